//! End-to-end run: ingest, deduplicate, audit, aggregate, merge.
//!
//! Stages run strictly in order. Per-record problems go to the
//! [`IssueLog`]; only I/O failures and residual duplicates abort a run.

use std::collections::BTreeSet;
use std::path::Path;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::PipelineConfig;
use crate::conflation::{ConflationDetector, ConflationReport};
use crate::cooccurrence::{CooccurrenceAggregator, HighCardinalityDocument};
use crate::dedup::{Deduplicator, GroupReport};
use crate::entity::EntityRecord;
use crate::error::{EntigraphResult, ValidationError};
use crate::feed::{self, MentionRow, RelationshipRow};
use crate::graph::{self, GraphMerger, MergedGraph, NamedEdge, ResolvedSecondary, WeightedEdgeSet};
use crate::identity::IdentityMap;
use crate::issues::{IssueCategory, IssueLog};

/// Run counters, always produced.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub raw_records_ingested: usize,
    pub malformed_records_skipped: usize,
    pub entities_before_dedup: usize,
    pub entities_after_dedup: usize,
    pub groups_merged: usize,
    pub records_absorbed: usize,
    pub residual_variation_groups: usize,
    pub type_conflicts: usize,
    pub partial_matches: usize,
    pub mentions_unresolved: u64,
    pub secondary_names_unresolved: usize,
    pub secondary_names_ambiguous: usize,
    pub secondary_self_loops_dropped: usize,
    pub documents_processed: u64,
    pub high_cardinality_documents: usize,
    pub cooccurrence_edges: usize,
    pub secondary_edges: usize,
    pub merged_edges: usize,
    pub corroborated_edges: usize,
    pub nodes: usize,
    pub synthetic_nodes: usize,
}

/// Everything a run produces.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Canonical entities, sorted by (kind, normalized name).
    pub entities: Vec<EntityRecord>,
    /// One report per entry of `entities`, same order.
    pub groups: Vec<GroupReport>,
    /// Findings of the audit that follows deduplication.
    pub conflation: ConflationReport,
    /// Identity context built from the deduplicated entities.
    pub identities: IdentityMap,
    /// Documents flagged as performance caveats.
    pub high_cardinality: BTreeSet<HighCardinalityDocument>,
    /// The co-occurrence graph as a tagged edge set.
    pub cooccurrence: WeightedEdgeSet,
    /// The secondary feed after name resolution.
    pub secondary: ResolvedSecondary,
    /// The merged, source-attributed graph.
    pub graph: MergedGraph,
    /// Run counters.
    pub summary: Summary,
    /// Per-record problems found during the run.
    pub issues: IssueLog,
}

/// Runs the stages under one [`PipelineConfig`].
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    /// Creates a pipeline; the config is validated when a run starts.
    #[must_use]
    pub const fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs over already-parsed feed rows.
    ///
    /// # Errors
    /// [`crate::EntigraphError::Validation`] for an invalid config and
    /// [`crate::EntigraphError::Pipeline`] when residual duplicates survive
    /// deduplication and the config says to fail on them.
    pub fn run(
        &self,
        mentions: &[MentionRow],
        relationships: &[RelationshipRow],
    ) -> EntigraphResult<PipelineOutput> {
        self.execute(mentions, relationships, 0, IssueLog::new())
    }

    /// Reads both feeds from disk and runs over them.
    ///
    /// Unparsable lines are counted as malformed input.
    ///
    /// # Errors
    /// [`crate::EntigraphError::Io`] if a feed cannot be read, otherwise as
    /// [`Self::run`].
    pub fn run_files(
        &self,
        mentions_path: &Path,
        relationships_path: Option<&Path>,
    ) -> EntigraphResult<PipelineOutput> {
        let mut issues = IssueLog::new();
        let mentions = feed::read_mentions(mentions_path, &mut issues)?;
        let unparsable_mentions = issues.count(IssueCategory::MalformedInput);
        let relationships = match relationships_path {
            Some(path) => feed::read_relationships(path, &mut issues)?,
            None => Vec::new(),
        };
        self.execute(&mentions, &relationships, unparsable_mentions, issues)
    }

    fn execute(
        &self,
        mentions: &[MentionRow],
        relationships: &[RelationshipRow],
        unparsable_mentions: usize,
        mut issues: IssueLog,
    ) -> EntigraphResult<PipelineOutput> {
        self.config.validate()?;
        let document_tag = self.config.document_tag()?;
        let secondary_tag = self.config.secondary_tag()?;

        let raw_records = self.ingest(mentions, &mut issues);
        let entities_before_dedup = raw_records.len();
        let documents = feed::group_documents(&raw_records);

        let outcome = Deduplicator::with_rules(self.config.canonical_rules.clone())
            .deduplicate(raw_records);
        for (surface, error) in &outcome.rejected {
            issues.record(IssueCategory::MalformedInput, surface.as_str(), error.to_string());
        }

        let conflation = ConflationDetector::new().detect(&outcome.records);
        if self.config.fail_on_residual_duplicates {
            conflation.ensure_no_residual_duplicates()?;
        }

        let identities = IdentityMap::from_records(&outcome.records);

        let aggregator = CooccurrenceAggregator::new(&identities)
            .with_high_cardinality_threshold(self.config.high_cardinality_threshold);
        let cooccurrence = if self.config.parallel {
            aggregator.aggregate_parallel(&documents)
        } else {
            aggregator.aggregate(&documents)
        };
        for document in &cooccurrence.high_cardinality {
            issues.record(
                IssueCategory::PerformanceCaveat,
                document.document_id.as_str(),
                format!(
                    "{} distinct entities produce {} pair increments",
                    document.distinct_entities, document.pair_increments
                ),
            );
        }
        let documents_processed = cooccurrence.documents_processed;
        let mentions_unresolved = cooccurrence.mentions_unresolved;
        let high_cardinality = cooccurrence.high_cardinality.clone();
        let cooccurrence = WeightedEdgeSet::from_cooccurrence(document_tag, cooccurrence);

        let named_edges = Self::validate_relationships(relationships, &mut issues);
        let secondary = graph::resolve_secondary(secondary_tag, &named_edges, &identities);
        Self::record_secondary_issues(&secondary, &mut issues);

        let graph = GraphMerger::new().merge(&[&cooccurrence, &secondary.edges], &identities);

        let counts = conflation.counts();
        let summary = Summary {
            raw_records_ingested: mentions.len() + unparsable_mentions,
            malformed_records_skipped: issues.count(IssueCategory::MalformedInput),
            entities_before_dedup,
            entities_after_dedup: outcome.records.len(),
            groups_merged: outcome.merged_groups(),
            records_absorbed: outcome.absorbed_records(),
            residual_variation_groups: counts.residual_variation,
            type_conflicts: counts.type_conflicts,
            partial_matches: counts.partial_matches,
            mentions_unresolved,
            secondary_names_unresolved: secondary.unresolved_names(),
            secondary_names_ambiguous: secondary.ambiguous_names.len(),
            secondary_self_loops_dropped: secondary.self_loops_dropped,
            documents_processed,
            high_cardinality_documents: high_cardinality.len(),
            cooccurrence_edges: cooccurrence.len(),
            secondary_edges: secondary.edges.len(),
            merged_edges: graph.edge_count(),
            corroborated_edges: graph.corroborated_edge_count(),
            nodes: graph.node_count(),
            synthetic_nodes: graph.nodes().filter(|n| n.synthetic).count(),
        };
        info!(
            raw = summary.raw_records_ingested,
            malformed = summary.malformed_records_skipped,
            entities = summary.entities_after_dedup,
            nodes = summary.nodes,
            edges = summary.merged_edges,
            "pipeline complete"
        );

        Ok(PipelineOutput {
            entities: outcome.records,
            groups: outcome.groups,
            conflation,
            identities,
            high_cardinality,
            cooccurrence,
            secondary,
            graph,
            summary,
            issues,
        })
    }

    /// Validates mention rows into raw records, in input order.
    fn ingest(&self, mentions: &[MentionRow], issues: &mut IssueLog) -> Vec<EntityRecord> {
        let validated: Vec<Result<EntityRecord, ValidationError>> = if self.config.parallel {
            mentions.par_iter().map(MentionRow::to_record).collect()
        } else {
            mentions.iter().map(MentionRow::to_record).collect()
        };

        let mut records = Vec::with_capacity(validated.len());
        for (index, result) in validated.into_iter().enumerate() {
            match result {
                Ok(record) => records.push(record),
                Err(e) => issues.record(
                    IssueCategory::MalformedInput,
                    format!("mentions[{index}]"),
                    e.to_string(),
                ),
            }
        }
        debug!(accepted = records.len(), total = mentions.len(), "mentions ingested");
        records
    }

    fn validate_relationships(
        relationships: &[RelationshipRow],
        issues: &mut IssueLog,
    ) -> Vec<NamedEdge> {
        relationships
            .iter()
            .enumerate()
            .filter_map(|(index, row)| match row.to_edge() {
                Ok(edge) => Some(edge),
                Err(e) => {
                    issues.record(
                        IssueCategory::MalformedInput,
                        format!("relationships[{index}]"),
                        e.to_string(),
                    );
                    None
                }
            })
            .collect()
    }

    fn record_secondary_issues(secondary: &ResolvedSecondary, issues: &mut IssueLog) {
        for (id, name) in &secondary.synthetic_nodes {
            issues.record(
                IssueCategory::UnresolvedReference,
                name.as_str(),
                format!("no entity matches; synthetic id {id}"),
            );
        }
        for name in &secondary.ambiguous_names {
            issues.record(
                IssueCategory::AmbiguousReference,
                name.as_str(),
                "name matches entities of several kinds",
            );
        }
        if secondary.self_loops_dropped > 0 {
            issues.record(
                IssueCategory::SelfLoop,
                secondary.edges.source.as_str(),
                format!("{} edges resolved to self-loops", secondary.self_loops_dropped),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityKind;
    use crate::identity::assign;

    fn row(name: &str, kind: &str, doc: &str, count: u64) -> MentionRow {
        MentionRow {
            mention_count: count,
            ..MentionRow::new(name, kind, doc)
        }
    }

    fn rel(a: &str, b: &str, weight: u64) -> RelationshipRow {
        RelationshipRow {
            source_name: a.to_string(),
            target_name: b.to_string(),
            weight,
        }
    }

    fn id(name: &str, kind: EntityKind) -> crate::entity::EntityId {
        assign(&crate::normalize::normalize(name), kind)
    }

    #[test]
    fn test_run_end_to_end() {
        let mentions = vec![
            row("THE FBI", "organization", "d1", 3),
            row("the FBI", "organization", "d2", 1),
            row("The FBI", "organization", "d3", 2),
            row("Jane Doe", "person", "d1", 1),
            row("Jane Doe", "person", "d2", 1),
            row("Bogus", "planet", "d1", 1),
        ];
        let relationships = vec![rel("Jane Doe", "The FBI", 5), rel("Jane Doe", "John Roe", 1)];
        let output = Pipeline::default().run(&mentions, &relationships).unwrap();

        assert_eq!(output.summary.raw_records_ingested, 6);
        assert_eq!(output.summary.malformed_records_skipped, 1);
        assert_eq!(output.summary.entities_before_dedup, 5);
        assert_eq!(output.summary.entities_after_dedup, 2);
        assert_eq!(output.summary.groups_merged, 2);
        assert_eq!(output.summary.documents_processed, 3);
        assert_eq!(output.summary.secondary_names_unresolved, 1);

        let fbi = id("The FBI", EntityKind::Organization);
        let jane = id("Jane Doe", EntityKind::Person);
        let edge = output.graph.edge(jane, fbi).unwrap();
        assert_eq!(edge.weight, 2 + 5);
        assert!(edge.is_corroborated());
        assert_eq!(output.issues.count(IssueCategory::UnresolvedReference), 1);
    }

    #[test]
    fn test_sequential_matches_parallel() {
        let mentions: Vec<MentionRow> = (0..40)
            .map(|i| row(&format!("Person {}", i % 7), "person", &format!("d{}", i % 5), 1))
            .collect();
        let parallel = Pipeline::default().run(&mentions, &[]).unwrap();
        let sequential = Pipeline::new(PipelineConfig {
            parallel: false,
            ..PipelineConfig::default()
        })
        .run(&mentions, &[])
        .unwrap();

        assert_eq!(parallel.summary, sequential.summary);
        assert_eq!(parallel.graph, sequential.graph);
        assert_eq!(parallel.entities, sequential.entities);
    }

    #[test]
    fn test_invalid_relationships_are_skipped() {
        let mentions = vec![row("A", "person", "d1", 1)];
        let output = Pipeline::default()
            .run(&mentions, &[rel("A", "", 1), rel("A", "B", 0), rel("A", "a", 4)])
            .unwrap();
        assert_eq!(output.issues.count(IssueCategory::MalformedInput), 2);
        assert_eq!(output.summary.secondary_self_loops_dropped, 1);
        assert_eq!(output.issues.count(IssueCategory::SelfLoop), 1);
        assert_eq!(output.summary.merged_edges, 0);
    }

    #[test]
    fn test_punctuation_only_endpoints_are_malformed() {
        let mentions = vec![row("Acme", "organization", "d1", 1)];
        let output = Pipeline::default()
            .run(&mentions, &[rel("???", "Acme", 1), rel("???", "!!!", 1)])
            .unwrap();
        assert_eq!(output.issues.count(IssueCategory::MalformedInput), 2);
        assert_eq!(output.summary.synthetic_nodes, 0);
        assert_eq!(output.summary.secondary_self_loops_dropped, 0);
        assert_eq!(output.summary.secondary_edges, 0);
    }

    #[test]
    fn test_high_cardinality_is_a_caveat() {
        let mentions: Vec<MentionRow> = ["A", "B", "C"]
            .iter()
            .map(|n| row(n, "concept", "big", 1))
            .collect();
        let config = PipelineConfig {
            high_cardinality_threshold: 3,
            ..PipelineConfig::default()
        };
        let output = Pipeline::new(config).run(&mentions, &[]).unwrap();
        assert_eq!(output.summary.high_cardinality_documents, 1);
        assert_eq!(output.summary.cooccurrence_edges, 3);
        assert_eq!(output.issues.count(IssueCategory::PerformanceCaveat), 1);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = PipelineConfig {
            high_cardinality_threshold: 0,
            ..PipelineConfig::default()
        };
        let err = Pipeline::new(config).run(&[], &[]).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_empty_input() {
        let output = Pipeline::default().run(&[], &[]).unwrap();
        assert_eq!(output.summary, Summary::default());
        assert!(output.issues.is_empty());
    }
}
