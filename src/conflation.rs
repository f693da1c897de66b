//! Conflation detection over deduplicated entities.
//!
//! Three independent, read-only passes:
//!
//! 1. **Residual name variation**: two canonical entities of one kind share a
//!    normalized name. Always a deduplication defect.
//! 2. **Type conflict**: one normalized name appears under several kinds.
//!    Reported for human review, never resolved here.
//! 3. **Partial match**: one normalized name is a whitespace-bounded
//!    substring of another. Advisory only.
//!
//! Findings are never written back to the entity set.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::entity::{EntityId, EntityKind, EntityRecord};
use crate::error::PipelineError;
use crate::normalize::tokens;

/// Attached to every partial-match section.
pub const PARTIAL_MATCH_NOTE: &str = "Partial matches are NOT asserted duplicates. Most pairs \
are legitimately distinct entities (for example a full name and an unrelated person sharing a \
surname, or a person and an organization named after them). Review before acting.";

/// How urgently a finding needs attention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// A pipeline defect; must never occur after deduplication.
    Defect,
    /// Needs manual resolution.
    Review,
    /// Informational; most findings are expected to be benign.
    Advisory,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Defect => write!(f, "defect"),
            Self::Review => write!(f, "review"),
            Self::Advisory => write!(f, "advisory"),
        }
    }
}

/// The fields of a record a reviewer needs to decide a finding.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct EntitySummary {
    pub normalized_name: String,
    pub kind: EntityKind,
    pub id: EntityId,
    pub canonical_name: String,
    pub mention_count: u64,
}

impl From<&EntityRecord> for EntitySummary {
    fn from(record: &EntityRecord) -> Self {
        Self {
            normalized_name: record.normalized_name.clone(),
            kind: record.kind,
            id: record.id,
            canonical_name: record.surface_name.clone(),
            mention_count: record.mention_count,
        }
    }
}

/// Several canonical entities of one kind sharing a normalized name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResidualVariation {
    /// Kind shared by every entity in the group.
    pub kind: EntityKind,
    /// Key shared by every entity in the group.
    pub normalized_name: String,
    /// The entities that should have been one.
    pub entities: Vec<EntitySummary>,
}

/// One normalized name classified under two or more kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeConflict {
    /// Key shared across the kinds.
    pub normalized_name: String,
    /// One summary per kind, ordered by kind.
    pub entities: Vec<EntitySummary>,
}

impl TypeConflict {
    /// The conflicting kinds.
    #[must_use]
    pub fn kinds(&self) -> Vec<EntityKind> {
        self.entities.iter().map(|e| e.kind).collect()
    }

    /// The identifiers involved.
    #[must_use]
    pub fn ids(&self) -> Vec<EntityId> {
        self.entities.iter().map(|e| e.id).collect()
    }
}

/// A pair where the shorter name occurs token-aligned inside the longer one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialMatch {
    /// The entity whose tokens appear inside the other's.
    pub shorter: EntitySummary,
    /// The entity containing them.
    pub longer: EntitySummary,
    /// Whether both entities share a kind.
    pub same_kind: bool,
}

/// Structured output of all three passes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflationReport {
    /// Same kind and key, several identities. A dedup defect.
    pub residual_variation: Vec<ResidualVariation>,
    /// Same key under several kinds, for review.
    pub type_conflicts: Vec<TypeConflict>,
    /// Token-aligned containment, advisory only.
    pub partial_matches: Vec<PartialMatch>,
}

/// Finding counts per section.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct ConflationCounts {
    pub residual_variation: usize,
    pub type_conflicts: usize,
    pub partial_matches: usize,
}

impl ConflationReport {
    /// Severity of the residual-variation section.
    pub const RESIDUAL_SEVERITY: Severity = Severity::Defect;
    /// Severity of the type-conflict section.
    pub const TYPE_CONFLICT_SEVERITY: Severity = Severity::Review;
    /// Severity of the partial-match section.
    pub const PARTIAL_MATCH_SEVERITY: Severity = Severity::Advisory;

    /// Finding counts per section.
    #[must_use]
    pub fn counts(&self) -> ConflationCounts {
        ConflationCounts {
            residual_variation: self.residual_variation.len(),
            type_conflicts: self.type_conflicts.len(),
            partial_matches: self.partial_matches.len(),
        }
    }

    /// Returns an error if the residual-variation section is non-empty.
    ///
    /// # Errors
    /// [`PipelineError::DeduplicationInvariantViolation`] naming the first
    /// offending group.
    pub fn ensure_no_residual_duplicates(&self) -> Result<(), PipelineError> {
        match self.residual_variation.first() {
            None => Ok(()),
            Some(first) => Err(PipelineError::DeduplicationInvariantViolation {
                groups: self.residual_variation.len(),
                first: format!("{}:{}", first.kind, first.normalized_name),
            }),
        }
    }
}

/// Runs the three conflation passes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConflationDetector;

impl ConflationDetector {
    /// Creates a detector.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Runs all three passes.
    #[must_use]
    pub fn detect(&self, entities: &[EntityRecord]) -> ConflationReport {
        let report = ConflationReport {
            residual_variation: self.residual_variation(entities),
            type_conflicts: self.type_conflicts(entities),
            partial_matches: self.partial_matches(entities),
        };
        let counts = report.counts();
        info!(
            residual = counts.residual_variation,
            type_conflicts = counts.type_conflicts,
            partial_matches = counts.partial_matches,
            "conflation detection complete"
        );
        report
    }

    /// Pass 1: entities of one kind that share a normalized name.
    #[must_use]
    pub fn residual_variation(&self, entities: &[EntityRecord]) -> Vec<ResidualVariation> {
        let mut groups: BTreeMap<(EntityKind, &str), Vec<EntitySummary>> = BTreeMap::new();
        for entity in entities {
            groups
                .entry((entity.kind, entity.normalized_name.as_str()))
                .or_default()
                .push(EntitySummary::from(entity));
        }

        groups
            .into_iter()
            .filter(|(_, members)| members.len() > 1)
            .map(|((kind, name), mut entities)| {
                entities.sort();
                ResidualVariation {
                    kind,
                    normalized_name: name.to_string(),
                    entities,
                }
            })
            .collect()
    }

    /// Pass 2: normalized names present under two or more kinds.
    #[must_use]
    pub fn type_conflicts(&self, entities: &[EntityRecord]) -> Vec<TypeConflict> {
        let mut by_name: BTreeMap<&str, BTreeMap<EntityKind, EntitySummary>> = BTreeMap::new();
        for entity in entities {
            by_name
                .entry(entity.normalized_name.as_str())
                .or_default()
                .entry(entity.kind)
                .or_insert_with(|| EntitySummary::from(entity));
        }

        by_name
            .into_iter()
            .filter(|(_, kinds)| kinds.len() > 1)
            .map(|(name, kinds)| {
                debug!(key = name, kinds = kinds.len(), "type conflict");
                TypeConflict {
                    normalized_name: name.to_string(),
                    entities: kinds.into_values().collect(),
                }
            })
            .collect()
    }

    /// Pass 3: token-aligned substring pairs, within or across kinds.
    ///
    /// Candidates are found through a token index: only entities containing
    /// the shorter name's first token are compared against it.
    #[must_use]
    pub fn partial_matches(&self, entities: &[EntityRecord]) -> Vec<PartialMatch> {
        let tokenized: Vec<Vec<&str>> = entities
            .iter()
            .map(|e| tokens(&e.normalized_name).collect())
            .collect();

        let mut index: HashMap<&str, Vec<usize>> = HashMap::new();
        for (i, toks) in tokenized.iter().enumerate() {
            let distinct: BTreeSet<&str> = toks.iter().copied().collect();
            for token in distinct {
                index.entry(token).or_default().push(i);
            }
        }

        let mut matches = Vec::new();
        let mut comparisons = 0usize;
        for (s, short_tokens) in tokenized.iter().enumerate() {
            let Some(first) = short_tokens.first() else {
                continue;
            };
            let Some(candidates) = index.get(first) else {
                continue;
            };
            for &l in candidates {
                let long_tokens = &tokenized[l];
                if long_tokens.len() <= short_tokens.len() {
                    continue;
                }
                comparisons += 1;
                if contains_run(long_tokens, short_tokens) {
                    matches.push(PartialMatch {
                        shorter: EntitySummary::from(&entities[s]),
                        longer: EntitySummary::from(&entities[l]),
                        same_kind: entities[s].kind == entities[l].kind,
                    });
                }
            }
        }
        debug!(
            entities = entities.len(),
            comparisons,
            matches = matches.len(),
            "partial-match scan"
        );

        matches.sort_by(|a, b| (&a.shorter, &a.longer).cmp(&(&b.shorter, &b.longer)));
        matches
    }
}

/// Returns true if `needle` occurs as a contiguous run inside `haystack`.
fn contains_run(haystack: &[&str], needle: &[&str]) -> bool {
    !needle.is_empty() && haystack.windows(needle.len()).any(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(name: &str, kind: EntityKind, mentions: u64) -> EntityRecord {
        EntityRecord::new(name, kind).unwrap().with_mentions(mentions)
    }

    #[test]
    fn test_contains_run() {
        assert!(contains_run(&["grace", "hopper"], &["hopper"]));
        assert!(contains_run(&["new", "york", "times"], &["new", "york"]));
        assert!(!contains_run(&["new", "york", "times"], &["new", "times"]));
        assert!(!contains_run(&["hopperville"], &["hopper"]));
        assert!(!contains_run(&["a"], &[]));
    }

    #[test]
    fn test_residual_variation_empty_for_distinct_names() {
        let entities = vec![
            entity("Acme", EntityKind::Organization, 1),
            entity("Globex", EntityKind::Organization, 1),
        ];
        let report = ConflationDetector::new().detect(&entities);
        assert!(report.residual_variation.is_empty());
        assert!(report.ensure_no_residual_duplicates().is_ok());
    }

    #[test]
    fn test_residual_variation_flags_same_kind_duplicates() {
        let entities = vec![
            entity("Acme", EntityKind::Organization, 1),
            entity("ACME", EntityKind::Organization, 2),
        ];
        let report = ConflationDetector::new().detect(&entities);
        assert_eq!(report.residual_variation.len(), 1);
        assert_eq!(report.residual_variation[0].entities.len(), 2);
        let err = report.ensure_no_residual_duplicates().unwrap_err();
        assert!(format!("{err}").contains("organization:acme"));
    }

    #[test]
    fn test_type_conflict_pairs_both_ids() {
        let loc = entity("New York", EntityKind::Location, 10);
        let org = entity("New York", EntityKind::Organization, 2);
        let report = ConflationDetector::new().detect(&[loc.clone(), org.clone()]);

        assert_eq!(report.type_conflicts.len(), 1);
        let conflict = &report.type_conflicts[0];
        assert_eq!(conflict.normalized_name, "new york");
        assert_eq!(conflict.ids(), vec![org.id, loc.id]);
        assert_eq!(
            conflict.kinds(),
            vec![EntityKind::Organization, EntityKind::Location]
        );
        assert_eq!(conflict.entities[1].mention_count, 10);
        assert!(report.residual_variation.is_empty());
    }

    #[test]
    fn test_type_conflict_three_kinds_is_one_finding() {
        let entities = vec![
            entity("Jordan", EntityKind::Person, 1),
            entity("Jordan", EntityKind::Location, 1),
            entity("Jordan", EntityKind::Organization, 1),
        ];
        let conflicts = ConflationDetector::new().type_conflicts(&entities);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].entities.len(), 3);
    }

    #[test]
    fn test_partial_match_within_and_across_kinds() {
        let entities = vec![
            entity("Hopper", EntityKind::Person, 4),
            entity("Grace Hopper", EntityKind::Person, 9),
            entity("Hopper Foundation", EntityKind::Organization, 3),
            entity("Hopperville", EntityKind::Location, 1),
        ];
        let matches = ConflationDetector::new().partial_matches(&entities);
        assert_eq!(matches.len(), 2);
        assert!(matches
            .iter()
            .all(|m| m.shorter.normalized_name == "hopper"));
        let longer: BTreeSet<&str> = matches
            .iter()
            .map(|m| m.longer.normalized_name.as_str())
            .collect();
        assert_eq!(longer, BTreeSet::from(["grace hopper", "hopper foundation"]));
        let cross = matches
            .iter()
            .find(|m| m.longer.normalized_name == "hopper foundation")
            .unwrap();
        assert!(!cross.same_kind);
    }

    #[test]
    fn test_partial_match_excludes_identical_names() {
        let entities = vec![
            entity("New York", EntityKind::Location, 1),
            entity("New York", EntityKind::Organization, 1),
        ];
        assert!(ConflationDetector::new().partial_matches(&entities).is_empty());
    }

    #[test]
    fn test_partial_match_multi_token_needle() {
        let entities = vec![
            entity("New York", EntityKind::Location, 1),
            entity("The New York Times", EntityKind::Organization, 1),
            entity("York", EntityKind::Location, 1),
        ];
        let matches = ConflationDetector::new().partial_matches(&entities);
        let pairs: BTreeSet<(&str, &str)> = matches
            .iter()
            .map(|m| (m.shorter.normalized_name.as_str(), m.longer.normalized_name.as_str()))
            .collect();
        assert_eq!(
            pairs,
            BTreeSet::from([
                ("new york", "the new york times"),
                ("york", "new york"),
                ("york", "the new york times"),
            ])
        );
    }

    #[test]
    fn test_report_is_deterministic_under_input_order() {
        let mut entities = vec![
            entity("Hopper", EntityKind::Person, 4),
            entity("Grace Hopper", EntityKind::Person, 9),
            entity("Ada Hopper", EntityKind::Person, 7),
            entity("Hopper", EntityKind::Location, 1),
        ];
        let forward = ConflationDetector::new().detect(&entities);
        entities.reverse();
        let backward = ConflationDetector::new().detect(&entities);
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_counts_and_severity_order() {
        let report = ConflationReport::default();
        assert_eq!(report.counts(), ConflationCounts::default());
        assert!(ConflationReport::TYPE_CONFLICT_SEVERITY < ConflationReport::PARTIAL_MATCH_SEVERITY);
        assert_eq!(format!("{}", Severity::Advisory), "advisory");
    }
}
