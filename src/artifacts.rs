//! Output artifacts.
//!
//! Every artifact is pretty-printed JSON built from ordered collections, so
//! identical inputs produce byte-identical files. Nothing here records a
//! timestamp.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use blake3::Hasher;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::conflation::{
    ConflationReport, PartialMatch, ResidualVariation, Severity, TypeConflict, PARTIAL_MATCH_NOTE,
};
use crate::dedup::GroupStatus;
use crate::entity::{EntityId, EntityKind};
use crate::error::{EntigraphError, EntigraphResult};
use crate::issues::IssueCategory;
use crate::pipeline::{PipelineOutput, Summary};

/// Deduplicated entity table.
pub const ENTITIES_FILE: &str = "entities.json";
/// Conflation report with one section per severity.
pub const CONFLATION_REPORT_FILE: &str = "conflation_report.json";
/// Merged graph nodes.
pub const GRAPH_NODES_FILE: &str = "graph_nodes.json";
/// Merged graph edges with source attribution.
pub const GRAPH_EDGES_FILE: &str = "graph_edges.json";
/// Run summary and issue counts.
pub const SUMMARY_FILE: &str = "summary.json";
/// Digests of the other artifacts.
pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Serialize)]
struct EntityRow<'a> {
    id: EntityId,
    canonical_name: &'a str,
    normalized_name: &'a str,
    kind: EntityKind,
    aliases: Vec<&'a str>,
    mention_count: u64,
    provenance: Vec<&'a str>,
    #[serde(flatten)]
    status: GroupStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<&'a serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct Section<'a, T> {
    severity: Severity,
    count: usize,
    findings: &'a [T],
}

#[derive(Debug, Serialize)]
struct PartialMatchSection<'a> {
    severity: Severity,
    count: usize,
    note: &'static str,
    findings: &'a [PartialMatch],
}

#[derive(Debug, Serialize)]
struct ConflationArtifact<'a> {
    residual_variation: Section<'a, ResidualVariation>,
    type_conflict: Section<'a, TypeConflict>,
    partial_match: PartialMatchSection<'a>,
}

impl<'a> From<&'a ConflationReport> for ConflationArtifact<'a> {
    fn from(report: &'a ConflationReport) -> Self {
        Self {
            residual_variation: Section {
                severity: ConflationReport::RESIDUAL_SEVERITY,
                count: report.residual_variation.len(),
                findings: &report.residual_variation,
            },
            type_conflict: Section {
                severity: ConflationReport::TYPE_CONFLICT_SEVERITY,
                count: report.type_conflicts.len(),
                findings: &report.type_conflicts,
            },
            partial_match: PartialMatchSection {
                severity: ConflationReport::PARTIAL_MATCH_SEVERITY,
                count: report.partial_matches.len(),
                note: PARTIAL_MATCH_NOTE,
                findings: &report.partial_matches,
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct NodeRow<'a> {
    id: EntityId,
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<EntityKind>,
    degree: usize,
    mention_count: u64,
    synthetic: bool,
}

#[derive(Debug, Serialize)]
struct EdgeRow<'a> {
    source: EntityId,
    target: EntityId,
    source_name: &'a str,
    target_name: &'a str,
    weight: u64,
    sources: Vec<&'a str>,
    corroborated: bool,
}

#[derive(Debug, Serialize)]
struct SummaryArtifact<'a> {
    #[serde(flatten)]
    summary: &'a Summary,
    issues: &'a BTreeMap<IssueCategory, usize>,
}

/// Digest of every artifact written by [`write_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    /// File name to lowercase hex blake3 digest.
    pub artifacts: BTreeMap<String, String>,
}

impl ArtifactManifest {
    /// Digest recorded for `file`, if it was written.
    #[must_use]
    pub fn digest(&self, file: &str) -> Option<&str> {
        self.artifacts.get(file).map(String::as_str)
    }
}

fn to_json<T: Serialize>(value: &T) -> EntigraphResult<Vec<u8>> {
    let mut bytes = serde_json::to_vec_pretty(value)?;
    bytes.push(b'\n');
    Ok(bytes)
}

fn digest(bytes: &[u8]) -> String {
    let mut h = Hasher::new();
    h.update(bytes);
    h.finalize().to_hex().to_string()
}

/// Renders every artifact in memory, keyed by file name.
///
/// The manifest is not included; [`write_all`] derives it from these bytes.
///
/// # Errors
/// [`EntigraphError::Serialization`] if a table fails to serialize.
pub fn render(output: &PipelineOutput) -> EntigraphResult<BTreeMap<&'static str, Vec<u8>>> {
    let entities: Vec<EntityRow<'_>> = output
        .entities
        .iter()
        .zip(&output.groups)
        .map(|(record, group)| EntityRow {
            id: record.id,
            canonical_name: &record.surface_name,
            normalized_name: &record.normalized_name,
            kind: record.kind,
            aliases: record.aliases.iter().map(String::as_str).collect(),
            mention_count: record.mention_count,
            provenance: record.provenance.iter().map(String::as_str).collect(),
            status: group.status,
            metadata: (!record.metadata.is_null()).then_some(&record.metadata),
        })
        .collect();

    let mut names: BTreeMap<EntityId, (&str, Option<EntityKind>)> = output
        .secondary
        .synthetic_nodes
        .iter()
        .map(|(id, name)| (*id, (name.as_str(), None)))
        .collect();
    for record in &output.entities {
        names.insert(record.id, (record.surface_name.as_str(), Some(record.kind)));
    }
    let name_of = |id: &EntityId| names.get(id).map_or("", |(name, _)| *name);

    let nodes: Vec<NodeRow<'_>> = output
        .graph
        .nodes()
        .map(|node| NodeRow {
            id: node.id,
            name: name_of(&node.id),
            kind: names.get(&node.id).and_then(|(_, kind)| *kind),
            degree: node.degree,
            mention_count: node.mention_count,
            synthetic: node.synthetic,
        })
        .collect();

    let edges: Vec<EdgeRow<'_>> = output
        .graph
        .edges()
        .map(|edge| EdgeRow {
            source: edge.key.low(),
            target: edge.key.high(),
            source_name: name_of(&edge.key.low()),
            target_name: name_of(&edge.key.high()),
            weight: edge.weight,
            sources: edge.sources.iter().map(|s| s.as_str()).collect(),
            corroborated: edge.is_corroborated(),
        })
        .collect();

    let summary = SummaryArtifact {
        summary: &output.summary,
        issues: output.issues.counts(),
    };

    let mut files = BTreeMap::new();
    files.insert(ENTITIES_FILE, to_json(&entities)?);
    files.insert(
        CONFLATION_REPORT_FILE,
        to_json(&ConflationArtifact::from(&output.conflation))?,
    );
    files.insert(GRAPH_NODES_FILE, to_json(&nodes)?);
    files.insert(GRAPH_EDGES_FILE, to_json(&edges)?);
    files.insert(SUMMARY_FILE, to_json(&summary)?);
    Ok(files)
}

/// Writes every artifact into `dir`, creating it if needed.
///
/// # Errors
/// [`EntigraphError::Io`] naming the path that failed, or
/// [`EntigraphError::Serialization`].
pub fn write_all(
    dir: &Path,
    output: &PipelineOutput,
    write_manifest: bool,
) -> EntigraphResult<ArtifactManifest> {
    fs::create_dir_all(dir).map_err(|e| EntigraphError::io(dir, e))?;

    let mut manifest = ArtifactManifest::default();
    for (name, bytes) in render(output)? {
        let path = dir.join(name);
        fs::write(&path, &bytes).map_err(|e| EntigraphError::io(&path, e))?;
        manifest.artifacts.insert(name.to_string(), digest(&bytes));
    }

    if write_manifest {
        let path = dir.join(MANIFEST_FILE);
        fs::write(&path, to_json(&manifest)?).map_err(|e| EntigraphError::io(&path, e))?;
    }
    info!(dir = %dir.display(), files = manifest.artifacts.len(), "artifacts written");
    Ok(manifest)
}
