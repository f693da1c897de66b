//! Weighted relationship graphs and their merge.
//!
//! Every input graph is a [`WeightedEdgeSet`]: canonical pairs with integer
//! weights, all attributed to one [`SourceTag`]. Merging sums weights per
//! pair and records which sources contributed, so document-only edges stay
//! distinguishable from edges corroborated by another source.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cooccurrence::{CooccurrenceGraph, EdgeKey};
use crate::entity::EntityId;
use crate::error::ValidationError;
use crate::identity::{self, IdentityMap, NameResolution};

/// Names the origin of an edge set.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceTag(String);

impl SourceTag {
    /// Tag for edges derived from document co-occurrence.
    pub const DOCUMENT: &'static str = "document";
    /// Default tag for the secondary relationship source.
    pub const MANIFEST: &'static str = "manifest";

    /// Creates a tag.
    ///
    /// # Errors
    /// Returns [`ValidationError::InvalidConfig`] for a blank tag.
    pub fn new(tag: impl Into<String>) -> Result<Self, ValidationError> {
        let tag = tag.into();
        if tag.trim().is_empty() {
            return Err(ValidationError::InvalidConfig {
                field: "source_tag".to_string(),
                reason: "source tag cannot be empty".to_string(),
            });
        }
        Ok(Self(tag))
    }

    /// The `document` tag.
    #[must_use]
    pub fn document() -> Self {
        Self(Self::DOCUMENT.to_string())
    }

    /// The `manifest` tag.
    #[must_use]
    pub fn manifest() -> Self {
        Self(Self::MANIFEST.to_string())
    }

    /// Returns the tag text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A weighted edge set attributed to a single source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeightedEdgeSet {
    /// Source every edge is attributed to.
    pub source: SourceTag,
    edges: BTreeMap<EdgeKey, u64>,
}

impl WeightedEdgeSet {
    /// Creates an empty set for `source`.
    #[must_use]
    pub fn new(source: SourceTag) -> Self {
        Self {
            source,
            edges: BTreeMap::new(),
        }
    }

    /// Wraps a co-occurrence graph.
    #[must_use]
    pub fn from_cooccurrence(source: SourceTag, graph: CooccurrenceGraph) -> Self {
        Self {
            source,
            edges: graph.into_weights(),
        }
    }

    /// Adds weight to a pair; repeated pairs accumulate. Self-pairs are
    /// ignored and reported by returning `false`.
    pub fn add(&mut self, a: EntityId, b: EntityId, weight: u64) -> bool {
        let Some(key) = EdgeKey::new(a, b) else {
            return false;
        };
        let slot = self.edges.entry(key).or_insert(0);
        *slot = slot.saturating_add(weight);
        true
    }

    /// Weight of a pair in either order (0 when absent).
    #[must_use]
    pub fn weight(&self, a: EntityId, b: EntityId) -> u64 {
        EdgeKey::new(a, b)
            .and_then(|key| self.edges.get(&key).copied())
            .unwrap_or(0)
    }

    /// Edges in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (&EdgeKey, &u64)> {
        self.edges.iter()
    }

    /// Number of edges.
    #[must_use]
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    /// Returns true if there are no edges.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

/// One relationship from the secondary source, keyed by surface names.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedEdge {
    pub source_name: String,
    pub target_name: String,
    pub weight: u64,
}

/// Secondary edges mapped into the entity identifier space.
#[derive(Debug, Clone)]
pub struct ResolvedSecondary {
    /// Resolved edges, self-loops removed.
    pub edges: WeightedEdgeSet,
    /// Names that fell back to a synthetic identifier, with that identifier.
    pub synthetic_nodes: BTreeMap<EntityId, String>,
    /// Names that matched several kinds.
    pub ambiguous_names: BTreeSet<String>,
    /// Edges whose endpoints resolved to the same identifier.
    pub self_loops_dropped: usize,
}

impl ResolvedSecondary {
    /// Number of distinct names that did not resolve.
    #[must_use]
    pub fn unresolved_names(&self) -> usize {
        self.synthetic_nodes.len()
    }
}

/// Maps a name-keyed edge list into identifier space.
///
/// Names missing from `identities` get a synthetic identifier so their
/// relationships are kept rather than dropped.
#[must_use]
pub fn resolve_secondary(
    source: SourceTag,
    edges: &[NamedEdge],
    identities: &IdentityMap,
) -> ResolvedSecondary {
    let mut resolved = ResolvedSecondary {
        edges: WeightedEdgeSet::new(source),
        synthetic_nodes: BTreeMap::new(),
        ambiguous_names: BTreeSet::new(),
        self_loops_dropped: 0,
    };

    for edge in edges {
        let a = resolve_endpoint(&edge.source_name, identities, &mut resolved);
        let b = resolve_endpoint(&edge.target_name, identities, &mut resolved);
        if !resolved.edges.add(a, b, edge.weight) {
            resolved.self_loops_dropped += 1;
            warn!(
                source = %edge.source_name,
                target = %edge.target_name,
                "secondary edge resolves to a self-loop; dropped"
            );
        }
    }

    info!(
        source = %resolved.edges.source,
        edges = resolved.edges.len(),
        unresolved_names = resolved.unresolved_names(),
        ambiguous_names = resolved.ambiguous_names.len(),
        self_loops = resolved.self_loops_dropped,
        "secondary graph resolved"
    );
    resolved
}

fn resolve_endpoint(
    name: &str,
    identities: &IdentityMap,
    resolved: &mut ResolvedSecondary,
) -> EntityId {
    match identities.resolve_name(name) {
        NameResolution::Unique(id) => id,
        NameResolution::Ambiguous { chosen, candidates } => {
            debug!(name, candidates, "ambiguous secondary name");
            resolved.ambiguous_names.insert(name.to_string());
            chosen
        }
        NameResolution::Unresolved => {
            let id = identity::synthetic_id(name);
            resolved
                .synthetic_nodes
                .entry(id)
                .or_insert_with(|| name.to_string());
            id
        }
    }
}

/// An edge of the merged graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedEdge {
    /// Canonical endpoint pair.
    pub key: EdgeKey,
    /// Sum over every contributing source.
    pub weight: u64,
    /// Sources that contributed.
    pub sources: BTreeSet<SourceTag>,
}

impl MergedEdge {
    /// Returns true if more than one source contributed.
    #[must_use]
    pub fn is_corroborated(&self) -> bool {
        self.sources.len() > 1
    }
}

/// A node of the merged graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedNode {
    /// Entity or synthetic identifier.
    pub id: EntityId,
    /// Distinct neighbours.
    pub degree: usize,
    /// Mentions recorded for the entity; 0 for synthetic nodes.
    pub mention_count: u64,
    /// True if the node exists only through a fallback identifier.
    pub synthetic: bool,
}

/// The merged, attributed, weighted graph.
///
/// Edges are stored once under their canonical [`EdgeKey`]; an adjacency
/// index makes lookups by either endpoint symmetric.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergedGraph {
    nodes: BTreeMap<EntityId, MergedNode>,
    edges: BTreeMap<EdgeKey, MergedEdge>,
    adjacency: BTreeMap<EntityId, BTreeSet<EntityId>>,
}

impl MergedGraph {
    /// Looks up the edge between `a` and `b`, in either order.
    #[must_use]
    pub fn edge(&self, a: EntityId, b: EntityId) -> Option<&MergedEdge> {
        EdgeKey::new(a, b).and_then(|key| self.edges.get(&key))
    }

    /// Neighbours of `id` (empty when unknown).
    pub fn neighbors(&self, id: EntityId) -> impl Iterator<Item = EntityId> + '_ {
        self.adjacency.get(&id).into_iter().flatten().copied()
    }

    /// Node by identifier.
    #[must_use]
    pub fn node(&self, id: EntityId) -> Option<&MergedNode> {
        self.nodes.get(&id)
    }

    /// Nodes in identifier order.
    pub fn nodes(&self) -> impl Iterator<Item = &MergedNode> {
        self.nodes.values()
    }

    /// Edges in canonical order.
    pub fn edges(&self) -> impl Iterator<Item = &MergedEdge> {
        self.edges.values()
    }

    /// Number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Number of edges contributed by more than one source.
    #[must_use]
    pub fn corroborated_edge_count(&self) -> usize {
        self.edges.values().filter(|e| e.is_corroborated()).count()
    }
}

/// Combines edge sets over a shared identifier space.
#[derive(Debug, Clone, Copy, Default)]
pub struct GraphMerger;

impl GraphMerger {
    /// Creates a merger.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Merges `sets` into one graph.
    ///
    /// Every entity in `identities` becomes a node, plus every edge endpoint
    /// not in it (flagged synthetic). The merge is a pure set combination:
    /// the edge count never exceeds the sum of the inputs' edge counts.
    #[must_use]
    pub fn merge(&self, sets: &[&WeightedEdgeSet], identities: &IdentityMap) -> MergedGraph {
        let mut graph = MergedGraph::default();

        for set in sets {
            for (key, weight) in set.iter() {
                let edge = graph.edges.entry(*key).or_insert_with(|| MergedEdge {
                    key: *key,
                    weight: 0,
                    sources: BTreeSet::new(),
                });
                edge.weight = edge.weight.saturating_add(*weight);
                edge.sources.insert(set.source.clone());

                graph.adjacency.entry(key.low()).or_default().insert(key.high());
                graph.adjacency.entry(key.high()).or_default().insert(key.low());
            }
        }

        let ids: BTreeSet<EntityId> = identities
            .ids()
            .chain(graph.adjacency.keys().copied())
            .collect();
        for id in ids {
            let degree = graph.adjacency.get(&id).map_or(0, BTreeSet::len);
            graph.nodes.insert(
                id,
                MergedNode {
                    id,
                    degree,
                    mention_count: identities.mention_count(id),
                    synthetic: !identities.contains(id),
                },
            );
        }

        let input_edges: usize = sets.iter().map(|s| s.len()).sum();
        info!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            input_edges,
            corroborated = graph.corroborated_edge_count(),
            "graph merge complete"
        );
        graph
    }
}
