//! Document-level co-occurrence aggregation.
//!
//! Aggregation is a pure fold over `(document, mentions)` pairs. Each
//! document contributes one increment per unordered pair of distinct
//! resolved entities, so a document with `k` distinct entities contributes
//! exactly `k * (k - 1) / 2` increments no matter how often each entity is
//! repeated inside it.
//!
//! Partial accumulators combine by addition and set union, which is
//! commutative and associative; [`CooccurrenceAggregator::aggregate_parallel`]
//! relies on that to split work across threads.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::entity::{EntityId, EntityKind};
use crate::identity::IdentityMap;

/// Default distinct-entity count at which a document is flagged.
pub const DEFAULT_HIGH_CARDINALITY_THRESHOLD: usize = 100;

/// An unordered entity pair, stored in canonical (sorted) order.
///
/// # Examples
///
/// ```
/// use entigraph::{identity::assign, EdgeKey, EntityKind};
///
/// let a = assign("acme", EntityKind::Organization);
/// let b = assign("globex", EntityKind::Organization);
/// assert_eq!(EdgeKey::new(a, b), EdgeKey::new(b, a));
/// assert!(EdgeKey::new(a, a).is_none());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EdgeKey {
    low: EntityId,
    high: EntityId,
}

impl EdgeKey {
    /// Canonicalizes a pair. Returns `None` for a self-pair.
    #[must_use]
    pub fn new(a: EntityId, b: EntityId) -> Option<Self> {
        match a.cmp(&b) {
            std::cmp::Ordering::Less => Some(Self { low: a, high: b }),
            std::cmp::Ordering::Greater => Some(Self { low: b, high: a }),
            std::cmp::Ordering::Equal => None,
        }
    }

    /// The smaller endpoint.
    #[must_use]
    pub const fn low(&self) -> EntityId {
        self.low
    }

    /// The larger endpoint.
    #[must_use]
    pub const fn high(&self) -> EntityId {
        self.high
    }

    /// Returns true if `id` is an endpoint.
    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.low == id || self.high == id
    }

    /// The endpoint opposite `id`, if `id` is an endpoint.
    #[must_use]
    pub fn other(&self, id: EntityId) -> Option<EntityId> {
        if self.low == id {
            Some(self.high)
        } else if self.high == id {
            Some(self.low)
        } else {
            None
        }
    }
}

impl fmt::Display for EdgeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}--{}", self.low, self.high)
    }
}

/// One raw mention inside a document.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mention {
    pub surface_name: String,
    pub kind: EntityKind,
}

impl Mention {
    /// Creates a mention.
    #[must_use]
    pub fn new(surface_name: impl Into<String>, kind: EntityKind) -> Self {
        Self {
            surface_name: surface_name.into(),
            kind,
        }
    }
}

/// A document and the raw mentions extracted from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Unique document identifier.
    pub id: String,
    /// Mentions in extraction order; repeats are allowed.
    pub mentions: Vec<Mention>,
}

impl Document {
    /// Creates a document.
    #[must_use]
    pub fn new(id: impl Into<String>, mentions: Vec<Mention>) -> Self {
        Self {
            id: id.into(),
            mentions,
        }
    }
}

/// A document whose distinct-entity count reached the threshold.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HighCardinalityDocument {
    /// The flagged document.
    pub document_id: String,
    /// Distinct resolved entities it mentions.
    pub distinct_entities: usize,
    /// Edge increments it contributed, `k * (k - 1) / 2`.
    pub pair_increments: u64,
}

/// Accumulated co-occurrence weights plus observability counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CooccurrenceGraph {
    weights: BTreeMap<EdgeKey, u64>,
    /// Documents folded in.
    pub documents_processed: u64,
    /// Mentions that matched an entity.
    pub mentions_resolved: u64,
    /// Mentions with no matching entity; skipped.
    pub mentions_unresolved: u64,
    /// Documents at or above the cardinality threshold.
    pub high_cardinality: BTreeSet<HighCardinalityDocument>,
}

impl CooccurrenceGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Weight of the pair `(a, b)`; symmetric, 0 when absent.
    #[must_use]
    pub fn weight(&self, a: EntityId, b: EntityId) -> u64 {
        EdgeKey::new(a, b)
            .and_then(|key| self.weights.get(&key).copied())
            .unwrap_or(0)
    }

    /// All pairs with their weights, in canonical order.
    #[must_use]
    pub fn weights(&self) -> &BTreeMap<EdgeKey, u64> {
        &self.weights
    }

    /// Consumes the graph, returning its weights.
    #[must_use]
    pub fn into_weights(self) -> BTreeMap<EdgeKey, u64> {
        self.weights
    }

    /// Number of distinct pairs.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.weights.len()
    }

    /// Sum of all pair increments.
    #[must_use]
    pub fn total_weight(&self) -> u64 {
        self.weights.values().sum()
    }

    /// Adds `weight` to the pair `key`.
    pub fn increment(&mut self, key: EdgeKey, weight: u64) {
        let slot = self.weights.entry(key).or_insert(0);
        *slot = slot.saturating_add(weight);
    }

    /// Merges another partial accumulator into this one.
    #[must_use]
    pub fn combine(mut self, other: Self) -> Self {
        for (key, weight) in other.weights {
            self.increment(key, weight);
        }
        self.documents_processed += other.documents_processed;
        self.mentions_resolved += other.mentions_resolved;
        self.mentions_unresolved += other.mentions_unresolved;
        self.high_cardinality.extend(other.high_cardinality);
        self
    }
}

/// Folds documents into a [`CooccurrenceGraph`] using an [`IdentityMap`].
#[derive(Debug, Clone, Copy)]
pub struct CooccurrenceAggregator<'a> {
    identities: &'a IdentityMap,
    high_cardinality_threshold: usize,
}

impl<'a> CooccurrenceAggregator<'a> {
    /// Creates an aggregator with [`DEFAULT_HIGH_CARDINALITY_THRESHOLD`].
    #[must_use]
    pub fn new(identities: &'a IdentityMap) -> Self {
        Self {
            identities,
            high_cardinality_threshold: DEFAULT_HIGH_CARDINALITY_THRESHOLD,
        }
    }

    /// Overrides the high-cardinality threshold.
    #[must_use]
    pub fn with_high_cardinality_threshold(mut self, threshold: usize) -> Self {
        self.high_cardinality_threshold = threshold;
        self
    }

    /// Folds a document sequence into a graph.
    pub fn aggregate<'d, I>(&self, documents: I) -> CooccurrenceGraph
    where
        I: IntoIterator<Item = &'d Document>,
    {
        let mut graph = CooccurrenceGraph::new();
        for document in documents {
            self.add_document(&mut graph, document);
        }
        self.log_summary(&graph);
        graph
    }

    /// Folds documents on the rayon pool and combines the partial graphs.
    ///
    /// Produces exactly the same graph as [`Self::aggregate`].
    #[must_use]
    pub fn aggregate_parallel(&self, documents: &[Document]) -> CooccurrenceGraph {
        let graph = documents
            .par_iter()
            .fold(CooccurrenceGraph::new, |mut graph, document| {
                self.add_document(&mut graph, document);
                graph
            })
            .reduce(CooccurrenceGraph::new, CooccurrenceGraph::combine);
        self.log_summary(&graph);
        graph
    }

    /// Adds one document's pair increments to `graph`.
    pub fn add_document(&self, graph: &mut CooccurrenceGraph, document: &Document) {
        let mut ids: BTreeSet<EntityId> = BTreeSet::new();
        for mention in &document.mentions {
            match self.identities.resolve(&mention.surface_name, mention.kind) {
                Some(id) => {
                    graph.mentions_resolved += 1;
                    ids.insert(id);
                }
                None => {
                    graph.mentions_unresolved += 1;
                    debug!(
                        document = %document.id,
                        surface = %mention.surface_name,
                        kind = %mention.kind,
                        "unresolved mention skipped"
                    );
                }
            }
        }
        graph.documents_processed += 1;

        let ids: Vec<EntityId> = ids.into_iter().collect();
        let k = ids.len() as u64;
        let increments = k * k.saturating_sub(1) / 2;
        if ids.len() >= self.high_cardinality_threshold {
            warn!(
                document = %document.id,
                distinct_entities = ids.len(),
                pair_increments = increments,
                "high-cardinality document"
            );
            graph.high_cardinality.insert(HighCardinalityDocument {
                document_id: document.id.clone(),
                distinct_entities: ids.len(),
                pair_increments: increments,
            });
        }

        for (i, &a) in ids.iter().enumerate() {
            for &b in &ids[i + 1..] {
                // `ids` is sorted and distinct, so (a, b) is already canonical.
                graph.increment(EdgeKey { low: a, high: b }, 1);
            }
        }
    }

    fn log_summary(&self, graph: &CooccurrenceGraph) {
        info!(
            documents = graph.documents_processed,
            edges = graph.edge_count(),
            resolved = graph.mentions_resolved,
            unresolved = graph.mentions_unresolved,
            high_cardinality = graph.high_cardinality.len(),
            "co-occurrence aggregation complete"
        );
    }
}
