//! # entigraph - Entity Resolution and Relationship Graph Construction
//!
//! entigraph turns raw named-entity mentions extracted from a document
//! corpus into a deduplicated entity registry, audits that registry for
//! conflation, and builds a weighted relationship graph from document
//! co-occurrence merged with a secondary relationship source.
//!
//! ## Core Concepts
//!
//! - **Normalization**: a deterministic name key (case, possessives, punctuation)
//! - **Identity**: a stable identifier derived from `(normalized name, kind)`
//! - **Deduplication**: one canonical record per key, with aliases and provenance
//! - **Conflation report**: residual variation, type conflicts, partial matches
//! - **Merged graph**: co-occurrence and secondary edges, attributed by source
//!
//! ## Usage
//!
//! ```rust
//! use entigraph::{identity, EntityKind, MentionRow, Pipeline, PipelineConfig};
//!
//! let mentions = vec![
//!     MentionRow::new("Jane Doe", "person", "doc-1"),
//!     MentionRow::new("Acme Corp.", "organization", "doc-1"),
//! ];
//! let output = Pipeline::new(PipelineConfig::default()).run(&mentions, &[]).unwrap();
//!
//! let jane = identity::assign("jane doe", EntityKind::Person);
//! let acme = identity::assign("acme corp", EntityKind::Organization);
//! assert_eq!(output.graph.edge(jane, acme).unwrap().weight, 1);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod entity;
pub mod error;
pub mod issues;
pub mod normalize;

// Resolution and audit
pub mod conflation;
pub mod dedup;
pub mod identity;

// Graph construction
pub mod cooccurrence;
pub mod graph;

// Running and output
pub mod artifacts;
pub mod config;
pub mod feed;
pub mod pipeline;

pub use artifacts::{write_all, ArtifactManifest};
pub use config::PipelineConfig;
pub use conflation::{ConflationDetector, ConflationReport, PartialMatch, Severity, TypeConflict};
pub use cooccurrence::{CooccurrenceAggregator, CooccurrenceGraph, Document, EdgeKey, Mention};
pub use dedup::{CanonicalRule, DedupOutcome, Deduplicator, GroupReport, GroupStatus};
pub use entity::{EntityId, EntityKind, EntityRecord};
pub use error::{EntigraphError, EntigraphResult, PipelineError, ValidationError};
pub use feed::{MentionRow, RelationshipRow};
pub use graph::{GraphMerger, MergedEdge, MergedGraph, NamedEdge, SourceTag, WeightedEdgeSet};
pub use identity::{IdentityMap, NameResolution};
pub use issues::{Issue, IssueCategory, IssueLog};
pub use normalize::normalize;
pub use pipeline::{Pipeline, PipelineOutput, Summary};
