//! Error types for entigraph.
//!
//! All errors are strongly typed using thiserror. Single-record problems
//! ([`ValidationError`]) are isolated by the pipeline into its issue log;
//! only [`PipelineError`] and I/O failures abort a run.

use std::path::PathBuf;

use thiserror::Error;

use crate::entity::EntityKind;

/// Validation errors for a single input record or configuration value.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Unknown entity kind '{value}'")]
    UnknownEntityKind {
        value: String,
    },

    #[error("Surface name cannot be empty")]
    EmptySurfaceName,

    #[error("Surface name '{surface_name}' normalizes to an empty key")]
    EmptyNormalizedName {
        surface_name: String,
    },

    #[error("Document id cannot be empty")]
    EmptyDocumentId,

    #[error("Relationship weight must be positive, got {value}")]
    InvalidWeight {
        value: u64,
    },

    #[error("Expected records of kind {expected}, found {found}")]
    MixedKinds {
        expected: EntityKind,
        found: EntityKind,
    },

    #[error("Invalid configuration for '{field}': {reason}")]
    InvalidConfig {
        field: String,
        reason: String,
    },
}

/// Violations of pipeline invariants. These indicate a defect, not bad data.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("Deduplication invariant violated: {groups} residual duplicate group(s), first: {first}")]
    DeduplicationInvariantViolation {
        groups: usize,
        first: String,
    },
}

/// Top-level error type for entigraph.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum EntigraphError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {message}")]
    Serialization {
        message: String,
    },

    #[error("Configuration error: {message}")]
    Config {
        message: String,
    },
}

impl EntigraphError {
    /// Creates an I/O error bound to a path.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a serialization error.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is a pipeline invariant violation.
    #[must_use]
    pub const fn is_invariant_violation(&self) -> bool {
        matches!(self, Self::Pipeline(_))
    }

    /// Returns true if this is an I/O error.
    #[must_use]
    pub const fn is_io(&self) -> bool {
        matches!(self, Self::Io { .. })
    }
}

impl From<serde_json::Error> for EntigraphError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

/// Result type alias for entigraph operations.
pub type EntigraphResult<T> = Result<T, EntigraphError>;
