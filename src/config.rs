//! Pipeline configuration.
//!
//! Every field has a default, so an empty TOML document is a valid config.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cooccurrence::DEFAULT_HIGH_CARDINALITY_THRESHOLD;
use crate::dedup::CanonicalRule;
use crate::error::{EntigraphError, EntigraphResult, ValidationError};
use crate::graph::SourceTag;

/// Settings for one pipeline run.
///
/// # Examples
///
/// ```
/// use entigraph::PipelineConfig;
///
/// let config = PipelineConfig::from_toml_str("secondary_source_tag = \"flight_logs\"").unwrap();
/// assert_eq!(config.secondary_source_tag, "flight_logs");
/// assert_eq!(config.high_cardinality_threshold, 100);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Distinct-entity count at which a document is flagged as a
    /// performance caveat. Such documents are still processed.
    pub high_cardinality_threshold: usize,

    /// Tag attached to co-occurrence edges.
    pub document_source_tag: String,

    /// Tag attached to edges from the secondary relationship source.
    pub secondary_source_tag: String,

    /// Canonical-form rule chain, in evaluation order.
    pub canonical_rules: Vec<CanonicalRule>,

    /// Run ingestion and aggregation on the rayon pool.
    pub parallel: bool,

    /// Abort when residual duplicates survive deduplication.
    pub fail_on_residual_duplicates: bool,

    /// Write `manifest.json` with artifact digests.
    pub write_manifest: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            high_cardinality_threshold: DEFAULT_HIGH_CARDINALITY_THRESHOLD,
            document_source_tag: SourceTag::DOCUMENT.to_string(),
            secondary_source_tag: SourceTag::MANIFEST.to_string(),
            canonical_rules: CanonicalRule::DEFAULT_CHAIN.to_vec(),
            parallel: true,
            fail_on_residual_duplicates: true,
            write_manifest: true,
        }
    }
}

impl PipelineConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    /// [`EntigraphError::Config`] for malformed TOML or unknown keys, and
    /// [`EntigraphError::Validation`] for out-of-range values.
    pub fn from_toml_str(content: &str) -> EntigraphResult<Self> {
        let config: Self = toml::from_str(content).map_err(|e| EntigraphError::Config {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a TOML file.
    ///
    /// # Errors
    /// [`EntigraphError::Io`] if the file cannot be read, otherwise as
    /// [`Self::from_toml_str`].
    pub fn load(path: &Path) -> EntigraphResult<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| EntigraphError::io(path, e))?;
        Self::from_toml_str(&content)
    }

    /// Checks value ranges and tag consistency.
    ///
    /// # Errors
    /// [`ValidationError::InvalidConfig`] naming the offending field.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.high_cardinality_threshold < 2 {
            return Err(ValidationError::InvalidConfig {
                field: "high_cardinality_threshold".to_string(),
                reason: "must be at least 2".to_string(),
            });
        }
        let document = SourceTag::new(self.document_source_tag.as_str())?;
        let secondary = SourceTag::new(self.secondary_source_tag.as_str())?;
        if document == secondary {
            return Err(ValidationError::InvalidConfig {
                field: "secondary_source_tag".to_string(),
                reason: format!("must differ from document_source_tag ('{document}')"),
            });
        }
        if self.canonical_rules.is_empty() {
            return Err(ValidationError::InvalidConfig {
                field: "canonical_rules".to_string(),
                reason: "at least one rule is required".to_string(),
            });
        }
        Ok(())
    }

    /// The document source tag.
    ///
    /// # Errors
    /// Returns an error if the tag is blank.
    pub fn document_tag(&self) -> Result<SourceTag, ValidationError> {
        SourceTag::new(self.document_source_tag.as_str())
    }

    /// The secondary source tag.
    ///
    /// # Errors
    /// Returns an error if the tag is blank.
    pub fn secondary_tag(&self) -> Result<SourceTag, ValidationError> {
        SourceTag::new(self.secondary_source_tag.as_str())
    }
}
