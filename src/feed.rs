//! Input feeds.
//!
//! Both feeds are JSON lines. Feed A carries raw mentions from the
//! extraction step; feed B carries a name-keyed weighted edge list from the
//! secondary relationship source. Lines that do not parse or validate are
//! recorded in the [`IssueLog`] and skipped; only I/O failures are errors.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::cooccurrence::{Document, Mention};
use crate::entity::{EntityKind, EntityRecord};
use crate::error::{EntigraphError, EntigraphResult, ValidationError};
use crate::graph::NamedEdge;
use crate::issues::{IssueCategory, IssueLog};
use crate::normalize::normalize;

const fn default_mention_count() -> u64 {
    1
}

/// One line of the mention feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MentionRow {
    /// Name as extracted.
    pub surface_name: String,
    /// Kept as text so an unknown kind is a validation issue, not a parse
    /// failure.
    pub entity_kind: String,
    /// Document the mention came from.
    pub document_id: String,
    /// Defaults to 1.
    #[serde(default = "default_mention_count")]
    pub mention_count: u64,
    /// Optional free-form attributes.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl MentionRow {
    /// Creates a row with one mention and no metadata.
    #[must_use]
    pub fn new(
        surface_name: impl Into<String>,
        entity_kind: impl Into<String>,
        document_id: impl Into<String>,
    ) -> Self {
        Self {
            surface_name: surface_name.into(),
            entity_kind: entity_kind.into(),
            document_id: document_id.into(),
            mention_count: 1,
            metadata: serde_json::Value::Null,
        }
    }

    /// Validates the row into a raw entity record.
    ///
    /// # Errors
    /// Unknown kind, blank surface name, punctuation-only name, or blank
    /// document id.
    pub fn to_record(&self) -> Result<EntityRecord, ValidationError> {
        let kind: EntityKind = self.entity_kind.parse()?;
        if self.document_id.trim().is_empty() {
            return Err(ValidationError::EmptyDocumentId);
        }
        Ok(EntityRecord::new(self.surface_name.as_str(), kind)?
            .with_mentions(self.mention_count)
            .with_document(self.document_id.trim())
            .with_metadata(self.metadata.clone()))
    }
}

/// One line of the secondary relationship feed.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipRow {
    pub source_name: String,
    pub target_name: String,
    pub weight: u64,
}

impl RelationshipRow {
    /// Validates the row into a named edge.
    ///
    /// # Errors
    /// Blank or punctuation-only endpoint names, or a zero weight.
    pub fn to_edge(&self) -> Result<NamedEdge, ValidationError> {
        for name in [&self.source_name, &self.target_name] {
            if name.trim().is_empty() {
                return Err(ValidationError::EmptySurfaceName);
            }
            if normalize(name).is_empty() {
                return Err(ValidationError::EmptyNormalizedName {
                    surface_name: name.clone(),
                });
            }
        }
        if self.weight == 0 {
            return Err(ValidationError::InvalidWeight { value: self.weight });
        }
        Ok(NamedEdge {
            source_name: self.source_name.clone(),
            target_name: self.target_name.clone(),
            weight: self.weight,
        })
    }
}

/// Parses JSON lines from `reader`, skipping blank lines.
///
/// `origin` names the input in issue locations (`origin:line`).
///
/// # Errors
/// [`EntigraphError::Io`] if reading fails.
pub fn read_json_lines<T, R>(reader: R, origin: &str, issues: &mut IssueLog) -> EntigraphResult<Vec<T>>
where
    T: serde::de::DeserializeOwned,
    R: BufRead,
{
    let mut rows = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| EntigraphError::io(origin, e))?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<T>(trimmed) {
            Ok(row) => rows.push(row),
            Err(e) => issues.record(
                IssueCategory::MalformedInput,
                format!("{origin}:{}", index + 1),
                format!("unparsable line: {e}"),
            ),
        }
    }
    Ok(rows)
}

/// Reads the mention feed from a file.
///
/// # Errors
/// [`EntigraphError::Io`] if the file cannot be opened or read.
pub fn read_mentions(path: &Path, issues: &mut IssueLog) -> EntigraphResult<Vec<MentionRow>> {
    let file = File::open(path).map_err(|e| EntigraphError::io(path, e))?;
    let rows = read_json_lines(BufReader::new(file), &path.display().to_string(), issues)?;
    info!(path = %path.display(), rows = rows.len(), "mention feed read");
    Ok(rows)
}

/// Reads the secondary relationship feed from a file.
///
/// # Errors
/// [`EntigraphError::Io`] if the file cannot be opened or read.
pub fn read_relationships(
    path: &Path,
    issues: &mut IssueLog,
) -> EntigraphResult<Vec<RelationshipRow>> {
    let file = File::open(path).map_err(|e| EntigraphError::io(path, e))?;
    let rows = read_json_lines(BufReader::new(file), &path.display().to_string(), issues)?;
    info!(path = %path.display(), rows = rows.len(), "relationship feed read");
    Ok(rows)
}

/// Groups validated mentions by document, in document-id order.
#[must_use]
pub fn group_documents(records: &[EntityRecord]) -> Vec<Document> {
    let mut documents: BTreeMap<&str, Vec<Mention>> = BTreeMap::new();
    for record in records {
        for document_id in &record.provenance {
            documents
                .entry(document_id.as_str())
                .or_default()
                .push(Mention::new(record.surface_name.as_str(), record.kind));
        }
    }
    documents
        .into_iter()
        .map(|(id, mentions)| Document::new(id, mentions))
        .collect()
}
