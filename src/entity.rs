//! Entity types and identity anchors.
//!
//! An [`EntityRecord`] is the unit the deduplicator groups and the conflation
//! detector inspects. Its [`EntityId`] is derived from the normalized name and
//! the [`EntityKind`], never generated randomly, so the same input always
//! lands on the same identifier.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::identity;
use crate::normalize::normalize;

/// Stable, reproducible entity identifier.
///
/// Identifiers are name-based UUIDs (see [`identity::assign`]). Ordering is
/// the UUID byte order and is used to canonicalize unordered pairs.
///
/// # Examples
///
/// ```
/// use entigraph::{identity, EntityKind};
///
/// let a = identity::assign("acme", EntityKind::Organization);
/// let b = identity::assign("acme", EntityKind::Organization);
/// assert_eq!(a, b);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(Uuid);

impl EntityId {
    /// Creates an entity ID from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Returns true if this is a nil (all zeros) UUID.
    #[must_use]
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for EntityId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<EntityId> for Uuid {
    fn from(id: EntityId) -> Self {
        id.0
    }
}

/// Closed classification of entity kinds.
///
/// The set is closed: a value outside it is rejected by
/// [`EntityKind::from_str`] rather than mapped onto a catch-all.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// A human person
    Person,
    /// A company, institution, agency, or group
    Organization,
    /// A geographic location
    Location,
    /// A temporal event
    Event,
    /// A physical or digital artifact (documents, products, objects)
    Artifact,
    /// An abstract concept or idea
    Concept,
}

impl EntityKind {
    /// Every kind, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::Person,
        Self::Organization,
        Self::Location,
        Self::Event,
        Self::Artifact,
        Self::Concept,
    ];

    /// The stable tag hashed into identifiers and written to artifacts.
    ///
    /// Changing any of these strings changes every identifier of that kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Person => "person",
            Self::Organization => "organization",
            Self::Location => "location",
            Self::Event => "event",
            Self::Artifact => "artifact",
            Self::Concept => "concept",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = ValidationError;

    /// Parses a kind tag, case-insensitively.
    ///
    /// Accepts the canonical tags plus the short forms `per`, `org` and `loc`
    /// that extraction tools commonly emit.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "person" | "per" => Ok(Self::Person),
            "organization" | "organisation" | "org" => Ok(Self::Organization),
            "location" | "loc" => Ok(Self::Location),
            "event" => Ok(Self::Event),
            "artifact" => Ok(Self::Artifact),
            "concept" => Ok(Self::Concept),
            _ => Err(ValidationError::UnknownEntityKind {
                value: s.to_string(),
            }),
        }
    }
}

/// A (raw or canonical) record of one named entity.
///
/// Raw records come straight from the mention feed, one per surface form
/// occurrence batch. Canonical records are produced by the deduplicator and
/// carry the absorbed surface forms as aliases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    /// Display spelling. For canonical records this is the chosen form.
    pub surface_name: String,

    /// Matching key, see [`normalize`].
    pub normalized_name: String,

    /// Classification; part of the identity.
    pub kind: EntityKind,

    /// Derived from `(normalized_name, kind)`.
    pub id: EntityId,

    /// Other surface forms absorbed into this record.
    #[serde(default)]
    pub aliases: BTreeSet<String>,

    /// Total mentions across every absorbed record.
    pub mention_count: u64,

    /// Documents supporting this record.
    #[serde(default)]
    pub provenance: BTreeSet<String>,

    /// Free-form attributes carried through unchanged.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl EntityRecord {
    /// Creates a raw record with a single mention and no provenance.
    ///
    /// # Errors
    /// Returns [`ValidationError::EmptySurfaceName`] for blank input and
    /// [`ValidationError::EmptyNormalizedName`] when the name is nothing
    /// but punctuation.
    ///
    /// # Examples
    ///
    /// ```
    /// use entigraph::{EntityKind, EntityRecord};
    ///
    /// let record = EntityRecord::new("The FBI", EntityKind::Organization).unwrap();
    /// assert_eq!(record.normalized_name, "the fbi");
    /// assert_eq!(record.mention_count, 1);
    /// ```
    pub fn new(surface_name: impl Into<String>, kind: EntityKind) -> Result<Self, ValidationError> {
        let surface_name = surface_name.into();
        if surface_name.trim().is_empty() {
            return Err(ValidationError::EmptySurfaceName);
        }
        let normalized_name = normalize(&surface_name);
        if normalized_name.is_empty() {
            return Err(ValidationError::EmptyNormalizedName { surface_name });
        }
        let id = identity::assign(&normalized_name, kind);
        Ok(Self {
            surface_name,
            normalized_name,
            kind,
            id,
            aliases: BTreeSet::new(),
            mention_count: 1,
            provenance: BTreeSet::new(),
            metadata: serde_json::Value::Null,
        })
    }

    /// Sets the mention count.
    #[must_use]
    pub fn with_mentions(mut self, mention_count: u64) -> Self {
        self.mention_count = mention_count;
        self
    }

    /// Adds a supporting document.
    #[must_use]
    pub fn with_document(mut self, document_id: impl Into<String>) -> Self {
        self.provenance.insert(document_id.into());
        self
    }

    /// Replaces the metadata object.
    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Every surface form this record stands for, canonical form included.
    pub fn surface_forms(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.surface_name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }

    /// Returns the number of aliases.
    #[must_use]
    pub fn alias_count(&self) -> usize {
        self.aliases.len()
    }
}
