//! Deterministic identity assignment and the identity lookup context.
//!
//! Identifiers are UUID v5 values over `normalized_name + ":" + kind` under a
//! fixed namespace. The namespace is versioned: bumping it is the only
//! sanctioned way to change every identifier at once.

use std::collections::{BTreeMap, HashMap};

use uuid::Uuid;

use crate::entity::{EntityId, EntityKind, EntityRecord};
use crate::normalize::normalize;

/// Namespace for identifiers of resolved entities (version 1).
pub const ENTITY_NAMESPACE_V1: Uuid = Uuid::from_u128(0x6b1f_3c2e_8d4a_5e07_9c31_a2f4_0d6e_7b18);

/// Namespace for fallback identifiers of names that did not resolve.
///
/// Kept apart from [`ENTITY_NAMESPACE_V1`] so a synthetic node can never
/// collide with a real entity.
pub const SYNTHETIC_NAMESPACE_V1: Uuid =
    Uuid::from_u128(0x3e9d_7a10_4c58_5f2b_8e06_b7c9_1a4d_62f3);

/// Assigns the identifier for a normalized name and kind.
///
/// Pure and deterministic: identical inputs yield identical identifiers on
/// every run and machine, and changing the kind changes the identifier.
///
/// # Examples
///
/// ```
/// use entigraph::{identity::assign, normalize::normalize, EntityKind};
///
/// let org = assign(&normalize("Acme"), EntityKind::Organization);
/// let loc = assign(&normalize("Acme"), EntityKind::Location);
/// assert_ne!(org, loc);
/// ```
#[must_use]
pub fn assign(normalized_name: &str, kind: EntityKind) -> EntityId {
    let name = format!("{normalized_name}:{}", kind.as_str());
    EntityId::from_uuid(Uuid::new_v5(&ENTITY_NAMESPACE_V1, name.as_bytes()))
}

/// Fallback identifier for a name that has no entry in the identity map.
///
/// Variants that normalize to the same key share one synthetic identifier.
#[must_use]
pub fn synthetic_id(surface_name: &str) -> EntityId {
    let key = normalize(surface_name);
    EntityId::from_uuid(Uuid::new_v5(&SYNTHETIC_NAMESPACE_V1, key.as_bytes()))
}

/// Outcome of resolving a name whose kind is unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameResolution {
    /// Exactly one kind carries this key.
    Unique(EntityId),
    /// Several kinds carry this key; the best-supported entity was chosen.
    Ambiguous {
        /// The entity with the most mentions, ties broken by kind order.
        chosen: EntityId,
        /// How many kinds carry the key.
        candidates: usize,
    },
    /// No entity carries this key.
    Unresolved,
}

impl NameResolution {
    /// The resolved identifier, if any.
    #[must_use]
    pub const fn id(&self) -> Option<EntityId> {
        match self {
            Self::Unique(id) | Self::Ambiguous { chosen: id, .. } => Some(*id),
            Self::Unresolved => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    kind: EntityKind,
    id: EntityId,
    mention_count: u64,
}

/// Lookup table from names to identifiers, built once per run.
///
/// This is an explicit context object: build it from deduplicated records and
/// pass it to whoever needs to resolve mentions. Nothing here is global.
#[derive(Debug, Clone, Default)]
pub struct IdentityMap {
    by_key: HashMap<(String, EntityKind), EntityId>,
    by_name: BTreeMap<String, Vec<Entry>>,
    mention_counts: HashMap<EntityId, u64>,
}

impl IdentityMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a map from canonical records.
    #[must_use]
    pub fn from_records(records: &[EntityRecord]) -> Self {
        let mut map = Self::new();
        for record in records {
            map.insert(record);
        }
        map
    }

    /// Registers a record. A second record with the same key and kind
    /// accumulates its mention count onto the first.
    pub fn insert(&mut self, record: &EntityRecord) {
        let key = (record.normalized_name.clone(), record.kind);
        let id = *self.by_key.entry(key).or_insert(record.id);
        *self.mention_counts.entry(id).or_insert(0) += record.mention_count;

        let entries = self.by_name.entry(record.normalized_name.clone()).or_default();
        match entries.iter_mut().find(|e| e.kind == record.kind) {
            Some(entry) => entry.mention_count += record.mention_count,
            None => {
                entries.push(Entry {
                    kind: record.kind,
                    id,
                    mention_count: record.mention_count,
                });
                entries.sort_by_key(|e| e.kind);
            }
        }
    }

    /// Resolves a raw mention by surface name and kind.
    #[must_use]
    pub fn resolve(&self, surface_name: &str, kind: EntityKind) -> Option<EntityId> {
        self.resolve_key(&normalize(surface_name), kind)
    }

    /// Resolves an already-normalized key.
    #[must_use]
    pub fn resolve_key(&self, normalized_name: &str, kind: EntityKind) -> Option<EntityId> {
        self.by_key
            .get(&(normalized_name.to_string(), kind))
            .copied()
    }

    /// Resolves a surface name without a kind.
    ///
    /// When several kinds share the key, the entity with the most mentions
    /// wins; remaining ties go to the earliest kind in [`EntityKind::ALL`].
    #[must_use]
    pub fn resolve_name(&self, surface_name: &str) -> NameResolution {
        let key = normalize(surface_name);
        let Some(entries) = self.by_name.get(&key) else {
            return NameResolution::Unresolved;
        };
        match entries.as_slice() {
            [] => NameResolution::Unresolved,
            [only] => NameResolution::Unique(only.id),
            many => {
                let mut best = many[0];
                for entry in &many[1..] {
                    if entry.mention_count > best.mention_count {
                        best = *entry;
                    }
                }
                NameResolution::Ambiguous {
                    chosen: best.id,
                    candidates: many.len(),
                }
            }
        }
    }

    /// Total mentions recorded for an identifier (0 when unknown).
    #[must_use]
    pub fn mention_count(&self, id: EntityId) -> u64 {
        self.mention_counts.get(&id).copied().unwrap_or(0)
    }

    /// Returns true if the identifier belongs to a registered entity.
    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.mention_counts.contains_key(&id)
    }

    /// Iterates over all registered identifiers (unordered).
    pub fn ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.mention_counts.keys().copied()
    }

    /// Number of registered entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    /// Returns true if no entity is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, kind: EntityKind, mentions: u64) -> EntityRecord {
        EntityRecord::new(name, kind).unwrap().with_mentions(mentions)
    }

    #[test]
    fn test_assign_is_deterministic() {
        let a = assign(&normalize("Grace Hopper"), EntityKind::Person);
        let b = assign(&normalize("Grace Hopper"), EntityKind::Person);
        assert_eq!(a, b);
    }

    #[test]
    fn test_assign_is_kind_sensitive() {
        let key = normalize("Acme");
        let ids: std::collections::HashSet<EntityId> =
            EntityKind::ALL.iter().map(|k| assign(&key, *k)).collect();
        assert_eq!(ids.len(), EntityKind::ALL.len());
    }

    #[test]
    fn test_assign_is_name_based_v5() {
        let id = assign("acme", EntityKind::Organization);
        assert_eq!(id.as_uuid().get_version_num(), 5);
        let expected = Uuid::new_v5(&ENTITY_NAMESPACE_V1, b"acme:organization");
        assert_eq!(id.as_uuid(), &expected);
    }

    #[test]
    fn test_synthetic_id_is_disjoint_from_assigned() {
        let synthetic = synthetic_id("Acme");
        for kind in EntityKind::ALL {
            assert_ne!(synthetic, assign("acme", kind));
        }
        assert_eq!(synthetic, synthetic_id("ACME"));
    }

    #[test]
    fn test_identity_map_resolves_by_kind() {
        let map = IdentityMap::from_records(&[
            record("New York", EntityKind::Location, 5),
            record("New York", EntityKind::Organization, 2),
        ]);
        assert_eq!(map.len(), 2);
        assert_eq!(
            map.resolve("NEW YORK", EntityKind::Location),
            Some(assign("new york", EntityKind::Location))
        );
        assert_eq!(map.resolve("New York", EntityKind::Person), None);
    }

    #[test]
    fn test_identity_map_resolve_name_unique() {
        let map = IdentityMap::from_records(&[record("Acme", EntityKind::Organization, 1)]);
        assert_eq!(
            map.resolve_name("acme"),
            NameResolution::Unique(assign("acme", EntityKind::Organization))
        );
        assert_eq!(map.resolve_name("Globex"), NameResolution::Unresolved);
        assert_eq!(map.resolve_name("Globex").id(), None);
    }

    #[test]
    fn test_identity_map_resolve_name_ambiguous_prefers_mentions() {
        let map = IdentityMap::from_records(&[
            record("Jordan", EntityKind::Person, 2),
            record("Jordan", EntityKind::Location, 7),
        ]);
        assert_eq!(
            map.resolve_name("Jordan"),
            NameResolution::Ambiguous {
                chosen: assign("jordan", EntityKind::Location),
                candidates: 2,
            }
        );
    }

    #[test]
    fn test_identity_map_resolve_name_ambiguous_tie_uses_kind_order() {
        let map = IdentityMap::from_records(&[
            record("Jordan", EntityKind::Location, 3),
            record("Jordan", EntityKind::Person, 3),
        ]);
        assert_eq!(
            map.resolve_name("Jordan").id(),
            Some(assign("jordan", EntityKind::Person))
        );
    }

    #[test]
    fn test_identity_map_mention_counts() {
        let map = IdentityMap::from_records(&[
            record("Acme", EntityKind::Organization, 3),
            record("ACME", EntityKind::Organization, 4),
        ]);
        let id = assign("acme", EntityKind::Organization);
        assert_eq!(map.len(), 1);
        assert_eq!(map.mention_count(id), 7);
        assert!(map.contains(id));
        assert_eq!(map.mention_count(synthetic_id("acme")), 0);
    }
}
