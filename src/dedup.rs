//! Deduplication of raw entity records.
//!
//! Records of one kind are grouped by normalized name. Each group collapses
//! into a single canonical record: one surface form is chosen by an ordered
//! chain of [`CanonicalRule`]s, provenance sets are unioned, mention counts
//! are summed, and every other surface form becomes an alias.
//!
//! Running the deduplicator on its own output performs no further merges.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::entity::{EntityId, EntityKind, EntityRecord};
use crate::error::ValidationError;
use crate::identity;

/// Lowercase connectives tolerated inside an otherwise capitalized name.
const CONNECTIVES: &[&str] = &[
    "a", "an", "and", "at", "de", "del", "der", "di", "du", "for", "in", "la", "le", "of", "on",
    "the", "van", "von",
];

/// How closely a surface form follows title casing. Lower is better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum CasingTier {
    /// "The Federal Bureau": every word capitalized, rest lowercase.
    Title,
    /// "The FBI": every word capitalized, not entirely uppercase.
    Capitalized,
    /// "THE FBI", "the fbi", "the FBI".
    Other,
}

/// Separators inside one word; each segment is cased on its own.
const SEGMENT_SEPARATORS: &[char] = &['-', '\'', '\u{2019}'];

/// Drops a trailing possessive and any punctuation after it.
fn strip_possessive(word: &str) -> &str {
    let word = word
        .trim_end_matches(|c: char| !c.is_alphanumeric() && !SEGMENT_SEPARATORS.contains(&c));
    ["'s", "\u{2019}s", "'", "\u{2019}"]
        .iter()
        .find_map(|suffix| word.strip_suffix(suffix))
        .unwrap_or(word)
}

fn casing_tier(surface: &str) -> CasingTier {
    let mut has_lower = false;
    let mut has_letter = false;
    let mut strict = true;

    for (index, word) in surface.split_whitespace().enumerate() {
        let word = strip_possessive(word);
        for (part, segment) in word.split(SEGMENT_SEPARATORS).enumerate() {
            let mut letters = segment.chars().filter(|c| c.is_alphabetic());
            let Some(first) = letters.next() else {
                continue;
            };
            has_letter = true;
            let rest: Vec<char> = letters.collect();
            if rest.iter().any(|c| c.is_lowercase()) || first.is_lowercase() {
                has_lower = true;
            }

            if first.is_lowercase() {
                let lowered = segment.to_lowercase();
                if (index > 0 || part > 0) && CONNECTIVES.contains(&lowered.as_str()) {
                    continue;
                }
                if part == 0 {
                    return CasingTier::Other;
                }
                // "Smith-jones": capitalized word, uncapitalized segment.
                strict = false;
                continue;
            }
            if rest.iter().any(|c| c.is_uppercase()) {
                strict = false;
            }
        }
    }

    if !has_letter || !has_lower {
        CasingTier::Other
    } else if strict {
        CasingTier::Title
    } else {
        CasingTier::Capitalized
    }
}

/// A candidate surface form within one group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Exact spelling as it appeared in the input.
    pub surface_name: String,
    /// Mentions across every raw record carrying this exact surface form.
    pub mention_count: u64,
}

/// One step of the canonical-form tie-break chain.
///
/// Each rule compares two candidates and returns `Ordering::Less` when the
/// first is preferred. The chain is evaluated in order and the first
/// non-equal verdict decides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalRule {
    /// Title Case beats all-caps and all-lowercase variants.
    PreferTitleCase,
    /// More mentions win.
    PreferHigherMentionCount,
    /// Lexicographically first surface form wins. Total, so it always
    /// terminates the chain.
    PreferLexicographicallyFirst,
}

impl CanonicalRule {
    /// The default chain: title case, then mentions, then lexicographic.
    pub const DEFAULT_CHAIN: [Self; 3] = [
        Self::PreferTitleCase,
        Self::PreferHigherMentionCount,
        Self::PreferLexicographicallyFirst,
    ];

    /// Compares two candidates under this rule.
    #[must_use]
    pub fn compare(self, a: &Candidate, b: &Candidate) -> Ordering {
        match self {
            Self::PreferTitleCase => {
                casing_tier(&a.surface_name).cmp(&casing_tier(&b.surface_name))
            }
            Self::PreferHigherMentionCount => b.mention_count.cmp(&a.mention_count),
            Self::PreferLexicographicallyFirst => a.surface_name.cmp(&b.surface_name),
        }
    }
}

/// What happened to one normalized-name group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GroupStatus {
    /// A single raw record; passed through unchanged.
    NoDuplicates,
    /// Several raw records collapsed into one.
    Merged {
        /// Raw records absorbed into the canonical one.
        absorbed: usize,
    },
}

/// Per-group outcome, reported for every output record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupReport {
    /// Identifier of the output record.
    pub id: EntityId,
    /// Kind of the group.
    pub kind: EntityKind,
    /// Key the group was formed on.
    pub normalized_name: String,
    /// Surface form chosen by the rule chain.
    pub canonical_name: String,
    /// Whether anything was merged.
    pub status: GroupStatus,
}

/// Result of a deduplication pass.
#[derive(Debug, Clone, Default)]
pub struct DedupOutcome {
    /// Canonical records, sorted by (kind, normalized name).
    pub records: Vec<EntityRecord>,
    /// One report per output record, same order.
    pub groups: Vec<GroupReport>,
    /// Input records that could not be grouped (empty normalized name).
    pub rejected: Vec<(String, ValidationError)>,
}

impl DedupOutcome {
    /// Number of groups that merged two or more raw records.
    #[must_use]
    pub fn merged_groups(&self) -> usize {
        self.groups
            .iter()
            .filter(|g| matches!(g.status, GroupStatus::Merged { .. }))
            .count()
    }

    /// Total raw records absorbed into other records.
    #[must_use]
    pub fn absorbed_records(&self) -> usize {
        self.groups
            .iter()
            .map(|g| match g.status {
                GroupStatus::Merged { absorbed } => absorbed,
                GroupStatus::NoDuplicates => 0,
            })
            .sum()
    }
}

/// Groups raw records and collapses each group to a canonical record.
#[derive(Debug, Clone)]
pub struct Deduplicator {
    rules: Vec<CanonicalRule>,
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self::new()
    }
}

impl Deduplicator {
    /// Creates a deduplicator with [`CanonicalRule::DEFAULT_CHAIN`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            rules: CanonicalRule::DEFAULT_CHAIN.to_vec(),
        }
    }

    /// Creates a deduplicator with a custom rule chain.
    ///
    /// [`CanonicalRule::PreferLexicographicallyFirst`] is appended when
    /// missing so that selection stays total.
    #[must_use]
    pub fn with_rules(mut rules: Vec<CanonicalRule>) -> Self {
        if !rules.contains(&CanonicalRule::PreferLexicographicallyFirst) {
            rules.push(CanonicalRule::PreferLexicographicallyFirst);
        }
        Self { rules }
    }

    /// The active rule chain.
    #[must_use]
    pub fn rules(&self) -> &[CanonicalRule] {
        &self.rules
    }

    /// Deduplicates records of mixed kinds by partitioning on kind first.
    #[must_use]
    pub fn deduplicate(&self, records: Vec<EntityRecord>) -> DedupOutcome {
        let mut by_kind: BTreeMap<EntityKind, Vec<EntityRecord>> = BTreeMap::new();
        for record in records {
            by_kind.entry(record.kind).or_default().push(record);
        }

        let mut outcome = DedupOutcome::default();
        for (kind, records) in by_kind {
            let partial = self.group_kind(kind, records);
            outcome.records.extend(partial.records);
            outcome.groups.extend(partial.groups);
            outcome.rejected.extend(partial.rejected);
        }

        info!(
            entities = outcome.records.len(),
            merged_groups = outcome.merged_groups(),
            absorbed = outcome.absorbed_records(),
            rejected = outcome.rejected.len(),
            "deduplication complete"
        );
        outcome
    }

    /// Deduplicates records that all share `kind`.
    ///
    /// # Errors
    /// Returns [`ValidationError::MixedKinds`] if any record has another kind.
    pub fn deduplicate_kind(
        &self,
        kind: EntityKind,
        records: Vec<EntityRecord>,
    ) -> Result<DedupOutcome, ValidationError> {
        if let Some(other) = records.iter().find(|r| r.kind != kind) {
            return Err(ValidationError::MixedKinds {
                expected: kind,
                found: other.kind,
            });
        }
        Ok(self.group_kind(kind, records))
    }

    fn group_kind(&self, kind: EntityKind, records: Vec<EntityRecord>) -> DedupOutcome {
        let mut outcome = DedupOutcome::default();
        let mut groups: BTreeMap<String, Vec<EntityRecord>> = BTreeMap::new();

        for record in records {
            if record.normalized_name.is_empty() {
                outcome.rejected.push((
                    record.surface_name.clone(),
                    ValidationError::EmptyNormalizedName {
                        surface_name: record.surface_name,
                    },
                ));
                continue;
            }
            groups.entry(record.normalized_name.clone()).or_default().push(record);
        }

        for (normalized_name, mut members) in groups {
            // Groups are never empty.
            let absorbed = members.len() - 1;
            let (record, status) = if absorbed == 0 {
                (members.swap_remove(0), GroupStatus::NoDuplicates)
            } else {
                let record = self.merge_group(kind, normalized_name, members);
                (record, GroupStatus::Merged { absorbed })
            };

            debug!(
                kind = %kind,
                key = %record.normalized_name,
                canonical = %record.surface_name,
                ?status,
                "dedup group"
            );
            outcome.groups.push(GroupReport {
                id: record.id,
                kind,
                normalized_name: record.normalized_name.clone(),
                canonical_name: record.surface_name.clone(),
                status,
            });
            outcome.records.push(record);
        }

        outcome
    }

    /// Chooses the canonical surface form among `candidates`.
    ///
    /// Returns `None` only for an empty slice.
    #[must_use]
    pub fn select_canonical<'a>(&self, candidates: &'a [Candidate]) -> Option<&'a Candidate> {
        candidates.iter().min_by(|a, b| self.rank(a, b))
    }

    fn rank(&self, a: &Candidate, b: &Candidate) -> Ordering {
        self.rules
            .iter()
            .map(|rule| rule.compare(a, b))
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    }

    fn merge_group(
        &self,
        kind: EntityKind,
        normalized_name: String,
        mut members: Vec<EntityRecord>,
    ) -> EntityRecord {
        // Per-surface mention totals feed the tie-break chain.
        let mut totals: BTreeMap<&str, u64> = BTreeMap::new();
        for member in &members {
            *totals.entry(member.surface_name.as_str()).or_insert(0) += member.mention_count;
        }
        let candidates: Vec<Candidate> = totals
            .into_iter()
            .map(|(surface_name, mention_count)| Candidate {
                surface_name: surface_name.to_string(),
                mention_count,
            })
            .collect();
        let canonical = self
            .select_canonical(&candidates)
            .map(|c| c.surface_name.clone())
            .unwrap_or_default();

        // Canonical-surface records first so their metadata takes precedence.
        members.sort_by(|a, b| {
            (a.surface_name != canonical)
                .cmp(&(b.surface_name != canonical))
                .then_with(|| a.surface_name.cmp(&b.surface_name))
                .then_with(|| b.mention_count.cmp(&a.mention_count))
                .then_with(|| a.provenance.cmp(&b.provenance))
                .then_with(|| a.metadata.to_string().cmp(&b.metadata.to_string()))
        });

        let mut aliases: BTreeSet<String> = BTreeSet::new();
        let mut provenance: BTreeSet<String> = BTreeSet::new();
        let mut mention_count = 0u64;
        let mut metadata = serde_json::Value::Null;

        for member in members {
            mention_count = mention_count.saturating_add(member.mention_count);
            provenance.extend(member.provenance);
            aliases.insert(member.surface_name);
            aliases.extend(member.aliases);
            metadata = merge_metadata(&metadata, &member.metadata);
        }
        aliases.remove(&canonical);

        EntityRecord {
            id: identity::assign(&normalized_name, kind),
            surface_name: canonical,
            normalized_name,
            kind,
            aliases,
            mention_count,
            provenance,
            metadata,
        }
    }
}

/// Merges metadata objects; keys already present in `primary` win.
fn merge_metadata(primary: &serde_json::Value, secondary: &serde_json::Value) -> serde_json::Value {
    use serde_json::Value;

    match (primary, secondary) {
        (Value::Null, other) => other.clone(),
        (Value::Object(a), Value::Object(b)) => {
            let mut out = a.clone();
            for (k, v) in b {
                out.entry(k.clone()).or_insert_with(|| v.clone());
            }
            Value::Object(out)
        }
        (primary, _) => primary.clone(),
    }
}

/// Convenience wrapper around [`Deduplicator::deduplicate`] with the default chain.
#[must_use]
pub fn deduplicate(records: Vec<EntityRecord>) -> DedupOutcome {
    Deduplicator::new().deduplicate(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(name: &str, kind: EntityKind, mentions: u64, docs: &[&str]) -> EntityRecord {
        docs.iter().fold(
            EntityRecord::new(name, kind).unwrap().with_mentions(mentions),
            |r, d| r.with_document(*d),
        )
    }

    fn candidate(name: &str, mentions: u64) -> Candidate {
        Candidate {
            surface_name: name.to_string(),
            mention_count: mentions,
        }
    }

    #[test]
    fn test_casing_tiers() {
        assert_eq!(casing_tier("Federal Bureau"), CasingTier::Title);
        assert_eq!(casing_tier("Bank of America"), CasingTier::Title);
        assert_eq!(casing_tier("The FBI"), CasingTier::Capitalized);
        assert_eq!(casing_tier("THE FBI"), CasingTier::Other);
        assert_eq!(casing_tier("the FBI"), CasingTier::Other);
        assert_eq!(casing_tier("the fbi"), CasingTier::Other);
        assert_eq!(casing_tier("of America"), CasingTier::Other);
        assert_eq!(casing_tier("1999"), CasingTier::Other);
    }

    #[test]
    fn test_casing_tiers_segment_compound_words() {
        assert_eq!(casing_tier("Smith-Jones"), CasingTier::Title);
        assert_eq!(casing_tier("Smith-jones"), CasingTier::Capitalized);
        assert_eq!(casing_tier("O'Brien"), CasingTier::Title);
        assert_eq!(casing_tier("O\u{2019}Brien"), CasingTier::Title);
        assert_eq!(casing_tier("O'brien"), CasingTier::Capitalized);
        assert_eq!(casing_tier("Grace Hopper's"), CasingTier::Title);
        assert_eq!(casing_tier("Smith's."), CasingTier::Title);
        assert_eq!(casing_tier("SMITH-JONES"), CasingTier::Other);
    }

    #[test]
    fn test_compound_title_case_beats_mentions() {
        let outcome = deduplicate(vec![
            raw("Smith-Jones", EntityKind::Person, 10, &["d1"]),
            raw("Smith-jones", EntityKind::Person, 1, &["d2"]),
        ]);
        assert_eq!(outcome.records[0].surface_name, "Smith-Jones");

        let outcome = deduplicate(vec![
            raw("O'brien", EntityKind::Person, 5, &["d1"]),
            raw("O'Brien", EntityKind::Person, 1, &["d2"]),
        ]);
        assert_eq!(outcome.records[0].surface_name, "O'Brien");
    }

    #[test]
    fn test_rule_chain_prefers_title_case_over_mentions() {
        let dedup = Deduplicator::new();
        let candidates = vec![candidate("THE FBI", 30), candidate("The FBI", 1)];
        assert_eq!(
            dedup.select_canonical(&candidates).unwrap().surface_name,
            "The FBI"
        );
    }

    #[test]
    fn test_rule_chain_mentions_then_lexicographic() {
        let dedup = Deduplicator::new();
        let candidates = vec![candidate("acme", 2), candidate("ACME", 5)];
        assert_eq!(dedup.select_canonical(&candidates).unwrap().surface_name, "ACME");

        let tied = vec![candidate("acme", 2), candidate("ACME", 2)];
        assert_eq!(dedup.select_canonical(&tied).unwrap().surface_name, "ACME");
    }

    #[test]
    fn test_with_rules_keeps_chain_total() {
        let dedup = Deduplicator::with_rules(vec![CanonicalRule::PreferHigherMentionCount]);
        assert_eq!(
            dedup.rules(),
            &[
                CanonicalRule::PreferHigherMentionCount,
                CanonicalRule::PreferLexicographicallyFirst
            ]
        );
        let candidates = vec![candidate("The FBI", 1), candidate("THE FBI", 3)];
        assert_eq!(
            dedup.select_canonical(&candidates).unwrap().surface_name,
            "THE FBI"
        );
    }

    #[test]
    fn test_select_canonical_empty() {
        assert!(Deduplicator::new().select_canonical(&[]).is_none());
    }

    #[test]
    fn test_fbi_variants_collapse() {
        let outcome = deduplicate(vec![
            raw("THE FBI", EntityKind::Organization, 3, &["d1"]),
            raw("the FBI", EntityKind::Organization, 1, &["d2"]),
            raw("The FBI", EntityKind::Organization, 2, &["d1", "d3"]),
        ]);

        assert_eq!(outcome.records.len(), 1);
        let record = &outcome.records[0];
        assert_eq!(record.surface_name, "The FBI");
        assert_eq!(record.mention_count, 6);
        assert_eq!(
            record.aliases,
            BTreeSet::from(["THE FBI".to_string(), "the FBI".to_string()])
        );
        assert_eq!(record.provenance.len(), 3);
        assert_eq!(record.id, identity::assign("the fbi", EntityKind::Organization));
        assert_eq!(outcome.groups[0].status, GroupStatus::Merged { absorbed: 2 });
    }

    #[test]
    fn test_singleton_passes_through() {
        let input = raw("Acme", EntityKind::Organization, 4, &["d1"]);
        let outcome = deduplicate(vec![input.clone()]);
        assert_eq!(outcome.records, vec![input]);
        assert_eq!(outcome.groups[0].status, GroupStatus::NoDuplicates);
        assert_eq!(outcome.merged_groups(), 0);
    }

    #[test]
    fn test_kinds_are_not_merged() {
        let outcome = deduplicate(vec![
            raw("New York", EntityKind::Location, 1, &["d1"]),
            raw("New York", EntityKind::Organization, 1, &["d2"]),
        ]);
        assert_eq!(outcome.records.len(), 2);
        assert_ne!(outcome.records[0].id, outcome.records[1].id);
    }

    #[test]
    fn test_deduplicate_is_idempotent() {
        let first = deduplicate(vec![
            raw("Grace Hopper", EntityKind::Person, 2, &["d1"]),
            raw("GRACE HOPPER", EntityKind::Person, 1, &["d2"]),
            raw("grace hopper's", EntityKind::Person, 1, &["d3"]),
            raw("Acme", EntityKind::Organization, 1, &["d1"]),
        ]);
        let second = deduplicate(first.records.clone());
        assert_eq!(second.records, first.records);
        assert_eq!(second.merged_groups(), 0);
    }

    /// Per (kind, key): every surface form, every document, total mentions.
    fn conserved(
        records: &[EntityRecord],
    ) -> BTreeMap<(EntityKind, String), (BTreeSet<String>, BTreeSet<String>, u64)> {
        let mut out: BTreeMap<_, (BTreeSet<String>, BTreeSet<String>, u64)> = BTreeMap::new();
        for record in records {
            let entry = out
                .entry((record.kind, record.normalized_name.clone()))
                .or_default();
            entry.0.insert(record.surface_name.clone());
            entry.0.extend(record.aliases.iter().cloned());
            entry.1.extend(record.provenance.iter().cloned());
            entry.2 += record.mention_count;
        }
        out
    }

    #[test]
    fn test_merge_conserves_surface_forms_and_provenance() {
        let earlier = deduplicate(vec![
            raw("Grace Hopper", EntityKind::Person, 2, &["d1"]),
            raw("GRACE HOPPER", EntityKind::Person, 1, &["d2"]),
            raw("Acme", EntityKind::Organization, 1, &["d1"]),
            raw("ACME Corp", EntityKind::Organization, 1, &["d2"]),
        ]);
        assert!(earlier
            .records
            .iter()
            .any(|r| r.aliases.contains("GRACE HOPPER")));

        let mut input = earlier.records;
        input.extend([
            raw("grace hopper", EntityKind::Person, 1, &["d3"]),
            raw("Grace Hopper's", EntityKind::Person, 1, &["d1", "d4"]),
            raw("ACME", EntityKind::Organization, 2, &["d5"]),
            raw("Acme Corp.", EntityKind::Organization, 1, &["d2", "d6"]),
            raw("Hopper", EntityKind::Person, 1, &["d7"]),
        ]);

        let outcome = deduplicate(input.clone());
        assert_eq!(conserved(&outcome.records), conserved(&input));

        let hopper = outcome
            .records
            .iter()
            .find(|r| r.normalized_name == "grace hopper")
            .unwrap();
        assert_eq!(
            hopper.aliases,
            BTreeSet::from([
                "GRACE HOPPER".to_string(),
                "Grace Hopper's".to_string(),
                "grace hopper".to_string(),
            ])
        );
        assert_eq!(hopper.surface_name, "Grace Hopper");
        assert_eq!(hopper.mention_count, 5);
    }

    #[test]
    fn test_input_order_does_not_matter() {
        let a = raw("THE FBI", EntityKind::Organization, 3, &["d1"]);
        let b = raw("The FBI", EntityKind::Organization, 2, &["d2"]);
        let forward = deduplicate(vec![a.clone(), b.clone()]);
        let backward = deduplicate(vec![b, a]);
        assert_eq!(forward.records, backward.records);
    }

    #[test]
    fn test_same_document_not_double_counted() {
        let outcome = deduplicate(vec![
            raw("Acme", EntityKind::Organization, 1, &["d1"]),
            raw("ACME", EntityKind::Organization, 1, &["d1"]),
        ]);
        assert_eq!(outcome.records[0].provenance.len(), 1);
        assert_eq!(outcome.records[0].mention_count, 2);
    }

    #[test]
    fn test_metadata_prefers_canonical_record() {
        let outcome = deduplicate(vec![
            raw("ACME", EntityKind::Organization, 9, &["d1"])
                .with_metadata(serde_json::json!({"sector": "other", "hq": "Reno"})),
            raw("Acme", EntityKind::Organization, 1, &["d2"])
                .with_metadata(serde_json::json!({"sector": "widgets"})),
        ]);
        let metadata = &outcome.records[0].metadata;
        assert_eq!(metadata["sector"], "widgets");
        assert_eq!(metadata["hq"], "Reno");
    }

    #[test]
    fn test_deduplicate_kind_rejects_mixed_kinds() {
        let err = Deduplicator::new()
            .deduplicate_kind(
                EntityKind::Person,
                vec![raw("Acme", EntityKind::Organization, 1, &[])],
            )
            .unwrap_err();
        assert!(matches!(err, ValidationError::MixedKinds { .. }));
    }

    #[test]
    fn test_empty_normalized_name_rejected() {
        let mut bad = raw("Acme", EntityKind::Organization, 1, &[]);
        bad.normalized_name.clear();
        let outcome = deduplicate(vec![bad]);
        assert!(outcome.records.is_empty());
        assert_eq!(outcome.rejected.len(), 1);
    }
}
