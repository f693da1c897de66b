//! Side channel for per-record problems.
//!
//! Single-record problems never abort a run. They are logged, recorded here,
//! and counted per category so the summary can report them.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Category of a recorded issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCategory {
    /// Unknown kind, blank name or document id, unparsable line, bad weight.
    MalformedInput,
    /// A mention or secondary name with no mapped identifier.
    UnresolvedReference,
    /// A secondary name matching entities of several kinds.
    AmbiguousReference,
    /// A secondary edge whose endpoints resolved to one entity.
    SelfLoop,
    /// A document with unusually many distinct entities.
    PerformanceCaveat,
}

impl fmt::Display for IssueCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedInput => write!(f, "malformed_input"),
            Self::UnresolvedReference => write!(f, "unresolved_reference"),
            Self::AmbiguousReference => write!(f, "ambiguous_reference"),
            Self::SelfLoop => write!(f, "self_loop"),
            Self::PerformanceCaveat => write!(f, "performance_caveat"),
        }
    }
}

/// One recorded issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    /// What kind of problem this is.
    pub category: IssueCategory,
    /// Where the issue arose, e.g. `mentions.jsonl:17` or a document id.
    pub location: String,
    /// Human-readable detail.
    pub message: String,
}

/// Collected issues with per-category counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueLog {
    issues: Vec<Issue>,
    counts: BTreeMap<IssueCategory, usize>,
}

impl IssueLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an issue and emits a warning.
    pub fn record(
        &mut self,
        category: IssueCategory,
        location: impl Into<String>,
        message: impl Into<String>,
    ) {
        let issue = Issue {
            category,
            location: location.into(),
            message: message.into(),
        };
        warn!(
            category = %issue.category,
            location = %issue.location,
            "{}",
            issue.message
        );
        *self.counts.entry(category).or_insert(0) += 1;
        self.issues.push(issue);
    }

    /// Appends every issue from `other`.
    pub fn extend(&mut self, other: Self) {
        for (category, count) in other.counts {
            *self.counts.entry(category).or_insert(0) += count;
        }
        self.issues.extend(other.issues);
    }

    /// Number of issues in `category`.
    #[must_use]
    pub fn count(&self, category: IssueCategory) -> usize {
        self.counts.get(&category).copied().unwrap_or(0)
    }

    /// Per-category counts.
    #[must_use]
    pub fn counts(&self) -> &BTreeMap<IssueCategory, usize> {
        &self.counts
    }

    /// All issues in recording order.
    #[must_use]
    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    /// Total number of issues.
    #[must_use]
    pub fn len(&self) -> usize {
        self.issues.len()
    }

    /// Returns true if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }
}
