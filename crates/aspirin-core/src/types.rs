use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use time::macros::format_description;
use time::OffsetDateTime;

/// Number of hex characters shown for an abbreviated SHA.
pub const SHORT_SHA_LEN: usize = 7;

/// One commit as fetched from the remote source. Immutable once stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommitRecord {
    pub sha: String,
    pub author_name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub author_date: OffsetDateTime,
    pub message: String,
    /// Paths touched by the commit, when the remote source reported them.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
}

impl CommitRecord {
    pub fn short_sha(&self) -> &str {
        match self.sha.char_indices().nth(SHORT_SHA_LEN) {
            Some((idx, _)) => &self.sha[..idx],
            None => &self.sha,
        }
    }

    /// First line of the commit message.
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or("").trim_end()
    }

    /// Author date as `MM/DD/YYYY HH:MM`.
    pub fn formatted_date(&self) -> String {
        let format = format_description!("[month]/[day]/[year] [hour]:[minute]");
        self.author_date
            .format(format)
            .unwrap_or_else(|_| self.author_date.to_string())
    }
}

/// The persisted aggregate: every known commit plus the completion set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommitSnapshot {
    /// Fetch order, unique by SHA.
    #[serde(default)]
    pub commits: Vec<CommitRecord>,
    #[serde(default)]
    pub completed: BTreeSet<String>,
    #[serde(
        default,
        alias = "last_run_timestamp",
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_synced_at: Option<OffsetDateTime>,
}

impl CommitSnapshot {
    pub fn contains_commit(&self, sha: &str) -> bool {
        self.commits.iter().any(|c| c.sha == sha)
    }

    pub fn is_completed(&self, sha: &str) -> bool {
        self.completed.contains(sha)
    }

    /// True when every loaded commit is in the completion set.
    /// An empty commit list counts as fully reviewed.
    pub fn all_completed(&self) -> bool {
        self.commits.iter().all(|c| self.is_completed(&c.sha))
    }

    /// Completed commits among the loaded ones. SHAs in `completed` that
    /// reference commits outside the loaded window are not counted.
    pub fn completed_count(&self) -> usize {
        self.commits
            .iter()
            .filter(|c| self.is_completed(&c.sha))
            .count()
    }

    /// Append a commit unless its SHA is already present.
    /// Returns whether the record was added.
    pub fn push_commit(&mut self, record: CommitRecord) -> bool {
        if self.contains_commit(&record.sha) {
            return false;
        }
        self.commits.push(record);
        true
    }

    /// Drop every record whose SHA already appeared earlier in `commits`,
    /// keeping the first occurrence. Returns how many were removed.
    pub fn dedup_commits(&mut self) -> usize {
        let before = self.commits.len();
        let mut seen = BTreeSet::new();
        self.commits.retain(|c| seen.insert(c.sha.clone()));
        before - self.commits.len()
    }

    /// Advance the sync marker. Never moves it backward.
    pub fn mark_synced(&mut self, at: OffsetDateTime) {
        match self.last_synced_at {
            Some(prev) if prev >= at => {}
            _ => self.last_synced_at = Some(at),
        }
    }
}
