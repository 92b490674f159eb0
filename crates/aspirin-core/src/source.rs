use time::OffsetDateTime;

use crate::types::CommitRecord;

/// Listing entry returned by the remote source before detail retrieval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitStub {
    pub sha: String,
}

impl CommitStub {
    pub fn new(sha: impl Into<String>) -> Self {
        Self { sha: sha.into() }
    }
}

/// Remote commit-history provider.
///
/// Implementations block; callers run them before the report server starts
/// or on a blocking thread.
pub trait CommitSource: Send + Sync {
    /// All commits with an author timestamp at or after `since`, in the
    /// order the provider returns them (typically newest first).
    fn list_commits_since(&self, since: OffsetDateTime) -> Result<Vec<CommitStub>, RemoteError>;

    /// Full record for one commit.
    fn get_commit(&self, sha: &str) -> Result<CommitRecord, RemoteError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("{url} returned HTTP {status}: {message}")]
    Status {
        url: String,
        status: u16,
        message: String,
    },

    #[error("rate limit exceeded for {url}{}", reset_hint(.reset_at))]
    RateLimited {
        url: String,
        /// Unix timestamp at which the quota resets, when reported.
        reset_at: Option<i64>,
    },

    #[error("unexpected response from {url}: {message}")]
    Decode { url: String, message: String },
}

fn reset_hint(reset_at: &Option<i64>) -> String {
    match reset_at.and_then(|ts| OffsetDateTime::from_unix_timestamp(ts).ok()) {
        Some(at) => format!(" (resets at {at})"),
        None => String::new(),
    }
}
