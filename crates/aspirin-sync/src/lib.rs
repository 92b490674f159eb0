//! Fetch-or-reuse reconciliation between the remote commit source and the
//! local snapshot.
//!
//! A sync loads the stored snapshot, asks the source for commits since a
//! lower bound, fetches detail only for SHAs it has not seen, advances the
//! sync marker and saves. Nothing is written unless every remote call
//! succeeded.

use time::{Duration, OffsetDateTime};

use aspirin_core::{CommitSnapshot, CommitSource, RemoteError};
use aspirin_store::{SnapshotStore, StoreError};

pub const DEFAULT_LOOKBACK: Duration = Duration::days(15);

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("fetching commits failed: {0}")]
    Remote(#[from] RemoteError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    /// How far back a first sync reaches.
    pub lookback: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            lookback: DEFAULT_LOOKBACK,
        }
    }
}

/// Lower bound for the remote "since" query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchBound {
    /// No usable history: reach back a fixed window from now.
    Bootstrap(OffsetDateTime),
    /// Continue from the previous sync marker.
    Incremental(OffsetDateTime),
}

impl FetchBound {
    pub fn since(self) -> OffsetDateTime {
        match self {
            FetchBound::Bootstrap(t) | FetchBound::Incremental(t) => t,
        }
    }

    pub fn is_bootstrap(self) -> bool {
        matches!(self, FetchBound::Bootstrap(_))
    }
}

/// Pick the fetch lower bound for a (possibly absent) prior snapshot.
pub fn fetch_lower_bound(
    prior: Option<&CommitSnapshot>,
    now: OffsetDateTime,
    lookback: Duration,
) -> FetchBound {
    match prior {
        Some(snapshot) if !snapshot.commits.is_empty() => match snapshot.last_synced_at {
            Some(last) => FetchBound::Incremental(last),
            None => FetchBound::Bootstrap(now - lookback),
        },
        _ => FetchBound::Bootstrap(now - lookback),
    }
}

/// Summary of one completed sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub bound: FetchBound,
    /// Commits returned by the listing, including ones already cached.
    pub listed: usize,
    pub added: usize,
    pub total: usize,
    pub synced_at: OffsetDateTime,
}

pub struct SyncEngine<'a> {
    store: &'a dyn SnapshotStore,
    source: &'a dyn CommitSource,
    options: SyncOptions,
}

impl<'a> SyncEngine<'a> {
    pub fn new(
        store: &'a dyn SnapshotStore,
        source: &'a dyn CommitSource,
        options: SyncOptions,
    ) -> Self {
        Self {
            store,
            source,
            options,
        }
    }

    pub fn sync(&self) -> Result<SyncReport, SyncError> {
        self.sync_at(OffsetDateTime::now_utc())
    }

    /// Run a sync with `now` as the clock reading taken before the listing
    /// request. `now` becomes the next incremental bound.
    pub fn sync_at(&self, now: OffsetDateTime) -> Result<SyncReport, SyncError> {
        let prior = self.store.load()?;
        let bound = fetch_lower_bound(prior.as_ref(), now, self.options.lookback);
        let mut snapshot = prior.unwrap_or_default();
        snapshot.dedup_commits();

        tracing::info!(
            since = %bound.since(),
            bootstrap = bound.is_bootstrap(),
            cached = snapshot.commits.len(),
            "fetching commits"
        );
        let stubs = self.source.list_commits_since(bound.since())?;

        let mut added = 0;
        for stub in &stubs {
            if snapshot.contains_commit(&stub.sha) {
                continue;
            }
            let record = self.source.get_commit(&stub.sha)?;
            tracing::debug!(sha = %record.sha, author = %record.author_name, "fetched commit");
            if snapshot.push_commit(record) {
                added += 1;
            }
        }

        snapshot.mark_synced(now);
        self.store.save(&snapshot)?;

        let report = SyncReport {
            bound,
            listed: stubs.len(),
            added,
            total: snapshot.commits.len(),
            synced_at: snapshot.last_synced_at.unwrap_or(now),
        };
        tracing::info!(
            listed = report.listed,
            added = report.added,
            total = report.total,
            "sync complete"
        );
        Ok(report)
    }
}
