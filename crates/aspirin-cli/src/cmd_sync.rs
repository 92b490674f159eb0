use std::path::Path;

use anyhow::Context;
use aspirin_core::AspirinConfig;
use aspirin_github::GitHubClient;
use aspirin_store::{StoreLock, YamlFileStore};
use aspirin_sync::{FetchBound, SyncEngine, SyncOptions, SyncReport};

/// `git-aspirin sync`
pub fn execute(config: &AspirinConfig, store_path: &Path) -> anyhow::Result<()> {
    let _lock = StoreLock::acquire(store_path)?;
    let report = sync(config, store_path)?;
    println!("{}", describe(&report));
    Ok(())
}

/// Run one sync against GitHub. The caller holds the store lock.
pub fn sync(config: &AspirinConfig, store_path: &Path) -> anyhow::Result<SyncReport> {
    config.require_token()?;
    let store = YamlFileStore::new(store_path);
    let client = GitHubClient::from_config(config);
    let options = SyncOptions {
        lookback: config.lookback(),
    };
    SyncEngine::new(&store, &client, options)
        .sync()
        .with_context(|| format!("syncing {}", config.repo_slug()))
}

fn describe(report: &SyncReport) -> String {
    let mode = match report.bound {
        FetchBound::Bootstrap(_) => "initial fetch",
        FetchBound::Incremental(_) => "incremental fetch",
    };
    format!(
        "{mode} since {}: {} listed, {} new, {} commits stored",
        report.bound.since(),
        report.listed,
        report.added,
        report.total
    )
}
