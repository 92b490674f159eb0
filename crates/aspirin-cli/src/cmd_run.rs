use std::path::Path;

use aspirin_core::AspirinConfig;
use aspirin_store::StoreLock;

use crate::cmd_serve::{self, ServeArgs};
use crate::cmd_sync;

/// `git-aspirin run`: sync, then serve. A failed sync stops here; the report
/// is not served over a snapshot that could not be refreshed.
pub fn execute(config: &AspirinConfig, store_path: &Path, args: &ServeArgs) -> anyhow::Result<()> {
    let _lock = StoreLock::acquire(store_path)?;
    let report = cmd_sync::sync(config, store_path)?;
    tracing::info!(added = report.added, total = report.total, "snapshot refreshed");
    cmd_serve::serve(config, store_path, args)
}
