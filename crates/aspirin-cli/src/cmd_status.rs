use std::path::Path;

use aspirin_core::CommitSnapshot;
use aspirin_store::{SnapshotStore, YamlFileStore};
use time::format_description::well_known::Rfc3339;

/// `git-aspirin status`
pub fn execute(store_path: &Path) -> anyhow::Result<()> {
    let store = YamlFileStore::new(store_path);
    let snapshot = store.load()?;
    println!("{}", render(snapshot.as_ref(), store.path()));
    Ok(())
}

fn render(snapshot: Option<&CommitSnapshot>, store_path: &Path) -> String {
    let Some(snap) = snapshot else {
        return format!(
            "No snapshot at {} (run `git-aspirin sync` first)",
            store_path.display()
        );
    };
    let mut lines = vec![format!(
        "{} of {} commits reviewed",
        snap.completed_count(),
        snap.commits.len()
    )];
    if !snap.commits.is_empty() && snap.all_completed() {
        lines.push("All commits reviewed.".to_string());
    }
    match snap.last_synced_at.and_then(|t| t.format(&Rfc3339).ok()) {
        Some(at) => lines.push(format!("Last synced: {at}")),
        None => lines.push("Last synced: never".to_string()),
    }
    lines.join("\n")
}
