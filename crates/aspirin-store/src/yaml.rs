use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use aspirin_core::CommitSnapshot;

use crate::{write_atomic, SnapshotStore, StoreError};

/// Snapshot kept as a single YAML document on disk.
#[derive(Debug, Clone)]
pub struct YamlFileStore {
    path: PathBuf,
}

impl YamlFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotStore for YamlFileStore {
    fn load(&self) -> Result<Option<CommitSnapshot>, StoreError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "no snapshot on disk");
                return Ok(None);
            }
            Err(source) => {
                return Err(StoreError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        // A zero-byte file is what `touch` leaves behind; nothing to parse.
        if content.trim().is_empty() {
            return Ok(Some(CommitSnapshot::default()));
        }
        let mut snapshot: CommitSnapshot =
            serde_yaml::from_str(&content).map_err(|source| StoreError::Corrupt {
                path: self.path.clone(),
                source,
            })?;
        let dropped = snapshot.dedup_commits();
        if dropped > 0 {
            tracing::warn!(path = %self.path.display(), dropped, "snapshot had duplicate commits");
        }
        Ok(Some(snapshot))
    }

    fn save(&self, snapshot: &CommitSnapshot) -> Result<(), StoreError> {
        let yaml = serde_yaml::to_string(snapshot)?;
        write_atomic(&self.path, yaml.as_bytes()).map_err(|source| StoreError::Write {
            path: self.path.clone(),
            source,
        })?;
        tracing::debug!(
            path = %self.path.display(),
            commits = snapshot.commits.len(),
            completed = snapshot.completed.len(),
            "snapshot saved"
        );
        Ok(())
    }
}
