use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use aspirin_core::CommitSnapshot;
use fs2::FileExt;

mod memory;
mod yaml;

pub use memory::MemoryStore;
pub use yaml::YamlFileStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("could not read snapshot {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("snapshot {} exists but cannot be parsed: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("could not encode snapshot: {0}")]
    Encode(#[from] serde_yaml::Error),

    #[error("could not write snapshot {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("snapshot {} is in use by another git-aspirin process", path.display())]
    Locked { path: PathBuf },
}

/// Durable home of the commit snapshot.
pub trait SnapshotStore: Send + Sync {
    /// `Ok(None)` when no snapshot has been written yet.
    fn load(&self) -> Result<Option<CommitSnapshot>, StoreError>;

    /// Replace the stored snapshot as a whole.
    fn save(&self, snapshot: &CommitSnapshot) -> Result<(), StoreError>;
}

/// Atomic write: write to temp file in same dir, then rename.
pub fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(data)?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Exclusive lock on `<snapshot>.lock`, released on drop.
pub struct StoreLock {
    _file: fs::File,
    path: PathBuf,
}

impl StoreLock {
    /// Try to lock the snapshot (non-blocking). Fails with
    /// [`StoreError::Locked`] if another process holds it.
    pub fn acquire(snapshot_path: &Path) -> Result<Self, StoreError> {
        let path = lock_path(snapshot_path);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| StoreError::Write {
                path: path.clone(),
                source,
            })?;
        }
        let file = fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|source| StoreError::Write {
                path: path.clone(),
                source,
            })?;
        file.try_lock_exclusive()
            .map_err(|_| StoreError::Locked {
                path: snapshot_path.to_path_buf(),
            })?;
        tracing::debug!(lock = %path.display(), "acquired snapshot lock");
        Ok(Self { _file: file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// `commits.yaml` -> `commits.yaml.lock`
pub fn lock_path(snapshot_path: &Path) -> PathBuf {
    let mut name = snapshot_path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}
