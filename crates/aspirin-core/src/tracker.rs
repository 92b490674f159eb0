use crate::types::CommitSnapshot;

/// Outcome of a toggle: the state the commit is in afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    Completed,
    Reopened,
}

impl Toggle {
    pub fn is_completed(self) -> bool {
        matches!(self, Toggle::Completed)
    }
}

/// Rejected commit identifier (empty or whitespace only).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("commit identifier is required")]
pub struct InvalidSha;

/// Trim and check a client-supplied commit identifier.
pub fn validate_sha(raw: &str) -> Result<&str, InvalidSha> {
    let sha = raw.trim();
    if sha.is_empty() {
        return Err(InvalidSha);
    }
    Ok(sha)
}

/// Flip a commit's membership in the completion set.
///
/// The snapshot is left untouched when the identifier is invalid. Toggling the
/// same SHA twice restores the original set.
pub fn toggle(snapshot: &mut CommitSnapshot, sha: &str) -> Result<Toggle, InvalidSha> {
    let sha = validate_sha(sha)?;
    if snapshot.completed.remove(sha) {
        Ok(Toggle::Reopened)
    } else {
        snapshot.completed.insert(sha.to_string());
        Ok(Toggle::Completed)
    }
}
