use serde::Serialize;
use time::format_description::well_known::Rfc3339;

use aspirin_core::{CommitRecord, CommitSnapshot};

/// Data handed to the report template.
#[derive(Debug, Serialize)]
pub struct ReportView<'a> {
    pub repo: &'a str,
    pub total: usize,
    pub completed_count: usize,
    pub all_completed: bool,
    pub last_synced_at: Option<String>,
    pub commits: Vec<CommitView<'a>>,
}

#[derive(Debug, Serialize)]
pub struct CommitView<'a> {
    pub sha: &'a str,
    pub short_sha: &'a str,
    pub author: &'a str,
    pub date: String,
    pub summary: &'a str,
    pub message: &'a str,
    pub completed: bool,
    pub files: Vec<&'a str>,
}

impl<'a> ReportView<'a> {
    /// Newest commits first; files under `exclude_folders` are dropped.
    pub fn build(snapshot: &'a CommitSnapshot, repo: &'a str, exclude_folders: &[String]) -> Self {
        let mut ordered: Vec<&CommitRecord> = snapshot.commits.iter().collect();
        ordered.sort_by(|a, b| b.author_date.cmp(&a.author_date));

        let commits = ordered
            .into_iter()
            .map(|c| CommitView {
                sha: &c.sha,
                short_sha: c.short_sha(),
                author: &c.author_name,
                date: c.formatted_date(),
                summary: c.summary(),
                message: &c.message,
                completed: snapshot.is_completed(&c.sha),
                files: c
                    .files
                    .iter()
                    .map(String::as_str)
                    .filter(|f| !is_excluded(f, exclude_folders))
                    .collect(),
            })
            .collect();

        Self {
            repo,
            total: snapshot.commits.len(),
            completed_count: snapshot.completed_count(),
            all_completed: snapshot.all_completed(),
            last_synced_at: snapshot.last_synced_at.and_then(|t| t.format(&Rfc3339).ok()),
            commits,
        }
    }
}

/// Whether `path` lies inside one of the excluded folders.
pub fn is_excluded(path: &str, exclude_folders: &[String]) -> bool {
    exclude_folders.iter().any(|folder| {
        let folder = folder.trim_matches('/');
        !folder.is_empty()
            && path
                .strip_prefix(folder)
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
    })
}
