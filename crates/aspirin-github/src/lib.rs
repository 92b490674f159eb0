use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use time::format_description::well_known::Rfc3339;
use time::{OffsetDateTime, UtcOffset};

use aspirin_core::{AspirinConfig, CommitRecord, CommitSource, CommitStub, RemoteError};

// ── Config ──

const TIMEOUT: Duration = Duration::from_secs(30);
const PER_PAGE: u32 = 100;
const API_VERSION: &str = "2022-11-28";
const USER_AGENT: &str = concat!("git-aspirin/", env!("CARGO_PKG_VERSION"));

/// Commit source backed by the GitHub REST API, authenticated with a static token.
pub struct GitHubClient {
    agent: ureq::Agent,
    api_url: String,
    owner: String,
    repo: String,
    token: String,
}

impl GitHubClient {
    pub fn new(api_url: &str, owner: &str, repo: &str, token: &str) -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(TIMEOUT))
            .http_status_as_error(false)
            .build()
            .new_agent();
        Self {
            agent,
            api_url: api_url.trim_end_matches('/').to_string(),
            owner: owner.to_string(),
            repo: repo.to_string(),
            token: token.to_string(),
        }
    }

    pub fn from_config(config: &AspirinConfig) -> Self {
        Self::new(
            &config.api_url,
            &config.repo_owner,
            &config.repo_name,
            &config.github_token,
        )
    }

    fn commits_url(&self) -> String {
        format!("{}/repos/{}/{}/commits", self.api_url, self.owner, self.repo)
    }

    fn list_url(&self, since: OffsetDateTime) -> Result<String, RemoteError> {
        let since = format_since(since).map_err(|message| RemoteError::Decode {
            url: self.commits_url(),
            message,
        })?;
        Ok(format!(
            "{}?since={since}&per_page={PER_PAGE}",
            self.commits_url()
        ))
    }

    /// GET a JSON document. Returns the decoded body and the `rel="next"` link, if any.
    fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<(T, Option<String>), RemoteError> {
        tracing::debug!(url, "GitHub request");
        let mut resp = self
            .agent
            .get(url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
            .header("User-Agent", USER_AGENT)
            .call()
            .map_err(|e| RemoteError::Transport {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        let status = resp.status().as_u16();
        let header = |name: &str| {
            resp.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let remaining = header("x-ratelimit-remaining");
        let reset = header("x-ratelimit-reset");
        let next = header("link").and_then(|link| next_page_url(&link));

        let body = resp
            .body_mut()
            .read_to_string()
            .map_err(|e| RemoteError::Transport {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        if let Some(err) = classify_status(url, status, remaining.as_deref(), reset.as_deref(), &body)
        {
            return Err(err);
        }

        let value = serde_json::from_str(&body).map_err(|e| RemoteError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        Ok((value, next))
    }
}

impl CommitSource for GitHubClient {
    fn list_commits_since(&self, since: OffsetDateTime) -> Result<Vec<CommitStub>, RemoteError> {
        let mut stubs = Vec::new();
        let mut next = Some(self.list_url(since)?);
        while let Some(url) = next {
            let (page, link): (Vec<ApiListEntry>, _) = self.get_json(&url)?;
            tracing::debug!(count = page.len(), "listed commit page");
            stubs.extend(page.into_iter().map(|entry| CommitStub::new(entry.sha)));
            next = link;
        }
        Ok(stubs)
    }

    fn get_commit(&self, sha: &str) -> Result<CommitRecord, RemoteError> {
        let url = format!("{}/{sha}", self.commits_url());
        let (commit, _): (ApiCommit, _) = self.get_json(&url)?;
        commit.into_record().map_err(|message| RemoteError::Decode { url, message })
    }
}

// ── Wire format ──

#[derive(Deserialize)]
struct ApiListEntry {
    sha: String,
}

#[derive(Deserialize)]
struct ApiCommit {
    sha: String,
    commit: ApiCommitDetail,
    #[serde(default)]
    files: Vec<ApiFile>,
}

#[derive(Deserialize)]
struct ApiCommitDetail {
    author: Option<ApiSignature>,
    committer: Option<ApiSignature>,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct ApiSignature {
    name: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    date: Option<OffsetDateTime>,
}

#[derive(Deserialize)]
struct ApiFile {
    filename: String,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    message: String,
}

impl ApiCommit {
    fn into_record(self) -> Result<CommitRecord, String> {
        let ApiCommitDetail {
            author,
            committer,
            message,
        } = self.commit;
        let author_date = author
            .as_ref()
            .and_then(|a| a.date)
            .or_else(|| committer.as_ref().and_then(|c| c.date))
            .ok_or_else(|| format!("commit {} has no author or committer date", self.sha))?;
        let author_name = author
            .and_then(|a| a.name)
            .or_else(|| committer.and_then(|c| c.name))
            .unwrap_or_else(|| "unknown".to_string());
        Ok(CommitRecord {
            sha: self.sha,
            author_name,
            author_date,
            message,
            files: self.files.into_iter().map(|f| f.filename).collect(),
        })
    }
}

// ── Helpers ──

/// `since` as UTC RFC 3339 with whole seconds, safe to drop into a query string.
fn format_since(since: OffsetDateTime) -> Result<String, String> {
    let utc = since.to_offset(UtcOffset::UTC);
    let truncated = utc - time::Duration::nanoseconds(i64::from(utc.nanosecond()));
    truncated.format(&Rfc3339).map_err(|e| e.to_string())
}

/// Extract the `rel="next"` target from a `Link` header.
fn next_page_url(link: &str) -> Option<String> {
    link.split(',').find_map(|part| {
        let mut pieces = part.split(';');
        let target = pieces.next()?.trim();
        let is_next = pieces.any(|p| p.trim() == "rel=\"next\"");
        if !is_next {
            return None;
        }
        target
            .strip_prefix('<')
            .and_then(|t| t.strip_suffix('>'))
            .map(str::to_string)
    })
}

/// Map a non-success response to a [`RemoteError`]; `None` for 2xx.
fn classify_status(
    url: &str,
    status: u16,
    ratelimit_remaining: Option<&str>,
    ratelimit_reset: Option<&str>,
    body: &str,
) -> Option<RemoteError> {
    if (200..300).contains(&status) {
        return None;
    }
    let exhausted = ratelimit_remaining.map(str::trim) == Some("0");
    if status == 429 || (status == 403 && exhausted) {
        return Some(RemoteError::RateLimited {
            url: url.to_string(),
            reset_at: ratelimit_reset.and_then(|r| r.trim().parse().ok()),
        });
    }
    let message = serde_json::from_str::<ApiErrorBody>(body)
        .map(|b| b.message)
        .unwrap_or_else(|_| body.chars().take(200).collect());
    Some(RemoteError::Status {
        url: url.to_string(),
        status,
        message,
    })
}

// ── Tests ──
