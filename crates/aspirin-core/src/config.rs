use std::path::{Path, PathBuf};

use serde::Deserialize;

pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const DEFAULT_LOOKBACK_DAYS: u32 = 15;
pub const DEFAULT_STORE_PATH: &str = "commits.yaml";
pub const DEFAULT_STATIC_DIR: &str = "static";

/// Environment variable consulted when `github_token` is left empty.
pub const TOKEN_ENV: &str = "GITHUB_TOKEN";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("could not parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Startup configuration, read once from `config.yaml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct AspirinConfig {
    #[serde(default)]
    pub github_token: String,
    pub repo_owner: String,
    pub repo_name: String,
    /// Working copy used by the local file-tree comparison; carried through
    /// but not consumed by the commit report.
    #[serde(default)]
    pub local_repo_path: Option<PathBuf>,
    /// Folder prefixes whose files are hidden from the report.
    #[serde(default)]
    pub exclude_folders: Vec<String>,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_lookback_days() -> u32 {
    DEFAULT_LOOKBACK_DAYS
}

fn default_store_path() -> PathBuf {
    PathBuf::from(DEFAULT_STORE_PATH)
}

fn default_static_dir() -> PathBuf {
    PathBuf::from(DEFAULT_STATIC_DIR)
}

impl AspirinConfig {
    /// Read, parse and validate a config file. The token falls back to
    /// `$GITHUB_TOKEN` when the file leaves it empty; whether one is present
    /// is checked by [`AspirinConfig::require_token`] on the paths that reach GitHub.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self =
            serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.apply_token_fallback(std::env::var(TOKEN_ENV).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse without touching the environment or validating.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    pub fn apply_token_fallback(&mut self, env_token: Option<String>) {
        if self.github_token.trim().is_empty() {
            if let Some(token) = env_token.filter(|t| !t.trim().is_empty()) {
                self.github_token = token;
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.repo_owner.trim().is_empty() {
            return Err(ConfigError::Invalid("repo_owner is empty".into()));
        }
        if self.repo_name.trim().is_empty() {
            return Err(ConfigError::Invalid("repo_name is empty".into()));
        }
        if self.lookback_days == 0 {
            return Err(ConfigError::Invalid("lookback_days must be at least 1".into()));
        }
        Ok(())
    }

    /// The API token, or an error when neither the file nor the environment set one.
    pub fn require_token(&self) -> Result<&str, ConfigError> {
        let token = self.github_token.trim();
        if token.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "github_token is empty (set it in the config or via ${TOKEN_ENV})"
            )));
        }
        Ok(token)
    }

    /// `owner/name`
    pub fn repo_slug(&self) -> String {
        format!("{}/{}", self.repo_owner, self.repo_name)
    }

    pub fn lookback(&self) -> time::Duration {
        time::Duration::days(i64::from(self.lookback_days))
    }
}
