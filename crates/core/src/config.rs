//! TOML-based configuration for gitauthors.
//!
//! The GitHub token is never stored in the file. `github.token_env` names the
//! environment variable holding it, and the value is read at runtime via
//! [`AppConfig::resolve_env_vars`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::ConfigError;
use crate::gate::DEFAULT_CONCURRENCY_LIMIT;
use crate::git::remote_url::{decode_remote, derive_git_remote_url, is_git_url, is_https};
use crate::identity::noreply::GITHUB_NOREPLY_DOMAIN;
use crate::sync_engine::SyncSettings;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level application configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Repository to scan.
    #[serde(default)]
    pub repository: RepositoryConfig,

    /// Cache file settings.
    #[serde(default)]
    pub cache: CacheConfig,

    /// GitHub API settings.
    #[serde(default)]
    pub github: GitHubConfig,
}

fn default_log_level() -> String {
    "warn".into()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            repository: RepositoryConfig::default(),
            cache: CacheConfig::default(),
            github: GitHubConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Repository
// ---------------------------------------------------------------------------

/// Where the repository lives and which branch is scanned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Remote URL. Derived from `owner`/`name` when empty.
    #[serde(default)]
    pub remote: String,

    /// Repository owner. Derived from `remote` when empty.
    #[serde(default)]
    pub owner: String,

    /// Repository name. Derived from `remote` when empty.
    #[serde(default)]
    pub name: String,

    /// Local checkout directory.
    #[serde(default = "default_local")]
    pub local: PathBuf,

    /// Branch whose history is scanned.
    #[serde(default = "default_branch")]
    pub branch: String,

    /// Private repositories are cloned with the token.
    #[serde(default)]
    pub private: bool,

    /// Allow a non-HTTPS remote for a private repository.
    #[serde(default)]
    pub skip_https_check: bool,
}

fn default_local() -> PathBuf {
    PathBuf::from(".")
}
fn default_branch() -> String {
    "master".into()
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            remote: String::new(),
            owner: String::new(),
            name: String::new(),
            local: default_local(),
            branch: default_branch(),
            private: false,
            skip_https_check: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

/// Cache file and resolution fan-out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Path of the JSON cache file.
    #[serde(default = "default_cache_path")]
    pub path: PathBuf,

    /// Maximum number of emails resolved at once.
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,
}

fn default_cache_path() -> PathBuf {
    PathBuf::from("gai-cache.json")
}
fn default_concurrency_limit() -> usize {
    DEFAULT_CONCURRENCY_LIMIT
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: default_cache_path(),
            concurrency_limit: default_concurrency_limit(),
        }
    }
}

// ---------------------------------------------------------------------------
// GitHub
// ---------------------------------------------------------------------------

/// GitHub API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// GitHub API base URL (default `https://api.github.com`).
    #[serde(default = "default_github_api_url")]
    pub api_url: String,

    /// Environment variable holding the personal access token.
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Only ask for commit authors, never search users by email.
    #[serde(default)]
    pub skip_search: bool,

    /// Domain of the host's noreply commit addresses.
    #[serde(default = "default_noreply_domain")]
    pub noreply_domain: String,

    /// Resolved token (populated by `resolve_env_vars`).
    #[serde(skip)]
    pub token: Option<String>,
}

fn default_github_api_url() -> String {
    "https://api.github.com".into()
}
fn default_token_env() -> String {
    "GITHUB_ACCESS_TOKEN".into()
}
fn default_noreply_domain() -> String {
    GITHUB_NOREPLY_DOMAIN.into()
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: default_github_api_url(),
            token_env: default_token_env(),
            skip_search: false,
            noreply_domain: default_noreply_domain(),
            token: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading & resolving
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Load an [`AppConfig`] from a TOML file at the given path.
    ///
    /// This does **not** resolve environment variables -- call
    /// [`resolve_env_vars`](Self::resolve_env_vars) afterwards.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Read the token from the variable named by `github.token_env`.
    ///
    /// A missing variable is not an error here; commands that talk to GitHub
    /// check [`GitHubConfig::token`] themselves.
    pub fn resolve_env_vars(&mut self) -> Result<(), ConfigError> {
        self.github.token = resolve_optional_env(&self.github.token_env, "github.token_env");
        Ok(())
    }

    /// Fill in whichever of `remote` or `owner`/`name` was left out, and
    /// expand a leading `~/` in the local checkout and cache paths.
    pub fn normalize(&mut self) -> Result<(), ConfigError> {
        self.cache.path = expand_tilde(&self.cache.path);
        self.repository.local = expand_tilde(&self.repository.local);

        let repo = &mut self.repository;
        repo.remote = repo.remote.trim().to_string();

        if !repo.remote.is_empty() {
            if repo.owner.is_empty() || repo.name.is_empty() {
                let (owner, name) = decode_remote(&repo.remote)?;
                if repo.owner.is_empty() {
                    repo.owner = owner;
                }
                if repo.name.is_empty() {
                    repo.name = name;
                }
            }
        } else if !repo.owner.is_empty() && !repo.name.is_empty() {
            repo.remote = derive_git_remote_url(&self.github.api_url, &repo.owner, &repo.name);
            debug!(remote = %repo.remote, "derived remote url");
        }
        Ok(())
    }

    /// Validate that all required fields are present and sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let repo = &self.repository;
        if !is_git_url(&repo.remote) {
            return Err(ConfigError::InvalidValue {
                field: "repository.remote".into(),
                detail: "wrong remote, it should be a url string".into(),
            });
        }
        if repo.owner.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "repository.owner".into(),
                detail: "repository owner must not be empty".into(),
            });
        }
        if repo.name.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "repository.name".into(),
                detail: "repository name must not be empty".into(),
            });
        }
        if repo.branch.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "repository.branch".into(),
                detail: "branch must not be empty".into(),
            });
        }
        if repo.private && !repo.skip_https_check && !is_https(&repo.remote) {
            return Err(ConfigError::InvalidValue {
                field: "repository.remote".into(),
                detail: "If the repo is private, you should use HTTPS url".into(),
            });
        }
        if self.cache.concurrency_limit == 0 {
            return Err(ConfigError::InvalidValue {
                field: "cache.concurrency_limit".into(),
                detail: "concurrency limit must be > 0".into(),
            });
        }

        Ok(())
    }

    /// Convenience: load, resolve, normalize and validate in one call.
    pub fn load_and_resolve<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.resolve_env_vars()?;
        config.normalize()?;
        config.validate()?;
        Ok(config)
    }

    /// The cache file location with `~/` expanded.
    pub fn cache_path(&self) -> PathBuf {
        expand_tilde(&self.cache.path)
    }

    /// The subset of settings the sync engine is built from.
    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            owner: self.repository.owner.clone(),
            repo_name: self.repository.name.clone(),
            cache_path: self.cache_path(),
            concurrency_limit: self.cache.concurrency_limit,
            skip_search: self.github.skip_search,
        }
    }
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}

/// Try to read an environment variable by name. Returns `Some(value)` on
/// success; logs a warning and returns `None` if the variable is unset.
fn resolve_optional_env(env_name: &str, field: &str) -> Option<String> {
    match std::env::var(env_name) {
        Ok(val) if !val.is_empty() => {
            debug!(field, env_name, "resolved env var");
            Some(val)
        }
        Ok(_) => {
            warn!(field, env_name, "env var is set but empty");
            None
        }
        Err(_) => {
            warn!(field, env_name, "env var not set");
            None
        }
    }
}
