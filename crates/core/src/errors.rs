//! Error types for the gitauthors core library.
//!
//! Each subsystem has its own error type derived with `thiserror`. The
//! binary wraps them in `anyhow` at the command boundary.
//!
//! Cache reads have no error type: a missing or corrupt cache file is
//! treated as an empty cache and never surfaces as an error.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Git errors
// ---------------------------------------------------------------------------

/// Errors from local Git (git2) operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// The repository path does not exist or is not a git repo.
    #[error("git repository not found at '{0}'")]
    RepositoryNotFound(String),

    /// A `git2` library error.
    #[error("git2 error: {0}")]
    Git2Error(#[from] git2::Error),

    /// A ref (branch, tag, SHA) could not be resolved.
    #[error("git ref not found: {0}")]
    RefNotFound(String),

    /// The local directory could not be prepared for a clone.
    #[error("cannot create {path}: {detail}")]
    LocalPathUnavailable {
        path: String,
        detail: String,
    },

    /// Cloning the configured remote failed.
    #[error("cannot clone '{url}': {detail}")]
    CloneFailed {
        url: String,
        detail: String,
    },

    /// The local branch and `origin/<branch>` both have commits the other
    /// lacks, so it cannot be fast-forwarded.
    #[error("local branch '{branch}' ({local}) has diverged from origin ({upstream})")]
    BranchDiverged {
        branch: String,
        local: String,
        upstream: String,
    },

    /// Uncommitted changes in the working tree conflict with the checkout.
    #[error("cannot check out '{branch}' over local changes: {detail}")]
    CheckoutBlocked {
        branch: String,
        detail: String,
    },

    /// A blocking git task panicked or was cancelled.
    #[error("git task interrupted: {0}")]
    Interrupted(String),

    /// Generic I/O wrapper.
    #[error("git I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// GitHub API errors
// ---------------------------------------------------------------------------

/// Errors from GitHub GraphQL API interactions.
#[derive(Debug, Error)]
pub enum GitHubError {
    /// HTTP-level transport error (network, TLS, etc.).
    #[error("GitHub HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// The API returned a non-success status code.
    #[error("GitHub API error (HTTP {status}): {body}")]
    ApiError {
        status: u16,
        body: String,
    },

    /// Authentication token is missing or invalid.
    #[error("GitHub authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Rate limit exceeded.
    #[error("GitHub rate limit exceeded, resets at {reset_at}")]
    RateLimited {
        reset_at: String,
    },

    /// The GraphQL endpoint answered with an `errors` array.
    #[error("GitHub GraphQL error: {0}")]
    GraphQl(String),

    /// JSON deserialization failure.
    #[error("GitHub response parse error: {0}")]
    ParseError(String),
}

// ---------------------------------------------------------------------------
// Identity resolution errors
// ---------------------------------------------------------------------------

/// Failure of a single resolution strategy.
#[derive(Debug, Error)]
pub enum StrategyError {
    /// User search returned nothing (or the search call itself failed).
    #[error("cannot find the info of \"{email}\"{}", detail_suffix(.source))]
    SearchFailed {
        email: String,
        #[source]
        source: Option<GitHubError>,
    },

    /// Commit-author lookup found no commit or no history.
    #[error("cannot find commit \"{commit}\" in \"{owner}/{repo}\"{}", detail_suffix(.source))]
    CommitNotFound {
        commit: String,
        owner: String,
        repo: String,
        #[source]
        source: Option<GitHubError>,
    },
}

fn detail_suffix(source: &Option<GitHubError>) -> String {
    match source {
        Some(err) => format!(" ({})", err),
        None => String::new(),
    }
}

/// Every attempted strategy failed for one email.
#[derive(Debug, Error)]
#[error("cannot resolve \"{email}\": {}", join_failures(.failures))]
pub struct ResolutionError {
    pub email: String,
    pub failures: Vec<StrategyError>,
}

fn join_failures(failures: &[StrategyError]) -> String {
    if failures.is_empty() {
        return "no strategy was attempted".into();
    }
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

// ---------------------------------------------------------------------------
// Cache errors
// ---------------------------------------------------------------------------

/// Errors from persisting the author cache.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The cache could not be serialized.
    #[error("cannot serialize cache: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Writing the cache file failed; the previous file is left in place.
    #[error("cannot write to {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("\"{0}\" does not exist")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A required environment variable is not set.
    #[error("required environment variable '{var}' is not set (referenced by config field '{field}')")]
    EnvVarMissing {
        var: String,
        field: String,
    },

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue {
        field: String,
        detail: String,
    },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Sync engine errors
// ---------------------------------------------------------------------------

/// Errors that abort a sync cycle. Nothing is persisted when one occurs.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Another cycle is already running on this engine.
    #[error("sync already in progress")]
    AlreadyRunning,

    /// The log provider failed.
    #[error("sync Git error: {0}")]
    GitError(#[from] GitError),

    /// At least one author could not be resolved.
    #[error("sync resolution error: {0}")]
    Resolution(#[from] ResolutionError),

    /// The updated cache could not be written.
    #[error("sync cache error: {0}")]
    Cache(#[from] CacheError),

    /// A resolution task panicked or was aborted.
    #[error("resolution task failed: {0}")]
    TaskFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = GitError::RepositoryNotFound("/tmp/repo".into());
        assert_eq!(err.to_string(), "git repository not found at '/tmp/repo'");

        let err = GitHubError::RateLimited {
            reset_at: "1700000000".into(),
        };
        assert!(err.to_string().contains("rate limit"));

        let err = ConfigError::EnvVarMissing {
            var: "GITHUB_ACCESS_TOKEN".into(),
            field: "github.token_env".into(),
        };
        assert!(err.to_string().contains("GITHUB_ACCESS_TOKEN"));

        let err = GitError::BranchDiverged {
            branch: "master".into(),
            local: "aaa".into(),
            upstream: "bbb".into(),
        };
        assert_eq!(
            err.to_string(),
            "local branch 'master' (aaa) has diverged from origin (bbb)"
        );
    }

    #[test]
    fn test_resolution_error_aggregates_failures() {
        let err = ResolutionError {
            email: "b@x.com".into(),
            failures: vec![
                StrategyError::SearchFailed {
                    email: "b@x.com".into(),
                    source: None,
                },
                StrategyError::CommitNotFound {
                    commit: "c9".into(),
                    owner: "acme".into(),
                    repo: "widget".into(),
                    source: Some(GitHubError::GraphQl("Could not resolve".into())),
                },
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("b@x.com"));
        assert!(msg.contains("cannot find commit \"c9\" in \"acme/widget\""));
        assert!(msg.contains("Could not resolve"));
    }
}
