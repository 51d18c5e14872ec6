//! Host-aware Git remote URL handling.
//!
//! Derives the HTTPS clone URL and the GraphQL endpoint for a GitHub
//! repository from the configured API URL, and splits a remote URL back into
//! its `owner`/`repo` pair.
//!
//! Supported remote forms:
//! - `https://github.com/owner/repo.git` (also `http://`, `ssh://`, `git://`)
//! - `git@github.com:owner/repo.git`

use std::sync::OnceLock;

use regex_lite::Regex;

use crate::errors::ConfigError;

fn url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^(?:(?:https?|ssh|git)://(?:[A-Za-z0-9_.-]+@)?[A-Za-z0-9_.-]+(?::[0-9]+)?/|[A-Za-z0-9_.-]+@[A-Za-z0-9_.-]+:)(?:[A-Za-z0-9_.~-]+/)*[A-Za-z0-9_.~-]+/[A-Za-z0-9_.~-]+?(?:\.git)?/?$",
        )
        .expect("remote url pattern is valid")
    })
}

/// Whether `url` looks like a Git remote URL.
pub fn is_git_url(url: &str) -> bool {
    url_pattern().is_match(url.trim())
}

/// Split a remote URL into `(owner, repo)`.
///
/// The last two path segments are used, with a trailing `.git` removed.
pub fn decode_remote(url: &str) -> Result<(String, String), ConfigError> {
    let url = url.trim();
    if !is_git_url(url) {
        return Err(ConfigError::InvalidValue {
            field: "repository.remote".into(),
            detail: format!("not a valid remote url: '{}'", url),
        });
    }

    // Drop the scheme/host (or the scp-style `user@host:` prefix).
    let path = match url.split_once("://") {
        Some((_, rest)) => rest.split_once('/').map(|(_, p)| p).unwrap_or(""),
        None => url.split_once(':').map(|(_, p)| p).unwrap_or(""),
    };

    let mut segments = path.trim_end_matches('/').rsplit('/');
    let repo = segments.next().unwrap_or("");
    let repo = repo.strip_suffix(".git").unwrap_or(repo);
    let owner = segments.next().unwrap_or("");

    if owner.is_empty() || repo.is_empty() {
        return Err(ConfigError::InvalidValue {
            field: "repository.remote".into(),
            detail: format!("not a valid remote url: '{}'", url),
        });
    }

    Ok((owner.to_string(), repo.to_string()))
}

/// Derive the HTTPS clone URL for `owner/repo`.
///
/// The resulting URL is `{base}/{owner}/{repo}.git`, see
/// [`derive_git_base_url`] for how the base is chosen.
pub fn derive_git_remote_url(api_url: &str, owner: &str, repo: &str) -> String {
    format!("{}/{}/{}.git", derive_git_base_url(api_url), owner, repo)
}

/// Derive just the Git base URL (without repo path).
///
/// - `https://api.github.com` → `https://github.com`
/// - `https://<host>/api/v3`  → `https://<host>`
/// - Anything else            → strip trailing slash, use as-is
pub fn derive_git_base_url(api_url: &str) -> String {
    let url = api_url.trim().trim_end_matches('/');

    if url.eq_ignore_ascii_case("https://api.github.com") {
        return "https://github.com".to_string();
    }

    if let Some(base) = url.strip_suffix("/api/v3") {
        return base.to_string();
    }

    url.to_string()
}

/// Derive the GraphQL endpoint from the REST API URL.
///
/// - `https://api.github.com` → `https://api.github.com/graphql`
/// - `https://<host>/api/v3`  → `https://<host>/api/graphql`
/// - Anything else            → `{url}/graphql`
pub fn derive_graphql_url(api_url: &str) -> String {
    let url = api_url.trim().trim_end_matches('/');

    if let Some(base) = url.strip_suffix("/api/v3") {
        return format!("{}/api/graphql", base);
    }

    format!("{}/graphql", url)
}

/// Whether the remote uses HTTPS (required for token credentials on private
/// repositories).
pub fn is_https(url: &str) -> bool {
    url.trim()
        .get(..8)
        .map(|scheme| scheme.eq_ignore_ascii_case("https://"))
        .unwrap_or(false)
}
