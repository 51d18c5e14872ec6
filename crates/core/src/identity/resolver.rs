//! Resolution of one author email to a GitHub identity.
//!
//! [`IdentityResolver`] races the available strategies for a request:
//! 1. Noreply address: the login is read from the address, nothing else runs
//! 2. User search by email (skipped for malformed addresses or on request)
//! 3. Author name of the commit itself
//!
//! Strategies 2 and 3 run concurrently and the first success wins.

use std::sync::{Arc, OnceLock};

use futures_util::future::{BoxFuture, FutureExt};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::noreply::{self, GITHUB_NOREPLY_DOMAIN};
use super::service::IdentityService;
use crate::errors::{GitHubError, ResolutionError, StrategyError};
use crate::race::first_success;

/// Everything needed to resolve one email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionRequest {
    pub email: String,
    pub commit_hash: String,
    pub owner: String,
    pub repo_name: String,
    #[serde(default)]
    pub skip_search: bool,
}

/// Resolves emails against an [`IdentityService`].
pub struct IdentityResolver {
    service: Arc<dyn IdentityService>,
    noreply_domain: String,
}

impl IdentityResolver {
    pub fn new(service: Arc<dyn IdentityService>) -> Self {
        Self {
            service,
            noreply_domain: GITHUB_NOREPLY_DOMAIN.to_string(),
        }
    }

    /// Use another noreply domain (GitHub Enterprise hosts have their own).
    pub fn with_noreply_domain(mut self, domain: impl Into<String>) -> Self {
        self.noreply_domain = domain.into();
        self
    }

    /// Resolve `request.email` to a name.
    ///
    /// Fails only when every attempted strategy failed; the error then
    /// carries each strategy's failure.
    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn resolve(&self, request: &ResolutionRequest) -> Result<String, ResolutionError> {
        if let Some(login) = noreply::extract_login(&request.email, &self.noreply_domain) {
            debug!(login, "resolved from noreply address");
            return Ok(login.to_string());
        }

        let mut strategies: Vec<BoxFuture<'_, Result<String, StrategyError>>> =
            Vec::with_capacity(2);
        if !request.skip_search && is_valid_email(&request.email) {
            strategies.push(self.search_by_email(&request.email).boxed());
        }
        strategies.push(self.commit_author(request).boxed());

        match first_success(strategies).await {
            Ok(name) => {
                debug!(name = %name, "resolved");
                Ok(name)
            }
            Err(failures) => Err(ResolutionError {
                email: request.email.clone(),
                failures,
            }),
        }
    }

    async fn search_by_email(&self, email: &str) -> Result<String, StrategyError> {
        match self.service.search_identity(email).await {
            Ok(candidates) => candidates
                .into_iter()
                .next()
                .map(|c| c.handle)
                .ok_or_else(|| StrategyError::SearchFailed {
                    email: email.to_string(),
                    source: None,
                }),
            Err(e) => Err(StrategyError::SearchFailed {
                email: email.to_string(),
                source: Some(e),
            }),
        }
    }

    async fn commit_author(&self, request: &ResolutionRequest) -> Result<String, StrategyError> {
        let not_found = |source: Option<GitHubError>| StrategyError::CommitNotFound {
            commit: request.commit_hash.clone(),
            owner: request.owner.clone(),
            repo: request.repo_name.clone(),
            source,
        };

        let found = self
            .service
            .lookup_commit_author(&request.owner, &request.repo_name, &request.commit_hash)
            .await
            .map_err(|e| not_found(Some(e)))?;

        found
            .history
            .into_iter()
            .next()
            .map(|entry| entry.author_name)
            .ok_or_else(|| not_found(None))
    }
}

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[^ \t\r\n@]+@[^ \t\r\n@.][^ \t\r\n@]*$")
            .expect("email pattern is valid")
    })
}

/// Basic `local@domain` syntax check. Single-label domains such as
/// `localhost` are accepted, as git author addresses often use them.
pub fn is_valid_email(email: &str) -> bool {
    email_pattern().is_match(email)
}
