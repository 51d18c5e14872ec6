//! Remote identity-lookup surface used by the resolver.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::GitHubError;

/// A user returned by an identity search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityCandidate {
    pub handle: String,
}

/// One entry of a commit's history as returned by the lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub author_name: String,
}

/// Author metadata for a commit. An empty history means the commit is unknown
/// to the remote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitAuthorHistory {
    pub history: Vec<HistoryEntry>,
}

/// Read-only identity queries. Calls are idempotent, so a resolver may issue
/// them concurrently and drop the ones it no longer needs.
#[async_trait]
pub trait IdentityService: Send + Sync {
    /// Search users matching `query` (an email address).
    async fn search_identity(&self, query: &str) -> Result<Vec<IdentityCandidate>, GitHubError>;

    /// Author history of `commit` in `owner/repo`.
    async fn lookup_commit_author(
        &self,
        owner: &str,
        repo: &str,
        commit: &str,
    ) -> Result<CommitAuthorHistory, GitHubError>;
}
