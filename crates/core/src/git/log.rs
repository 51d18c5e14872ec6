//! Commit log capability consumed by the sync engine.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::GitError;

/// One commit on the active branch, as far as the sync engine cares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitLogEntry {
    pub hash: String,
    pub author_email: String,
}

impl CommitLogEntry {
    pub fn new(hash: impl Into<String>, author_email: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            author_email: author_email.into(),
        }
    }
}

/// Reference to the newest commit of the branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRef {
    pub hash: String,
}

/// Result of a log query.
///
/// `all` is newest-first and excludes the `since` commit itself. `latest` is
/// the branch head whenever the branch has commits, even when `all` is empty
/// because nothing happened since the cursor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitLog {
    pub latest: Option<CommitRef>,
    pub all: Vec<CommitLogEntry>,
}

/// Source of commit history for a sync cycle.
#[async_trait]
pub trait LogProvider: Send + Sync {
    /// Commits not yet seen as of `since`, newest-first.
    async fn log(&self, since: Option<&str>) -> Result<CommitLog, GitError>;
}
