//! Git operations: the local repository, its commit log and the GitHub API.

pub mod client;
pub mod github;
pub mod log;
pub mod remote_url;

pub use client::GitClient;
pub use github::GitHubClient;
pub use log::{CommitLog, CommitLogEntry, CommitRef, LogProvider};
