//! Incremental author cache synchronization.
//!
//! The [`SyncEngine`] runs one cycle at a time:
//!
//! 1. Read the cursor (last processed commit) from the cache.
//! 2. Ask the log provider for the commits after it.
//! 3. Stop early when the branch is empty or the head equals the cursor.
//! 4. Move the cursor to the head and resolve every new author email through
//!    a [`ConcurrencyGate`].
//! 5. Persist the cache only if every resolution succeeded.
//!
//! A lock mechanism prevents concurrent sync cycles.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use crate::cache::{AuthorCache, CacheStore};
use crate::errors::SyncError;
use crate::gate::ConcurrencyGate;
use crate::git::log::LogProvider;
use crate::identity::{IdentityResolver, ResolutionRequest};

// ---------------------------------------------------------------------------
// Settings & outcomes
// ---------------------------------------------------------------------------

/// Fixed inputs of every cycle run by one engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSettings {
    pub owner: String,
    pub repo_name: String,
    pub cache_path: PathBuf,
    pub concurrency_limit: usize,
    pub skip_search: bool,
}

/// Statistics from a cycle that updated the cache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    /// The new cursor.
    pub cursor: String,
    pub commits_scanned: usize,
    /// Distinct emails seen in the scanned commits.
    pub distinct_authors: usize,
    /// Emails newly added to the cache.
    pub resolved: usize,
}

/// How a successful cycle ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    /// The branch has no commits. Nothing was written.
    NoCommits,
    /// The head is already the cursor. Nothing was written.
    NoChange { cursor: String },
    /// New commits were processed and the cache persisted.
    Updated(SyncStats),
}

impl std::fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoCommits => write!(f, "no_commits"),
            Self::NoChange { .. } => write!(f, "no_change"),
            Self::Updated(_) => write!(f, "updated"),
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Keeps the author cache in step with the commit log.
pub struct SyncEngine {
    settings: SyncSettings,
    resolver: Arc<IdentityResolver>,
    store: CacheStore,
    /// Atomic flag preventing concurrent sync cycles.
    running: Arc<AtomicBool>,
}

impl SyncEngine {
    pub fn new(settings: SyncSettings, resolver: Arc<IdentityResolver>) -> Self {
        info!(
            owner = %settings.owner,
            repo = %settings.repo_name,
            cache = %settings.cache_path.display(),
            "initializing sync engine"
        );
        let store = CacheStore::new(&settings.cache_path);
        Self {
            settings,
            resolver,
            store,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// The store cycles read from and persist to.
    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// Check if a sync cycle is currently running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    // -----------------------------------------------------------------------
    // Main entry points
    // -----------------------------------------------------------------------

    /// Load the cache from disk and run one cycle against it.
    pub async fn run_cycle(&self, logs: &dyn LogProvider) -> Result<SyncOutcome, SyncError> {
        let mut cache = self.store.load().await;
        self.sync(logs, &mut cache).await
    }

    /// Bring `cache` up to date with `logs` and persist it.
    ///
    /// On error the file on disk is left as it was, while `cache` may hold the
    /// new cursor and some of the new entries.
    #[instrument(skip_all, fields(owner = %self.settings.owner, repo = %self.settings.repo_name))]
    pub async fn sync(
        &self,
        logs: &dyn LogProvider,
        cache: &mut AuthorCache,
    ) -> Result<SyncOutcome, SyncError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SyncError::AlreadyRunning);
        }

        // RAII guard that clears the running flag on drop (even on panic).
        let _guard = SyncLockGuard(self.running.clone());

        let cursor = cache.cursor().map(str::to_owned);
        let log = logs.log(cursor.as_deref()).await?;

        let Some(latest) = log.latest else {
            info!("branch has no commits");
            return Ok(SyncOutcome::NoCommits);
        };
        if cursor.as_deref() == Some(latest.hash.as_str()) {
            info!(cursor = %latest.hash, "nothing new");
            return Ok(SyncOutcome::NoChange {
                cursor: latest.hash,
            });
        }

        cache.set_cursor(latest.hash.as_str());

        let mut seen = HashSet::new();
        let mut distinct_authors = 0;
        let mut pending = Vec::new();
        for entry in &log.all {
            if !seen.insert(entry.author_email.as_str()) {
                continue;
            }
            distinct_authors += 1;
            if cache.contains(&entry.author_email) {
                continue;
            }
            pending.push(ResolutionRequest {
                email: entry.author_email.clone(),
                commit_hash: entry.hash.clone(),
                owner: self.settings.owner.clone(),
                repo_name: self.settings.repo_name.clone(),
                skip_search: self.settings.skip_search,
            });
        }
        info!(
            commits = log.all.len(),
            distinct_authors,
            pending = pending.len(),
            "resolving new authors"
        );

        let resolved = self.resolve_all(pending, cache).await?;

        self.store.persist(cache).await?;
        let stats = SyncStats {
            cursor: latest.hash,
            commits_scanned: log.all.len(),
            distinct_authors,
            resolved,
        };
        info!(cursor = %stats.cursor, resolved, "cache updated");
        Ok(SyncOutcome::Updated(stats))
    }

    /// Resolve every request through one gate, waiting for all of them.
    ///
    /// Successful results go into `cache` as they arrive. The first failure is
    /// returned once every task has finished.
    async fn resolve_all(
        &self,
        pending: Vec<ResolutionRequest>,
        cache: &mut AuthorCache,
    ) -> Result<usize, SyncError> {
        let gate = ConcurrencyGate::new(self.settings.concurrency_limit);
        let mut tasks = JoinSet::new();

        for request in pending {
            let resolver = Arc::clone(&self.resolver);
            gate.submit(&mut tasks, async move {
                let result = resolver.resolve(&request).await;
                (request.email, result)
            })
            .await;
        }

        let mut resolved = 0;
        let mut failure = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((email, Ok(name))) => {
                    debug!(email = %email, name = %name, "resolved author");
                    if cache.insert_if_absent(email, name) {
                        resolved += 1;
                    }
                }
                Ok((email, Err(e))) => {
                    warn!(email = %email, error = %e, "author resolution failed");
                    failure.get_or_insert(SyncError::Resolution(e));
                }
                Err(e) => {
                    warn!(error = %e, "resolution task did not complete");
                    failure.get_or_insert(SyncError::TaskFailed(e.to_string()));
                }
            }
        }

        match failure {
            Some(err) => Err(err),
            None => Ok(resolved),
        }
    }
}

// ---------------------------------------------------------------------------
// Sync lock RAII guard
// ---------------------------------------------------------------------------

/// Drop guard that resets the `running` flag to `false`.
struct SyncLockGuard(Arc<AtomicBool>);

impl Drop for SyncLockGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::errors::{GitError, GitHubError};
    use crate::git::log::{CommitLog, CommitLogEntry, CommitRef};
    use crate::identity::service::{
        CommitAuthorHistory, HistoryEntry, IdentityCandidate, IdentityService,
    };

    /// Log provider returning a fixed history, ignoring `since`.
    struct StaticLog {
        log: CommitLog,
        delay_ms: u64,
    }

    impl StaticLog {
        fn new(latest: Option<&str>, entries: &[(&str, &str)]) -> Self {
            Self {
                log: CommitLog {
                    latest: latest.map(|h| CommitRef { hash: h.into() }),
                    all: entries
                        .iter()
                        .map(|(hash, email)| CommitLogEntry::new(*hash, *email))
                        .collect(),
                },
                delay_ms: 0,
            }
        }
    }

    #[async_trait]
    impl LogProvider for StaticLog {
        async fn log(&self, _since: Option<&str>) -> Result<CommitLog, GitError> {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            Ok(self.log.clone())
        }
    }

    /// Commit lookups answer with the local part of the email; search is
    /// always empty. Emails listed in `broken` fail.
    struct LocalPartService {
        broken: Vec<&'static str>,
        calls: AtomicUsize,
    }

    impl LocalPartService {
        fn new(broken: Vec<&'static str>) -> Self {
            Self {
                broken,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl IdentityService for LocalPartService {
        async fn search_identity(
            &self,
            _query: &str,
        ) -> Result<Vec<IdentityCandidate>, GitHubError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }

        async fn lookup_commit_author(
            &self,
            _owner: &str,
            _repo: &str,
            commit: &str,
        ) -> Result<CommitAuthorHistory, GitHubError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            // Commit hashes in these tests are the author's email.
            if self.broken.iter().any(|b| *b == commit) {
                return Ok(CommitAuthorHistory::default());
            }
            let name = commit.split('@').next().unwrap_or(commit).to_string();
            Ok(CommitAuthorHistory {
                history: vec![HistoryEntry { author_name: name }],
            })
        }
    }

    fn engine(dir: &std::path::Path, service: Arc<LocalPartService>) -> SyncEngine {
        let settings = SyncSettings {
            owner: "acme".into(),
            repo_name: "widget".into(),
            cache_path: dir.join("gai-cache.json"),
            concurrency_limit: 2,
            skip_search: true,
        };
        SyncEngine::new(settings, Arc::new(IdentityResolver::new(service)))
    }

    #[tokio::test]
    async fn test_no_commits() {
        let dir = tempfile::tempdir().unwrap();
        let service = Arc::new(LocalPartService::new(vec![]));
        let engine = engine(dir.path(), service.clone());

        let mut cache = AuthorCache::new();
        let outcome = engine.sync(&StaticLog::new(None, &[]), &mut cache).await.unwrap();
        assert_eq!(outcome, SyncOutcome::NoCommits);
        assert!(!engine.store().path().exists());
        assert_eq!(service.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_no_change() {
        let dir = tempfile::tempdir().unwrap();
        let service = Arc::new(LocalPartService::new(vec![]));
        let engine = engine(dir.path(), service.clone());

        let mut cache = AuthorCache::new();
        cache.set_cursor("c1");
        let outcome = engine
            .sync(&StaticLog::new(Some("c1"), &[]), &mut cache)
            .await
            .unwrap();
        assert_eq!(outcome, SyncOutcome::NoChange { cursor: "c1".into() });
        assert!(!engine.store().path().exists());
        assert_eq!(service.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dedupes_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let service = Arc::new(LocalPartService::new(vec![]));
        let engine = engine(dir.path(), service.clone());
        let log = StaticLog::new(
            Some("c9"),
            &[("a@x.com", "a@x.com"), ("b@x.com", "b@x.com"), ("a@x.com", "a@x.com")],
        );

        let mut cache = AuthorCache::new();
        let outcome = engine.sync(&log, &mut cache).await.unwrap();
        assert_eq!(
            outcome,
            SyncOutcome::Updated(SyncStats {
                cursor: "c9".into(),
                commits_scanned: 3,
                distinct_authors: 2,
                resolved: 2,
            })
        );
        assert_eq!(service.calls.load(Ordering::SeqCst), 2);

        let expected: AuthorCache = [("cursor", "c9"), ("a@x.com", "a"), ("b@x.com", "b")]
            .into_iter()
            .collect();
        assert_eq!(cache, expected);
        assert_eq!(engine.store().load().await, expected);
    }

    #[tokio::test]
    async fn test_known_authors_are_not_resolved_again() {
        let dir = tempfile::tempdir().unwrap();
        let service = Arc::new(LocalPartService::new(vec![]));
        let engine = engine(dir.path(), service.clone());

        let mut cache: AuthorCache = [("cursor", "c1"), ("a@x.com", "Alice Cached")]
            .into_iter()
            .collect();
        let log = StaticLog::new(Some("c2"), &[("a@x.com", "a@x.com")]);
        engine.sync(&log, &mut cache).await.unwrap();

        assert_eq!(cache.get("a@x.com"), Some("Alice Cached"));
        assert_eq!(cache.cursor(), Some("c2"));
        assert_eq!(service.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failure_skips_persist() {
        let dir = tempfile::tempdir().unwrap();
        let service = Arc::new(LocalPartService::new(vec!["b@x.com"]));
        let engine = engine(dir.path(), service);
        let log = StaticLog::new(Some("c9"), &[("a@x.com", "a@x.com"), ("b@x.com", "b@x.com")]);

        let mut cache = AuthorCache::new();
        let err = engine.sync(&log, &mut cache).await.unwrap_err();
        match err {
            SyncError::Resolution(e) => assert_eq!(e.email, "b@x.com"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(!engine.store().path().exists());
        assert!(!engine.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_cycle_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path(), Arc::new(LocalPartService::new(vec![])));
        let mut slow = StaticLog::new(Some("c1"), &[]);
        slow.delay_ms = 100;

        let mut first_cache = AuthorCache::new();
        let mut second_cache = AuthorCache::new();
        let (first, second) = tokio::join!(
            engine.sync(&slow, &mut first_cache),
            async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                engine.sync(&slow, &mut second_cache).await
            }
        );

        assert!(matches!(first, Ok(SyncOutcome::Updated(_))));
        assert!(matches!(second, Err(SyncError::AlreadyRunning)));
        assert!(!engine.is_running());
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(SyncOutcome::NoCommits.to_string(), "no_commits");
        assert_eq!(
            SyncOutcome::NoChange { cursor: "c1".into() }.to_string(),
            "no_change"
        );
        assert_eq!(SyncOutcome::Updated(SyncStats::default()).to_string(), "updated");
    }
}
