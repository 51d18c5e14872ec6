//! Local Git repository operations via `git2`.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use git2::build::CheckoutBuilder;
use git2::{BranchType, Cred, ErrorCode, FetchOptions, Oid, RemoteCallbacks, Repository};
use tracing::{debug, info, instrument, warn};

use super::log::{CommitLog, CommitLogEntry, CommitRef, LogProvider};
use crate::config::RepositoryConfig;
use crate::errors::GitError;

/// High-level Git client wrapping a `git2::Repository`.
///
/// The repository handle sits behind a shared mutex so [`LogProvider::log`]
/// can walk history on the blocking thread pool.
pub struct GitClient {
    repo: Arc<Mutex<Repository>>,
    repo_path: PathBuf,
}

impl GitClient {
    /// Open an existing Git repository rooted at `repo_path`.
    pub fn open<P: AsRef<Path>>(repo_path: P) -> Result<Self, GitError> {
        let path = repo_path.as_ref();
        info!(path = %path.display(), "opening git repository");
        let repo = Repository::open(path)
            .map_err(|_| GitError::RepositoryNotFound(path.display().to_string()))?;
        Ok(Self::from_repo(repo, path))
    }

    /// Clone a remote repository to `path`.
    #[instrument(skip_all, fields(url = %url, path = %path.display()))]
    pub fn clone_repo(url: &str, path: &Path, token: Option<&str>) -> Result<Self, GitError> {
        info!("cloning git repository");
        let mut fetch_opts = FetchOptions::new();
        fetch_opts.remote_callbacks(token_callbacks(token));
        let mut builder = git2::build::RepoBuilder::new();
        builder.fetch_options(fetch_opts);
        let repo = builder.clone(url, path).map_err(|e| GitError::CloneFailed {
            url: url.to_string(),
            detail: e.message().to_string(),
        })?;
        info!("clone completed");
        Ok(Self::from_repo(repo, path))
    }

    /// Make `config.local` a checkout of `config.remote` on `config.branch`.
    ///
    /// - missing directory: created, then cloned into
    /// - not a repository: cloned into
    /// - repository with a different `origin`: deleted and cloned fresh
    /// - repository with the right `origin`: fetched and fast-forwarded
    ///
    /// Local work is never discarded: see [`GitClient::checkout_branch`].
    /// `token` is only sent when the repository is private.
    pub fn prepare(config: &RepositoryConfig, token: Option<&str>) -> Result<Self, GitError> {
        let local = config.local.as_path();
        let remote = config.remote.as_str();
        let token = if config.private { token } else { None };

        if !local.exists() {
            std::fs::create_dir_all(local).map_err(|e| GitError::LocalPathUnavailable {
                path: local.display().to_string(),
                detail: e.to_string(),
            })?;
        }

        let client = match Repository::open(local) {
            Ok(repo) => {
                let client = Self::from_repo(repo, local);
                match client.origin_url() {
                    Some(url) if url == remote => {
                        debug!("existing checkout matches remote");
                        client.fetch("origin", token)?;
                        client
                    }
                    other => {
                        warn!(
                            path = %local.display(),
                            found = ?other,
                            expected = remote,
                            "checkout points at another remote, cloning again"
                        );
                        drop(client);
                        std::fs::remove_dir_all(local).map_err(|e| GitError::CloneFailed {
                            url: remote.to_string(),
                            detail: format!("cannot remove {}: {}", local.display(), e),
                        })?;
                        Self::clone_repo(remote, local, token)?
                    }
                }
            }
            Err(_) => Self::clone_repo(remote, local, token)?,
        };

        client.checkout_branch(&config.branch)?;
        Ok(client)
    }

    fn from_repo(repo: Repository, path: &Path) -> Self {
        Self {
            repo: Arc::new(Mutex::new(repo)),
            repo_path: path.to_path_buf(),
        }
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    fn repo(&self) -> MutexGuard<'_, Repository> {
        lock_repo(&self.repo)
    }

    /// URL of the `origin` remote, if any.
    pub fn origin_url(&self) -> Option<String> {
        let repo = self.repo();
        let remote = repo.find_remote("origin").ok()?;
        remote.url().map(str::to_string)
    }

    /// Fetch from a named remote.
    #[instrument(skip(self, token))]
    pub fn fetch(&self, remote_name: &str, token: Option<&str>) -> Result<(), GitError> {
        info!(remote = remote_name, "fetching");
        let repo = self.repo();
        let mut remote = repo.find_remote(remote_name)?;
        let mut fetch_opts = FetchOptions::new();
        fetch_opts.remote_callbacks(token_callbacks(token));
        remote.fetch(&[] as &[&str], Some(&mut fetch_opts), None)?;
        debug!("fetch completed");
        Ok(())
    }

    /// Check out `branch`, fast-forwarding it to `origin/<branch>`.
    ///
    /// The local branch only ever moves forward. A branch that is ahead of
    /// origin is checked out as it is; one that has diverged is an error.
    /// The working tree is updated with a safe checkout, so uncommitted
    /// changes that the update would touch stop it with
    /// [`GitError::CheckoutBlocked`] instead of being overwritten.
    #[instrument(skip(self))]
    pub fn checkout_branch(&self, branch: &str) -> Result<(), GitError> {
        let repo = self.repo();
        let local_ref = format!("refs/heads/{}", branch);
        let remote_ref = format!("refs/remotes/origin/{}", branch);

        let upstream = match repo.find_reference(&remote_ref) {
            Ok(reference) => Some(reference.peel_to_commit()?),
            Err(_) => None,
        };
        let current = match repo.find_branch(branch, BranchType::Local) {
            Ok(existing) => Some(existing.get().peel_to_commit()?),
            Err(_) => None,
        };

        let (tip, update) = match (current, upstream) {
            (None, None) => return Err(GitError::RefNotFound(branch.to_string())),
            (None, Some(up)) => (up, BranchUpdate::Create),
            (Some(cur), None) => (cur, BranchUpdate::Keep),
            (Some(cur), Some(up)) if cur.id() == up.id() => (cur, BranchUpdate::Keep),
            (Some(cur), Some(up)) if repo.graph_descendant_of(up.id(), cur.id())? => {
                (up, BranchUpdate::FastForward)
            }
            (Some(cur), Some(up)) if repo.graph_descendant_of(cur.id(), up.id())? => {
                warn!(
                    branch,
                    local = %cur.id(),
                    origin = %up.id(),
                    "local branch is ahead of origin"
                );
                (cur, BranchUpdate::Keep)
            }
            (Some(cur), Some(up)) => {
                return Err(GitError::BranchDiverged {
                    branch: branch.to_string(),
                    local: cur.id().to_string(),
                    upstream: up.id().to_string(),
                })
            }
        };

        repo.checkout_tree(tip.as_object(), Some(CheckoutBuilder::new().safe()))
            .map_err(|e| GitError::CheckoutBlocked {
                branch: branch.to_string(),
                detail: e.message().to_string(),
            })?;

        match update {
            BranchUpdate::Keep => {}
            BranchUpdate::Create => {
                repo.branch(branch, &tip, false)?;
            }
            BranchUpdate::FastForward => {
                repo.find_reference(&local_ref)?
                    .set_target(tip.id(), "gitauthors: fast-forward")?;
            }
        }
        repo.set_head(&local_ref)?;
        info!(branch, sha = %tip.id(), "checked out branch");
        Ok(())
    }

    /// Return the SHA of HEAD.
    pub fn get_head_sha(&self) -> Result<String, GitError> {
        let repo = self.repo();
        let head = repo.head()?;
        let commit = head.peel_to_commit()?;
        Ok(commit.id().to_string())
    }

    /// Walk commits from HEAD backwards, hiding `since_sha` and everything
    /// reachable from it.
    ///
    /// An unknown or malformed `since_sha` (e.g. after a force-push) walks the
    /// whole history.
    pub fn read_log(&self, since_sha: Option<&str>) -> Result<CommitLog, GitError> {
        walk_log(&self.repo(), since_sha)
    }
}

#[async_trait]
impl LogProvider for GitClient {
    async fn log(&self, since: Option<&str>) -> Result<CommitLog, GitError> {
        let repo = Arc::clone(&self.repo);
        let since = since.map(str::to_string);
        tokio::task::spawn_blocking(move || walk_log(&lock_repo(&repo), since.as_deref()))
            .await
            .map_err(|e| GitError::Interrupted(e.to_string()))?
    }
}

/// How `checkout_branch` moves the local branch ref.
enum BranchUpdate {
    Keep,
    Create,
    FastForward,
}

fn lock_repo(repo: &Mutex<Repository>) -> MutexGuard<'_, Repository> {
    // A poisoned lock still holds a usable repository handle.
    repo.lock().unwrap_or_else(|e| e.into_inner())
}

fn walk_log(repo: &Repository, since_sha: Option<&str>) -> Result<CommitLog, GitError> {
    let head = match repo.head() {
        Ok(head) => head,
        Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => {
            debug!("branch has no commits");
            return Ok(CommitLog::default());
        }
        Err(e) => return Err(e.into()),
    };
    let head_id = head.peel_to_commit()?.id();

    let mut revwalk = repo.revwalk()?;
    revwalk.push(head_id)?;
    revwalk.set_sorting(git2::Sort::TOPOLOGICAL | git2::Sort::TIME)?;

    if let Some(sha) = since_sha {
        match Oid::from_str(sha).ok().filter(|oid| repo.find_commit(*oid).is_ok()) {
            Some(oid) => revwalk.hide(oid)?,
            None => warn!(cursor = sha, "cursor commit not found, walking full history"),
        }
    }

    let mut all = Vec::new();
    for oid_result in revwalk {
        let oid = oid_result?;
        let commit = repo.find_commit(oid)?;
        all.push(CommitLogEntry {
            hash: oid.to_string(),
            author_email: commit.author().email().unwrap_or("").to_string(),
        });
    }
    debug!(count = all.len(), latest = %head_id, "collected commits");

    Ok(CommitLog {
        latest: Some(CommitRef {
            hash: head_id.to_string(),
        }),
        all,
    })
}

fn token_callbacks(token: Option<&str>) -> RemoteCallbacks<'static> {
    let mut callbacks = RemoteCallbacks::new();
    if let Some(tok) = token {
        let tok = tok.to_string();
        callbacks.credentials(move |_url, _username, _allowed| {
            Cred::userpass_plaintext("x-access-token", &tok)
        });
    }
    callbacks
}

#[cfg(test)]
mod tests {
    use super::*;
    use git2::Signature;

    fn commit_as(repo: &Repository, file: &str, email: &str) -> Oid {
        let workdir = repo.workdir().unwrap().to_path_buf();
        std::fs::write(workdir.join(file), email).unwrap();
        let mut index = repo.index().unwrap();
        index.add_path(Path::new(file)).unwrap();
        index.write().unwrap();
        let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
        let sig = Signature::now("Someone", email).unwrap();
        let parent = repo.head().ok().map(|h| h.peel_to_commit().unwrap());
        let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();
        repo.commit(Some("HEAD"), &sig, &sig, file, &tree, &parents)
            .unwrap()
    }

    #[test]
    fn test_log_of_empty_repo_has_no_latest() {
        let dir = tempfile::tempdir().unwrap();
        Repository::init(dir.path()).unwrap();
        let client = GitClient::open(dir.path()).unwrap();
        let log = client.read_log(None).unwrap();
        assert!(log.latest.is_none());
        assert!(log.all.is_empty());
    }

    #[test]
    fn test_log_is_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        let first = commit_as(&repo, "a.txt", "a@x.com");
        let second = commit_as(&repo, "b.txt", "b@x.com");

        let client = GitClient::open(dir.path()).unwrap();
        let log = client.read_log(None).unwrap();
        assert_eq!(log.latest.unwrap().hash, second.to_string());
        assert_eq!(
            log.all,
            vec![
                CommitLogEntry::new(second.to_string(), "b@x.com"),
                CommitLogEntry::new(first.to_string(), "a@x.com"),
            ]
        );
    }

    #[test]
    fn test_log_since_excludes_cursor() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        let first = commit_as(&repo, "a.txt", "a@x.com");
        let second = commit_as(&repo, "b.txt", "b@x.com");
        let third = commit_as(&repo, "c.txt", "c@x.com");

        let client = GitClient::open(dir.path()).unwrap();
        let log = client.read_log(Some(&first.to_string())).unwrap();
        let hashes: Vec<_> = log.all.iter().map(|e| e.hash.clone()).collect();
        assert_eq!(hashes, vec![third.to_string(), second.to_string()]);
    }

    #[test]
    fn test_log_since_head_keeps_latest() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        let head = commit_as(&repo, "a.txt", "a@x.com");

        let client = GitClient::open(dir.path()).unwrap();
        let log = client.read_log(Some(&head.to_string())).unwrap();
        assert!(log.all.is_empty());
        assert_eq!(log.latest.unwrap().hash, head.to_string());
    }

    #[test]
    fn test_log_with_unknown_cursor_walks_everything() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        commit_as(&repo, "a.txt", "a@x.com");
        commit_as(&repo, "b.txt", "b@x.com");

        let client = GitClient::open(dir.path()).unwrap();
        let log = client.read_log(Some("not-a-sha")).unwrap();
        assert_eq!(log.all.len(), 2);
    }

    #[test]
    fn test_prepare_clones_and_checks_out_branch() {
        let origin_dir = tempfile::tempdir().unwrap();
        let origin = Repository::init(origin_dir.path()).unwrap();
        let head = commit_as(&origin, "a.txt", "a@x.com");
        let branch = origin
            .head()
            .unwrap()
            .shorthand()
            .unwrap()
            .to_string();

        let work = tempfile::tempdir().unwrap();
        let local = work.path().join("checkout");
        let config = RepositoryConfig {
            remote: origin_dir.path().display().to_string(),
            local: local.clone(),
            branch,
            ..Default::default()
        };

        let client = GitClient::prepare(&config, None).unwrap();
        assert_eq!(client.get_head_sha().unwrap(), head.to_string());

        // Second run reuses the checkout and picks up new commits.
        let newer = commit_as(&origin, "b.txt", "b@x.com");
        drop(client);
        let client = GitClient::prepare(&config, None).unwrap();
        assert_eq!(client.get_head_sha().unwrap(), newer.to_string());
    }

    /// Origin repository with one commit, and a config cloning it into `work`.
    fn origin_and_config(work: &Path) -> (tempfile::TempDir, Repository, RepositoryConfig) {
        let origin_dir = tempfile::tempdir().unwrap();
        let origin = Repository::init(origin_dir.path()).unwrap();
        commit_as(&origin, "a.txt", "a@x.com");
        let branch = origin
            .head()
            .unwrap()
            .shorthand()
            .unwrap()
            .to_string();
        let config = RepositoryConfig {
            remote: origin_dir.path().display().to_string(),
            local: work.join("checkout"),
            branch,
            ..Default::default()
        };
        (origin_dir, origin, config)
    }

    #[test]
    fn test_prepare_keeps_unpushed_commit_and_edits() {
        let work = tempfile::tempdir().unwrap();
        let (_origin_dir, _origin, config) = origin_and_config(work.path());
        drop(GitClient::prepare(&config, None).unwrap());

        let checkout = Repository::open(&config.local).unwrap();
        let unpushed = commit_as(&checkout, "c.txt", "c@x.com");
        std::fs::write(config.local.join("a.txt"), "work in progress").unwrap();

        let client = GitClient::prepare(&config, None).unwrap();
        assert_eq!(client.get_head_sha().unwrap(), unpushed.to_string());
        assert_eq!(
            std::fs::read_to_string(config.local.join("a.txt")).unwrap(),
            "work in progress"
        );
    }

    #[test]
    fn test_prepare_refuses_diverged_branch() {
        let work = tempfile::tempdir().unwrap();
        let (_origin_dir, origin, config) = origin_and_config(work.path());
        drop(GitClient::prepare(&config, None).unwrap());

        let checkout = Repository::open(&config.local).unwrap();
        let unpushed = commit_as(&checkout, "c.txt", "c@x.com");
        commit_as(&origin, "b.txt", "b@x.com");

        let err = GitClient::prepare(&config, None).err().unwrap();
        assert!(matches!(
            err,
            GitError::BranchDiverged { ref local, .. } if *local == unpushed.to_string()
        ));
        let head = checkout.head().unwrap().peel_to_commit().unwrap();
        assert_eq!(head.id(), unpushed);
    }

    #[test]
    fn test_prepare_does_not_overwrite_uncommitted_changes() {
        let work = tempfile::tempdir().unwrap();
        let (_origin_dir, origin, config) = origin_and_config(work.path());
        let before = GitClient::prepare(&config, None)
            .unwrap()
            .get_head_sha()
            .unwrap();

        std::fs::write(config.local.join("a.txt"), "work in progress").unwrap();
        commit_as(&origin, "a.txt", "b@x.com");

        let err = GitClient::prepare(&config, None).err().unwrap();
        assert!(matches!(err, GitError::CheckoutBlocked { .. }));
        assert_eq!(
            std::fs::read_to_string(config.local.join("a.txt")).unwrap(),
            "work in progress"
        );
        let checkout = Repository::open(&config.local).unwrap();
        let head = checkout.head().unwrap().peel_to_commit().unwrap();
        assert_eq!(head.id().to_string(), before);
    }

    #[tokio::test]
    async fn test_log_provider_matches_read_log() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        let first = commit_as(&repo, "a.txt", "a@x.com");
        commit_as(&repo, "b.txt", "b@x.com");

        let client = GitClient::open(dir.path()).unwrap();
        let since = first.to_string();
        let log = client.log(Some(&since)).await.unwrap();
        assert_eq!(log, client.read_log(Some(&since)).unwrap());
        assert_eq!(log.all.len(), 1);
    }

    #[test]
    fn test_checkout_missing_branch() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        commit_as(&repo, "a.txt", "a@x.com");
        let client = GitClient::open(dir.path()).unwrap();
        assert!(matches!(
            client.checkout_branch("does-not-exist"),
            Err(GitError::RefNotFound(_))
        ));
    }

    #[test]
    fn test_repo_not_found() {
        assert!(matches!(
            GitClient::open("/nonexistent"),
            Err(GitError::RepositoryNotFound(_))
        ));
    }
}
