//! The persisted email to identity cache.
//!
//! On disk the cache is one flat JSON object. The reserved key `"cursor"`
//! holds the hash of the newest commit already processed; every other key is
//! an author email mapped to the resolved name.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::errors::CacheError;

/// Reserved key holding the last processed commit hash.
pub const CURSOR_KEY: &str = "cursor";

/// In-memory view of the cache file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthorCache {
    entries: BTreeMap<String, String>,
}

impl AuthorCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cursor(&self) -> Option<&str> {
        self.entries.get(CURSOR_KEY).map(String::as_str)
    }

    pub fn set_cursor(&mut self, hash: impl Into<String>) {
        self.entries.insert(CURSOR_KEY.to_string(), hash.into());
    }

    /// Whether `email` already has an identity.
    pub fn contains(&self, email: &str) -> bool {
        email != CURSOR_KEY && self.entries.contains_key(email)
    }

    pub fn get(&self, email: &str) -> Option<&str> {
        if email == CURSOR_KEY {
            return None;
        }
        self.entries.get(email).map(String::as_str)
    }

    /// Record `name` for `email` unless one is already present.
    ///
    /// Returns `true` if the entry was added. Entries are never overwritten.
    pub fn insert_if_absent(&mut self, email: impl Into<String>, name: impl Into<String>) -> bool {
        let email = email.into();
        if email == CURSOR_KEY || self.entries.contains_key(&email) {
            return false;
        }
        self.entries.insert(email, name.into());
        true
    }

    /// Email/name pairs in key order, cursor excluded.
    pub fn authors(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .filter(|(k, _)| k.as_str() != CURSOR_KEY)
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of cached authors.
    pub fn len(&self) -> usize {
        self.authors().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for AuthorCache {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Reads and writes an [`AuthorCache`] at a fixed path.
#[derive(Debug, Clone)]
pub struct CacheStore {
    path: PathBuf,
}

impl CacheStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the cache, starting empty if the file is missing or unreadable.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub async fn load(&self) -> AuthorCache {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) => {
                info!(error = %e, "Cannot read the cache file, creating new...");
                return AuthorCache::new();
            }
        };
        match serde_json::from_slice::<AuthorCache>(&raw) {
            Ok(cache) => {
                debug!(authors = cache.len(), cursor = ?cache.cursor(), "loaded cache");
                cache
            }
            Err(e) => {
                info!(error = %e, "Cannot parse the cache file, creating new...");
                AuthorCache::new()
            }
        }
    }

    /// Write the whole cache, replacing the previous file atomically.
    ///
    /// The JSON goes to a sibling temporary file which is then renamed over
    /// the target. On failure the temporary file is removed and the previous
    /// cache file is untouched.
    #[instrument(skip(self, cache), fields(path = %self.path.display()))]
    pub async fn persist(&self, cache: &AuthorCache) -> Result<(), CacheError> {
        let body = serde_json::to_vec(cache)?;
        let tmp = self.temp_path();

        let written = async {
            tokio::fs::write(&tmp, &body).await?;
            tokio::fs::rename(&tmp, &self.path).await
        }
        .await;

        if let Err(source) = written {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(CacheError::Write {
                path: self.path.display().to_string(),
                source,
            });
        }

        debug!(bytes = body.len(), "cache persisted");
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "cache".to_string());
        self.path.with_file_name(format!(".{}.tmp", name))
    }
}
