//! JSON file mirror of the user store.
//!
//! The file holds a single object mapping user id to user record. Every
//! operation reads the whole file and, for mutations, writes the whole file
//! back through a uniquely named temporary sibling that is renamed into place.
//!
//! Entries stay raw JSON on disk. Only the entry being read or written is
//! converted to a [`UserRecord`], so a malformed neighbour never blocks
//! access to other users and is written back byte-for-byte as parsed.

use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::{Error, Result};
use crate::users::store::{UserRecord, UserStore};

/// On-disk layout: user id -> raw user record.
pub type UserMap = serde_json::Map<String, serde_json::Value>;

/// Handle to the user cache file.
///
/// Clones share one lock, so read-modify-write cycles never interleave.
/// The lock covers the whole file rather than single keys: two writers
/// touching different users would still overwrite each other's file.
#[derive(Debug, Clone)]
pub struct UserCache {
    path: PathBuf,
    io_timeout: Duration,
    lock: Arc<Mutex<()>>,
}

impl UserCache {
    pub fn new(path: impl Into<PathBuf>, io_timeout: Duration) -> Self {
        Self {
            path: path.into(),
            io_timeout,
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `Ok(false)` only when the file is absent; other I/O failures are errors.
    pub async fn exists(&self) -> Result<bool> {
        Ok(tokio::fs::try_exists(&self.path).await?)
    }

    /// Copy the in-memory record for `user_id` into the file.
    pub async fn cache_to_disk(&self, users: &UserStore, user_id: &str) -> Result<()> {
        let record = serde_json::to_value(users.get(user_id)?)?;
        self.with_deadline(async {
            let guard = self.lock.clone().lock_owned().await;
            let mut map = self.read_map().await?;
            map.insert(user_id.to_string(), record);
            self.write_map(guard, map).await
        })
        .await?;
        tracing::debug!("Cached user {} to {}", user_id, self.path.display());
        Ok(())
    }

    pub async fn get_cached(&self, user_id: &str) -> Result<UserRecord> {
        let raw = self
            .with_deadline(async {
                let _guard = self.lock.lock().await;
                let mut map = self.read_map().await?;
                map.remove(user_id)
                    .ok_or_else(|| Error::not_found(format!("cached user {}", user_id)))
            })
            .await?;
        Ok(serde_json::from_value(raw)?)
    }

    /// Remove `user_id` from the file. The file is not rewritten when the user is absent.
    pub async fn delete_cached(&self, user_id: &str) -> Result<()> {
        self.with_deadline(async {
            let guard = self.lock.clone().lock_owned().await;
            let mut map = self.read_map().await?;
            if map.remove(user_id).is_none() {
                return Err(Error::not_found(format!("cached user {}", user_id)));
            }
            self.write_map(guard, map).await
        })
        .await?;
        tracing::debug!("Removed user {} from {}", user_id, self.path.display());
        Ok(())
    }

    pub async fn load_all_cached(&self) -> Result<UserMap> {
        self.with_deadline(async {
            let _guard = self.lock.lock().await;
            self.read_map().await
        })
        .await
    }

    async fn with_deadline<T>(&self, op: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.io_timeout, op)
            .await
            .map_err(|_| Error::Timeout(self.io_timeout))?
    }

    async fn read_map(&self) -> Result<UserMap> {
        let bytes = tokio::fs::read(&self.path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// The guard moves into the blocking write, so a deadline that cancels the
    /// caller can't release the lock while the write is still running.
    async fn write_map(&self, guard: OwnedMutexGuard<()>, map: UserMap) -> Result<()> {
        let bytes = serde_json::to_vec(&map)?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let _guard = guard;
            replace_file(&path, &bytes)
        })
        .await
        .map_err(|e| Error::Io(std::io::Error::other(e)))?
    }
}

fn replace_file(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Load the cache file into `users` if it exists. Returns the number of users loaded.
///
/// Entries that don't parse as a [`UserRecord`] are skipped with a warning.
pub async fn preload(cache: &UserCache, users: &UserStore) -> Result<usize> {
    if !cache.exists().await? {
        tracing::info!(
            "User cache {} not found, starting with no users",
            cache.path().display()
        );
        return Ok(0);
    }
    let map = cache.load_all_cached().await?;
    let records = map
        .into_iter()
        .filter_map(|(user_id, raw)| match serde_json::from_value::<UserRecord>(raw) {
            Ok(record) => Some((user_id, record)),
            Err(e) => {
                tracing::warn!("Skipping cached user {}: {}", user_id, e);
                None
            }
        });
    let count = users.restore(records);
    tracing::info!("Loaded {} users from {}", count, cache.path().display());
    Ok(count)
}
