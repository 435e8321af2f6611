//! File-backed [`KeyValueStore`].
//!
//! The whole map lives in one JSON object on disk. Every write rewrites the
//! file through a sibling temp file and a rename, so a crash mid-write
//! leaves either the old or the new contents, never a torn file.
//!
//! Several handles (tabs, processes) may open the same path. Mutations take
//! a sibling `.lock` file created with `create_new`, re-read the map from
//! disk and only then apply the change, so a compare-and-set in one handle
//! sees every write made through the others.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::KeyValueStore;
use crate::error::{Error, Result};

/// How long a writer waits for another handle to release the lock file
const LOCK_WAIT: Duration = Duration::from_secs(10);

/// Poll interval while the lock file is held elsewhere
const LOCK_RETRY: Duration = Duration::from_millis(5);

/// A lock file older than this was left behind by a crashed writer
const LOCK_STALE: Duration = Duration::from_secs(30);

type Entries = HashMap<String, String>;

/// JSON-file storage for one device profile
pub struct FileStore {
    path: PathBuf,
    lock_path: PathBuf,
    writer: Mutex<()>,
}

impl FileStore {
    /// Open (or lazily create) the store at `path`
    ///
    /// A missing file is an empty store. A file that exists but is not a
    /// JSON string map is reported as `StorageReadError` rather than
    /// silently replaced: it may hold the only copy of the device salt.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = read_entries(&path).await?;

        tracing::debug!(path = %path.display(), entries = entries.len(), "Opened file store");

        Ok(Self {
            lock_path: sibling(&path, ".lock"),
            path,
            writer: Mutex::new(()),
        })
    }

    /// Location of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read-modify-write under the lock file
    ///
    /// `apply` returns its result and whether the map changed; unchanged
    /// maps are not rewritten.
    async fn update<R, F>(&self, apply: F) -> Result<R>
    where
        F: FnOnce(&mut Entries) -> (R, bool) + Send,
        R: Send,
    {
        let _writer = self.writer.lock().await;
        self.ensure_parent().await?;
        let _lock = LockFile::acquire(&self.lock_path).await?;

        let mut entries = read_entries(&self.path).await?;
        let (result, changed) = apply(&mut entries);
        if changed {
            self.persist(&entries).await?;
        }
        Ok(result)
    }

    async fn ensure_parent(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| Error::StorageWriteError(e.to_string()))?;
            }
        }
        Ok(())
    }

    async fn persist(&self, entries: &Entries) -> Result<()> {
        let json = serde_json::to_vec_pretty(entries)?;
        let tmp = sibling(&self.path, ".tmp");

        tokio::fs::write(&tmp, &json)
            .await
            .map_err(|e| Error::StorageWriteError(format!("{}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| Error::StorageWriteError(format!("{}: {}", self.path.display(), e)))?;

        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(read_entries(&self.path).await?.remove(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.update(|entries| {
            let changed = entries.get(key).map(String::as_str) != Some(value);
            entries.insert(key.to_string(), value.to_string());
            ((), changed)
        })
        .await
    }

    async fn set_if_absent(&self, key: &str, value: &str) -> Result<String> {
        self.update(|entries| match entries.get(key) {
            Some(existing) => (existing.clone(), false),
            None => {
                entries.insert(key.to_string(), value.to_string());
                (value.to_string(), true)
            }
        })
        .await
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        self.update(|entries| {
            let removed = entries.remove(key).is_some();
            (removed, removed)
        })
        .await
    }
}

/// Exclusive writer lock shared by every handle on one path
///
/// Removed on drop.
struct LockFile {
    path: PathBuf,
}

impl LockFile {
    async fn acquire(path: &Path) -> Result<Self> {
        let deadline = tokio::time::Instant::now() + LOCK_WAIT;

        loop {
            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(path)
                .await
            {
                Ok(_) => {
                    return Ok(Self {
                        path: path.to_path_buf(),
                    })
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if is_stale(path).await {
                        tracing::warn!(path = %path.display(), "Removing stale store lock");
                        let _ = tokio::fs::remove_file(path).await;
                        continue;
                    }
                    if tokio::time::Instant::now() >= deadline {
                        return Err(Error::Timeout(format!(
                            "{} held for longer than {:?}",
                            path.display(),
                            LOCK_WAIT
                        )));
                    }
                    tokio::time::sleep(LOCK_RETRY).await;
                }
                Err(e) => {
                    return Err(Error::StorageWriteError(format!(
                        "{}: {}",
                        path.display(),
                        e
                    )))
                }
            }
        }
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to release store lock");
        }
    }
}

async fn is_stale(path: &Path) -> bool {
    match tokio::fs::metadata(path).await.and_then(|m| m.modified()) {
        Ok(modified) => modified
            .elapsed()
            .map(|age| age > LOCK_STALE)
            .unwrap_or(false),
        // Released between our open and this check
        Err(_) => false,
    }
}

async fn read_entries(path: &Path) -> Result<Entries> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) if contents.trim().is_empty() => Ok(HashMap::new()),
        Ok(contents) => serde_json::from_str(&contents).map_err(|e| {
            Error::StorageReadError(format!("{} is not a valid store: {}", path.display(), e))
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
        Err(e) => Err(e.into()),
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}
