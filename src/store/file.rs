//! On-disk cache store.
//!
//! Each partition is a directory under the store root; each entry is a
//! bincode-serialized `CachedResponse` in a file named by the SHA-256 of its
//! key. Quota and I/O failures propagate as `StoreError::Io` with no retry.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::debug;

use super::{CacheStore, CachedResponse, StoreError};

/// Directory name under the user cache dir for the default store root.
const APP_NAME: &str = "chartcache";

pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Store rooted at the platform cache directory.
    pub fn in_user_cache_dir() -> Result<Self, StoreError> {
        let cache_dir = dirs::cache_dir().ok_or(StoreError::NoCacheDir)?;
        Ok(Self::new(cache_dir.join(APP_NAME)))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, partition: &str, key: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        let hash = hasher.finalize();
        self.root.join(partition).join(format!("{hash:x}"))
    }
}

#[async_trait]
impl CacheStore for FileStore {
    async fn get(&self, partition: &str, key: &str) -> Result<Option<CachedResponse>, StoreError> {
        let path = self.entry_path(partition, key);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let entry = bincode::deserialize(&raw)?;
        Ok(Some(entry))
    }

    async fn put(
        &self,
        partition: &str,
        key: &str,
        entry: CachedResponse,
    ) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(self.root.join(partition)).await?;
        let raw = bincode::serialize(&entry)?;
        tokio::fs::write(self.entry_path(partition, key), raw).await?;
        Ok(())
    }

    async fn delete_partition(&self, partition: &str) -> Result<bool, StoreError> {
        let path = self.root.join(partition);
        match tokio::fs::remove_dir_all(&path).await {
            Ok(()) => {
                debug!(partition, "removed partition directory");
                Ok(true)
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    async fn list_partitions(&self) -> Result<Vec<String>, StoreError> {
        let mut read_dir = match tokio::fs::read_dir(&self.root).await {
            Ok(read_dir) => read_dir,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let mut names = Vec::new();
        while let Some(dir_entry) = read_dir.next_entry().await? {
            if dir_entry.file_type().await?.is_dir() {
                if let Ok(name) = dir_entry.file_name().into_string() {
                    names.push(name);
                }
            }
        }
        Ok(names)
    }
}
