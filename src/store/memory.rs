//! In-memory cache store, used by tests and hosts without disk access.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{CacheStore, CachedResponse, StoreError};

#[derive(Default)]
pub struct MemoryStore {
    partitions: RwLock<HashMap<String, HashMap<String, CachedResponse>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries across all partitions.
    pub async fn len(&self) -> usize {
        self.partitions
            .read()
            .await
            .values()
            .map(|entries| entries.len())
            .sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, partition: &str, key: &str) -> Result<Option<CachedResponse>, StoreError> {
        let partitions = self.partitions.read().await;
        Ok(partitions
            .get(partition)
            .and_then(|entries| entries.get(key))
            .cloned())
    }

    async fn put(
        &self,
        partition: &str,
        key: &str,
        entry: CachedResponse,
    ) -> Result<(), StoreError> {
        let mut partitions = self.partitions.write().await;
        partitions
            .entry(partition.to_string())
            .or_default()
            .insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete_partition(&self, partition: &str) -> Result<bool, StoreError> {
        let mut partitions = self.partitions.write().await;
        Ok(partitions.remove(partition).is_some())
    }

    async fn list_partitions(&self) -> Result<Vec<String>, StoreError> {
        let partitions = self.partitions.read().await;
        Ok(partitions.keys().cloned().collect())
    }
}
