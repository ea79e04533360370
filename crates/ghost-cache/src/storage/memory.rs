//! # Memory Storage
//!
//! In-process bucket storage. Entries live as long as the storage value.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use crate::error::{ProxyError, ProxyResult};
use crate::request::{RequestKey, StoredResponse};
use crate::storage::CacheStorage;

#[derive(Debug, Default)]
struct MemoryBucket {
    name: String,
    entries: HashMap<RequestKey, StoredResponse>,
}

/// Bucket storage held entirely in memory
#[derive(Debug, Default)]
pub struct MemoryStorage {
    /// Buckets in creation order
    buckets: RwLock<Vec<MemoryBucket>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStorage for MemoryStorage {
    async fn open(&self, name: &str) -> ProxyResult<()> {
        let mut buckets = self.buckets.write();
        if !buckets.iter().any(|b| b.name == name) {
            buckets.push(MemoryBucket {
                name: name.to_string(),
                entries: HashMap::new(),
            });
            debug!(bucket = name, "Created memory bucket");
        }
        Ok(())
    }

    async fn has(&self, name: &str) -> ProxyResult<bool> {
        Ok(self.buckets.read().iter().any(|b| b.name == name))
    }

    async fn bucket_names(&self) -> ProxyResult<Vec<String>> {
        Ok(self.buckets.read().iter().map(|b| b.name.clone()).collect())
    }

    async fn delete_bucket(&self, name: &str) -> ProxyResult<bool> {
        let mut buckets = self.buckets.write();
        let before = buckets.len();
        buckets.retain(|b| b.name != name);
        let removed = buckets.len() != before;
        if removed {
            debug!(bucket = name, "Deleted memory bucket");
        }
        Ok(removed)
    }

    async fn put_all(
        &self,
        name: &str,
        entries: Vec<(RequestKey, StoredResponse)>,
    ) -> ProxyResult<()> {
        let mut buckets = self.buckets.write();
        let bucket = buckets
            .iter_mut()
            .find(|b| b.name == name)
            .ok_or_else(|| ProxyError::BucketNotFound(name.to_string()))?;
        bucket.entries.extend(entries);
        Ok(())
    }

    async fn get(&self, name: &str, key: &RequestKey) -> ProxyResult<Option<StoredResponse>> {
        Ok(self
            .buckets
            .read()
            .iter()
            .find(|b| b.name == name)
            .and_then(|b| b.entries.get(key).cloned()))
    }

    async fn entry_keys(&self, name: &str) -> ProxyResult<Vec<RequestKey>> {
        let buckets = self.buckets.read();
        let bucket = buckets
            .iter()
            .find(|b| b.name == name)
            .ok_or_else(|| ProxyError::BucketNotFound(name.to_string()))?;
        let mut keys: Vec<RequestKey> = bucket.entries.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}
