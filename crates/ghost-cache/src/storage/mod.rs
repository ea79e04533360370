//! # Cache Storage
//!
//! The host-owned storage the proxy keeps its buckets in. A storage holds any
//! number of named buckets, each mapping request identities to stored
//! responses, and remembers the order buckets were created in.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
use tracing::debug;

use crate::error::{ProxyError, ProxyResult};
use crate::network::Network;
use crate::request::{ProxyRequest, RequestKey, StoredResponse};

pub use self::file::FileStorage;
pub use self::memory::MemoryStorage;

pub mod file;
pub mod memory;

/// Multi-bucket storage for request/response pairs
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Create the bucket if it does not exist yet
    async fn open(&self, name: &str) -> ProxyResult<()>;

    /// Whether a bucket with this name exists
    async fn has(&self, name: &str) -> ProxyResult<bool>;

    /// Names of all buckets, oldest first
    async fn bucket_names(&self) -> ProxyResult<Vec<String>>;

    /// Destroy a bucket and all its entries, returning whether it existed
    async fn delete_bucket(&self, name: &str) -> ProxyResult<bool>;

    /// Store a batch of entries into an existing bucket
    async fn put_all(
        &self,
        name: &str,
        entries: Vec<(RequestKey, StoredResponse)>,
    ) -> ProxyResult<()>;

    /// Look up one entry in one bucket
    async fn get(&self, name: &str, key: &RequestKey) -> ProxyResult<Option<StoredResponse>>;

    /// Request identities stored in one bucket, sorted
    async fn entry_keys(&self, name: &str) -> ProxyResult<Vec<RequestKey>>;

    /// First entry for `key` across every bucket, oldest bucket first
    async fn match_any(&self, key: &RequestKey) -> ProxyResult<Option<(String, StoredResponse)>> {
        for name in self.bucket_names().await? {
            if let Some(response) = self.get(&name, key).await? {
                return Ok(Some((name, response)));
            }
        }
        Ok(None)
    }
}

/// Handle on one opened bucket
#[derive(Clone)]
pub struct CacheBucket {
    storage: Arc<dyn CacheStorage>,
    name: String,
}

impl CacheBucket {
    /// Open (creating if absent) the bucket called `name`
    pub async fn open(storage: Arc<dyn CacheStorage>, name: impl Into<String>) -> ProxyResult<Self> {
        let name = name.into();
        storage.open(&name).await?;
        Ok(Self { storage, name })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fetch every request from the network and store the responses.
    ///
    /// Requests are fetched concurrently. Nothing is stored unless every
    /// fetch succeeded with a success status.
    pub async fn add_all(
        &self,
        network: &dyn Network,
        requests: &[ProxyRequest],
    ) -> ProxyResult<Vec<RequestKey>> {
        let entries = try_join_all(requests.iter().map(|request| async move {
            let response = network.fetch(request).await?;
            if !response.is_success() {
                return Err(ProxyError::Status {
                    url: request.url.to_string(),
                    status: response.status(),
                });
            }
            Ok((request.key(), response))
        }))
        .await?;

        let keys: Vec<RequestKey> = entries.iter().map(|(key, _)| key.clone()).collect();
        self.storage.put_all(&self.name, entries).await?;

        debug!(bucket = %self.name, count = keys.len(), "Bulk add stored entries");
        Ok(keys)
    }

    pub async fn put(&self, key: RequestKey, response: StoredResponse) -> ProxyResult<()> {
        self.storage.put_all(&self.name, vec![(key, response)]).await
    }

    /// Stored response for the request, if it is cacheable and present
    pub async fn match_request(&self, request: &ProxyRequest) -> ProxyResult<Option<StoredResponse>> {
        if !request.is_cacheable() {
            return Ok(None);
        }
        self.storage.get(&self.name, &request.key()).await
    }

    pub async fn keys(&self) -> ProxyResult<Vec<RequestKey>> {
        self.storage.entry_keys(&self.name).await
    }

    pub async fn len(&self) -> ProxyResult<usize> {
        Ok(self.keys().await?.len())
    }

    pub async fn is_empty(&self) -> ProxyResult<bool> {
        Ok(self.len().await? == 0)
    }
}

impl std::fmt::Debug for CacheBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheBucket").field("name", &self.name).finish()
    }
}
