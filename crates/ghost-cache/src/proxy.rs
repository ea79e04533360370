//! # Offline Proxy
//!
//! One deployed version of the cache-first proxy. It owns the bucket named by
//! its generation tag and reacts to the three lifecycle signals:
//!
//! - `install` warms the bucket with the asset list, then asks the host to
//!   skip waiting.
//! - `activate` destroys every bucket from another generation, then asks the
//!   host to claim open clients.
//! - `fetch` answers from any bucket if it can, otherwise goes to the network.
//!   Network responses are never written back.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::ProxyConfig;
use crate::error::{ProxyError, ProxyResult};
use crate::lifecycle::{
    ActivateReport, FetchOutcome, HostControl, InstallReport, LifecycleSignal, ResponseSource,
    SignalOutcome,
};
use crate::network::Network;
use crate::request::ProxyRequest;
use crate::storage::{CacheBucket, CacheStorage};

pub struct OfflineProxy {
    config: ProxyConfig,
    scope: Url,
    storage: Arc<dyn CacheStorage>,
    network: Arc<dyn Network>,
}

impl OfflineProxy {
    pub fn new(
        config: ProxyConfig,
        storage: Arc<dyn CacheStorage>,
        network: Arc<dyn Network>,
    ) -> ProxyResult<Self> {
        config.validate()?;
        let scope = config.scope_url()?;
        Ok(Self {
            config,
            scope,
            storage,
            network,
        })
    }

    pub fn generation(&self) -> &str {
        &self.config.generation
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    pub fn scope(&self) -> &Url {
        &self.scope
    }

    pub fn storage(&self) -> &Arc<dyn CacheStorage> {
        &self.storage
    }

    pub fn network(&self) -> &Arc<dyn Network> {
        &self.network
    }

    /// Route a signal to its handler
    pub async fn dispatch(
        &self,
        signal: LifecycleSignal,
        host: &dyn HostControl,
    ) -> ProxyResult<SignalOutcome> {
        debug!(signal = signal.name(), generation = %self.config.generation, "Dispatching signal");
        match signal {
            LifecycleSignal::Install => self.install(host).await.map(SignalOutcome::Installed),
            LifecycleSignal::Activate => self.activate(host).await.map(SignalOutcome::Activated),
            LifecycleSignal::Fetch(request) => {
                self.fetch(&request).await.map(SignalOutcome::Responded)
            }
        }
    }

    /// Warm the current generation's bucket with every asset.
    ///
    /// Any asset failure fails the whole install and skip-waiting is not
    /// signalled.
    pub async fn install(&self, host: &dyn HostControl) -> ProxyResult<InstallReport> {
        let generation = &self.config.generation;
        info!(generation = %generation, assets = self.config.assets.len(), "Installing");

        let requests = self
            .config
            .assets
            .iter()
            .map(|path| ProxyRequest::resolve(&self.scope, path))
            .collect::<ProxyResult<Vec<_>>>()
            .map_err(|e| ProxyError::install_failed(generation, e))?;

        let bucket = CacheBucket::open(self.storage.clone(), generation.clone())
            .await
            .map_err(|e| ProxyError::install_failed(generation, e))?;

        let stored = bucket
            .add_all(self.network.as_ref(), &requests)
            .await
            .map_err(|e| {
                warn!(generation = %generation, error = %e, "Install failed");
                ProxyError::install_failed(generation, e)
            })?;

        info!(generation = %generation, stored = stored.len(), "Installed");
        host.skip_waiting().await;

        Ok(InstallReport {
            generation: generation.clone(),
            stored,
        })
    }

    /// Destroy every bucket whose name is not the current generation tag.
    ///
    /// Deletions run concurrently. A failed deletion is logged and left for a
    /// later activation; it never fails this one.
    pub async fn activate(&self, host: &dyn HostControl) -> ProxyResult<ActivateReport> {
        let generation = &self.config.generation;

        let stale: Vec<String> = self
            .storage
            .bucket_names()
            .await?
            .into_iter()
            .filter(|name| name != generation)
            .collect();

        let results = join_all(stale.iter().map(|name| async move {
            (name, self.storage.delete_bucket(name).await)
        }))
        .await;

        let mut removed = Vec::with_capacity(results.len());
        for (name, result) in results {
            match result {
                Ok(true) => removed.push(name.clone()),
                Ok(false) => debug!(bucket = %name, "Stale bucket already gone"),
                Err(e) => warn!(bucket = %name, error = %e, "Failed to delete stale bucket"),
            }
        }

        info!(generation = %generation, removed = ?removed, "Activated");
        host.claim_clients().await;

        Ok(ActivateReport {
            generation: generation.clone(),
            removed,
        })
    }

    /// Cache-first lookup with network fallback
    pub async fn fetch(&self, request: &ProxyRequest) -> ProxyResult<FetchOutcome> {
        cache_first(self.storage.as_ref(), self.network.as_ref(), request).await
    }
}

/// Answer from any bucket in `storage`, otherwise from `network`.
///
/// Network responses are returned as they are and never stored.
pub async fn cache_first(
    storage: &dyn CacheStorage,
    network: &dyn Network,
    request: &ProxyRequest,
) -> ProxyResult<FetchOutcome> {
    if request.is_cacheable() {
        let key = request.key();
        match storage.match_any(&key).await {
            Ok(Some((bucket, response))) => {
                debug!(key = %key, bucket = %bucket, "Cache hit");
                return Ok(FetchOutcome {
                    response,
                    source: ResponseSource::Cache { bucket },
                });
            }
            Ok(None) => debug!(key = %key, "Cache miss"),
            // A broken storage must not take the page offline.
            Err(e) => warn!(key = %key, error = %e, "Cache lookup failed, using network"),
        }
    }

    let response = network.fetch(request).await?;
    Ok(FetchOutcome {
        response,
        source: ResponseSource::Network,
    })
}

impl std::fmt::Debug for OfflineProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineProxy")
            .field("generation", &self.config.generation)
            .field("scope", &self.scope.as_str())
            .field("assets", &self.config.assets)
            .finish()
    }
}
