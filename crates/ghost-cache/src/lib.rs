//! # Ghost Cache
//!
//! An offline cache-first proxy for a single-page document.
//! A deployed version pre-loads a fixed asset list into a named bucket on
//! install, evicts buckets of other generations on activate, and answers
//! fetches from the cache before falling back to the network.
//!
//! ## Features
//!
//! - Lifecycle dispatch over a closed set of signals (install, activate, fetch)
//! - Memory and file-backed bucket storage
//! - reqwest-backed network passthrough
//! - A reference host that walks versions through their state machine

pub mod builder;
pub mod config;
pub mod error;
pub mod host;
pub mod lifecycle;
pub mod network;
pub mod proxy;
pub mod request;
pub mod storage;

#[cfg(test)]
mod test_support;

pub use builder::ProxyConfigBuilder;
pub use config::{DEFAULT_ASSETS, DEFAULT_GENERATION, DEFAULT_SCOPE, NetworkConfig, ProxyConfig};
pub use error::{ProxyError, ProxyResult};
pub use host::ProxyHost;
pub use lifecycle::{
    ActivateReport, FetchOutcome, HostControl, InstallReport, LifecycleSignal, NoopControl,
    ResponseSource, SignalOutcome, VersionState,
};
pub use network::{HttpNetwork, Network, create_client};
pub use proxy::{OfflineProxy, cache_first};
pub use request::{EntryMetadata, ProxyRequest, RequestKey, StoredResponse};
pub use storage::{CacheBucket, CacheStorage, FileStorage, MemoryStorage};
