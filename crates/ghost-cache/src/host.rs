//! # Proxy Host
//!
//! A reference host environment. It owns the version lifecycle: installs a
//! deployed version, decides when it activates, and routes fetches through
//! whichever version is active.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::ProxyResult;
use crate::lifecycle::{
    FetchOutcome, HostControl, LifecycleSignal, NoopControl, ResponseSource, VersionState,
};
use crate::network::Network;
use crate::proxy::{OfflineProxy, cache_first};
use crate::request::ProxyRequest;
use crate::storage::CacheStorage;

/// Controls recorded for one version while its handlers run
#[derive(Debug, Default)]
struct VersionControl {
    skip_waiting: AtomicBool,
    claim_clients: AtomicBool,
}

#[async_trait]
impl HostControl for VersionControl {
    async fn skip_waiting(&self) {
        self.skip_waiting.store(true, Ordering::Release);
    }

    async fn claim_clients(&self) {
        self.claim_clients.store(true, Ordering::Release);
    }
}

#[derive(Debug, Default)]
struct HostState {
    active: Option<Arc<OfflineProxy>>,
    waiting: Option<Arc<OfflineProxy>>,
    states: HashMap<String, VersionState>,
    clients_claimed: bool,
}

impl HostState {
    fn set(&mut self, generation: &str, state: VersionState) {
        debug!(generation, state = %state, "Version state changed");
        self.states.insert(generation.to_string(), state);
    }
}

pub struct ProxyHost {
    /// Used for requests while no version is active
    network: Arc<dyn Network>,
    /// Buckets left by earlier runs, consulted while no version is active
    storage: Option<Arc<dyn CacheStorage>>,
    state: RwLock<HostState>,
    /// One version's install/activate handlers run at a time
    lifecycle_lock: Mutex<()>,
}

impl ProxyHost {
    pub fn new(network: Arc<dyn Network>) -> Self {
        Self {
            network,
            storage: None,
            state: RwLock::new(HostState::default()),
            lifecycle_lock: Mutex::new(()),
        }
    }

    /// Host whose storage outlives a single run.
    ///
    /// Until a version activates, requests are still answered cache-first
    /// from whatever buckets the storage already holds.
    pub fn with_storage(network: Arc<dyn Network>, storage: Arc<dyn CacheStorage>) -> Self {
        Self {
            storage: Some(storage),
            ..Self::new(network)
        }
    }

    /// Install a version and, if it asked to skip waiting or nothing is
    /// active yet, activate it.
    ///
    /// On install failure the version becomes redundant and the previously
    /// active version keeps serving.
    pub async fn deploy(&self, proxy: Arc<OfflineProxy>) -> ProxyResult<VersionState> {
        let _guard = self.lifecycle_lock.lock().await;
        let generation = proxy.generation().to_string();

        {
            // Versions retired by an earlier deploy are forgotten.
            let mut state = self.state.write();
            state.states.retain(|_, s| *s != VersionState::Redundant);
            state.set(&generation, VersionState::Installing);
        }

        let control = VersionControl::default();
        let installed = proxy
            .dispatch(LifecycleSignal::Install, &control)
            .await
            .and_then(|outcome| outcome.into_installed());

        if let Err(e) = installed {
            warn!(generation = %generation, error = %e, "Version failed to install");
            self.state.write().set(&generation, VersionState::Redundant);
            return Err(e);
        }

        let activate_now = {
            let mut state = self.state.write();
            state.set(&generation, VersionState::Installed);
            control.skip_waiting.load(Ordering::Acquire) || state.active.is_none()
        };

        if activate_now {
            self.activate_version(proxy).await;
            return Ok(VersionState::Active);
        }

        let mut state = self.state.write();
        if let Some(previous) = state.waiting.replace(proxy) {
            if previous.generation() != generation {
                state.set(previous.generation(), VersionState::Redundant);
            }
        }
        info!(generation = %generation, "Version installed, waiting");
        Ok(VersionState::Installed)
    }

    /// Activate the waiting version, once the host decides old clients are gone
    pub async fn promote_waiting(&self) -> Option<String> {
        let _guard = self.lifecycle_lock.lock().await;
        let waiting = self.state.write().waiting.take()?;
        let generation = waiting.generation().to_string();
        self.activate_version(waiting).await;
        Some(generation)
    }

    async fn activate_version(&self, proxy: Arc<OfflineProxy>) {
        let generation = proxy.generation().to_string();
        self.state.write().set(&generation, VersionState::Activating);

        let control = VersionControl::default();
        // A failing activate handler does not stop activation.
        if let Err(e) = proxy
            .dispatch(LifecycleSignal::Activate, &control)
            .await
            .and_then(|outcome| outcome.into_activated())
        {
            warn!(generation = %generation, error = %e, "Activate handler failed");
        }

        let mut state = self.state.write();
        if let Some(previous) = state.active.replace(proxy) {
            if previous.generation() != generation {
                state.set(previous.generation(), VersionState::Redundant);
            }
        }
        if state
            .waiting
            .as_ref()
            .is_some_and(|w| w.generation() == generation)
        {
            state.waiting = None;
        }
        state.set(&generation, VersionState::Active);
        state.clients_claimed = control.claim_clients.load(Ordering::Acquire);
        info!(
            generation = %generation,
            clients_claimed = state.clients_claimed,
            "Version active"
        );
    }

    /// Answer a request through the active version, or the stored buckets and network when none is active
    pub async fn handle_fetch(&self, request: ProxyRequest) -> ProxyResult<FetchOutcome> {
        let active = self.state.read().active.clone();
        match active {
            Some(proxy) => proxy
                .dispatch(LifecycleSignal::Fetch(request), &NoopControl)
                .await?
                .into_response(),
            None => match &self.storage {
                Some(storage) => {
                    debug!(url = %request.url, "No active version, using stored buckets");
                    cache_first(storage.as_ref(), self.network.as_ref(), &request).await
                }
                None => {
                    debug!(url = %request.url, "No active version, using network");
                    let response = self.network.fetch(&request).await?;
                    Ok(FetchOutcome {
                        response,
                        source: ResponseSource::Network,
                    })
                }
            },
        }
    }

    pub fn active_generation(&self) -> Option<String> {
        self.state
            .read()
            .active
            .as_ref()
            .map(|p| p.generation().to_string())
    }

    pub fn waiting_generation(&self) -> Option<String> {
        self.state
            .read()
            .waiting
            .as_ref()
            .map(|p| p.generation().to_string())
    }

    /// State of a version; redundant versions are dropped at the next deploy
    pub fn state_of(&self, generation: &str) -> Option<VersionState> {
        self.state.read().states.get(generation).copied()
    }

    /// Whether the active version took control of already-open clients
    pub fn clients_claimed(&self) -> bool {
        self.state.read().clients_claimed
    }
}

impl std::fmt::Debug for ProxyHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyHost")
            .field("active", &self.active_generation())
            .field("waiting", &self.waiting_generation())
            .finish()
    }
}
