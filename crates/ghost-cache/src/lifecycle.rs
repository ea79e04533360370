//! # Lifecycle
//!
//! Signals the host sends to a proxy version, what each handler reports
//! back, and the controls a proxy can invoke on its host.

use std::fmt;

use async_trait::async_trait;

use crate::error::{ProxyError, ProxyResult};
use crate::request::{ProxyRequest, RequestKey, StoredResponse};

/// Event emitted by the host to a proxy version
#[derive(Debug, Clone)]
pub enum LifecycleSignal {
    Install,
    Activate,
    Fetch(ProxyRequest),
}

impl LifecycleSignal {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Activate => "activate",
            Self::Fetch(_) => "fetch",
        }
    }
}

/// Result of handling one signal
#[derive(Debug, Clone)]
pub enum SignalOutcome {
    Installed(InstallReport),
    Activated(ActivateReport),
    Responded(FetchOutcome),
}

impl SignalOutcome {
    pub fn into_installed(self) -> ProxyResult<InstallReport> {
        match self {
            Self::Installed(report) => Ok(report),
            other => Err(other.mismatch("install")),
        }
    }

    pub fn into_activated(self) -> ProxyResult<ActivateReport> {
        match self {
            Self::Activated(report) => Ok(report),
            other => Err(other.mismatch("activate")),
        }
    }

    pub fn into_response(self) -> ProxyResult<FetchOutcome> {
        match self {
            Self::Responded(outcome) => Ok(outcome),
            other => Err(other.mismatch("fetch")),
        }
    }

    fn mismatch(&self, expected: &str) -> ProxyError {
        let got = match self {
            Self::Installed(_) => "install",
            Self::Activated(_) => "activate",
            Self::Responded(_) => "fetch",
        };
        ProxyError::Internal(format!("expected {expected} outcome, got {got}"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub generation: String,
    /// Request identities warmed into the bucket
    pub stored: Vec<RequestKey>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivateReport {
    pub generation: String,
    /// Stale buckets that were destroyed
    pub removed: Vec<String>,
}

/// Where a fetch response came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseSource {
    /// Served from the named bucket without touching the network
    Cache { bucket: String },
    Network,
}

#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub response: StoredResponse,
    pub source: ResponseSource,
}

impl FetchOutcome {
    pub fn is_cache_hit(&self) -> bool {
        matches!(self.source, ResponseSource::Cache { .. })
    }
}

/// State of one deployed version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VersionState {
    Installing,
    /// Installed and waiting for the host to activate it
    Installed,
    Activating,
    Active,
    /// Failed to install, or replaced by a newer version
    Redundant,
}

impl fmt::Display for VersionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Installing => "installing",
            Self::Installed => "installed",
            Self::Activating => "activating",
            Self::Active => "active",
            Self::Redundant => "redundant",
        };
        f.write_str(s)
    }
}

/// Controls a proxy version can invoke on its host
#[async_trait]
pub trait HostControl: Send + Sync {
    /// Activate this version as soon as it is installed
    async fn skip_waiting(&self);

    /// Take control of clients that are already open
    async fn claim_clients(&self);
}

/// Host control that ignores both signals
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopControl;

#[async_trait]
impl HostControl for NoopControl {
    async fn skip_waiting(&self) {}

    async fn claim_clients(&self) {}
}
