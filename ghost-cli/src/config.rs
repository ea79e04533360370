use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ghost_cache::{NetworkConfig, ProxyConfig};
use serde::{Deserialize, Serialize};

use crate::cli::CliArgs;
use crate::error::{AppError, Result};

const DEFAULT_LISTEN: &str = "127.0.0.1:8091";

/// Where buckets are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Memory,
    File,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub kind: StorageKind,
    /// Directory for file storage; the system temp dir is used when unset
    pub dir: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            kind: StorageKind::File,
            dir: None,
        }
    }
}

impl StorageConfig {
    pub fn resolved_dir(&self) -> PathBuf {
        self.dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("ghost-cache"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Address the local front listens on
    pub listen: String,

    /// Seconds between install retries after a failed install, zero disables
    pub install_retry_secs: u64,

    pub proxy: ProxyConfig,
    pub network: NetworkConfig,
    pub storage: StorageConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN.to_string(),
            install_retry_secs: 30,
            proxy: ProxyConfig::default(),
            network: NetworkConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file, or defaults when no path is given
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        match config_path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    AppError::Config(format!("failed to read {}: {e}", path.display()))
                })?;
                Ok(toml::from_str(&content)?)
            }
            None => Ok(Self::default()),
        }
    }

    /// Apply command-line overrides on top of the loaded values
    pub fn merge_args(mut self, args: &CliArgs) -> Self {
        if let Some(listen) = &args.listen {
            self.listen = listen.clone();
        }
        if let Some(origin) = &args.origin {
            self.proxy.scope = origin.clone();
        }
        if let Some(generation) = &args.generation {
            self.proxy.generation = generation.clone();
        }
        if !args.assets.is_empty() {
            self.proxy.assets = args.assets.clone();
        }
        if let Some(dir) = &args.cache_dir {
            self.storage.kind = StorageKind::File;
            self.storage.dir = Some(dir.clone());
        }
        if args.memory {
            self.storage.kind = StorageKind::Memory;
        }
        if let Some(timeout) = args.timeout {
            self.network.timeout = Duration::from_secs(timeout);
        }
        self
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.listen
            .parse()
            .map_err(|e| AppError::Config(format!("invalid listen address {}: {e}", self.listen)))
    }

    pub fn install_retry(&self) -> Option<Duration> {
        (self.install_retry_secs > 0).then(|| Duration::from_secs(self.install_retry_secs))
    }
}
