//! # Builder for ProxyConfig
//!
//! Fluent construction of a [`ProxyConfig`], starting from the shipped
//! defaults.
//!
//! # Example
//!
//! ```
//! use ghost_cache::ProxyConfig;
//!
//! let config = ProxyConfig::builder()
//!     .with_generation("ghost-v2")
//!     .with_scope("http://localhost:8090/")
//!     .with_asset("ghost.html")
//!     .with_asset("manifest.json")
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(config.generation, "ghost-v2");
//! assert_eq!(config.assets.len(), 2);
//! ```

use crate::config::ProxyConfig;
use crate::error::ProxyResult;

/// Builder for creating ProxyConfig instances with a fluent API
#[derive(Debug, Clone)]
pub struct ProxyConfigBuilder {
    config: ProxyConfig,
    /// Cleared on the first `with_asset` so defaults are replaced, not extended
    default_assets: bool,
}

impl Default for ProxyConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProxyConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: ProxyConfig::default(),
            default_assets: true,
        }
    }

    /// Set the generation tag
    pub fn with_generation(mut self, generation: impl Into<String>) -> Self {
        self.config.generation = generation.into();
        self
    }

    /// Set the scope the assets resolve against
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.config.scope = scope.into();
        self
    }

    /// Append one asset path
    pub fn with_asset(mut self, path: impl Into<String>) -> Self {
        if self.default_assets {
            self.config.assets.clear();
            self.default_assets = false;
        }
        self.config.assets.push(path.into());
        self
    }

    /// Replace the whole asset list
    pub fn with_assets<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.assets = paths.into_iter().map(Into::into).collect();
        self.default_assets = false;
        self
    }

    /// Validate and return the configuration
    pub fn build(self) -> ProxyResult<ProxyConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
