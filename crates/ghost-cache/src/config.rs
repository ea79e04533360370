use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ProxyError, ProxyResult};

/// Generation tag of the bucket the current version installs into.
pub const DEFAULT_GENERATION: &str = "ghost-v1";

/// Resources pre-loaded into the bucket at install time.
pub const DEFAULT_ASSETS: [&str; 3] = ["ghost.html", "manifest.json", "icon.svg"];

/// Origin the document is served from.
pub const DEFAULT_SCOPE: &str = "http://localhost:8090/";

const DEFAULT_USER_AGENT: &str = concat!("ghost-cache/", env!("CARGO_PKG_VERSION"));

/// Configuration of one deployed proxy version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Name of the cache bucket this version owns
    pub generation: String,

    /// Relative paths fetched and stored on install, in order
    pub assets: Vec<String>,

    /// Base URL relative paths resolve against
    pub scope: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            generation: DEFAULT_GENERATION.to_owned(),
            assets: DEFAULT_ASSETS.iter().map(|s| (*s).to_owned()).collect(),
            scope: DEFAULT_SCOPE.to_owned(),
        }
    }
}

impl ProxyConfig {
    pub fn builder() -> crate::builder::ProxyConfigBuilder {
        crate::builder::ProxyConfigBuilder::new()
    }

    /// Parse the scope as a base URL.
    ///
    /// A scope without a trailing slash is treated as a directory so that
    /// `http://host/app` and `http://host/app/` resolve assets identically.
    pub fn scope_url(&self) -> ProxyResult<Url> {
        let mut scope = Url::parse(&self.scope)?;
        if scope.cannot_be_a_base() {
            return Err(ProxyError::Config(format!(
                "scope {} cannot be used as a base URL",
                self.scope
            )));
        }
        if !scope.path().ends_with('/') {
            let path = format!("{}/", scope.path());
            scope.set_path(&path);
        }
        Ok(scope)
    }

    /// Check the invariants a version needs before it can be installed
    pub fn validate(&self) -> ProxyResult<()> {
        if self.generation.trim().is_empty() {
            return Err(ProxyError::Config(
                "generation tag must not be empty".to_string(),
            ));
        }
        let scope = self.scope_url()?;
        for asset in &self.assets {
            scope.join(asset).map_err(|e| {
                ProxyError::Config(format!("asset path {asset:?} is not a valid URL: {e}"))
            })?;
        }
        Ok(())
    }
}

/// Options for the HTTP client used to reach the network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Overall timeout for one request, zero disables it
    #[serde(with = "duration_secs")]
    pub timeout: Duration,

    /// Time allowed to establish the connection, zero disables it
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,

    /// Whether to follow redirects
    pub follow_redirects: bool,

    /// User agent string sent when the forwarded request carries none
    pub user_agent: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            follow_redirects: true,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_shipped_document() {
        let config = ProxyConfig::default();
        assert_eq!(config.generation, "ghost-v1");
        assert_eq!(config.assets, vec!["ghost.html", "manifest.json", "icon.svg"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn scope_without_trailing_slash_is_a_directory() {
        let config = ProxyConfig {
            scope: "http://example.com/app".to_string(),
            ..ProxyConfig::default()
        };
        let scope = config.scope_url().unwrap();
        assert_eq!(scope.as_str(), "http://example.com/app/");
        assert_eq!(
            scope.join("icon.svg").unwrap().as_str(),
            "http://example.com/app/icon.svg"
        );
    }

    #[test]
    fn empty_generation_is_rejected() {
        let config = ProxyConfig {
            generation: "  ".to_string(),
            ..ProxyConfig::default()
        };
        assert!(matches!(config.validate(), Err(ProxyError::Config(_))));
    }

    #[test]
    fn opaque_scope_is_rejected() {
        let config = ProxyConfig {
            scope: "data:text/plain,ghost".to_string(),
            ..ProxyConfig::default()
        };
        assert!(matches!(config.scope_url(), Err(ProxyError::Config(_))));
    }

    #[test]
    fn network_config_reads_seconds() {
        let config: NetworkConfig =
            serde_json::from_str(r#"{"timeout": 5, "follow_redirects": false}"#).unwrap();
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert!(!config.follow_redirects);
    }
}
