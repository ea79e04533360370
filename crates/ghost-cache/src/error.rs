use std::sync::Arc;

use reqwest::StatusCode;

/// Result alias used across the proxy engine
pub type ProxyResult<T> = std::result::Result<T, ProxyError>;

// Error type for every lifecycle handler and storage backend
#[derive(Debug, thiserror::Error, Clone)]
pub enum ProxyError {
    #[error("Install of {generation} failed: {reason}")]
    InstallFailed { generation: String, reason: String },

    #[error("Network error: {source}")]
    Network {
        #[from]
        source: Arc<reqwest::Error>,
    },

    #[error("Network unreachable: {0}")]
    Unreachable(String),

    #[error("Server returned status code {status} for {url}")]
    Status { url: String, status: StatusCode },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Storage error: {source}")]
    Storage {
        #[from]
        source: Arc<std::io::Error>,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Cache bucket not found: {0}")]
    BucketNotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProxyError {
    /// Wrap any failure that happened while warming a bucket as an install failure
    pub fn install_failed(generation: impl Into<String>, reason: impl ToString) -> Self {
        Self::InstallFailed {
            generation: generation.into(),
            reason: reason.to_string(),
        }
    }

    /// True when the failure came from the network rather than local storage
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            Self::Network { .. } | Self::Unreachable(_) | Self::Status { .. }
        )
    }
}

// Manual implementation because of the Arc wrapping.
impl From<reqwest::Error> for ProxyError {
    fn from(err: reqwest::Error) -> Self {
        ProxyError::Network {
            source: Arc::new(err),
        }
    }
}

impl From<std::io::Error> for ProxyError {
    fn from(err: std::io::Error) -> Self {
        ProxyError::Storage {
            source: Arc::new(err),
        }
    }
}

impl From<serde_json::Error> for ProxyError {
    fn from(err: serde_json::Error) -> Self {
        ProxyError::Serialization(err.to_string())
    }
}

impl From<url::ParseError> for ProxyError {
    fn from(err: url::ParseError) -> Self {
        ProxyError::InvalidUrl(err.to_string())
    }
}
