//! # Network
//!
//! The outward edge of the proxy: a request goes in, whatever the origin
//! answers comes back. Non-success statuses are responses, not errors; only
//! transport failures are reported as [`ProxyError::Network`].

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::config::NetworkConfig;
use crate::error::{ProxyError, ProxyResult};
use crate::request::{ProxyRequest, StoredResponse};

#[async_trait]
pub trait Network: Send + Sync {
    /// Forward the request unmodified and collect the full response
    async fn fetch(&self, request: &ProxyRequest) -> ProxyResult<StoredResponse>;
}

/// Create a reqwest Client with the provided configuration
pub fn create_client(config: &NetworkConfig) -> ProxyResult<Client> {
    let mut client_builder = Client::builder()
        .pool_max_idle_per_host(5)
        .user_agent(&config.user_agent)
        .redirect(if config.follow_redirects {
            reqwest::redirect::Policy::limited(10)
        } else {
            reqwest::redirect::Policy::none()
        });

    if !config.timeout.is_zero() {
        client_builder = client_builder.timeout(config.timeout);
    }

    if !config.connect_timeout.is_zero() {
        client_builder = client_builder.connect_timeout(config.connect_timeout);
    }

    client_builder.build().map_err(ProxyError::from)
}

/// Network backed by a shared reqwest client
#[derive(Debug, Clone)]
pub struct HttpNetwork {
    client: Client,
}

impl HttpNetwork {
    pub fn new(config: &NetworkConfig) -> ProxyResult<Self> {
        Ok(Self {
            client: create_client(config)?,
        })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &ProxyRequest) -> ProxyResult<StoredResponse> {
        let response = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone())
            .body(request.body.clone())
            .send()
            .await?;

        let status = response.status();
        let final_url = response.url().to_string();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        debug!(
            method = %request.method,
            url = %request.url,
            status = status.as_u16(),
            bytes = body.len(),
            "Network fetch completed"
        );

        Ok(StoredResponse::new(final_url, status, &headers, body))
    }
}
