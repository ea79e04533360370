// Shared fixtures for the unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use url::Url;

use crate::error::{ProxyError, ProxyResult};
use crate::network::Network;
use crate::request::{ProxyRequest, RequestKey, StoredResponse};

pub const SCOPE: &str = "http://localhost:8090/";

pub fn scope() -> Url {
    Url::parse(SCOPE).unwrap()
}

pub fn key(path: &str) -> RequestKey {
    RequestKey::resolve(&scope(), path).unwrap()
}

pub fn request(path: &str) -> ProxyRequest {
    ProxyRequest::resolve(&scope(), path).unwrap()
}

pub fn response(path: &str, body: &str) -> StoredResponse {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    StoredResponse::new(
        key(path).as_str(),
        StatusCode::OK,
        &headers,
        Bytes::from(body.to_string()),
    )
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

#[derive(Clone)]
enum Route {
    Respond(StatusCode, String),
    Unreachable,
}

/// Network double that answers from a route table and counts every call
#[derive(Default)]
pub struct MockNetwork {
    routes: Mutex<HashMap<String, Route>>,
    calls: AtomicUsize,
    log: Mutex<Vec<String>>,
}

impl MockNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Network that serves 200 for each of the given paths
    pub fn serving(paths: &[&str]) -> Self {
        let network = Self::new();
        for path in paths {
            network.respond(path, StatusCode::OK, &format!("body of {path}"));
        }
        network
    }

    pub fn respond(&self, path: &str, status: StatusCode, body: &str) {
        self.routes
            .lock()
            .insert(key(path).as_str().to_string(), Route::Respond(status, body.to_string()));
    }

    pub fn unreachable(&self, path: &str) {
        self.routes
            .lock()
            .insert(key(path).as_str().to_string(), Route::Unreachable);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn calls_to(&self, path: &str) -> usize {
        let target = key(path);
        self.log
            .lock()
            .iter()
            .filter(|url| url.as_str() == target.as_str())
            .count()
    }
}

#[async_trait]
impl Network for MockNetwork {
    async fn fetch(&self, request: &ProxyRequest) -> ProxyResult<StoredResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let url = request.key().as_str().to_string();
        self.log.lock().push(url.clone());

        let route = self.routes.lock().get(&url).cloned();
        match route {
            Some(Route::Respond(status, body)) => {
                let mut headers = HeaderMap::new();
                headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
                Ok(StoredResponse::new(url, status, &headers, Bytes::from(body)))
            }
            Some(Route::Unreachable) => Err(ProxyError::Unreachable(url)),
            None => Ok(StoredResponse::new(
                url,
                StatusCode::NOT_FOUND,
                &HeaderMap::new(),
                Bytes::new(),
            )),
        }
    }
}
