// Axum front: every inbound request becomes a fetch signal for the active version.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::{Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use ghost_cache::{FetchOutcome, ProxyHost, ProxyRequest};
use tokio::net::TcpListener;
use tracing::{debug, error};
use url::Url;

use crate::error::Result;

/// Largest request body forwarded to the origin (16 MB).
const MAX_REQUEST_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Response header telling whether the cache answered
pub const CACHE_STATUS_HEADER: &str = "x-ghost-cache";

/// Headers that describe one connection and must not be forwarded
const HOP_BY_HOP: [HeaderName; 7] = [
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

#[derive(Clone)]
struct ServerState {
    host: Arc<ProxyHost>,
    origin: Url,
}

pub struct ProxyServer {
    addr: SocketAddr,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    task: tokio::task::JoinHandle<()>,
}

impl ProxyServer {
    /// Bind `addr` and serve requests through `host`, resolving paths against `origin`
    pub async fn start(addr: SocketAddr, host: Arc<ProxyHost>, origin: Url) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let app = Router::new()
            .fallback(proxy_handler)
            .with_state(ServerState { host, origin });

        let task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
            {
                error!("proxy server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn url(&self) -> String {
        format!("http://{}/", self.addr)
    }

    /// Stop accepting connections and wait for in-flight requests
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        let _ = self.task.await;
    }
}

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(name) || name.as_str() == "keep-alive"
}

/// Translate the inbound request into the request the origin would have seen
async fn to_proxy_request(origin: &Url, request: Request) -> std::result::Result<ProxyRequest, Response> {
    let (parts, body) = request.into_parts();

    // Set path and query on the origin instead of joining, so a path such as
    // `//other.host/` cannot redirect the fetch to another authority.
    let mut url = origin.clone();
    url.set_path(parts.uri.path());
    url.set_query(parts.uri.query());
    url.set_fragment(None);

    let mut headers = HeaderMap::with_capacity(parts.headers.len());
    for (name, value) in parts.headers.iter() {
        if name == header::HOST || is_hop_by_hop(name) {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }

    let body = axum::body::to_bytes(body, MAX_REQUEST_BODY_BYTES)
        .await
        .map_err(|e| {
            (StatusCode::PAYLOAD_TOO_LARGE, format!("request body rejected: {e}")).into_response()
        })?;

    let mut forwarded = ProxyRequest::new(parts.method, url);
    forwarded.headers = headers;
    forwarded.body = body;
    Ok(forwarded)
}

fn to_response(outcome: FetchOutcome) -> Response {
    let cache_status = if outcome.is_cache_hit() { "hit" } else { "miss" };
    let stored = outcome.response;

    let mut resp_headers = HeaderMap::new();
    for (name, value) in stored.header_map().iter() {
        // Length is recomputed from the body we actually send.
        if is_hop_by_hop(name) || name == header::CONTENT_LENGTH {
            continue;
        }
        resp_headers.append(name.clone(), value.clone());
    }
    resp_headers.insert(
        HeaderName::from_static(CACHE_STATUS_HEADER),
        HeaderValue::from_static(cache_status),
    );

    (stored.status(), resp_headers, Body::from(stored.body)).into_response()
}

/// Fallback route: answer every path through the host
async fn proxy_handler(State(state): State<ServerState>, request: Request) -> Response {
    let forwarded = match to_proxy_request(&state.origin, request).await {
        Ok(forwarded) => forwarded,
        Err(response) => return response,
    };

    debug!("proxy request method={} url={}", forwarded.method, forwarded.url);

    match state.host.handle_fetch(forwarded).await {
        Ok(outcome) => to_response(outcome),
        Err(e) => {
            error!("fetch error: {}", e);
            let status = if e.is_network() {
                StatusCode::BAD_GATEWAY
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            (status, format!("error: {e}")).into_response()
        }
    }
}
