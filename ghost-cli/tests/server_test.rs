use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::{
    Router,
    body::Bytes,
    extract::{Request, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use ghost_cache::{
    CacheStorage, FileStorage, HttpNetwork, MemoryStorage, Network, NetworkConfig, OfflineProxy,
    ProxyConfig, ProxyHost, RequestKey, StoredResponse, VersionState,
};
use ghost_cli::{CACHE_STATUS_HEADER, ProxyServer};
use tokio::net::TcpListener;
use url::Url;

#[derive(Clone, Default)]
struct OriginState {
    hits: Arc<AtomicUsize>,
}

async fn origin_handler(State(state): State<OriginState>, request: Request) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);
    match request.uri().path() {
        "/ghost.html" => (
            [(header::CONTENT_TYPE, "text/html")],
            "<html><body>ghost</body></html>",
        )
            .into_response(),
        "/manifest.json" => (
            [(header::CONTENT_TYPE, "application/json")],
            r#"{"name":"ghost"}"#,
        )
            .into_response(),
        "/icon.svg" => ([(header::CONTENT_TYPE, "image/svg+xml")], "<svg/>").into_response(),
        "/other.png" => ([(header::CONTENT_TYPE, "image/png")], "png").into_response(),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn start_origin() -> (SocketAddr, Arc<AtomicUsize>) {
    let state = OriginState::default();
    let hits = state.hits.clone();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = Router::new().fallback(origin_handler).with_state(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, hits)
}

async fn start_front(origin: SocketAddr, generation: &str) -> (ProxyServer, Arc<ProxyHost>) {
    let config = ProxyConfig::builder()
        .with_generation(generation)
        .with_scope(format!("http://{origin}/"))
        .build()
        .unwrap();
    let storage: Arc<dyn CacheStorage> = Arc::new(MemoryStorage::new());
    let network: Arc<dyn Network> = Arc::new(HttpNetwork::new(&NetworkConfig::default()).unwrap());
    let proxy = Arc::new(OfflineProxy::new(config, storage, network.clone()).unwrap());
    let host = Arc::new(ProxyHost::new(network));

    let state = host.deploy(proxy.clone()).await.unwrap();
    assert_eq!(state, VersionState::Active);

    let server = ProxyServer::start(
        "127.0.0.1:0".parse().unwrap(),
        host.clone(),
        proxy.scope().clone(),
    )
    .await
    .unwrap();
    (server, host)
}

#[tokio::test]
async fn precached_asset_is_served_without_origin() {
    let (origin, hits) = start_origin().await;
    let (server, host) = start_front(origin, "ghost-v1").await;

    assert_eq!(host.active_generation().as_deref(), Some("ghost-v1"));
    assert_eq!(hits.load(Ordering::SeqCst), 3);

    let url = Url::parse(&server.url()).unwrap().join("icon.svg").unwrap();
    let response = reqwest::get(url).await.unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(
        response.headers().get(CACHE_STATUS_HEADER).unwrap(),
        "hit"
    );
    assert_eq!(
        response.headers().get(reqwest::header::CONTENT_TYPE).unwrap(),
        "image/svg+xml"
    );
    assert_eq!(response.text().await.unwrap(), "<svg/>");
    assert_eq!(hits.load(Ordering::SeqCst), 3);

    server.shutdown().await;
}

#[tokio::test]
async fn unknown_asset_goes_to_origin_each_time() {
    let (origin, hits) = start_origin().await;
    let (server, _host) = start_front(origin, "ghost-v1").await;
    let url = Url::parse(&server.url()).unwrap().join("other.png").unwrap();

    for expected_hits in [4, 5] {
        let response = reqwest::get(url.clone()).await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        assert_eq!(
            response.headers().get(CACHE_STATUS_HEADER).unwrap(),
            "miss"
        );
        assert_eq!(response.text().await.unwrap(), "png");
        assert_eq!(hits.load(Ordering::SeqCst), expected_hits);
    }

    server.shutdown().await;
}

#[tokio::test]
async fn origin_status_is_passed_through() {
    let (origin, _hits) = start_origin().await;
    let (server, _host) = start_front(origin, "ghost-v1").await;

    let url = Url::parse(&server.url()).unwrap().join("missing.txt").unwrap();
    let response = reqwest::get(url).await.unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
    assert_eq!(
        response.headers().get(CACHE_STATUS_HEADER).unwrap(),
        "miss"
    );

    server.shutdown().await;
}

#[tokio::test]
async fn unreachable_origin_is_a_bad_gateway() {
    // Bind then drop to get a port nobody listens on.
    let dead = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let origin = Url::parse(&format!("http://{dead}/")).unwrap();
    let network: Arc<dyn Network> = Arc::new(HttpNetwork::new(&NetworkConfig::default()).unwrap());
    let host = Arc::new(ProxyHost::new(network));

    let server = ProxyServer::start("127.0.0.1:0".parse().unwrap(), host, origin)
        .await
        .unwrap();

    let url = Url::parse(&server.url()).unwrap().join("ghost.html").unwrap();
    let response = reqwest::get(url).await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_GATEWAY);

    server.shutdown().await;
}

#[tokio::test]
async fn restart_with_origin_down_serves_from_disk() {
    let dead = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let scope = Url::parse(&format!("http://{dead}/")).unwrap();
    let cache_dir = tempfile::tempdir().unwrap();

    // Left behind by an earlier run that installed successfully.
    {
        let storage = FileStorage::new(cache_dir.path()).await.unwrap();
        storage.open("ghost-v1").await.unwrap();
        let key = RequestKey::resolve(&scope, "icon.svg").unwrap();
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            reqwest::header::HeaderValue::from_static("image/svg+xml"),
        );
        let stored = StoredResponse::new(
            key.as_str(),
            reqwest::StatusCode::OK,
            &headers,
            Bytes::from_static(b"<svg/>"),
        );
        storage.put_all("ghost-v1", vec![(key, stored)]).await.unwrap();
    }

    let storage: Arc<dyn CacheStorage> =
        Arc::new(FileStorage::new(cache_dir.path()).await.unwrap());
    let network: Arc<dyn Network> = Arc::new(HttpNetwork::new(&NetworkConfig::default()).unwrap());
    let config = ProxyConfig::builder()
        .with_scope(scope.as_str())
        .build()
        .unwrap();
    let proxy = Arc::new(OfflineProxy::new(config, storage.clone(), network.clone()).unwrap());
    let host = Arc::new(ProxyHost::with_storage(network, storage));

    assert!(host.deploy(proxy.clone()).await.is_err());

    let server = ProxyServer::start(
        "127.0.0.1:0".parse().unwrap(),
        host,
        proxy.scope().clone(),
    )
    .await
    .unwrap();

    let base = Url::parse(&server.url()).unwrap();
    let response = reqwest::get(base.join("icon.svg").unwrap()).await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(
        response.headers().get(CACHE_STATUS_HEADER).unwrap(),
        "hit"
    );
    assert_eq!(response.text().await.unwrap(), "<svg/>");

    let response = reqwest::get(base.join("ghost.html").unwrap()).await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_GATEWAY);

    server.shutdown().await;
}
