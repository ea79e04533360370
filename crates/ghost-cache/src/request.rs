//! # Requests and Stored Responses
//!
//! Request identity, the forwarded request, and the response payload kept in
//! a cache bucket.

use std::fmt;

use bytes::Bytes;
use reqwest::header::{CONTENT_TYPE, ETAG, HeaderMap, HeaderName, HeaderValue, LAST_MODIFIED};
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ProxyResult;

/// Identity of a request inside a bucket: the absolute URL without fragment
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestKey(String);

impl RequestKey {
    /// Resolve a path or URL against the scope
    pub fn resolve(scope: &Url, raw: &str) -> ProxyResult<Self> {
        Ok(Self::from_url(&scope.join(raw)?))
    }

    pub fn from_url(url: &Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Convert to a filename-safe string
    pub fn to_filename(&self) -> String {
        use sha2::{Digest, Sha256};

        let mut hasher = Sha256::new();
        hasher.update(self.0.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A request intercepted on its way to the network
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ProxyRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// A plain `GET` for an absolute URL
    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// A plain `GET` for a path resolved against the scope
    pub fn resolve(scope: &Url, path: &str) -> ProxyResult<Self> {
        Ok(Self::get(scope.join(path)?))
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn key(&self) -> RequestKey {
        RequestKey::from_url(&self.url)
    }

    /// Only `GET` requests can be answered from a bucket
    pub fn is_cacheable(&self) -> bool {
        self.method == Method::GET
    }
}

/// Metadata recorded next to a stored response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMetadata {
    /// When the response was stored, seconds since the epoch
    pub stored_at: u64,
    pub content_type: Option<String>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    /// Body length in bytes
    pub size: u64,
}

impl EntryMetadata {
    pub fn from_headers(headers: &HeaderMap, size: u64) -> Self {
        let header = |name: HeaderName| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string())
        };

        Self {
            stored_at: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            content_type: header(CONTENT_TYPE),
            etag: header(ETAG),
            last_modified: header(LAST_MODIFIED),
            size,
        }
    }
}

/// A response as stored in a bucket or returned by the network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredResponse {
    /// Final URL of the response, after redirects
    pub url: String,
    pub status: u16,
    /// Header list in the order the network returned it, values as raw bytes
    pub headers: Vec<(String, Vec<u8>)>,
    pub metadata: EntryMetadata,
    /// Body bytes, kept out of the serialized metadata
    #[serde(skip)]
    pub body: Bytes,
}

impl StoredResponse {
    pub fn new(url: impl Into<String>, status: StatusCode, headers: &HeaderMap, body: Bytes) -> Self {
        let metadata = EntryMetadata::from_headers(headers, body.len() as u64);
        let headers = headers
            .iter()
            .map(|(name, value)| (name.as_str().to_string(), value.as_bytes().to_vec()))
            .collect();

        Self {
            url: url.into(),
            status: status.as_u16(),
            headers,
            metadata,
            body,
        }
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub fn is_success(&self) -> bool {
        self.status().is_success()
    }

    /// First value of a header, case-insensitive; `None` if it is not text
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .and_then(|(_, v)| std::str::from_utf8(v).ok())
    }

    /// Rebuild a header map, skipping entries that are no longer valid
    pub fn header_map(&self) -> HeaderMap {
        let mut map = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in &self.headers {
            if let (Ok(name), Ok(value)) = (
                name.parse::<HeaderName>(),
                HeaderValue::from_bytes(value),
            ) {
                map.append(name, value);
            }
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope() -> Url {
        Url::parse("http://localhost:8090/").unwrap()
    }

    #[test]
    fn relative_spellings_share_one_key() {
        let a = RequestKey::resolve(&scope(), "icon.svg").unwrap();
        let b = RequestKey::resolve(&scope(), "./icon.svg").unwrap();
        let c = RequestKey::resolve(&scope(), "/icon.svg").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!(a.as_str(), "http://localhost:8090/icon.svg");
    }

    #[test]
    fn fragment_is_not_part_of_identity() {
        let plain = RequestKey::resolve(&scope(), "ghost.html").unwrap();
        let room = RequestKey::resolve(&scope(), "ghost.html#room=abc").unwrap();
        assert_eq!(plain, room);
    }

    #[test]
    fn query_is_part_of_identity() {
        let plain = RequestKey::resolve(&scope(), "ghost.html").unwrap();
        let query = RequestKey::resolve(&scope(), "ghost.html?v=2").unwrap();
        assert_ne!(plain, query);
    }

    #[test]
    fn filenames_are_stable_hex() {
        let key = RequestKey::resolve(&scope(), "manifest.json").unwrap();
        let name = key.to_filename();
        assert_eq!(name.len(), 64);
        assert_eq!(name, key.clone().to_filename());
        assert!(name.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn only_get_is_cacheable() {
        let url = scope().join("ghost.html").unwrap();
        assert!(ProxyRequest::get(url.clone()).is_cacheable());
        assert!(!ProxyRequest::new(Method::POST, url.clone()).is_cacheable());
        assert!(!ProxyRequest::new(Method::HEAD, url).is_cacheable());
    }

    #[test]
    fn response_keeps_headers_and_metadata() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("image/svg+xml"));
        headers.insert(ETAG, HeaderValue::from_static("\"abc\""));
        let response = StoredResponse::new(
            "http://localhost:8090/icon.svg",
            StatusCode::OK,
            &headers,
            Bytes::from_static(b"<svg/>"),
        );

        assert!(response.is_success());
        assert_eq!(response.header("Content-Type"), Some("image/svg+xml"));
        assert_eq!(response.metadata.etag.as_deref(), Some("\"abc\""));
        assert_eq!(response.metadata.size, 6);
        assert_eq!(response.header_map().len(), 2);
    }

    #[test]
    fn non_ascii_header_bytes_are_kept() {
        let raw: &[u8] = b"attachment; filename=caf\xe9.txt";
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        headers.insert(
            reqwest::header::CONTENT_DISPOSITION,
            HeaderValue::from_bytes(raw).unwrap(),
        );

        let response = StoredResponse::new(
            "http://localhost:8090/report.txt",
            StatusCode::OK,
            &headers,
            Bytes::from_static(b"report"),
        );

        let rebuilt = response.header_map();
        assert_eq!(rebuilt.len(), 2);
        assert_eq!(
            rebuilt
                .get(reqwest::header::CONTENT_DISPOSITION)
                .unwrap()
                .as_bytes(),
            raw
        );
        assert_eq!(response.header("content-type"), Some("text/plain"));
    }
}
