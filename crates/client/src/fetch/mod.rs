//! HTTP fetch pipeline behind the interception layer.
//!
//! ### Transport vs. status
//! - A [`Fetcher`] returns `Err` only for transport failures (DNS, refused
//!   connection, timeout, truncated body).
//! - HTTP error statuses are ordinary responses and are passed through to the
//!   application verbatim.
//!
//! ### Requests
//! - URLs are parsed with [`parse_request_url`]: paths resolve against the
//!   application origin and fragments are removed.
//! - Cache keys are derived from method and canonical URL.

#[cfg(test)]
pub(crate) mod mock;
pub mod url;

use bytes::Bytes;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, StatusCode, Url};
use serde::Serialize;
use std::time::{Duration, Instant};

pub use url::{UrlError, parse_request_url};

use stash_core::{AppConfig, Error, StoredResponse, cache::request_key};

/// Configuration for the HTTP fetcher.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "stash/0.1")
    pub user_agent: String,

    /// Request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self { user_agent: "stash/0.1".to_string(), timeout: Duration::from_millis(20000), max_redirects: 5 }
    }
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self { user_agent: config.user_agent.clone(), timeout: config.timeout(), max_redirects: config.max_redirects }
    }
}

/// A request issued by the application.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: Method,
    pub url: Url,
    /// Top-level document navigation (as opposed to a subresource or XHR).
    pub navigate: bool,
}

impl FetchRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self { method, url, navigate: false }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn navigation(url: Url) -> Self {
        Self { method: Method::GET, url, navigate: true }
    }

    /// Build from a method name, case-insensitive (`"get"`, `"POST"`).
    pub fn with_method(method: &str, url: Url) -> Result<Self, Error> {
        let method = Method::from_bytes(method.trim().to_ascii_uppercase().as_bytes())
            .map_err(|_| Error::InvalidInput(format!("invalid HTTP method: {method:?}")))?;
        Ok(Self::new(method, url))
    }

    /// Cache key for this request.
    pub fn cache_key(&self) -> String {
        request_key(self.method.as_str(), self.url.as_str())
    }
}

/// Where a delivered response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseSource {
    Network,
    Cache,
    Synthetic,
}

/// Response delivered to the application.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// The URL requested (after canonicalization)
    pub url: Url,
    /// HTTP status code
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Response body bytes
    pub bytes: Bytes,
    /// Network, cache, or synthesized offline fallback
    pub source: ResponseSource,
    /// Time taken to fetch in milliseconds (0 unless from the network)
    pub fetch_ms: u64,
}

impl FetchResponse {
    /// Build a locally generated response.
    pub fn synthetic(url: Url, status: StatusCode, content_type: Option<&str>, body: impl Into<Bytes>) -> Self {
        let mut headers = HeaderMap::new();
        if let Some(value) = content_type.and_then(|ct| HeaderValue::from_str(ct).ok()) {
            headers.insert(header::CONTENT_TYPE, value);
        }
        Self { url, status, headers, bytes: body.into(), source: ResponseSource::Synthetic, fetch_ms: 0 }
    }

    /// Rebuild a response from a cache entry.
    ///
    /// Headers that no longer parse are dropped rather than failing the hit.
    pub fn from_stored(url: Url, stored: StoredResponse) -> Self {
        let status = StatusCode::from_u16(stored.status).unwrap_or(StatusCode::OK);
        let mut headers = HeaderMap::new();
        for (name, value) in &stored.headers {
            if let (Ok(name), Ok(value)) = (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
                headers.append(name, value);
            }
        }
        Self { url, status, headers, bytes: Bytes::from(stored.body), source: ResponseSource::Cache, fetch_ms: 0 }
    }

    /// Snapshot for storage in a namespace.
    pub fn to_stored(&self) -> StoredResponse {
        let headers = self
            .headers
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string())))
            .collect();
        StoredResponse::new(self.status.as_u16(), headers, self.bytes.to_vec())
    }

    /// Content-Type header.
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }
}

/// Transport-level failure: the network could not produce any response.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("network error: {0}")]
    Network(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() { FetchError::Timeout(err.to_string()) } else { FetchError::Network(err.to_string()) }
    }
}

impl From<FetchError> for Error {
    fn from(err: FetchError) -> Self {
        Error::Network(err.to_string())
    }
}

/// The real network, as seen by the interception layer.
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    /// Perform the request. `Err` means transport failure only.
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError>;
}

/// reqwest-backed [`Fetcher`].
pub struct HttpFetcher {
    http: Client,
}

impl HttpFetcher {
    /// Create a new fetcher with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { http })
    }
}

#[async_trait::async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        let start = Instant::now();

        let response = self
            .http
            .request(request.method.clone(), request.url.clone())
            .send()
            .await?;

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.bytes().await?;

        let fetch_ms = start.elapsed().as_millis() as u64;

        tracing::debug!(
            "fetched {} {} -> {} in {}ms ({} bytes)",
            request.method,
            request.url,
            status.as_u16(),
            fetch_ms,
            bytes.len()
        );

        Ok(FetchResponse {
            url: request.url.clone(),
            status,
            headers,
            bytes,
            source: ResponseSource::Network,
            fetch_ms,
        })
    }
}
