//! Scripted [`Fetcher`] for tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::{self, HeaderMap, HeaderValue};
use tokio::sync::Semaphore;

use super::{FetchError, FetchRequest, FetchResponse, Fetcher, ResponseSource};

#[derive(Clone)]
struct Route {
    status: u16,
    content_type: String,
    body: Bytes,
}

/// Serves canned responses by URL and counts calls.
///
/// Unknown URLs answer 404. `set_offline(true)` or `fail(url)` turn requests
/// into transport failures. `pause()` holds every fetch (after it is counted)
/// until `resume()`.
#[derive(Default)]
pub struct MockFetcher {
    routes: Mutex<HashMap<String, Route>>,
    calls: Mutex<HashMap<String, usize>>,
    failing: Mutex<HashSet<String>>,
    offline: AtomicBool,
    gate: Mutex<Option<Arc<Semaphore>>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(&self, url: &str, status: u16, content_type: &str, body: impl Into<Bytes>) {
        self.routes.lock().unwrap().insert(
            url.to_string(),
            Route { status, content_type: content_type.to_string(), body: body.into() },
        );
    }

    pub fn fail(&self, url: &str) {
        self.failing.lock().unwrap().insert(url.to_string());
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn calls(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    pub fn pause(&self) {
        *self.gate.lock().unwrap() = Some(Arc::new(Semaphore::new(0)));
    }

    pub fn resume(&self) {
        if let Some(gate) = self.gate.lock().unwrap().take() {
            gate.close();
        }
    }
}

#[async_trait::async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        let url = request.url.to_string();
        *self.calls.lock().unwrap().entry(url.clone()).or_default() += 1;

        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            // Closed on resume; the error is the release signal.
            let _ = gate.acquire().await;
        }

        if self.offline.load(Ordering::SeqCst) || self.failing.lock().unwrap().contains(&url) {
            return Err(FetchError::Network(format!("connection refused: {url}")));
        }

        let route = self.routes.lock().unwrap().get(&url).cloned();
        let response = match route {
            Some(route) => {
                let mut headers = HeaderMap::new();
                headers.insert(header::CONTENT_TYPE, HeaderValue::from_str(&route.content_type).unwrap());
                FetchResponse {
                    url: request.url.clone(),
                    status: StatusCode::from_u16(route.status).unwrap(),
                    headers,
                    bytes: route.body,
                    source: ResponseSource::Network,
                    fetch_ms: 1,
                }
            }
            None => FetchResponse {
                url: request.url.clone(),
                status: StatusCode::NOT_FOUND,
                headers: HeaderMap::new(),
                bytes: Bytes::new(),
                source: ResponseSource::Network,
                fetch_ms: 1,
            },
        };

        Ok(response)
    }
}
