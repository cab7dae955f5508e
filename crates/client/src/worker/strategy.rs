//! Caching strategies, one per request class.
//!
//! | class        | strategy                          | cache namespace |
//! |--------------|-----------------------------------|-----------------|
//! | API          | network-first with fallback       | data            |
//! | static/other | cache-first with refill           | static          |
//! | map tile     | stale-while-revalidate            | map-tiles       |
//!
//! Stores and revalidations are detached: the response is handed back to the
//! caller without waiting for them, and their failures are only logged.

use std::sync::Arc;

use reqwest::Url;
use stash_core::{Error, Namespace, StoredResponse, cache::request_key};

use super::{CacheWorker, offline};
use crate::fetch::{FetchRequest, FetchResponse, Fetcher};

impl CacheWorker {
    /// API traffic: live response first, cached copy or offline notice on
    /// transport failure.
    pub(super) async fn network_first(&self, request: &FetchRequest) -> FetchResponse {
        match self.fetcher.fetch(request).await {
            Ok(response) => {
                if response.status.is_success() && self.settings.is_cacheable_route(request.url.path()) {
                    self.store_in_background(&self.data, request, &response, self.settings.max_data_entries);
                }
                response
            }
            Err(e) => {
                tracing::debug!(url = %request.url, error = %e, "network unavailable, trying data cache");
                match lookup(&self.data, &request.url, &request.cache_key()).await {
                    Some(cached) => cached,
                    None => offline::api_unavailable(
                        &request.url,
                        &self.settings.offline_error,
                        &self.settings.offline_message,
                    ),
                }
            }
        }
    }

    /// Static assets and documents: cache hit skips the network entirely.
    pub(super) async fn cache_first(&self, request: &FetchRequest) -> FetchResponse {
        if let Some(cached) = lookup(&self.static_assets, &request.url, &request.cache_key()).await {
            return cached;
        }

        match self.fetcher.fetch(request).await {
            Ok(response) => {
                if response.status.is_success() && self.settings.classifier.is_cacheable_asset(&request.url) {
                    self.store_in_background(&self.static_assets, request, &response, None);
                }
                response
            }
            Err(e) => {
                tracing::debug!(url = %request.url, error = %e, "network unavailable, static cache miss");
                if request.navigate {
                    let root = &self.settings.root_url;
                    if let Some(shell) = lookup(&self.static_assets, root, &request_key("GET", root.as_str())).await {
                        return shell;
                    }
                }
                offline::offline_text(&request.url)
            }
        }
    }

    /// Map tiles: serve the cached tile now, refresh it for next time.
    pub(super) async fn stale_while_revalidate(&self, request: &FetchRequest) -> FetchResponse {
        if let Some(cached) = lookup(&self.map_tiles, &request.url, &request.cache_key()).await {
            self.revalidate_in_background(request);
            return cached;
        }

        match self.fetcher.fetch(request).await {
            Ok(response) => {
                if response.status.is_success() {
                    self.store_in_background(&self.map_tiles, request, &response, self.settings.max_tile_entries);
                }
                response
            }
            Err(e) => {
                tracing::debug!(url = %request.url, error = %e, "tile unavailable");
                offline::tile_missing(&request.url)
            }
        }
    }

    fn store_in_background(
        &self, namespace: &Namespace, request: &FetchRequest, response: &FetchResponse, cap: Option<usize>,
    ) {
        let namespace = namespace.clone();
        let key = request.cache_key();
        let url = request.url.to_string();
        let stored = response.to_stored();
        let pinned = (namespace.name() == self.data.name()).then(|| self.payload_key());

        self.background.spawn(async move {
            if let Err(e) = store(&namespace, &key, &url, &stored, cap, pinned.as_deref()).await {
                tracing::warn!(namespace = namespace.name(), url = %url, error = %e, "cache store failed");
            }
        });
    }

    fn revalidate_in_background(&self, request: &FetchRequest) {
        let fetcher: Arc<dyn Fetcher> = Arc::clone(&self.fetcher);
        let namespace = self.map_tiles.clone();
        let request = request.clone();
        let cap = self.settings.max_tile_entries;

        self.background.spawn(async move {
            match fetcher.fetch(&request).await {
                Ok(fresh) if fresh.status.is_success() => {
                    let url = request.url.to_string();
                    if let Err(e) = store(&namespace, &request.cache_key(), &url, &fresh.to_stored(), cap, None).await {
                        tracing::debug!(url = %url, error = %e, "tile refresh store failed");
                    }
                }
                Ok(fresh) => {
                    tracing::debug!(url = %request.url, status = fresh.status.as_u16(), "tile refresh not stored");
                }
                Err(e) => {
                    tracing::debug!(url = %request.url, error = %e, "tile refresh failed");
                }
            }
        });
    }
}

/// Cache lookup where a storage error counts as a miss.
async fn lookup(namespace: &Namespace, url: &Url, key: &str) -> Option<FetchResponse> {
    match namespace.match_key(key).await {
        Ok(Some(stored)) => {
            tracing::debug!(namespace = namespace.name(), url = %url, "cache hit");
            Some(FetchResponse::from_stored(url.clone(), stored))
        }
        Ok(None) => {
            tracing::debug!(namespace = namespace.name(), url = %url, "cache miss");
            None
        }
        Err(e) => {
            tracing::warn!(namespace = namespace.name(), url = %url, error = %e, "cache lookup failed");
            None
        }
    }
}

async fn store(
    namespace: &Namespace, key: &str, url: &str, response: &StoredResponse, cap: Option<usize>, pinned: Option<&str>,
) -> Result<(), Error> {
    namespace.put(key, url, response).await?;
    if let Some(max_entries) = cap {
        let trimmed = namespace.trim(max_entries, pinned).await?;
        if trimmed > 0 {
            tracing::debug!(namespace = namespace.name(), trimmed, "trimmed namespace to cap");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use crate::ControlMessage;
    use crate::fetch::mock::MockFetcher;
    use crate::fetch::{FetchRequest, ResponseSource};
    use reqwest::{StatusCode, Url};
    use std::sync::Arc;

    const TILE: &str = "https://a.tile.openstreetmap.org/12/2048/1361.png";

    fn tile_request() -> FetchRequest {
        FetchRequest::get(Url::parse(TILE).unwrap())
    }

    #[tokio::test]
    async fn test_api_cacheable_route_replays_offline() {
        let fetcher = Arc::new(MockFetcher::new());
        let worker = active_worker(fetcher.clone()).await;
        let listing = url("/api/properties?municipality=7");
        let body = "[{\"id\":1,\"owner\":\"Ana\"},{\"id\":2,\"owner\":\"Luis\"}]";
        fetcher.route(listing.as_str(), 200, "application/json", body);

        let live = worker.handle(FetchRequest::get(listing.clone())).await.unwrap();
        assert_eq!(live.source, ResponseSource::Network);
        worker.settle().await;

        fetcher.set_offline(true);
        let replay = worker.handle(FetchRequest::get(listing)).await.unwrap();
        assert_eq!(replay.source, ResponseSource::Cache);
        assert_eq!(replay.status, StatusCode::OK);
        assert_eq!(&replay.bytes[..], body.as_bytes());
        assert_eq!(replay.content_type(), Some("application/json"));
    }

    #[tokio::test]
    async fn test_store_failure_does_not_change_response() {
        let fetcher = Arc::new(MockFetcher::new());
        let worker = active_worker(fetcher.clone()).await;
        worker.db.fail_writes_to("data-v1").await.unwrap();
        worker.db.fail_writes_to("static-v1").await.unwrap();
        let listing = url("/api/properties");
        let script = url("/assets/app.js");
        fetcher.route(listing.as_str(), 200, "application/json", "[7]");
        fetcher.route(script.as_str(), 200, "text/javascript", "boot()");

        let api = worker.handle(FetchRequest::get(listing.clone())).await.unwrap();
        let asset = worker.handle(FetchRequest::get(script.clone())).await.unwrap();

        assert_eq!(api.source, ResponseSource::Network);
        assert_eq!(api.status, StatusCode::OK);
        assert_eq!(&api.bytes[..], b"[7]");
        assert_eq!(asset.source, ResponseSource::Network);
        assert_eq!(&asset.bytes[..], b"boot()");

        worker.settle().await;
        assert_eq!(worker.data.len().await.unwrap(), 0);

        let again = worker.handle(FetchRequest::get(script.clone())).await.unwrap();
        assert_eq!(again.source, ResponseSource::Network);
        assert_eq!(fetcher.calls(script.as_str()), 2);
    }

    #[tokio::test]
    async fn test_data_cap_keeps_offline_payload() {
        let fetcher = Arc::new(MockFetcher::new());
        let mut config = config("v1");
        config.max_data_entries = Some(1);
        route_manifest(&fetcher, &config);
        let db = stash_core::CacheDb::open_in_memory().await.unwrap();
        let worker = worker_with(db, fetcher.clone(), &config).await;
        worker.install().await.unwrap();
        worker.activate().await.unwrap();

        let payload = serde_json::json!({"saved": true});
        worker.handle_control(ControlMessage::CachePayload { payload: payload.clone() }).await.unwrap();
        for id in 0..3 {
            let listing = url(&format!("/api/properties/{id}"));
            fetcher.route(listing.as_str(), 200, "application/json", "{}");
            worker.handle(FetchRequest::get(listing)).await.unwrap();
            worker.settle().await;
        }

        assert_eq!(worker.data.len().await.unwrap(), 1);
        fetcher.set_offline(true);
        let replay = worker.handle(FetchRequest::get(worker.settings().payload_url.clone())).await.unwrap();
        assert_eq!(replay.source, ResponseSource::Cache);
        assert_eq!(serde_json::from_slice::<serde_json::Value>(&replay.bytes).unwrap(), payload);
    }

    #[tokio::test]
    async fn test_api_non_cacheable_route_gives_offline_json() {
        let fetcher = Arc::new(MockFetcher::new());
        let worker = active_worker(fetcher.clone()).await;
        let petitions = url("/api/petitions");
        fetcher.route(petitions.as_str(), 200, "application/json", "[]");

        worker.handle(FetchRequest::get(petitions.clone())).await.unwrap();
        worker.settle().await;
        assert_eq!(worker.data.len().await.unwrap(), 0);

        fetcher.set_offline(true);
        let response = worker.handle(FetchRequest::get(petitions)).await.unwrap();
        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.source, ResponseSource::Synthetic);
        assert_eq!(response.content_type(), Some("application/json"));

        let body: serde_json::Value = serde_json::from_slice(&response.bytes).unwrap();
        assert_eq!(body["offline"], true);
        assert_eq!(body["error"], worker.settings().offline_error.as_str());
        assert_eq!(body["message"], worker.settings().offline_message.as_str());
    }

    #[tokio::test]
    async fn test_api_error_status_passes_through_uncached() {
        let fetcher = Arc::new(MockFetcher::new());
        let worker = active_worker(fetcher.clone()).await;
        let listing = url("/api/municipalities");
        fetcher.route(listing.as_str(), 500, "application/json", "{\"detail\":\"boom\"}");

        let response = worker.handle(FetchRequest::get(listing)).await.unwrap();
        worker.settle().await;

        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(&response.bytes[..], b"{\"detail\":\"boom\"}");
        assert_eq!(worker.data.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_api_always_prefers_network() {
        let fetcher = Arc::new(MockFetcher::new());
        let worker = active_worker(fetcher.clone()).await;
        let listing = url("/api/properties");
        fetcher.route(listing.as_str(), 200, "application/json", "[1]");
        worker.handle(FetchRequest::get(listing.clone())).await.unwrap();
        worker.settle().await;

        fetcher.route(listing.as_str(), 200, "application/json", "[1,2]");
        let response = worker.handle(FetchRequest::get(listing.clone())).await.unwrap();
        worker.settle().await;

        assert_eq!(&response.bytes[..], b"[1,2]");
        assert_eq!(fetcher.calls(listing.as_str()), 2);
    }

    #[tokio::test]
    async fn test_static_hit_makes_no_network_call() {
        let fetcher = Arc::new(MockFetcher::new());
        let worker = active_worker(fetcher.clone()).await;
        let script = url("/assets/app.js");
        fetcher.route(script.as_str(), 200, "text/javascript", "console.log(1)");

        let first = worker.handle(FetchRequest::get(script.clone())).await.unwrap();
        worker.settle().await;
        assert_eq!(first.source, ResponseSource::Network);
        assert_eq!(fetcher.calls(script.as_str()), 1);

        for _ in 0..3 {
            let hit = worker.handle(FetchRequest::get(script.clone())).await.unwrap();
            assert_eq!(hit.source, ResponseSource::Cache);
            assert_eq!(&hit.bytes[..], b"console.log(1)");
        }
        worker.settle().await;
        assert_eq!(fetcher.calls(script.as_str()), 1);
    }

    #[tokio::test]
    async fn test_precached_shell_served_without_network() {
        let fetcher = Arc::new(MockFetcher::new());
        let worker = active_worker(fetcher.clone()).await;
        let before = fetcher.total_calls();

        let response = worker.handle(FetchRequest::navigation(url("/index.html"))).await.unwrap();

        assert_eq!(response.source, ResponseSource::Cache);
        assert_eq!(fetcher.total_calls(), before);
    }

    #[tokio::test]
    async fn test_other_responses_are_not_stored() {
        let fetcher = Arc::new(MockFetcher::new());
        let worker = active_worker(fetcher.clone()).await;
        let page = url("/reports/summary");
        fetcher.route(page.as_str(), 200, "text/html", "<p>report</p>");

        worker.handle(FetchRequest::get(page.clone())).await.unwrap();
        worker.handle(FetchRequest::get(page.clone())).await.unwrap();
        worker.settle().await;

        assert_eq!(fetcher.calls(page.as_str()), 2);
    }

    #[tokio::test]
    async fn test_static_error_status_not_stored() {
        let fetcher = Arc::new(MockFetcher::new());
        let worker = active_worker(fetcher.clone()).await;
        let missing = url("/assets/missing.css");

        let response = worker.handle(FetchRequest::get(missing.clone())).await.unwrap();
        worker.settle().await;
        assert_eq!(response.status, StatusCode::NOT_FOUND);

        worker.handle(FetchRequest::get(missing.clone())).await.unwrap();
        assert_eq!(fetcher.calls(missing.as_str()), 2);
    }

    #[tokio::test]
    async fn test_offline_navigation_gets_cached_root() {
        let fetcher = Arc::new(MockFetcher::new());
        let worker = active_worker(fetcher.clone()).await;
        fetcher.set_offline(true);

        let response = worker.handle(FetchRequest::navigation(url("/petitions/42"))).await.unwrap();

        assert_eq!(response.source, ResponseSource::Cache);
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(&response.bytes[..], b"<html>shell</html>");
    }

    #[tokio::test]
    async fn test_offline_subresource_gets_503_text() {
        let fetcher = Arc::new(MockFetcher::new());
        let worker = active_worker(fetcher.clone()).await;
        fetcher.set_offline(true);

        let response = worker.handle(FetchRequest::get(url("/assets/chunk-9.js"))).await.unwrap();

        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.content_type(), Some("text/plain"));
        assert_eq!(&response.bytes[..], b"Offline");
    }

    #[tokio::test]
    async fn test_offline_navigation_without_shell_gets_503() {
        let fetcher = Arc::new(MockFetcher::new());
        let worker = active_worker(fetcher.clone()).await;
        worker.static_assets.delete(&FetchRequest::get(url("/")).cache_key()).await.unwrap();
        fetcher.set_offline(true);

        let response = worker.handle(FetchRequest::navigation(url("/petitions"))).await.unwrap();
        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(&response.bytes[..], b"Offline");
    }

    #[tokio::test]
    async fn test_tile_miss_fetches_and_stores() {
        let fetcher = Arc::new(MockFetcher::new());
        let worker = active_worker(fetcher.clone()).await;
        fetcher.route(TILE, 200, "image/png", "tile-v1");

        let response = worker.handle(tile_request()).await.unwrap();
        worker.settle().await;

        assert_eq!(response.source, ResponseSource::Network);
        assert_eq!(worker.map_tiles.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_tile_hit_returns_stale_and_refreshes_once_per_request() {
        let fetcher = Arc::new(MockFetcher::new());
        let worker = active_worker(fetcher.clone()).await;
        fetcher.route(TILE, 200, "image/png", "tile-v1");
        worker.handle(tile_request()).await.unwrap();
        worker.settle().await;
        assert_eq!(fetcher.calls(TILE), 1);

        fetcher.route(TILE, 200, "image/png", "tile-v2");
        fetcher.pause();

        let first = worker.handle(tile_request()).await.unwrap();
        let second = worker.handle(tile_request()).await.unwrap();
        assert_eq!(first.source, ResponseSource::Cache);
        assert_eq!(&first.bytes[..], b"tile-v1");
        assert_eq!(&second.bytes[..], b"tile-v1");

        fetcher.resume();
        worker.settle().await;
        assert_eq!(fetcher.calls(TILE), 3);

        let refreshed = worker.handle(tile_request()).await.unwrap();
        assert_eq!(refreshed.source, ResponseSource::Cache);
        assert_eq!(&refreshed.bytes[..], b"tile-v2");
        worker.settle().await;
        assert_eq!(fetcher.calls(TILE), 4);
    }

    #[tokio::test]
    async fn test_tile_refresh_failure_keeps_cached_tile() {
        let fetcher = Arc::new(MockFetcher::new());
        let worker = active_worker(fetcher.clone()).await;
        fetcher.route(TILE, 200, "image/png", "tile-v1");
        worker.handle(tile_request()).await.unwrap();
        worker.settle().await;

        fetcher.set_offline(true);
        let response = worker.handle(tile_request()).await.unwrap();
        worker.settle().await;
        assert_eq!(&response.bytes[..], b"tile-v1");

        fetcher.set_offline(false);
        fetcher.route(TILE, 503, "text/plain", "busy");
        worker.handle(tile_request()).await.unwrap();
        worker.settle().await;

        let response = worker.handle(tile_request()).await.unwrap();
        assert_eq!(&response.bytes[..], b"tile-v1");
    }

    #[tokio::test]
    async fn test_tile_offline_miss_is_empty_404() {
        let fetcher = Arc::new(MockFetcher::new());
        let worker = active_worker(fetcher.clone()).await;
        fetcher.set_offline(true);

        let response = worker.handle(tile_request()).await.unwrap();
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert!(response.bytes.is_empty());
        assert_eq!(response.source, ResponseSource::Synthetic);
    }

    #[tokio::test]
    async fn test_tile_cap_trims_oldest() {
        let fetcher = Arc::new(MockFetcher::new());
        let mut config = config("v1");
        config.max_tile_entries = Some(2);
        route_manifest(&fetcher, &config);
        let db = stash_core::CacheDb::open_in_memory().await.unwrap();
        let worker = worker_with(db, fetcher.clone(), &config).await;
        worker.install().await.unwrap();
        worker.activate().await.unwrap();

        for i in 0..4 {
            let tile = format!("https://a.tile.openstreetmap.org/3/{i}/0.png");
            fetcher.route(&tile, 200, "image/png", "t");
            worker.handle(FetchRequest::get(Url::parse(&tile).unwrap())).await.unwrap();
            worker.settle().await;
        }

        assert_eq!(
            worker.map_tiles.urls().await.unwrap(),
            vec![
                "https://a.tile.openstreetmap.org/3/2/0.png".to_string(),
                "https://a.tile.openstreetmap.org/3/3/0.png".to_string()
            ]
        );
    }
}
