//! Synthesized responses for when neither network nor cache can answer.

use reqwest::{StatusCode, Url};
use serde::Serialize;

use crate::fetch::FetchResponse;

#[derive(Serialize)]
struct OfflineBody<'a> {
    error: &'a str,
    offline: bool,
    message: &'a str,
}

/// 503 JSON notice for API requests.
pub(crate) fn api_unavailable(url: &Url, error: &str, message: &str) -> FetchResponse {
    let body = serde_json::to_vec(&OfflineBody { error, offline: true, message }).unwrap_or_default();
    FetchResponse::synthetic(url.clone(), StatusCode::SERVICE_UNAVAILABLE, Some("application/json"), body)
}

/// 503 plain-text notice for documents and assets.
pub(crate) fn offline_text(url: &Url) -> FetchResponse {
    FetchResponse::synthetic(url.clone(), StatusCode::SERVICE_UNAVAILABLE, Some("text/plain"), "Offline")
}

/// Empty 404 for tiles, so the map renders a blank square instead of an error.
pub(crate) fn tile_missing(url: &Url) -> FetchResponse {
    FetchResponse::synthetic(url.clone(), StatusCode::NOT_FOUND, None, Vec::new())
}
