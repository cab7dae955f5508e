//! fetch tool implementation.
//!
//! Issues a request through the worker exactly as the application would, so
//! the caller sees the live, cached, or synthesized offline response.

use std::collections::BTreeMap;

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use stash_client::fetch::{FetchRequest, ResponseSource, parse_request_url};
use stash_client::{CacheWorker, RequestClass};
use stash_core::Error;

use super::json_result;

/// Input parameters for the fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FetchParams {
    /// Absolute URL, or a path resolved against the application origin.
    pub url: String,

    /// HTTP method (default: GET). Only GET requests are intercepted.
    #[serde(default = "default_method")]
    pub method: String,

    /// Treat the request as a top-level page navigation.
    #[serde(default)]
    pub navigate: bool,
}

fn default_method() -> String {
    "GET".into()
}

/// Output structure for the fetch tool.
#[derive(Debug, Clone, Serialize)]
pub struct FetchOutput {
    pub url: String,
    pub method: String,
    pub status: u16,
    /// network, cache, or synthetic
    pub source: ResponseSource,
    /// Classification applied, absent when the request was not intercepted.
    pub class: Option<RequestClass>,
    pub content_type: Option<String>,
    pub headers: BTreeMap<String, String>,
    /// Body decoded as UTF-8, lossy for binary content.
    pub body: String,
    pub body_bytes: usize,
    pub fetch_ms: u64,
}

pub async fn fetch_impl(worker: &CacheWorker, params: FetchParams) -> Result<CallToolResult, McpError> {
    let url = parse_request_url(&params.url, &worker.settings().origin).map_err(Error::from)?;
    let mut request = FetchRequest::with_method(&params.method, url)?;
    request.navigate = params.navigate;

    let class = worker.classify(&request);
    let method = request.method.to_string();
    let response = worker.handle(request).await?;

    let headers = response
        .headers
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string())))
        .collect();

    let output = FetchOutput {
        url: response.url.to_string(),
        method,
        status: response.status.as_u16(),
        source: response.source,
        class,
        content_type: response.content_type().map(str::to_string),
        headers,
        body: String::from_utf8_lossy(&response.bytes).into_owned(),
        body_bytes: response.bytes.len(),
        fetch_ms: response.fetch_ms,
    };

    json_result(&output)
}
