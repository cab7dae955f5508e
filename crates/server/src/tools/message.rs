//! post_message tool implementation.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;
use stash_client::{CacheWorker, ControlMessage};
use stash_core::Error;

use super::json_result;

/// Input parameters for the post_message tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PostMessageParams {
    /// Message type: "CACHE_PAYLOAD" or "CLEAR_CACHE".
    #[serde(rename = "type")]
    pub kind: String,

    /// JSON payload to keep for offline use (CACHE_PAYLOAD only).
    #[serde(default)]
    pub payload: Option<serde_json::Value>,

    /// Wait for the message to be processed and return its outcome.
    #[serde(default)]
    pub wait: bool,
}

impl TryFrom<PostMessageParams> for ControlMessage {
    type Error = Error;

    fn try_from(params: PostMessageParams) -> Result<Self, Self::Error> {
        let mut message = json!({ "type": params.kind });
        if let Some(payload) = params.payload {
            message["payload"] = payload;
        }
        serde_json::from_value(message).map_err(|e| Error::InvalidInput(format!("invalid control message: {e}")))
    }
}

pub async fn post_message_impl(worker: &CacheWorker, params: PostMessageParams) -> Result<CallToolResult, McpError> {
    let wait = params.wait;
    let message = ControlMessage::try_from(params)?;

    if wait {
        let outcome = worker.handle_control(message).await?;
        return json_result(&outcome);
    }

    worker.post_message(message);
    json_result(&json!({ "accepted": true }))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use stash_client::fetch::FetchRequest;
    use std::sync::Arc;

    fn params(kind: &str, payload: Option<serde_json::Value>, wait: bool) -> PostMessageParams {
        PostMessageParams { kind: kind.into(), payload, wait }
    }

    #[test]
    fn test_params_convert_to_message() {
        let msg = ControlMessage::try_from(params("CLEAR_CACHE", None, false)).unwrap();
        assert_eq!(msg, ControlMessage::ClearCache);

        let msg = ControlMessage::try_from(params("CACHE_PAYLOAD", Some(json!([1])), false)).unwrap();
        assert_eq!(msg, ControlMessage::CachePayload { payload: json!([1]) });
    }

    #[tokio::test]
    async fn test_unknown_type_is_invalid_input() {
        let worker = worker(Arc::new(StubFetcher::default())).await;

        let err = post_message_impl(&worker, params("SKIP_WAITING", None, true)).await.unwrap_err();
        assert_eq!(err.code.0, -32602);

        let err = post_message_impl(&worker, params("CACHE_PAYLOAD", None, true)).await.unwrap_err();
        assert_eq!(err.code.0, -32602);
    }

    #[tokio::test]
    async fn test_payload_round_trips_offline() {
        let fetcher = Arc::new(StubFetcher::default());
        let worker = worker(fetcher.clone()).await;
        worker.install().await.unwrap();
        worker.activate().await.unwrap();

        let payload = json!({"municipalities": ["Springfield"]});
        let result = post_message_impl(&worker, params("CACHE_PAYLOAD", Some(payload.clone()), true)).await;
        let out = output(&result.unwrap());
        assert_eq!(out["outcome"], "payload_stored");

        set_offline(&fetcher, true);
        let url = worker.settings().payload_url.clone();
        let response = worker.handle(FetchRequest::get(url)).await.unwrap();
        let replayed: serde_json::Value = serde_json::from_slice(&response.bytes).unwrap();
        assert_eq!(replayed, payload);
    }

    #[tokio::test]
    async fn test_fire_and_forget_clear() {
        let worker = worker(Arc::new(StubFetcher::default())).await;
        worker.install().await.unwrap();

        let out = output(&post_message_impl(&worker, params("CLEAR_CACHE", None, false)).await.unwrap());
        assert_eq!(out["accepted"], true);

        worker.settle().await;
        let status = worker.status().await.unwrap();
        assert!(status.namespaces.is_empty());
    }
}
