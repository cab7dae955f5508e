//! Control channel: messages posted to the worker by the application.
//!
//! Wire shape is `{"type":"CACHE_PAYLOAD","payload":<json>}` or
//! `{"type":"CLEAR_CACHE"}`.

use futures_util::future::join_all;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use stash_core::{CacheDb, Error, Namespace, Purpose, StoredResponse};

use super::CacheWorker;
use crate::fetch::FetchRequest;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMessage {
    /// Keep an application payload for offline replay.
    CachePayload { payload: serde_json::Value },
    /// Purge every owned namespace, whatever its generation.
    ClearCache,
}

/// Acknowledgement returned by [`CacheWorker::handle_control`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ControlOutcome {
    PayloadStored { url: String, bytes: usize },
    /// `failed` lists the name prefixes whose purge did not complete.
    Cleared { deleted: Vec<String>, failed: Vec<String> },
}

impl CacheWorker {
    /// Deliver a message without waiting for it to be processed.
    ///
    /// Failures are logged only.
    pub fn post_message(&self, message: ControlMessage) {
        let db = self.db.clone();
        let data = self.data.clone();
        let payload_url = self.settings.payload_url.clone();

        self.background.spawn(async move {
            if let Err(e) = apply(&db, &data, &payload_url, message).await {
                tracing::warn!(error = %e, "control message failed");
            }
        });
    }

    /// Process a message and report what it did.
    pub async fn handle_control(&self, message: ControlMessage) -> Result<ControlOutcome, Error> {
        apply(&self.db, &self.data, &self.settings.payload_url, message).await
    }
}

async fn apply(
    db: &CacheDb, data: &Namespace, payload_url: &Url, message: ControlMessage,
) -> Result<ControlOutcome, Error> {
    match message {
        ControlMessage::CachePayload { payload } => {
            let body = serde_json::to_vec(&payload).map_err(|e| Error::Serialization(e.to_string()))?;
            let bytes = body.len();
            let response = StoredResponse::new(
                200,
                vec![("content-type".to_string(), "application/json".to_string())],
                body,
            );
            let key = FetchRequest::get(payload_url.clone()).cache_key();
            data.put(&key, payload_url.as_str(), &response).await?;

            tracing::info!(namespace = data.name(), bytes, "cached offline payload");
            Ok(ControlOutcome::PayloadStored { url: payload_url.to_string(), bytes })
        }
        ControlMessage::ClearCache => {
            let purges = Purpose::ALL.iter().map(|purpose| async move {
                let prefix = purpose.prefix();
                let result = db.delete_namespaces_with_prefix(&prefix).await;
                (prefix, result)
            });
            let results = join_all(purges).await;

            let mut deleted = Vec::new();
            let mut failed = Vec::new();
            for (prefix, result) in results {
                match result {
                    Ok(names) => deleted.extend(names),
                    Err(e) => {
                        tracing::warn!(prefix = %prefix, error = %e, "failed to clear namespaces");
                        failed.push(prefix);
                    }
                }
            }
            deleted.sort();

            tracing::info!(deleted = deleted.len(), failed = failed.len(), "cleared caches");
            Ok(ControlOutcome::Cleared { deleted, failed })
        }
    }
}
