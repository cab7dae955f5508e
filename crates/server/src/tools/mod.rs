//! MCP tool implementations.
//!
//! This module contains all tools exposed by the stash server. Every tool
//! returns its output as pretty-printed JSON text content.

pub mod fetch;
pub mod lifecycle;
pub mod message;

pub use fetch::FetchParams;
pub use message::PostMessageParams;

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use serde::Serialize;
use stash_core::Error;

pub(crate) fn json_result<T: Serialize>(output: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(output)
        .map_err(|e| Error::Serialization(format!("failed to serialize output: {e}")))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}
