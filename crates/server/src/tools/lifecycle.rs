//! install, activate and status tools.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use stash_client::CacheWorker;

use super::json_result;

pub async fn install_impl(worker: &CacheWorker) -> Result<CallToolResult, McpError> {
    let outcome = worker.install().await?;
    json_result(&outcome)
}

pub async fn activate_impl(worker: &CacheWorker) -> Result<CallToolResult, McpError> {
    let outcome = worker.activate().await?;
    json_result(&outcome)
}

pub async fn status_impl(worker: &CacheWorker) -> Result<CallToolResult, McpError> {
    let status = worker.status().await?;
    json_result(&status)
}
