//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the cache worker.
use std::sync::Arc;

use crate::tools::{
    FetchParams, PostMessageParams,
    fetch::fetch_impl,
    lifecycle::{activate_impl, install_impl, status_impl},
    message::post_message_impl,
};

use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};
use stash_client::CacheWorker;

/// The main MCP server handler for stash.
#[derive(Clone)]
pub struct StashServer {
    tool_router: ToolRouter<Self>,
    worker: Arc<CacheWorker>,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl StashServer {
    /// Create a new server handler around a constructed worker.
    pub fn new(worker: Arc<CacheWorker>) -> Self {
        Self { tool_router: Self::tool_router(), worker }
    }

    #[tool(description = "Pre-cache the application shell. All-or-nothing: any failed asset aborts the install.")]
    async fn install(&self) -> Result<CallToolResult, McpError> {
        install_impl(&self.worker).await
    }

    #[tool(description = "Delete caches from other versions and start intercepting requests.")]
    async fn activate(&self) -> Result<CallToolResult, McpError> {
        activate_impl(&self.worker).await
    }

    /// Issue a request through the worker.
    ///
    /// GET requests are classified and served network-first (API), cache-first
    /// (static assets and documents), or stale-while-revalidate (map tiles).
    #[tool(description = "Fetch a URL through the offline cache layer. Returns status, source, headers and body.")]
    async fn fetch(&self, params: Parameters<FetchParams>) -> Result<CallToolResult, McpError> {
        fetch_impl(&self.worker, params.0).await
    }

    #[tool(description = "Post a control message: CACHE_PAYLOAD keeps a JSON payload offline, CLEAR_CACHE wipes caches.")]
    async fn post_message(&self, params: Parameters<PostMessageParams>) -> Result<CallToolResult, McpError> {
        post_message_impl(&self.worker, params.0).await
    }

    #[tool(description = "Report lifecycle state, cache namespaces with entry counts, and pending background tasks.")]
    async fn status(&self) -> Result<CallToolResult, McpError> {
        status_impl(&self.worker).await
    }
}

impl ServerHandler for StashServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "stash".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}
