//! stash server entry point.
//!
//! Boots the cache worker and exposes it as an MCP server on stdio transport.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::Result;
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use stash_client::{CacheWorker, FetchConfig, HttpFetcher, WorkerSettings};
use stash_core::{AppConfig, CacheDb};
use tracing_subscriber::EnvFilter;

mod handler;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;

    if let Some(parent) = config.db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let db = CacheDb::open(&config.db_path).await?;
    let fetcher = HttpFetcher::new(FetchConfig::from(&config))?;
    let settings = WorkerSettings::from_config(&config)?;
    let worker = Arc::new(CacheWorker::new(db, Arc::new(fetcher), settings));

    tracing::info!(
        origin = %config.origin,
        generation = %config.cache_version,
        db = %config.db_path.display(),
        "Starting stash server on stdio transport"
    );

    let handler = handler::StashServer::new(Arc::clone(&worker));
    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    server.waiting().await?;
    worker.settle().await;

    Ok(())
}
