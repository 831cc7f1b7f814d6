//! Runs Hub - paginated, cached listing of test runs
//!
//! Serves test run records stored as JSON blobs in Azure Blob Storage,
//! filtered and paginated, with a file-backed result cache in front.

mod config;
mod cursor;
mod error;
mod layout;
mod listing;
mod server;
mod types;

use crate::config::Config;
use crate::error::Result;
use crate::server::{start_server, ServerState, SharedState};
use blob_listing::BlobStore;
use runs_cache::RunsCache;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let env_filter = EnvFilter::from_default_env()
        .add_directive("runs_hub=info".parse()?)
        .add_directive("runs_cache=info".parse()?)
        .add_directive("blob_listing=info".parse()?);

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    };

    info!("Starting Runs Hub...");

    let config = Config::from_env();
    info!(
        port = config.port,
        account = %config.storage_account,
        container = %config.container,
        prefix = %config.prefix,
        "Storage configured"
    );
    info!(
        cache_file = ?config.cache_file,
        ttl_secs = config.cache_ttl_secs,
        max_entries = config.cache_max_entries,
        index_enabled = config.index_enabled,
        "Cache configured"
    );

    let store: Arc<dyn BlobStore> = Arc::new(config.blob_store()?);
    let cache = Arc::new(RunsCache::open(config.cache_config()).await);

    let port = config.port;
    let state: SharedState = Arc::new(ServerState::new(config, store, cache.clone()));

    // Runs until Ctrl-C or SIGTERM
    let served = start_server(state, port).await;

    cache.close().await;

    served?;
    Ok(())
}
