//! HTTP server for the runs hub
//!
//! Provides /api/health and /api/runs, plus the static UI at / and /static.

use crate::config::Config;
use crate::error::Result;
use crate::listing::RunLister;
use crate::types::{HealthResponse, RunsParams};
use axum::{
    extract::{Query, State},
    response::Json,
    routing::get,
    Router,
};
use blob_listing::BlobStore;
use chrono::{DateTime, Utc};
use runs_cache::{RunsCache, RunsResponse};
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tracing::{info, warn};

/// Shared state for the HTTP server
pub struct ServerState {
    pub config: Config,
    pub cache: Arc<RunsCache>,
    pub lister: RunLister,
    pub started_at: DateTime<Utc>,
}

impl ServerState {
    pub fn new(config: Config, store: Arc<dyn BlobStore>, cache: Arc<RunsCache>) -> Self {
        let lister = RunLister::new(store, cache.clone(), config.layout());
        Self {
            config,
            cache,
            lister,
            started_at: Utc::now(),
        }
    }
}

pub type SharedState = Arc<ServerState>;

/// Create the HTTP router
pub fn create_router(state: SharedState) -> Router {
    let static_dir = state.config.static_dir.clone();

    Router::new()
        .route("/api/health", get(health))
        .route("/api/runs", get(list_runs))
        .route_service("/", ServeFile::new(static_dir.join("index.html")))
        .nest_service("/static", ServeDir::new(static_dir))
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the HTTP server and run until Ctrl-C or SIGTERM
pub async fn start_server(state: SharedState, port: u16) -> std::io::Result<()> {
    let router = create_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}

/// Health check endpoint
async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let cache_stats = state.cache.stats().await;
    let uptime_secs = (Utc::now() - state.started_at).num_seconds().max(0) as u64;

    Json(HealthResponse {
        ok: true,
        uptime_secs,
        cache: cache_stats,
    })
}

/// List runs, newest first
async fn list_runs(
    State(state): State<SharedState>,
    Query(params): Query<RunsParams>,
) -> Result<Json<RunsResponse>> {
    let query = params.to_query()?;
    state.config.require_storage()?;

    let response = state.lister.list(&query, params.refresh()).await?;
    Ok(Json(response))
}
