//! Convivencia Backend
//!
//! REST backend for school discipline tracking: records faltas synced from
//! the Phidias platform and derives follow-up case state for moderada ones.

mod api;
mod casos;
mod classify;
mod config;
mod db;
mod errors;
mod models;
mod phidias;
mod sync;
mod terms;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::Config;
use db::Repository;
use phidias::PhidiasClient;
use sync::SyncService;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub sync: Arc<SyncService>,
    pub config: Arc<Config>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env();

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Convivencia Backend");
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Phidias base URL: {}", config.phidias_base_url);
    tracing::info!("Bind address: {}", config.bind_addr);

    // Warn if the Phidias token is not configured
    if config.phidias_token.is_none() {
        tracing::warn!("No Phidias API token configured (PHIDIAS_API_TOKEN). Sync runs will be rejected by the platform!");
    }

    // Initialize database
    let pool = db::init_database(&config.db_path).await?;
    let repo = Arc::new(Repository::new(pool));

    // Initialize the Phidias client and the sync service
    let client = Arc::new(PhidiasClient::new(&config)?);
    let sync = Arc::new(SyncService::new(
        repo.clone(),
        client,
        config.sync_batch_size,
    ));

    // Create application state
    let state = AppState {
        repo,
        sync,
        config: Arc::new(config.clone()),
    };

    // Build router
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // API routes
    let api_routes = Router::new()
        // Sync
        .route("/sync", post(api::trigger_sync))
        .route("/sync/status", get(api::sync_status))
        .route("/sync/runs", get(api::list_sync_runs))
        // Sync configs
        .route("/configs", get(api::list_configs))
        .route("/configs", post(api::create_config))
        // Cases
        .route("/casos", get(api::list_casos))
        .route("/casos/{hash}/seguimientos", post(api::create_seguimiento));

    // Health check
    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests;
