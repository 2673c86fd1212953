mod archive;
mod circuit_breaker;
mod classifier;
mod config;
mod coordinator;
mod db;
mod db_storage;
mod eligibility;
mod errors;
mod handlers;
mod models;
mod provider;
mod timeline;

use axum::{
    routing::{get, post},
    Router,
};
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::db::Database;
use crate::provider::ParclService;

/// Main entry point for the ingestion service.
///
/// Initializes logging, configuration, the database pool, the provider
/// client, and the HTTP trigger surface, then starts the Axum server. The
/// actual ingestion pipeline runs as background tasks spawned by the
/// trigger endpoint.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rust_parcl_ingest=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!("Configuration loaded successfully");

    // Initialize database connection pool
    let db = Database::new(&config.database_url).await?;
    tracing::info!("Database connection pool established");

    // Provider client; market enumeration per region is cached inside
    let provider = Arc::new(ParclService::new(&config));
    tracing::info!("Parcl client initialized: {}", config.parcl_base_url);

    // Run status per session id (24 hour TTL) backing the poll endpoint
    let run_status_cache = Cache::builder()
        .time_to_live(Duration::from_secs(86400))
        .max_capacity(1_000)
        .build();
    tracing::info!("Run status cache initialized");

    // Build application state
    let app_state = Arc::new(crate::handlers::AppState {
        db: db.pool.clone(),
        config: config.clone(),
        provider,
        run_status_cache,
    });

    // Rate limiter on the trigger routes: 2 requests/second per IP, burst of 5
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(2)
            .burst_size(5)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .unwrap(),
    );

    // Trigger routes with security layers
    let protected_routes = Router::new()
        .route("/api/ingest/runs", post(handlers::start_run))
        .route("/api/ingest/runs/:session_id", get(handlers::get_run))
        .layer(
            ServiceBuilder::new()
                // Request size limit: trigger payloads are tiny
                .layer(RequestBodyLimitLayer::new(64 * 1024))
                .layer(GovernorLayer {
                    config: governor_conf,
                }),
        );

    // Build final app with health check (bypasses rate limiting)
    let app = Router::new()
        .route("/health", get(handlers::health_check))
        .merge(protected_routes)
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
