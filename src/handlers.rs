use crate::config::Config;
use crate::coordinator::{IngestCoordinator, IngestSettings};
use crate::db_storage::IngestStorage;
use crate::errors::AppError;
use crate::models::DateRange;
use crate::provider::{MarketDataProvider, ParclService};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{NaiveDate, Utc};
use moka::future::Cache;
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

/// Shared application state.
pub struct AppState {
    /// Database connection pool.
    pub db: PgPool,
    /// Application configuration.
    pub config: Config,
    /// Market-data provider client (market enumeration is cached inside).
    pub provider: Arc<ParclService>,
    /// Run status per session id, backing the poll endpoint.
    /// Value: {"status": "running" | "completed" | "failed", ...}.
    pub run_status_cache: Cache<String, Value>,
}

/// Health check endpoint.
pub async fn health_check() -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "parcl-ingest",
            "version": env!("CARGO_PKG_VERSION"),
        })),
    )
}

/// Overrides accepted by the run trigger; anything omitted falls back to the
/// configured defaults.
#[derive(Debug, Deserialize, Default)]
pub struct StartRunRequest {
    pub region: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub workers: Option<usize>,
}

/// Starts an ingestion run in a background task and returns `202 Accepted`
/// with the session id; progress is served by [`get_run`]. The run itself is
/// long (minutes for a large region), so the request never waits on it.
pub async fn start_run(
    State(state): State<Arc<AppState>>,
    payload: Option<Json<StartRunRequest>>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let request = payload.map(|Json(r)| r).unwrap_or_default();

    let region = request
        .region
        .unwrap_or_else(|| state.config.region.clone());
    if region.trim().is_empty() {
        return Err(AppError::BadRequest("region cannot be empty".to_string()));
    }

    let (default_start, default_end) = state.config.default_date_range();
    let range = DateRange {
        start: request.start_date.unwrap_or(default_start),
        end: request.end_date.unwrap_or(default_end),
    };
    if range.start > range.end {
        return Err(AppError::BadRequest(
            "start_date must not be after end_date".to_string(),
        ));
    }

    let mut settings = IngestSettings::from(&state.config);
    if let Some(workers) = request.workers {
        if workers < 1 {
            return Err(AppError::BadRequest(
                "workers must be at least 1".to_string(),
            ));
        }
        settings.worker_count = workers;
    }

    let session_id = Uuid::new_v4();

    state
        .run_status_cache
        .insert(
            session_id.to_string(),
            json!({
                "status": "running",
                "region": region,
                "date_range": range,
                "started_at": Utc::now(),
            }),
        )
        .await;

    let provider: Arc<dyn MarketDataProvider> = state.provider.clone();
    let sink = Arc::new(IngestStorage::new(state.db.clone()));
    let coordinator = IngestCoordinator::new(provider, sink, settings);
    let status_cache = state.run_status_cache.clone();
    let task_region = region.clone();

    tokio::spawn(async move {
        let status = match coordinator.run_session(&task_region, range, session_id).await {
            Ok(summary) => json!({
                "status": "completed",
                "summary": summary,
            }),
            Err(e) => {
                tracing::error!("Run {} failed: {}", session_id, e);
                json!({
                    "status": "failed",
                    "error": e.to_string(),
                })
            }
        };
        status_cache.insert(session_id.to_string(), status).await;
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "session_id": session_id,
            "status": "running",
            "region": region,
            "date_range": range,
        })),
    ))
}

/// Serves the status (and, once finished, the summary) of one run.
pub async fn get_run(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    match state.run_status_cache.get(&session_id).await {
        Some(status) => Ok(Json(status)),
        None => Err(AppError::NotFound(format!(
            "No run found for session {}",
            session_id
        ))),
    }
}
