//! HTTP surface: read-only views over the pipeline.
//!
//! - `GET /health`        liveness
//! - `GET /signals`       signals recomputed from the cache (`asset`, `sentiment`,
//!                        `min_confidence`, `hours` query params)
//! - `GET /report/latest` last scheduled run, 404 until one completes

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;

use crate::config::pipeline::{build_query, check_min_confidence};
use crate::error::ConfigError;
use crate::ingest::LatestReport;
use crate::pipeline::{Pipeline, RunReport};

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub latest: LatestReport,
}

impl AppState {
    pub fn new(pipeline: Arc<Pipeline>, latest: LatestReport) -> Self {
        Self { pipeline, latest }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/signals", get(signals))
        .route("/report/latest", get(latest_report))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
struct SignalParams {
    asset: Option<String>,
    sentiment: Option<String>,
    min_confidence: Option<u32>,
    hours: Option<u32>,
}

/// JSON error body with a status code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl From<ConfigError> for ApiError {
    fn from(e: ConfigError) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.message }));
        (self.status, body).into_response()
    }
}

async fn signals(
    State(state): State<AppState>,
    Query(p): Query<SignalParams>,
) -> Result<Json<RunReport>, ApiError> {
    let cfg = state.pipeline.config();
    let query = build_query(
        p.hours.unwrap_or(cfg.lookback_hours),
        p.asset.as_deref().or(cfg.asset.as_deref()),
        p.sentiment.as_deref().or(cfg.sentiment.as_deref()),
    )?;
    let min_confidence = check_min_confidence(p.min_confidence.unwrap_or(cfg.min_confidence))?;

    let report = state
        .pipeline
        .analyze_cached(&query, min_confidence, chrono::Utc::now());
    tracing::debug!(
        target: "api",
        asset = ?query.asset,
        hours = query.hours,
        signals = report.signals.len(),
        "signals served from cache"
    );
    Ok(Json(report))
}

async fn latest_report(State(state): State<AppState>) -> Result<Json<RunReport>, ApiError> {
    match state.latest.get() {
        Some(r) => Ok(Json(RunReport::clone(&r))),
        None => Err(ApiError {
            status: StatusCode::NOT_FOUND,
            message: "no completed run yet".into(),
        }),
    }
}
