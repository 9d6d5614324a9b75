// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod aggregate;
pub mod api;
pub mod article;
pub mod cache;
pub mod classify;
pub mod config;
pub mod dedup;
pub mod error;
pub mod ingest;
pub mod metrics;
pub mod pipeline;
pub mod risk;
pub mod scoring;
pub mod signal;
pub mod source_weights;

use std::sync::Arc;

use axum::Router;

// ---- Re-exports for stable public API ----
pub use crate::api::{router, AppState};
pub use crate::article::{Article, Impact, Sentiment};
pub use crate::cache::ArticleCache;
pub use crate::config::PipelineConfig;
pub use crate::error::{ClassificationError, ConfigError, RunError, SourceError};
pub use crate::ingest::LatestReport;
pub use crate::pipeline::{EmptyReason, Pipeline, RunReport, RunSummary};
pub use crate::signal::{Direction, KeyDriver, Signal};

/// Full HTTP app: API routes plus `/metrics` when an exporter is installed.
pub fn app(pipeline: Arc<Pipeline>, latest: LatestReport, metrics: Option<&metrics::Metrics>) -> Router {
    let api = router(AppState::new(pipeline, latest));
    match metrics {
        Some(m) => api.merge(m.router()),
        None => api,
    }
}
