//! Error taxonomy for the signal pipeline.
//!
//! Only `ConfigError` is fatal, and it is raised before any fetch begins.
//! Source and classification failures are isolated per item and reported in
//! the run summary. An empty result set is not an error at all; see
//! `pipeline::EmptyReason`.

use std::time::Duration;

use thiserror::Error;

/// Invalid filter / window / resource values. Surfaced before work starts.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("lookback window must be between 1 and {max} hours, got {hours}")]
    InvalidWindow { hours: u32, max: u32 },
    #[error("min_confidence must be within 0..=100, got {value}")]
    InvalidMinConfidence { value: u32 },
    #[error("fetch concurrency must be at least 1")]
    InvalidConcurrency,
    #[error("fetch timeout must be greater than zero")]
    InvalidTimeout,
    #[error("cache TTL must be greater than zero")]
    InvalidTtl,
    #[error("top_k_drivers must be at least 1")]
    InvalidTopK,
    #[error("asset filter cannot be blank")]
    BlankAssetFilter,
    #[error("unknown sentiment filter '{value}', expected bullish, bearish or neutral")]
    InvalidSentiment { value: String },
    #[error("at least one source must be configured")]
    NoSources,
    #[error("duplicate source key '{key}'")]
    DuplicateSourceKey { key: String },
    #[error("scoring.{name} must be {expected}")]
    InvalidScoringParam {
        name: &'static str,
        expected: &'static str,
    },
    #[error("title_similarity must be within (0, 1]")]
    InvalidTitleSimilarity,
    #[error("failed to load configuration: {reason}")]
    Load { reason: String },
}

/// One source could not be fetched for this run.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("timed out after {}s", .after.as_secs())]
    Timeout { after: Duration },
    #[error("unavailable: {reason}")]
    Unavailable { reason: String },
    #[error("fetch task aborted: {reason}")]
    Aborted { reason: String },
}

/// A single article could not be classified; it is dropped from the run.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("classification failed for '{url}': {reason}")]
pub struct ClassificationError {
    pub url: String,
    pub reason: String,
}

/// Run-level failure. Everything else degrades into the run summary.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("pipeline run was cancelled before all sources completed")]
    Cancelled,
}
