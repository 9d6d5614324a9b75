//! News Signal Service — Binary Entrypoint
//! Boots the scheduled pipeline and the Axum HTTP server on top of it.

use std::sync::Arc;

use anyhow::Context;
use shuttle_axum::ShuttleAxum;
use tokio::sync::watch;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use news_signal_engine::classify::KeywordClassifier;
use news_signal_engine::config::load_pipeline_config_default;
use news_signal_engine::ingest::providers::HttpRssFeed;
use news_signal_engine::ingest::{spawn_scheduler, LatestReport};
use news_signal_engine::metrics::Metrics;
use news_signal_engine::Pipeline;

/// Enable compact tracing logs in development only.
/// Activation requires BOTH:
///   - dev environment (debug build OR SHUTTLE_ENV in {local, development, dev})
///   - NEWS_SIGNAL_DEV_LOG=1
fn enable_dev_tracing() {
    let dev_flag = std::env::var("NEWS_SIGNAL_DEV_LOG")
        .ok()
        .is_some_and(|v| v == "1");

    let is_dev_env = cfg!(debug_assertions)
        || matches!(
            std::env::var("SHUTTLE_ENV")
                .unwrap_or_default()
                .to_ascii_lowercase()
                .as_str(),
            "local" | "development" | "dev"
        );

    if !(dev_flag && is_dev_env) {
        return;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("news_signal_engine=info,warn"));

    // Shuttle may already own the global subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .try_init();
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    enable_dev_tracing();

    let config = load_pipeline_config_default().context("loading pipeline config")?;
    let metrics = Metrics::init(config.cache_ttl())?;

    let feed = HttpRssFeed::new(config.fetch_timeout())?;
    let every = config.schedule_interval();
    let pipeline = Pipeline::new(config, Arc::new(feed), Arc::new(KeywordClassifier::new()))
        .context("invalid pipeline config")?;
    let pipeline = Arc::new(pipeline);

    let latest = LatestReport::new();
    // Dropping the sender leaves the scheduler running for the life of the process.
    let (_stop_tx, stop_rx) = watch::channel(false);
    spawn_scheduler(Arc::clone(&pipeline), every, latest.clone(), stop_rx);

    tracing::info!(target: "api", every_secs = every.as_secs(), "scheduler started");

    let router = news_signal_engine::app(pipeline, latest, Some(&metrics));
    Ok(router.into())
}
