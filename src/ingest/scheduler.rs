// src/ingest/scheduler.rs
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::RunError;
use crate::pipeline::{Pipeline, RunReport};

/// Slot holding the last completed scheduled report. Cheap to clone.
#[derive(Clone, Debug, Default)]
pub struct LatestReport {
    inner: Arc<RwLock<Option<Arc<RunReport>>>>,
}

impl LatestReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<Arc<RunReport>> {
        self.inner
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Replace the slot with a fully built report.
    pub fn publish(&self, report: RunReport) {
        let report = Arc::new(report);
        *self.inner.write().unwrap_or_else(|p| p.into_inner()) = Some(report);
    }
}

/// Resolves once `true` is observed; never resolves if the sender is gone.
async fn stopped(mut rx: watch::Receiver<bool>) {
    if rx.wait_for(|v| *v).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Spawn a periodic pipeline runner. Flip `stop` to `true` to end it; an
/// in-flight run is cancelled and not published.
pub fn spawn_scheduler(
    pipeline: Arc<Pipeline>,
    every: Duration,
    latest: LatestReport,
    stop: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = stopped(stop.clone()) => break,
                _ = ticker.tick() => {}
            }

            match pipeline.run(chrono::Utc::now(), stopped(stop.clone())).await {
                Ok(report) => {
                    tracing::info!(
                        target: "ingest",
                        signals = report.signals.len(),
                        failed = report.summary.failed_sources.len(),
                        "scheduled run published"
                    );
                    latest.publish(report);
                }
                Err(RunError::Cancelled) => break,
                Err(e) => {
                    tracing::warn!(target: "ingest", error = %e, "scheduled run failed");
                }
            }
        }
        tracing::info!(target: "ingest", "scheduler stopped");
    })
}
