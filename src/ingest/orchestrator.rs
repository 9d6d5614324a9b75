// src/ingest/orchestrator.rs
//! Parallel, bounded, per-source-timeout fetching.
//!
//! One task per source, at most `concurrency` in flight. Each task fetches,
//! classifies (or reuses a cached classification) and publishes its articles
//! into the `ArticleCache` before reporting back. A failing source never
//! aborts the others; it is reported in `FetchOutcome::failures`.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::article::Article;
use crate::cache::ArticleCache;
use crate::classify::{classification_failed, Classifier};
use crate::error::{ClassificationError, RunError, SourceError};

use super::types::{RawArticle, SourceDescriptor, SourceFeed};

/// One source that produced nothing this run.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SourceFailure {
    pub source: String,
    #[serde(serialize_with = "error_string")]
    pub error: SourceError,
}

fn error_string<S: serde::Serializer>(e: &SourceError, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&e.to_string())
}

/// Everything the fetch stage hands downstream.
#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    /// Classified articles from every successful source (not yet deduplicated).
    pub articles: Vec<Article>,
    /// Raw items returned by feeds.
    pub fetched: usize,
    pub cache_hits: usize,
    pub failures: Vec<SourceFailure>,
    pub classification_failures: Vec<ClassificationError>,
    /// Names of sources that completed.
    pub succeeded: Vec<String>,
}

struct SourceBatch {
    articles: Vec<Article>,
    fetched: usize,
    cache_hits: usize,
    classification_failures: Vec<ClassificationError>,
}

pub struct FetchOrchestrator {
    feed: Arc<dyn SourceFeed>,
    classifier: Arc<dyn Classifier>,
    cache: Arc<ArticleCache>,
    concurrency: usize,
    timeout: Duration,
}

impl FetchOrchestrator {
    pub fn new(
        feed: Arc<dyn SourceFeed>,
        classifier: Arc<dyn Classifier>,
        cache: Arc<ArticleCache>,
        concurrency: usize,
        timeout: Duration,
    ) -> Self {
        super::ensure_metrics_described();
        Self {
            feed,
            classifier,
            cache,
            concurrency: concurrency.max(1),
            timeout,
        }
    }

    /// Fetch every source. Completes with partial results on per-source
    /// failure; returns `RunError::Cancelled` (abandoning in-flight tasks)
    /// if `shutdown` resolves first.
    pub async fn run<F>(
        &self,
        sources: &[SourceDescriptor],
        now: DateTime<Utc>,
        shutdown: F,
    ) -> Result<FetchOutcome, RunError>
    where
        F: Future<Output = ()>,
    {
        let permits = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks: JoinSet<(String, Result<SourceBatch, SourceError>)> = JoinSet::new();

        for src in sources.iter().cloned() {
            let permits = Arc::clone(&permits);
            let feed = Arc::clone(&self.feed);
            let classifier = Arc::clone(&self.classifier);
            let cache = Arc::clone(&self.cache);
            let timeout = self.timeout;
            tasks.spawn(async move {
                let name = src.name.clone();
                let _permit = match permits.acquire_owned().await {
                    Ok(p) => p,
                    Err(e) => {
                        let err = SourceError::Aborted {
                            reason: e.to_string(),
                        };
                        return (name, Err(err));
                    }
                };
                let res = fetch_one(feed.as_ref(), classifier.as_ref(), &cache, &src, timeout, now).await;
                (name, res)
            });
        }

        let mut out = FetchOutcome::default();
        let mut reported: Vec<String> = Vec::with_capacity(sources.len());
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    tasks.abort_all();
                    tracing::warn!(
                        target: "ingest",
                        completed = reported.len(),
                        total = sources.len(),
                        "fetch cancelled; abandoning in-flight sources"
                    );
                    return Err(RunError::Cancelled);
                }
                next = tasks.join_next() => {
                    let Some(joined) = next else { break };
                    match joined {
                        Ok((name, Ok(batch))) => {
                            out.fetched += batch.fetched;
                            out.cache_hits += batch.cache_hits;
                            out.articles.extend(batch.articles);
                            out.classification_failures.extend(batch.classification_failures);
                            out.succeeded.push(name.clone());
                            reported.push(name);
                        }
                        Ok((name, Err(error))) => {
                            record_failure(&name, &error);
                            out.failures.push(SourceFailure { source: name.clone(), error });
                            reported.push(name);
                        }
                        Err(e) => {
                            tracing::warn!(target: "ingest", error = %e, "fetch task join error");
                        }
                    }
                }
            }
        }

        // A task that panicked never reported; surface it as failed.
        for src in sources {
            if !reported.contains(&src.name) {
                let error = SourceError::Aborted {
                    reason: "fetch task did not complete".into(),
                };
                record_failure(&src.name, &error);
                out.failures.push(SourceFailure {
                    source: src.name.clone(),
                    error,
                });
            }
        }

        // Completion order is not observable downstream.
        out.failures.sort_by(|a, b| a.source.cmp(&b.source));
        out.succeeded.sort();
        out.articles.sort_by(|a, b| a.id.cmp(&b.id).then_with(|| a.source.cmp(&b.source)));

        tracing::info!(
            target: "ingest",
            sources = sources.len(),
            ok = out.succeeded.len(),
            failed = out.failures.len(),
            fetched = out.fetched,
            cache_hits = out.cache_hits,
            "fetch stage done"
        );
        Ok(out)
    }
}

fn record_failure(name: &str, error: &SourceError) {
    tracing::warn!(target: "ingest", source = %name, error = %error, "source failed");
    counter!("ingest_source_failures_total", "source" => name.to_string()).increment(1);
}

async fn fetch_one(
    feed: &dyn SourceFeed,
    classifier: &dyn Classifier,
    cache: &ArticleCache,
    src: &SourceDescriptor,
    timeout: Duration,
    now: DateTime<Utc>,
) -> Result<SourceBatch, SourceError> {
    let t0 = Instant::now();
    let raws = match tokio::time::timeout(timeout, feed.fetch(src)).await {
        Err(_) => return Err(SourceError::Timeout { after: timeout }),
        Ok(Err(e)) => {
            return Err(SourceError::Unavailable {
                reason: format!("{e:#}"),
            })
        }
        Ok(Ok(raws)) => raws,
    };
    histogram!("ingest_fetch_ms").record(t0.elapsed().as_secs_f64() * 1000.0);

    let mut batch = SourceBatch {
        articles: Vec::with_capacity(raws.len()),
        fetched: raws.len(),
        cache_hits: 0,
        classification_failures: Vec::new(),
    };

    for raw in &raws {
        // Labels are reused only from this outlet's own copy of the story.
        let cached = cache
            .get(&raw.fingerprint(), now)
            .filter(|c| c.source == raw.source);
        let article = match cached {
            Some(cached) => {
                batch.cache_hits += 1;
                counter!("ingest_cache_hits_total").increment(1);
                refetched(cached, raw)
            }
            None => match classifier.classify(raw) {
                Ok(a) => a,
                Err(e) => {
                    batch
                        .classification_failures
                        .push(classification_failed(classifier, raw, &e));
                    continue;
                }
            },
        };
        if let Err(e) = cache.put(article.clone(), now) {
            tracing::warn!(target: "cache", error = %e, id = %article.id, "cache write failed");
        }
        batch.articles.push(article);
    }

    tracing::debug!(
        target: "ingest",
        source = %src.name,
        items = batch.fetched,
        kept = batch.articles.len(),
        "source fetched"
    );
    Ok(batch)
}

/// Rebuild an article from the fetched item, reusing only the cached labels.
/// Every per-source field comes from `raw`.
fn refetched(cached: Article, raw: &RawArticle) -> Article {
    Article::new(
        raw.source.clone(),
        raw.url.clone(),
        raw.title.clone(),
        raw.published_at,
        raw.fetched_at,
        cached.sentiment,
        cached.impact,
        &cached.assets,
    )
    .with_summary(raw.summary_or_title())
    .with_actionable(cached.actionable)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::DEFAULT_TTL;
    use crate::classify::KeywordClassifier;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    struct MapFeed;

    #[async_trait]
    impl SourceFeed for MapFeed {
        async fn fetch(&self, source: &SourceDescriptor) -> Result<Vec<RawArticle>> {
            match source.key.as_str() {
                "ok" => Ok(vec![RawArticle {
                    source: source.name.clone(),
                    url: "https://ok.test/1".into(),
                    title: "Bitcoin rallies".into(),
                    published_at: now(),
                    fetched_at: now(),
                    summary: None,
                }]),
                "slow" => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(vec![])
                }
                _ => Err(anyhow!("connection refused")),
            }
        }
        fn name(&self) -> &'static str {
            "map"
        }
    }

    fn orch(cache: Arc<ArticleCache>) -> FetchOrchestrator {
        FetchOrchestrator::new(
            Arc::new(MapFeed),
            Arc::new(KeywordClassifier),
            cache,
            2,
            Duration::from_secs(5),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn failures_are_isolated_and_sorted() {
        let cache = Arc::new(ArticleCache::in_memory(DEFAULT_TTL));
        let sources = vec![
            SourceDescriptor::new("slow", "Zeta", "-"),
            SourceDescriptor::new("ok", "CoinDesk", "-"),
            SourceDescriptor::new("down", "Alpha", "-"),
        ];
        let out = orch(Arc::clone(&cache))
            .run(&sources, now(), std::future::pending())
            .await
            .unwrap();

        assert_eq!(out.articles.len(), 1);
        assert_eq!(out.succeeded, vec!["CoinDesk".to_string()]);
        let failed: Vec<_> = out.failures.iter().map(|f| f.source.as_str()).collect();
        assert_eq!(failed, vec!["Alpha", "Zeta"]);
        assert!(matches!(out.failures[1].error, SourceError::Timeout { .. }));
        assert_eq!(cache.len_live(now()), 1);
    }

    #[tokio::test]
    async fn second_run_reuses_cached_classification() {
        let cache = Arc::new(ArticleCache::in_memory(DEFAULT_TTL));
        let sources = vec![SourceDescriptor::new("ok", "CoinDesk", "-")];
        let o = orch(Arc::clone(&cache));
        let first = o.run(&sources, now(), std::future::pending()).await.unwrap();
        let second = o.run(&sources, now(), std::future::pending()).await.unwrap();
        assert_eq!(first.cache_hits, 0);
        assert_eq!(second.cache_hits, 1);
        assert_eq!(first.articles, second.articles);
    }

    #[test]
    fn refetch_keeps_labels_but_takes_fields_from_the_item() {
        let cached = Article::new(
            "CoinDesk",
            "https://wire.test/etf",
            "SEC approves spot ETF",
            now(),
            now(),
            crate::article::Sentiment::Bullish,
            crate::article::Impact::High,
            ["BTC"],
        )
        .with_summary("coindesk text");
        let raw = RawArticle {
            source: "Decrypt".into(),
            url: "https://wire.test/etf".into(),
            title: "SEC approves spot ETF".into(),
            published_at: now() - chrono::Duration::hours(20),
            fetched_at: now(),
            summary: Some("decrypt text".into()),
        };

        let a = refetched(cached, &raw);
        assert_eq!(a.source, "Decrypt");
        assert_eq!(a.summary, "decrypt text");
        assert_eq!(a.published_at, raw.published_at);
        assert_eq!(a.sources.len(), 1);
        assert!(a.sources.contains("Decrypt"));
        assert_eq!(a.sentiment, crate::article::Sentiment::Bullish);
        assert!(a.assets.contains("BTC"));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_the_run() {
        let cache = Arc::new(ArticleCache::in_memory(DEFAULT_TTL));
        let sources = vec![SourceDescriptor::new("slow", "Zeta", "-")];
        let res = orch(cache)
            .run(&sources, now(), tokio::time::sleep(Duration::from_secs(1)))
            .await;
        assert!(matches!(res, Err(RunError::Cancelled)));
    }
}
