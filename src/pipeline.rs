//! # Pipeline
//! End-to-end run: validate → fetch (writes cache) → dedup → aggregate →
//! score → assemble → filter → sort.
//!
//! Only configuration errors and cancellation fail a run. Source and
//! classification failures land in the `RunSummary`, and an empty result is
//! a normal outcome carrying an `EmptyReason`.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use metrics::{counter, gauge};
use serde::Serialize;

use crate::aggregate::{aggregate, AggregateQuery};
use crate::article::Article;
use crate::cache::{ArticleCache, FileStore};
use crate::classify::Classifier;
use crate::config::PipelineConfig;
use crate::dedup::{Deduplicator, Similarity, TitleSimilarity};
use crate::error::{ConfigError, RunError};
use crate::ingest::{FetchOrchestrator, FetchOutcome, SourceFailure, SourceFeed};
use crate::risk::RiskRuleSet;
use crate::scoring::{ConfidenceScorer, Direction};
use crate::signal::{Signal, SignalAssembler};
use crate::source_weights::SourceWeightsConfig;

/// Why a run produced no signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyReason {
    /// Every configured source failed.
    AllSourcesFailed,
    /// Sources answered but returned nothing usable.
    NoArticles,
    /// Articles existed but none survived the window / asset / sentiment filters.
    FilteredOut,
    /// Signals were scored but all fell below `min_confidence`.
    BelowMinConfidence,
}

/// Run-level summary shown next to the signals.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub long: usize,
    pub short: usize,
    pub neutral: usize,
    /// Directional signals at or above the configured strong threshold.
    pub strong: usize,
    pub sources_total: usize,
    pub failed_sources: Vec<SourceFailure>,
    /// Raw items returned by feeds.
    pub fetched: usize,
    pub cache_hits: usize,
    pub classification_failures: usize,
    /// Records folded into another by dedup.
    pub merged: usize,
    /// Distinct post-dedup articles that backed at least one scored group.
    pub analyzed: usize,
    /// Non-actionable mentions seen in the window.
    pub informational: usize,
    /// Signals dropped by `min_confidence`.
    pub below_min_confidence: usize,
    /// At least one source failed; the signals rest on a subset of sources.
    pub degraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub empty_reason: Option<EmptyReason>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub generated_at: DateTime<Utc>,
    pub signals: Vec<Signal>,
    pub summary: RunSummary,
}

pub struct Pipeline {
    config: PipelineConfig,
    cache: Arc<ArticleCache>,
    feed: Arc<dyn SourceFeed>,
    classifier: Arc<dyn Classifier>,
    authority: SourceWeightsConfig,
    risk: RiskRuleSet,
    similarity: Box<dyn Similarity>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("cache", &self.cache)
            .field("feed", &self.feed.name())
            .field("classifier", &self.classifier.name())
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Validate `config` and build the pipeline. Authority weights and risk
    /// rules come from the configured files, falling back to built-in seeds.
    pub fn new(
        config: PipelineConfig,
        feed: Arc<dyn SourceFeed>,
        classifier: Arc<dyn Classifier>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        crate::ingest::ensure_metrics_described();

        let cache = match &config.cache_dir {
            Some(dir) => {
                let store = FileStore::open(dir).map_err(|e| ConfigError::Load {
                    reason: format!("cache dir {}: {e}", dir.display()),
                })?;
                ArticleCache::new(store, config.cache_ttl())
            }
            None => ArticleCache::in_memory(config.cache_ttl()),
        };
        let authority = SourceWeightsConfig::load_from_file(&config.source_weights_path);
        let risk = RiskRuleSet::load_from_file(&config.risk_rules_path);
        let similarity = TitleSimilarity {
            threshold: config.title_similarity,
            ..TitleSimilarity::default()
        };

        Ok(Self {
            config,
            cache: Arc::new(cache),
            feed,
            classifier,
            authority,
            risk,
            similarity: Box::new(similarity),
        })
    }

    /// Share an existing cache (e.g. between the scheduler and the API).
    pub fn with_cache(mut self, cache: Arc<ArticleCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_authority(mut self, authority: SourceWeightsConfig) -> Self {
        self.authority = authority;
        self
    }

    pub fn with_risk_rules(mut self, risk: RiskRuleSet) -> Self {
        self.risk = risk;
        self
    }

    pub fn with_similarity(mut self, similarity: impl Similarity + 'static) -> Self {
        self.similarity = Box::new(similarity);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<ArticleCache> {
        &self.cache
    }

    /// Full run. Cancelled runs score nothing.
    pub async fn run<F>(&self, now: DateTime<Utc>, shutdown: F) -> Result<RunReport, RunError>
    where
        F: Future<Output = ()>,
    {
        self.config.validate()?;
        let query = self.config.query()?;
        let min_confidence = self.config.min_confidence()?;

        let orchestrator = FetchOrchestrator::new(
            Arc::clone(&self.feed),
            Arc::clone(&self.classifier),
            Arc::clone(&self.cache),
            self.config.fetch_concurrency,
            self.config.fetch_timeout(),
        );
        let fetched = orchestrator.run(&self.config.sources, now, shutdown).await?;

        let FetchOutcome {
            articles,
            fetched: fetched_count,
            cache_hits,
            failures,
            classification_failures,
            succeeded,
        } = fetched;

        let mut report = self.analyze(articles, &query, min_confidence, now);
        let s = &mut report.summary;
        s.sources_total = self.config.sources.len();
        s.fetched = fetched_count;
        s.cache_hits = cache_hits;
        s.classification_failures = classification_failures.len();
        s.degraded = !failures.is_empty();
        if succeeded.is_empty() {
            s.empty_reason = Some(EmptyReason::AllSourcesFailed);
        }
        s.failed_sources = failures;

        self.record_run(&report);
        tracing::info!(
            target: "pipeline",
            signals = report.signals.len(),
            failed_sources = report.summary.failed_sources.len(),
            analyzed = report.summary.analyzed,
            degraded = report.summary.degraded,
            "pipeline run complete"
        );
        Ok(report)
    }

    /// Analysis over whatever the cache currently holds. No fetching.
    pub fn analyze_cached(
        &self,
        query: &AggregateQuery,
        min_confidence: u8,
        now: DateTime<Utc>,
    ) -> RunReport {
        let articles = self.cache.get_all(query.window_start(now), now);
        let mut report = self.analyze(articles, query, min_confidence, now);
        report.summary.sources_total = self.config.sources.len();
        report
    }

    /// Pure analysis stage: dedup → aggregate → score → assemble → filter → sort.
    pub fn analyze(
        &self,
        articles: Vec<Article>,
        query: &AggregateQuery,
        min_confidence: u8,
        now: DateTime<Utc>,
    ) -> RunReport {
        let had_input = !articles.is_empty();
        let dedup = Deduplicator::new(&self.authority, self.similarity.as_ref()).dedup(articles);
        let groups = aggregate(&dedup.articles, query, now);

        let scorer = ConfidenceScorer::new(
            &self.authority,
            self.config.scoring,
            Duration::hours(i64::from(query.hours)),
            now,
        );
        let assembler = SignalAssembler::new(scorer, &self.risk, self.config.top_k_drivers);

        let mut analyzed: BTreeSet<&str> = BTreeSet::new();
        let mut informational: BTreeSet<&str> = BTreeSet::new();
        let mut scored = Vec::with_capacity(groups.len());
        for g in &groups {
            analyzed.extend(g.articles.iter().map(|a| a.id.as_str()));
            informational.extend(g.informational.iter().map(|a| a.id.as_str()));
            if let Some(sig) = assembler.assemble(g) {
                scored.push(sig);
            }
        }

        let scored_count = scored.len();
        let mut signals: Vec<Signal> = scored
            .into_iter()
            .filter(|s| s.confidence >= min_confidence)
            .collect();
        signals.sort_by(|a, b| {
            b.confidence
                .cmp(&a.confidence)
                .then_with(|| a.asset.cmp(&b.asset))
        });

        let mut summary = RunSummary {
            merged: dedup.merged,
            analyzed: analyzed.len(),
            informational: informational.len(),
            below_min_confidence: scored_count - signals.len(),
            ..RunSummary::default()
        };
        let strong_threshold = self.config.scoring.strong_threshold;
        for s in &signals {
            if s.is_strong(strong_threshold) {
                summary.strong += 1;
            }
            match s.direction {
                Direction::Long => summary.long += 1,
                Direction::Short => summary.short += 1,
                Direction::Neutral => summary.neutral += 1,
            }
        }
        if signals.is_empty() {
            summary.empty_reason = Some(if !had_input {
                EmptyReason::NoArticles
            } else if scored_count == 0 {
                EmptyReason::FilteredOut
            } else {
                EmptyReason::BelowMinConfidence
            });
        }

        RunReport {
            generated_at: now,
            signals,
            summary,
        }
    }

    fn record_run(&self, report: &RunReport) {
        counter!("pipeline_runs_total").increment(1);
        counter!("pipeline_signals_total").increment(report.signals.len() as u64);
        gauge!("pipeline_last_run_ts").set(report.generated_at.timestamp().max(0) as f64);
    }
}
