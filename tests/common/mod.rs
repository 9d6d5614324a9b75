// tests/common/mod.rs
//
// Deterministic collaborators for pipeline tests: a feed serving canned
// items per source key and a classifier driven by a lookup table.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use news_signal_engine::classify::Classifier;
use news_signal_engine::config::PipelineConfig;
use news_signal_engine::ingest::{RawArticle, SourceDescriptor, SourceFeed};
use news_signal_engine::risk::RiskRuleSet;
use news_signal_engine::source_weights::SourceWeightsConfig;
use news_signal_engine::{Article, Impact, Pipeline, Sentiment};

pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
}

pub fn hours_ago(h: i64) -> DateTime<Utc> {
    now() - chrono::Duration::hours(h)
}

pub fn raw(source: &str, url: &str, title: &str, published_at: DateTime<Utc>) -> RawArticle {
    RawArticle {
        source: source.into(),
        url: url.into(),
        title: title.into(),
        published_at,
        fetched_at: now(),
        summary: Some(format!("{title} ({source})")),
    }
}

#[derive(Clone)]
pub enum Behavior {
    Items(Vec<RawArticle>),
    Fail(String),
    Slow(Duration, Vec<RawArticle>),
}

#[derive(Default)]
pub struct StubFeed {
    by_key: HashMap<String, Behavior>,
    pub calls: AtomicUsize,
}

impl StubFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, b: Behavior) -> Self {
        self.by_key.insert(key.to_string(), b);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceFeed for StubFeed {
    async fn fetch(&self, source: &SourceDescriptor) -> Result<Vec<RawArticle>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.by_key.get(&source.key) {
            Some(Behavior::Items(v)) => Ok(v.clone()),
            Some(Behavior::Fail(reason)) => Err(anyhow!("{reason}")),
            Some(Behavior::Slow(d, v)) => {
                tokio::time::sleep(*d).await;
                Ok(v.clone())
            }
            None => Err(anyhow!("unreachable host for '{}'", source.key)),
        }
    }

    fn name(&self) -> &'static str {
        "stub"
    }
}

/// Classification looked up by URL; unknown URLs fail.
#[derive(Default)]
pub struct TableClassifier {
    table: HashMap<String, (Sentiment, Impact, Vec<String>)>,
}

impl TableClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: &str, s: Sentiment, i: Impact, assets: &[&str]) -> Self {
        self.table.insert(
            url.to_string(),
            (s, i, assets.iter().map(|a| a.to_string()).collect()),
        );
        self
    }
}

impl Classifier for TableClassifier {
    fn classify(&self, raw: &RawArticle) -> Result<Article> {
        let Some((s, i, assets)) = self.table.get(&raw.url) else {
            bail!("no label for {}", raw.url);
        };
        let summary = raw.summary.clone().unwrap_or_else(|| raw.title.clone());
        Ok(Article::new(
            raw.source.clone(),
            raw.url.clone(),
            raw.title.clone(),
            raw.published_at,
            raw.fetched_at,
            *s,
            *i,
            assets,
        )
        .with_summary(summary))
    }

    fn name(&self) -> &'static str {
        "table"
    }
}

pub fn sources() -> Vec<SourceDescriptor> {
    vec![
        SourceDescriptor::new("coindesk", "CoinDesk", "stub://coindesk"),
        SourceDescriptor::new("theblock", "The Block", "stub://theblock"),
        SourceDescriptor::new("decrypt", "Decrypt", "stub://decrypt"),
    ]
}

pub fn config(sources: Vec<SourceDescriptor>) -> PipelineConfig {
    PipelineConfig {
        sources,
        fetch_timeout_secs: 5,
        ..PipelineConfig::default()
    }
}

pub fn pipeline(cfg: PipelineConfig, feed: StubFeed, classifier: TableClassifier) -> Pipeline {
    Pipeline::new(cfg, Arc::new(feed), Arc::new(classifier))
        .expect("valid config")
        .with_authority(SourceWeightsConfig::default_seed())
        .with_risk_rules(RiskRuleSet::default_seed())
}

/// Three-outlet BTC story set plus one neutral ETH item.
pub fn btc_eth_fixture() -> (StubFeed, TableClassifier) {
    let feed = StubFeed::new()
        .with(
            "coindesk",
            Behavior::Items(vec![
                raw("CoinDesk", "https://coindesk.test/etf", "Spot bitcoin ETF inflows hit record", now()),
                raw("CoinDesk", "https://coindesk.test/eth", "Ethereum developers schedule call", now()),
            ]),
        )
        .with(
            "theblock",
            Behavior::Items(vec![raw(
                "The Block",
                "https://theblock.test/miners",
                "Miners hold as hashrate climbs",
                now(),
            )]),
        )
        .with(
            "decrypt",
            Behavior::Items(vec![raw(
                "Decrypt",
                "https://decrypt.test/whale",
                "Whale moves coins to exchange",
                now(),
            )]),
        );
    let classifier = TableClassifier::new()
        .with("https://coindesk.test/etf", Sentiment::Bullish, Impact::High, &["BTC"])
        .with("https://theblock.test/miners", Sentiment::Bullish, Impact::High, &["BTC"])
        .with("https://decrypt.test/whale", Sentiment::Bearish, Impact::Low, &["BTC"])
        .with("https://coindesk.test/eth", Sentiment::Neutral, Impact::Medium, &["ETH"]);
    (feed, classifier)
}
