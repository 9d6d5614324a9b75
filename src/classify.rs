//! # Classifier
//! Turns a `RawArticle` into a classified `Article` (sentiment, impact,
//! assets, actionable).
//!
//! The classifier is an external collaborator; the pipeline only relies on
//! the `Classifier` trait. `KeywordClassifier` is a deterministic rule engine
//! usable as a default and as a test stub.

use std::collections::BTreeSet;

use anyhow::{bail, Result};
use metrics::counter;

use crate::article::{Article, Impact, Sentiment};
use crate::error::ClassificationError;
use crate::ingest::types::RawArticle;

/// `classify(RawArticle) -> Article`. May fail per article.
pub trait Classifier: Send + Sync {
    fn classify(&self, raw: &RawArticle) -> Result<Article>;
    fn name(&self) -> &'static str;
}

/// Classify a batch; failures are dropped, logged and returned alongside.
pub fn classify_batch(
    classifier: &dyn Classifier,
    raws: &[RawArticle],
) -> (Vec<Article>, Vec<ClassificationError>) {
    let mut ok = Vec::with_capacity(raws.len());
    let mut failed = Vec::new();
    for raw in raws {
        match classifier.classify(raw) {
            Ok(a) => ok.push(a),
            Err(e) => failed.push(classification_failed(classifier, raw, &e)),
        }
    }
    (ok, failed)
}

/// Log + count one failure and turn it into the reportable error.
pub(crate) fn classification_failed(
    classifier: &dyn Classifier,
    raw: &RawArticle,
    e: &anyhow::Error,
) -> ClassificationError {
    tracing::warn!(
        target: "ingest",
        classifier = classifier.name(),
        source = %raw.source,
        url = %raw.url,
        error = %format!("{e:#}"),
        "article dropped: classification failed"
    );
    counter!("ingest_classification_failures_total").increment(1);
    ClassificationError {
        url: raw.url.clone(),
        reason: format!("{e:#}"),
    }
}

const BULLISH_WORDS: &[&str] = &[
    "surge", "surges", "rally", "rallies", "soar", "soars", "jump", "jumps", "gain", "gains",
    "bull", "bullish", "positive", "breakout", "approval", "approved", "inflows", "record high",
    "adoption", "upgrade",
];

const BEARISH_WORDS: &[&str] = &[
    "plunge", "plunges", "crash", "crashes", "dump", "dumps", "fall", "falls", "bear", "bearish",
    "negative", "fear", "hack", "hacked", "exploit", "outflows", "lawsuit", "ban", "liquidation",
    "sell-off",
];

const HIGH_IMPACT_WORDS: &[&str] = &[
    "break", "breaks", "record", "major", "significant", "alert", "urgent", "etf", "sec",
    "hack", "exploit",
];

const MEDIUM_IMPACT_WORDS: &[&str] = &["update", "report", "data", "news", "analysis", "forecast"];

const KNOWN_TICKERS: &[&str] = &[
    "BTC", "ETH", "SOL", "XRP", "ADA", "DOGE", "DOT", "MATIC", "LINK", "AVAX", "UNI", "ATOM",
    "LTC", "BCH", "ETC", "ALGO", "VET", "FIL", "XLM", "HBAR", "NEAR", "APE", "SAND", "MANA",
    "AXS", "GALA",
];

const FULL_NAMES: &[(&str, &str)] = &[
    ("bitcoin", "BTC"),
    ("ethereum", "ETH"),
    ("ether", "ETH"),
    ("solana", "SOL"),
    ("ripple", "XRP"),
    ("cardano", "ADA"),
    ("dogecoin", "DOGE"),
    ("polkadot", "DOT"),
    ("chainlink", "LINK"),
    ("avalanche", "AVAX"),
    ("litecoin", "LTC"),
];

/// Keyword rule engine over title + summary.
#[derive(Debug, Clone, Default)]
pub struct KeywordClassifier;

impl KeywordClassifier {
    pub fn new() -> Self {
        Self
    }
}

fn tokens(s: &str) -> Vec<String> {
    s.split(|c: char| !(c.is_alphanumeric() || c == '-'))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn contains_phrase(lower: &str, words: &[String], phrase: &str) -> bool {
    if phrase.contains(' ') {
        lower.contains(phrase)
    } else {
        words.iter().any(|w| w == phrase)
    }
}

/// Ticker symbols (whole-token, upper-case in source) and full names.
pub fn extract_assets(text: &str) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    for tok in tokens(text) {
        let upper = tok.to_ascii_uppercase();
        // "$BTC" arrives as "BTC"; require the original token to be upper-case
        // so words like "ape" or "sand" don't match.
        if tok == upper && KNOWN_TICKERS.contains(&upper.as_str()) {
            out.insert(upper);
        }
    }
    let lower_words: Vec<String> = tokens(&text.to_lowercase());
    for (name, ticker) in FULL_NAMES {
        if lower_words.iter().any(|w| w == name) {
            out.insert((*ticker).to_string());
        }
    }
    out
}

impl Classifier for KeywordClassifier {
    fn classify(&self, raw: &RawArticle) -> Result<Article> {
        if raw.title.trim().is_empty() {
            bail!("empty title");
        }
        let text = format!("{} {}", raw.title, raw.summary.as_deref().unwrap_or_default());
        let lower = text.to_lowercase();
        let words = tokens(&lower);

        let bull = BULLISH_WORDS
            .iter()
            .filter(|w| contains_phrase(&lower, &words, w))
            .count();
        let bear = BEARISH_WORDS
            .iter()
            .filter(|w| contains_phrase(&lower, &words, w))
            .count();
        let sentiment = match bull.cmp(&bear) {
            std::cmp::Ordering::Greater => Sentiment::Bullish,
            std::cmp::Ordering::Less => Sentiment::Bearish,
            std::cmp::Ordering::Equal => Sentiment::Neutral,
        };

        let impact = if HIGH_IMPACT_WORDS
            .iter()
            .any(|w| contains_phrase(&lower, &words, w))
        {
            Impact::High
        } else if MEDIUM_IMPACT_WORDS
            .iter()
            .any(|w| contains_phrase(&lower, &words, w))
        {
            Impact::Medium
        } else {
            Impact::Low
        };

        let assets = extract_assets(&text);
        Ok(Article::new(
            raw.source.clone(),
            raw.url.clone(),
            raw.title.clone(),
            raw.published_at,
            raw.fetched_at,
            sentiment,
            impact,
            assets,
        )
        .with_summary(raw.summary_or_title()))
    }

    fn name(&self) -> &'static str {
        "keyword"
    }
}
