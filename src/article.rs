//! # Article model
//! Classified news items and the content fingerprint used as cache and
//! dedup key.
//!
//! `id` is derived from the normalized URL plus the normalized title, so the
//! same story re-fetched (or syndicated under the same link) always maps to
//! the same key.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Classifier sentiment for one article.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Bullish,
    Bearish,
    Neutral,
}

impl Sentiment {
    /// Direction contribution: +1 / -1 / 0.
    pub fn sign(self) -> f64 {
        match self {
            Sentiment::Bullish => 1.0,
            Sentiment::Bearish => -1.0,
            Sentiment::Neutral => 0.0,
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Sentiment::Bullish => "bullish",
            Sentiment::Bearish => "bearish",
            Sentiment::Neutral => "neutral",
        };
        f.write_str(s)
    }
}

impl FromStr for Sentiment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bullish" => Ok(Sentiment::Bullish),
            "bearish" => Ok(Sentiment::Bearish),
            "neutral" => Ok(Sentiment::Neutral),
            other => Err(ConfigError::InvalidSentiment {
                value: other.to_string(),
            }),
        }
    }
}

/// Impact tier assigned by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    High,
    Medium,
    Low,
}

impl Impact {
    /// Fixed numeric weight used by the scorer.
    pub fn weight(self) -> f64 {
        match self {
            Impact::High => 1.0,
            Impact::Medium => 0.55,
            Impact::Low => 0.25,
        }
    }
}

/// One classified news item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: String,
    /// Canonical source (highest authority among contributors after dedup).
    pub source: String,
    pub url: String,
    pub title: String,
    pub published_at: DateTime<Utc>,
    pub fetched_at: DateTime<Utc>,
    pub sentiment: Sentiment,
    pub impact: Impact,
    pub assets: BTreeSet<String>,
    pub actionable: bool,
    pub summary: String,
    /// Every source that reported this story (always contains `source`).
    #[serde(default)]
    pub sources: BTreeSet<String>,
}

impl Article {
    /// Builder-ish constructor used by classifiers and tests.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: impl Into<String>,
        url: impl Into<String>,
        title: impl Into<String>,
        published_at: DateTime<Utc>,
        fetched_at: DateTime<Utc>,
        sentiment: Sentiment,
        impact: Impact,
        assets: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> Self {
        let source = source.into();
        let url = url.into();
        let title = title.into();
        let assets: BTreeSet<String> = assets
            .into_iter()
            .map(|a| normalize_asset(a.as_ref()))
            .filter(|a| !a.is_empty())
            .collect();
        let mut sources = BTreeSet::new();
        sources.insert(source.clone());
        Self {
            id: fingerprint(&url, &title),
            actionable: !assets.is_empty(),
            summary: title.clone(),
            source,
            url,
            title,
            published_at,
            fetched_at,
            sentiment,
            impact,
            assets,
            sources,
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    pub fn with_actionable(mut self, actionable: bool) -> Self {
        self.actionable = actionable;
        self
    }

    /// Age relative to `now`; negative for future-dated items.
    pub fn age_secs(&self, now: DateTime<Utc>) -> i64 {
        (now - self.published_at).num_seconds()
    }
}

/// Tickers are compared upper-case and trimmed.
pub fn normalize_asset(s: &str) -> String {
    s.trim().to_ascii_uppercase()
}

/// Stable content fingerprint: SHA-256 over normalized URL + title, 32 hex chars.
pub fn fingerprint(url: &str, title: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(normalize_url(url).as_bytes());
    hasher.update(b"\n");
    hasher.update(normalize_title(title).as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(32);
    for b in digest.iter().take(16) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Lower-case, drop scheme / `www.` / fragment / `utm_*` params / trailing slash.
pub fn normalize_url(url: &str) -> String {
    let mut s = url.trim().to_ascii_lowercase();
    for scheme in ["https://", "http://"] {
        if let Some(rest) = s.strip_prefix(scheme) {
            s = rest.to_string();
            break;
        }
    }
    if let Some(rest) = s.strip_prefix("www.") {
        s = rest.to_string();
    }
    if let Some(pos) = s.find('#') {
        s.truncate(pos);
    }
    if let Some(pos) = s.find('?') {
        let query = s[pos + 1..].to_string();
        s.truncate(pos);
        let kept: Vec<&str> = query
            .split('&')
            .filter(|kv| !kv.is_empty() && !kv.starts_with("utm_"))
            .collect();
        if !kept.is_empty() {
            s.push('?');
            s.push_str(&kept.join("&"));
        }
    }
    while s.ends_with('/') {
        s.pop();
    }
    s
}

/// Lower-case, punctuation to spaces, collapse whitespace.
pub fn normalize_title(title: &str) -> String {
    let lowered: String = title
        .chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_lowercase().next().unwrap_or(c)
            } else {
                ' '
            }
        })
        .collect();
    lowered.split_whitespace().collect::<Vec<_>>().join(" ")
}
