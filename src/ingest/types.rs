// src/ingest/types.rs
use anyhow::Result;
use chrono::{DateTime, Utc};

/// Unclassified item as returned by a feed.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct RawArticle {
    pub source: String, // e.g., "CoinDesk", "Decrypt"
    pub url: String,
    pub title: String,
    pub published_at: DateTime<Utc>,
    pub fetched_at: DateTime<Utc>,
    pub summary: Option<String>, // normalized text
}

impl RawArticle {
    /// Same key the classified `Article` will carry.
    pub fn fingerprint(&self) -> String {
        crate::article::fingerprint(&self.url, &self.title)
    }

    /// Driver text for this item: the feed summary, else the title.
    pub fn summary_or_title(&self) -> String {
        self.summary
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| self.title.clone())
    }
}

/// Where and how to fetch one source.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct SourceDescriptor {
    /// Stable key, e.g. "coindesk".
    pub key: String,
    /// Display name used for authority lookup and attribution.
    pub name: String,
    /// Feed location (RSS URL).
    pub url: String,
}

impl SourceDescriptor {
    pub fn new(key: impl Into<String>, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            url: url.into(),
        }
    }
}

/// External feed collaborator: one call per source per run.
#[async_trait::async_trait]
pub trait SourceFeed: Send + Sync {
    async fn fetch(&self, source: &SourceDescriptor) -> Result<Vec<RawArticle>>;
    fn name(&self) -> &'static str;
}
