// src/ingest/providers/rss.rs
use std::collections::HashMap;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use quick_xml::de::from_str;
use serde::Deserialize;
use time::{format_description::well_known::Rfc2822, OffsetDateTime, UtcOffset};

use crate::ingest::normalize_text;
use crate::ingest::types::{RawArticle, SourceDescriptor, SourceFeed};

/// Items taken per feed.
pub const MAX_ITEMS_PER_FEED: usize = 50;
const MAX_TITLE_CHARS: usize = 200;
const MAX_SUMMARY_CHARS: usize = 500;

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}

fn parse_rfc2822(ts: &str) -> Option<DateTime<Utc>> {
    OffsetDateTime::parse(ts.trim(), &Rfc2822)
        .ok()
        .map(|dt| dt.to_offset(UtcOffset::UTC).unix_timestamp())
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
}

fn truncate_chars(s: String, max: usize) -> String {
    if s.chars().count() > max {
        s.chars().take(max).collect()
    } else {
        s
    }
}

/// Parse an RSS 2.0 document into raw articles attributed to `source_name`.
/// Items without a title or link are skipped; a missing or unparseable
/// `pubDate` falls back to `fetched_at`.
pub fn parse_rss(xml: &str, source_name: &str, fetched_at: DateTime<Utc>) -> Result<Vec<RawArticle>> {
    let t0 = std::time::Instant::now();

    let rss: Rss = from_str(xml).with_context(|| format!("parsing {source_name} rss xml"))?;
    let mut out = Vec::with_capacity(rss.channel.item.len().min(MAX_ITEMS_PER_FEED));

    for it in rss.channel.item.into_iter().take(MAX_ITEMS_PER_FEED) {
        let title = normalize_text(it.title.as_deref().unwrap_or_default());
        let url = it.link.as_deref().map(str::trim).unwrap_or_default().to_string();
        if title.is_empty() || url.is_empty() {
            continue;
        }
        let summary = it
            .description
            .as_deref()
            .map(normalize_text)
            .filter(|s| !s.is_empty())
            .map(|s| truncate_chars(s, MAX_SUMMARY_CHARS));

        out.push(RawArticle {
            source: source_name.to_string(),
            url,
            title: truncate_chars(title, MAX_TITLE_CHARS),
            published_at: it
                .pub_date
                .as_deref()
                .and_then(parse_rfc2822)
                .unwrap_or(fetched_at),
            fetched_at,
            summary,
        });
    }

    let ms = t0.elapsed().as_secs_f64() * 1_000.0;
    histogram!("ingest_parse_ms").record(ms);
    counter!("ingest_events_total").increment(out.len() as u64);

    Ok(out)
}

/// Fetches each source's RSS URL over HTTP.
pub struct HttpRssFeed {
    http: reqwest::Client,
}

impl HttpRssFeed {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("news-signal-engine/0.1")
            .connect_timeout(Duration::from_secs(4).min(timeout))
            .timeout(timeout)
            .build()
            .context("building feed http client")?;
        Ok(Self { http })
    }
}

#[async_trait]
impl SourceFeed for HttpRssFeed {
    async fn fetch(&self, source: &SourceDescriptor) -> Result<Vec<RawArticle>> {
        let resp = self
            .http
            .get(&source.url)
            .send()
            .await
            .with_context(|| format!("requesting {}", source.url))?
            .error_for_status()
            .with_context(|| format!("status from {}", source.url))?;
        let body = resp.text().await.context("reading feed body")?;
        parse_rss(&body, &source.name, Utc::now())
    }

    fn name(&self) -> &'static str {
        "http-rss"
    }
}

/// Serves fixed RSS documents keyed by source key. No network.
#[derive(Debug, Clone, Default)]
pub struct StaticFeed {
    docs: HashMap<String, String>,
    fetched_at: Option<DateTime<Utc>>,
}

impl StaticFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_doc(mut self, key: impl Into<String>, xml: impl Into<String>) -> Self {
        self.docs.insert(key.into(), xml.into());
        self
    }

    /// Pin `fetched_at` (and the pubDate fallback) for reproducible runs.
    pub fn fetched_at(mut self, at: DateTime<Utc>) -> Self {
        self.fetched_at = Some(at);
        self
    }
}

#[async_trait]
impl SourceFeed for StaticFeed {
    async fn fetch(&self, source: &SourceDescriptor) -> Result<Vec<RawArticle>> {
        let xml = self
            .docs
            .get(&source.key)
            .ok_or_else(|| anyhow!("no fixture for source '{}'", source.key))?;
        parse_rss(xml, &source.name, self.fetched_at.unwrap_or_else(Utc::now))
    }

    fn name(&self) -> &'static str {
        "static-rss"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const XML: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>t</title>
<item><title>Bitcoin &amp; Ether rally</title><link>https://coindesk.test/a</link>
<pubDate>Sat, 01 Mar 2025 10:00:00 +0000</pubDate>
<description>&lt;p&gt;Prices  jump&lt;/p&gt;</description></item>
<item><title></title><link>https://coindesk.test/empty</link></item>
<item><title>No date here</title><link>https://coindesk.test/b</link></item>
</channel></rss>"#;

    #[test]
    fn parses_items_and_falls_back_on_missing_date() {
        let fetched = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let out = parse_rss(XML, "CoinDesk", fetched).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].title, "Bitcoin & Ether rally");
        assert_eq!(out[0].summary.as_deref(), Some("Prices jump"));
        assert_eq!(
            out[0].published_at,
            Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap()
        );
        assert_eq!(out[1].published_at, fetched);
        assert!(out.iter().all(|a| a.source == "CoinDesk"));
    }

    #[test]
    fn malformed_xml_is_an_error() {
        assert!(parse_rss("<rss><channel>", "X", Utc::now()).is_err());
    }
}
