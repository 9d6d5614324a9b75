//! # Aggregator
//! Groups deduplicated articles by asset inside the lookback window.
//!
//! Articles outside the window, or removed by the asset / sentiment filter,
//! are dropped before grouping; they are never carried as zero-weight
//! entries. An article mentioning several assets lands in each group with
//! its full weight.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::article::{normalize_asset, Article, Sentiment};

/// Tolerated clock skew (seconds) for articles stamped slightly in the future.
pub const FUTURE_SKEW_SECS: i64 = 5 * 60;

/// Per-run filter inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateQuery {
    pub hours: u32,
    pub asset: Option<String>,
    pub sentiment: Option<Sentiment>,
}

impl Default for AggregateQuery {
    fn default() -> Self {
        Self {
            hours: 24,
            asset: None,
            sentiment: None,
        }
    }
}

impl AggregateQuery {
    pub fn window(&self) -> Duration {
        Duration::hours(i64::from(self.hours))
    }

    /// Oldest `published_at` still inside the window.
    pub fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.window()
    }

    fn in_window(&self, a: &Article, now: DateTime<Utc>) -> bool {
        a.published_at >= self.window_start(now) && a.published_at <= now + Duration::seconds(FUTURE_SKEW_SECS)
    }
}

/// Articles relevant to one asset for this run.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetGroup {
    pub asset: String,
    /// Actionable articles, newest first. These are scored.
    pub articles: Vec<Article>,
    /// Non-actionable mentions; shown for context, never scored.
    pub informational: Vec<Article>,
}

impl AssetGroup {
    pub fn new(asset: impl Into<String>) -> Self {
        Self {
            asset: asset.into(),
            articles: Vec::new(),
            informational: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.articles.is_empty()
    }
}

/// Build one group per asset present after filtering, ordered by ticker.
pub fn aggregate(articles: &[Article], query: &AggregateQuery, now: DateTime<Utc>) -> Vec<AssetGroup> {
    let wanted_asset = query.asset.as_deref().map(normalize_asset);
    let mut groups: BTreeMap<String, AssetGroup> = BTreeMap::new();

    for a in articles {
        if !query.in_window(a, now) {
            continue;
        }
        if query.sentiment.is_some_and(|s| s != a.sentiment) {
            continue;
        }
        for asset in &a.assets {
            if wanted_asset.as_ref().is_some_and(|w| w != asset) {
                continue;
            }
            let g = groups
                .entry(asset.clone())
                .or_insert_with(|| AssetGroup::new(asset.clone()));
            if a.actionable {
                g.articles.push(a.clone());
            } else {
                g.informational.push(a.clone());
            }
        }
    }

    let newest_first = |x: &Article, y: &Article| {
        y.published_at
            .cmp(&x.published_at)
            .then_with(|| x.id.cmp(&y.id))
    };
    groups
        .into_values()
        .map(|mut g| {
            g.articles.sort_by(newest_first);
            g.informational.sort_by(newest_first);
            g
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::article::Impact;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn art(url: &str, hours_ago: i64, sentiment: Sentiment, assets: &[&str]) -> Article {
        let at = now() - Duration::hours(hours_ago);
        Article::new(
            "CoinDesk",
            url,
            url,
            at,
            at,
            sentiment,
            Impact::Medium,
            assets.iter().copied(),
        )
    }

    #[test]
    fn window_excludes_old_articles_entirely() {
        let items = vec![
            art("a", 1, Sentiment::Bullish, &["BTC"]),
            art("b", 25, Sentiment::Bullish, &["BTC"]),
            art("c", 30, Sentiment::Bearish, &["ETH"]),
        ];
        let groups = aggregate(&items, &AggregateQuery::default(), now());
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].asset, "BTC");
        assert_eq!(groups[0].articles.len(), 1);
    }

    #[test]
    fn multi_asset_article_lands_in_each_group() {
        let items = vec![art("a", 1, Sentiment::Bullish, &["BTC", "ETH"])];
        let groups = aggregate(&items, &AggregateQuery::default(), now());
        assert_eq!(
            groups.iter().map(|g| g.asset.as_str()).collect::<Vec<_>>(),
            vec!["BTC", "ETH"]
        );
    }

    #[test]
    fn asset_and_sentiment_filters_apply_before_grouping() {
        let items = vec![
            art("a", 1, Sentiment::Bullish, &["BTC", "ETH"]),
            art("b", 2, Sentiment::Bearish, &["BTC"]),
        ];
        let q = AggregateQuery {
            hours: 24,
            asset: Some("btc".into()),
            sentiment: Some(Sentiment::Bearish),
        };
        let groups = aggregate(&items, &q, now());
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].articles.len(), 1);
        assert_eq!(groups[0].articles[0].url, "b");
    }

    #[test]
    fn non_actionable_articles_are_informational_only() {
        let items = vec![art("a", 1, Sentiment::Bullish, &["BTC"]).with_actionable(false)];
        let groups = aggregate(&items, &AggregateQuery::default(), now());
        assert_eq!(groups.len(), 1);
        assert!(groups[0].is_empty());
        assert_eq!(groups[0].informational.len(), 1);
    }

    #[test]
    fn articles_sorted_newest_first() {
        let items = vec![
            art("old", 10, Sentiment::Bullish, &["BTC"]),
            art("new", 1, Sentiment::Bullish, &["BTC"]),
        ];
        let g = &aggregate(&items, &AggregateQuery::default(), now())[0];
        assert_eq!(g.articles[0].url, "new");
    }
}
