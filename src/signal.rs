//! Final per-asset output and its assembly.
//!
//! A `Signal` is advisory only: direction, confidence, the articles that
//! moved it most, and caveats from the risk rule set.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::aggregate::AssetGroup;
use crate::risk::{GroupStats, RiskRuleSet};
use crate::scoring::{ConfidenceScorer, Score, WeightedArticle};

pub use crate::scoring::Direction;

/// Default number of key drivers per signal.
pub const DEFAULT_TOP_K: usize = 3;

/// One rendered driver: canonical summary plus attribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyDriver {
    pub text: String,
    pub source: String,
    /// Other outlets that carried the same story.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub also_reported_by: Vec<String>,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub asset: String,
    pub direction: Direction,
    /// 0..=100.
    pub confidence: u8,
    #[serde(default)]
    pub key_drivers: Vec<KeyDriver>,
    #[serde(default)]
    pub risk_notes: Vec<String>,
    pub article_count: usize,
    /// Non-actionable mentions seen for the asset (context only).
    #[serde(default)]
    pub informational_count: usize,
}

impl Signal {
    /// Directional and at or above `threshold`.
    pub fn is_strong(&self, threshold: u8) -> bool {
        self.direction != Direction::Neutral && self.confidence >= threshold
    }
}

/// Builds signals from scored groups. Pure.
pub struct SignalAssembler<'a> {
    scorer: ConfidenceScorer<'a>,
    risk: &'a RiskRuleSet,
    top_k: usize,
}

impl<'a> SignalAssembler<'a> {
    pub fn new(scorer: ConfidenceScorer<'a>, risk: &'a RiskRuleSet, top_k: usize) -> Self {
        Self {
            scorer,
            risk,
            top_k: top_k.max(1),
        }
    }

    /// `None` when the group has no actionable articles.
    pub fn assemble(&self, group: &AssetGroup) -> Option<Signal> {
        let score = self.scorer.score(group)?;
        Some(self.assemble_scored(group, score))
    }

    pub fn assemble_scored(&self, group: &AssetGroup, score: Score) -> Signal {
        let stats = GroupStats::collect(&self.scorer, group, &score);
        Signal {
            asset: group.asset.clone(),
            direction: score.direction,
            confidence: score.confidence,
            key_drivers: self.key_drivers(group),
            risk_notes: self.risk.evaluate(&stats),
            article_count: group.articles.len(),
            informational_count: group.informational.len(),
        }
    }

    /// Top-K by weight; ties by newer `published_at`, then `id`.
    pub fn key_drivers(&self, group: &AssetGroup) -> Vec<KeyDriver> {
        let mut weighted: Vec<WeightedArticle<'_>> =
            group.articles.iter().map(|a| self.scorer.weigh(a)).collect();
        weighted.sort_by(|x, y| {
            y.weight
                .partial_cmp(&x.weight)
                .unwrap_or(Ordering::Equal)
                .then_with(|| y.article.published_at.cmp(&x.article.published_at))
                .then_with(|| x.article.id.cmp(&y.article.id))
        });
        weighted
            .into_iter()
            .take(self.top_k)
            .map(|w| {
                let a = w.article;
                KeyDriver {
                    text: a.summary.clone(),
                    source: a.source.clone(),
                    also_reported_by: a
                        .sources
                        .iter()
                        .filter(|s| **s != a.source)
                        .cloned()
                        .collect(),
                    url: a.url.clone(),
                }
            })
            .collect()
    }
}
