//! Confidence scoring for one asset group.
//!
//! Per-article weight = `impact × recency × authority`, all in [0,1]:
//! - `impact`    : High 1.0, Medium 0.55, Low 0.25
//! - `recency`   : `1 − (1 − floor) × clamp(age / window, 0, 1)`, floor 0.3
//! - `authority` : source weight from `SourceWeightsConfig`
//!
//! Aggregation:
//! - `net   = Σ sign(sentiment) × weight` (neutral contributes 0)
//! - `total = Σ weight` (neutral included)
//! - `agreement = |net| / total`, `evidence = 1 − exp(−total / evidence_scale)`
//! - direction: long / short when `agreement > deadband`, else neutral
//! - directional confidence `= 100 × √agreement × √evidence`
//! - neutral, neutral articles only: `neutral_scale × evidence` (volume only)
//! - neutral inside the deadband: `min(neutral_scale × evidence,
//!   100 × √agreement × √evidence)`, so conflict suppresses it
//! - neutral confidence is capped at `strong_threshold − 1`
//!
//! A group whose total weight is zero produces no score.
//!
//! Everything here is pure: same group, same `now`, same result.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregate::AssetGroup;
use crate::article::{Article, Impact, Sentiment};
use crate::error::ConfigError;
use crate::source_weights::SourceWeightsConfig;

/// Signal direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Long,
    Short,
    Neutral,
}

/// Scoring constants. Defaults are the documented formula; override only for
/// calibration experiments.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoringParams {
    #[serde(default = "default_recency_floor")]
    pub recency_floor: f64,
    #[serde(default = "default_deadband")]
    pub deadband: f64,
    #[serde(default = "default_evidence_scale")]
    pub evidence_scale: f64,
    #[serde(default = "default_neutral_scale")]
    pub neutral_scale: f64,
    /// Confidence at or above this is a "strong" signal.
    #[serde(default = "default_strong_threshold")]
    pub strong_threshold: u8,
}

fn default_recency_floor() -> f64 {
    0.3
}
fn default_deadband() -> f64 {
    0.15
}
fn default_evidence_scale() -> f64 {
    1.5
}
fn default_neutral_scale() -> f64 {
    50.0
}
fn default_strong_threshold() -> u8 {
    60
}

impl ScoringParams {
    /// Bounds that keep weights in [0,1] and neutral signals below "strong".
    pub fn validate(&self) -> Result<(), ConfigError> {
        let bad = |name, expected| Err(ConfigError::InvalidScoringParam { name, expected });
        if !(0.0..=1.0).contains(&self.recency_floor) {
            return bad("recency_floor", "within [0, 1]");
        }
        if !(0.0..1.0).contains(&self.deadband) {
            return bad("deadband", "within [0, 1)");
        }
        if !(self.evidence_scale.is_finite() && self.evidence_scale > 0.0) {
            return bad("evidence_scale", "a finite value greater than 0");
        }
        if !(0.0..=100.0).contains(&self.neutral_scale) {
            return bad("neutral_scale", "within [0, 100]");
        }
        if !(1..=100).contains(&self.strong_threshold) {
            return bad("strong_threshold", "within 1..=100");
        }
        Ok(())
    }
}

impl Default for ScoringParams {
    fn default() -> Self {
        Self {
            recency_floor: default_recency_floor(),
            deadband: default_deadband(),
            evidence_scale: default_evidence_scale(),
            neutral_scale: default_neutral_scale(),
            strong_threshold: default_strong_threshold(),
        }
    }
}

/// Weight breakdown for one article. Kept for explainability (key drivers).
#[derive(Clone, Copy, Debug)]
pub struct WeightedArticle<'g> {
    pub article: &'g Article,
    pub impact: f64,
    pub recency: f64,
    pub authority: f64,
    pub weight: f64,
}

/// Scorer output.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Score {
    pub direction: Direction,
    /// 0..=100.
    pub confidence: u8,
    pub net: f64,
    pub total: f64,
    pub agreement: f64,
    pub evidence: f64,
}

/// Pure scorer; all run-wide inputs are passed in explicitly.
#[derive(Clone, Copy, Debug)]
pub struct ConfidenceScorer<'a> {
    authority: &'a SourceWeightsConfig,
    params: ScoringParams,
    window: Duration,
    now: DateTime<Utc>,
}

impl<'a> ConfidenceScorer<'a> {
    pub fn new(
        authority: &'a SourceWeightsConfig,
        params: ScoringParams,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            authority,
            params,
            window,
            now,
        }
    }

    pub fn params(&self) -> &ScoringParams {
        &self.params
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// Monotonic non-increasing in age; 1.0 at `now` (and for future-dated
    /// items), `recency_floor` at and beyond the window edge.
    pub fn recency_weight(&self, published_at: DateTime<Utc>) -> f64 {
        let age = (self.now - published_at).num_seconds().max(0) as f64;
        let window = self.window.num_seconds().max(1) as f64;
        let frac = (age / window).clamp(0.0, 1.0);
        1.0 - (1.0 - self.params.recency_floor) * frac
    }

    pub fn weigh<'g>(&self, article: &'g Article) -> WeightedArticle<'g> {
        let impact = impact_weight(article.impact);
        let recency = self.recency_weight(article.published_at);
        let authority = self.authority.weight_for(&article.source);
        WeightedArticle {
            article,
            impact,
            recency,
            authority,
            weight: impact * recency * authority,
        }
    }

    /// `None` for an empty group or one with zero total weight: no
    /// evidence, no signal.
    pub fn score(&self, group: &AssetGroup) -> Option<Score> {
        let mut net = 0.0f64;
        let mut total = 0.0f64;
        let mut directional = 0.0f64;
        for a in &group.articles {
            let w = self.weigh(a).weight;
            net += a.sentiment.sign() * w;
            total += w;
            if a.sentiment != Sentiment::Neutral {
                directional += w;
            }
        }
        if total <= 0.0 {
            return None;
        }
        Some(self.finish(net, total, directional))
    }

    fn finish(&self, net: f64, total: f64, directional: f64) -> Score {
        let p = &self.params;
        let agreement = (net.abs() / total).clamp(0.0, 1.0);
        let evidence = 1.0 - (-total / p.evidence_scale.max(1e-9)).exp();

        let direction = if agreement <= p.deadband {
            Direction::Neutral
        } else if net > 0.0 {
            Direction::Long
        } else {
            Direction::Short
        };

        let directional_conf = 100.0 * agreement.sqrt() * evidence.sqrt();
        let raw = match direction {
            Direction::Neutral => {
                let volume = p.neutral_scale * evidence;
                let capped = if directional > 0.0 {
                    volume.min(directional_conf)
                } else {
                    volume
                };
                capped.min(f64::from(p.strong_threshold.saturating_sub(1)))
            }
            _ => directional_conf,
        };

        Score {
            direction,
            confidence: to_percent(raw),
            net,
            total,
            agreement,
            evidence,
        }
    }
}

/// Fixed impact weight.
pub fn impact_weight(impact: Impact) -> f64 {
    impact.weight()
}

/// Per-sentiment weight sums (bullish, bearish, neutral) for a group.
pub fn sentiment_mass(scorer: &ConfidenceScorer<'_>, group: &AssetGroup) -> (f64, f64, f64) {
    let mut out = (0.0, 0.0, 0.0);
    for a in &group.articles {
        let w = scorer.weigh(a).weight;
        match a.sentiment {
            Sentiment::Bullish => out.0 += w,
            Sentiment::Bearish => out.1 += w,
            Sentiment::Neutral => out.2 += w,
        }
    }
    out
}

fn to_percent(x: f64) -> u8 {
    if x.is_nan() {
        return 0;
    }
    x.round().clamp(0.0, 100.0) as u8
}
