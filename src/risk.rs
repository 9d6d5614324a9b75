//! Risk notes rule set (loaded from `config/risk_rules.json`).
//!
//! Small JSON DSL evaluated over group-level statistics. Every condition is
//! optional; a rule matches when all present conditions hold:
//! - `max_articles`:        article count <= value
//! - `min_dispersion`:      sentiment dispersion >= value (0 = unanimous, 1 = even split)
//! - `min_high_impact`:     high-impact article count >= value
//! - `max_confidence`:      confidence <= value
//! - `max_sources`:         distinct contributing outlets <= value
//! - `min_newest_age_hours`: newest article at least this old
//! - `directional`:         true = long/short only, false = neutral only
//!
//! `note` is a template; `{articles}`, `{sources}`, `{high_impact}`,
//! `{confidence}`, `{dispersion}`, `{newest_age_hours}` and `{asset}` are
//! substituted.

use std::{collections::BTreeSet, fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::aggregate::AssetGroup;
use crate::article::Impact;
use crate::scoring::{sentiment_mass, ConfidenceScorer, Direction, Score};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskRuleSet {
    pub rules: Vec<RiskRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskRule {
    pub name: String,
    #[serde(default)]
    pub when: RiskWhen,
    pub note: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskWhen {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_articles: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_dispersion: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_high_impact: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_confidence: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_sources: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_newest_age_hours: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directional: Option<bool>,
}

/// Group-level inputs to the rule set.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupStats {
    pub asset: String,
    pub articles: usize,
    pub sources: usize,
    pub high_impact: usize,
    pub dispersion: f64,
    pub confidence: u8,
    pub direction: Direction,
    pub newest_age_hours: f64,
}

impl GroupStats {
    pub fn collect(scorer: &ConfidenceScorer<'_>, group: &AssetGroup, score: &Score) -> Self {
        let (bull, bear, _) = sentiment_mass(scorer, group);
        let outlets: BTreeSet<&str> = group
            .articles
            .iter()
            .flat_map(|a| a.sources.iter().map(String::as_str))
            .collect();
        let directional = bull + bear;
        let dispersion = if directional > 0.0 {
            2.0 * bull.min(bear) / directional
        } else {
            0.0
        };
        let newest_age_hours = group
            .articles
            .iter()
            .map(|a| a.age_secs(scorer.now()))
            .min()
            .map(|s| s.max(0) as f64 / 3600.0)
            .unwrap_or(0.0);

        Self {
            asset: group.asset.clone(),
            articles: group.articles.len(),
            sources: outlets.len(),
            high_impact: group
                .articles
                .iter()
                .filter(|a| a.impact == Impact::High)
                .count(),
            dispersion,
            confidence: score.confidence,
            direction: score.direction,
            newest_age_hours,
        }
    }
}

impl RiskRuleSet {
    /// Built-in rules used when no file is configured.
    pub fn default_seed() -> Self {
        let rule = |name: &str, when: RiskWhen, note: &str| RiskRule {
            name: name.to_string(),
            when,
            note: note.to_string(),
        };
        Self {
            rules: vec![
                rule(
                    "mixed_sentiment",
                    RiskWhen {
                        min_dispersion: Some(0.3),
                        ..RiskWhen::default()
                    },
                    "Mixed sentiment across sources (dispersion {dispersion})",
                ),
                rule(
                    "thin_evidence",
                    RiskWhen {
                        max_articles: Some(2),
                        ..RiskWhen::default()
                    },
                    "Thin evidence: only {articles} article(s) in the window",
                ),
                rule(
                    "high_impact_low_confidence",
                    RiskWhen {
                        min_high_impact: Some(1),
                        max_confidence: Some(49),
                        ..RiskWhen::default()
                    },
                    "High-impact news but only {confidence}% confidence; wait for confirmation",
                ),
                rule(
                    "single_source",
                    RiskWhen {
                        max_sources: Some(1),
                        ..RiskWhen::default()
                    },
                    "All coverage comes from a single outlet",
                ),
                rule(
                    "stale_news",
                    RiskWhen {
                        min_newest_age_hours: Some(12.0),
                        ..RiskWhen::default()
                    },
                    "Stale: newest article is {newest_age_hours}h old",
                ),
            ],
        }
    }

    /// Load rules from JSON; missing or invalid files fall back to the seed.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(s) => match serde_json::from_str::<Self>(&s) {
                Ok(set) => set,
                Err(e) => {
                    tracing::warn!(error = %e, path = %path.display(), "invalid risk rules, using seed");
                    Self::default_seed()
                }
            },
            Err(_) => Self::default_seed(),
        }
    }

    /// Rendered notes of every matching rule, in rule order.
    pub fn evaluate(&self, stats: &GroupStats) -> Vec<String> {
        self.rules
            .iter()
            .filter(|r| r.when.matches(stats))
            .map(|r| render(&r.note, stats))
            .collect()
    }
}

impl Default for RiskRuleSet {
    fn default() -> Self {
        Self::default_seed()
    }
}

impl RiskWhen {
    pub fn matches(&self, s: &GroupStats) -> bool {
        if self.max_articles.is_some_and(|v| s.articles > v) {
            return false;
        }
        if self.min_dispersion.is_some_and(|v| s.dispersion < v) {
            return false;
        }
        if self.min_high_impact.is_some_and(|v| s.high_impact < v) {
            return false;
        }
        if self.max_confidence.is_some_and(|v| s.confidence > v) {
            return false;
        }
        if self.max_sources.is_some_and(|v| s.sources > v) {
            return false;
        }
        if self.min_newest_age_hours.is_some_and(|v| s.newest_age_hours < v) {
            return false;
        }
        if let Some(d) = self.directional {
            if d != (s.direction != Direction::Neutral) {
                return false;
            }
        }
        true
    }
}

fn render(template: &str, s: &GroupStats) -> String {
    template
        .replace("{asset}", &s.asset)
        .replace("{articles}", &s.articles.to_string())
        .replace("{sources}", &s.sources.to_string())
        .replace("{high_impact}", &s.high_impact.to_string())
        .replace("{confidence}", &s.confidence.to_string())
        .replace("{dispersion}", &format!("{:.2}", s.dispersion))
        .replace("{newest_age_hours}", &format!("{:.0}", s.newest_age_hours))
}
