// src/config/pipeline.rs
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::aggregate::AggregateQuery;
use crate::article::{normalize_asset, Sentiment};
use crate::error::ConfigError;
use crate::ingest::types::SourceDescriptor;
use crate::scoring::ScoringParams;

const ENV_PATH: &str = "NEWS_SIGNAL_CONFIG_PATH";

/// Longest accepted lookback (30 days).
pub const MAX_LOOKBACK_HOURS: u32 = 720;

fn default_lookback_hours() -> u32 {
    24
}
fn default_cache_ttl_secs() -> u64 {
    2 * 3600
}
fn default_fetch_concurrency() -> usize {
    4
}
fn default_fetch_timeout_secs() -> u64 {
    30
}
fn default_top_k_drivers() -> usize {
    3
}
fn default_schedule_interval_secs() -> u64 {
    15 * 60
}
fn default_title_similarity() -> f64 {
    0.88
}
fn default_source_weights_path() -> PathBuf {
    PathBuf::from("config/source_weights.json")
}
fn default_risk_rules_path() -> PathBuf {
    PathBuf::from("config/risk_rules.json")
}

/// Built-in crypto outlets.
pub fn default_sources() -> Vec<SourceDescriptor> {
    vec![
        SourceDescriptor::new(
            "coindesk",
            "CoinDesk",
            "https://www.coindesk.com/arc/outboundfeeds/rss/",
        ),
        SourceDescriptor::new("cointelegraph", "Cointelegraph", "https://cointelegraph.com/rss"),
        SourceDescriptor::new(
            "bitcoinmagazine",
            "Bitcoin Magazine",
            "https://bitcoinmagazine.com/.rss/full/",
        ),
        SourceDescriptor::new("decrypt", "Decrypt", "https://decrypt.co/feed"),
    ]
}

/// Run configuration. Every field is a pure input to the pipeline stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_lookback_hours")]
    pub lookback_hours: u32,
    /// Ticker filter, e.g. "BTC".
    #[serde(default)]
    pub asset: Option<String>,
    /// "bullish" | "bearish" | "neutral"
    #[serde(default)]
    pub sentiment: Option<String>,
    /// Signals below this confidence are dropped from the output.
    #[serde(default)]
    pub min_confidence: u32,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// Durable cache directory; in-memory when unset.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    #[serde(default = "default_fetch_concurrency")]
    pub fetch_concurrency: usize,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_top_k_drivers")]
    pub top_k_drivers: usize,
    #[serde(default = "default_schedule_interval_secs")]
    pub schedule_interval_secs: u64,
    /// Headline similarity at or above which cross-source stories merge.
    #[serde(default = "default_title_similarity")]
    pub title_similarity: f64,
    #[serde(default = "default_source_weights_path")]
    pub source_weights_path: PathBuf,
    #[serde(default = "default_risk_rules_path")]
    pub risk_rules_path: PathBuf,
    #[serde(default)]
    pub scoring: ScoringParams,
    #[serde(default = "default_sources")]
    pub sources: Vec<SourceDescriptor>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            lookback_hours: default_lookback_hours(),
            asset: None,
            sentiment: None,
            min_confidence: 0,
            cache_ttl_secs: default_cache_ttl_secs(),
            cache_dir: None,
            fetch_concurrency: default_fetch_concurrency(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            top_k_drivers: default_top_k_drivers(),
            schedule_interval_secs: default_schedule_interval_secs(),
            title_similarity: default_title_similarity(),
            source_weights_path: default_source_weights_path(),
            risk_rules_path: default_risk_rules_path(),
            scoring: ScoringParams::default(),
            sources: default_sources(),
        }
    }
}

impl PipelineConfig {
    /// Reject anything that would make a run meaningless. Called before any fetch.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.query()?;
        self.min_confidence()?;
        if self.fetch_concurrency == 0 {
            return Err(ConfigError::InvalidConcurrency);
        }
        if self.fetch_timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout);
        }
        if self.cache_ttl_secs == 0 {
            return Err(ConfigError::InvalidTtl);
        }
        if self.top_k_drivers == 0 {
            return Err(ConfigError::InvalidTopK);
        }
        if !(self.title_similarity > 0.0 && self.title_similarity <= 1.0) {
            return Err(ConfigError::InvalidTitleSimilarity);
        }
        self.scoring.validate()?;
        if self.sources.is_empty() {
            return Err(ConfigError::NoSources);
        }
        let mut seen = BTreeSet::new();
        for s in &self.sources {
            if !seen.insert(s.key.as_str()) {
                return Err(ConfigError::DuplicateSourceKey { key: s.key.clone() });
            }
        }
        Ok(())
    }

    /// Window + filters as an aggregation query.
    pub fn query(&self) -> Result<AggregateQuery, ConfigError> {
        build_query(
            self.lookback_hours,
            self.asset.as_deref(),
            self.sentiment.as_deref(),
        )
    }

    pub fn min_confidence(&self) -> Result<u8, ConfigError> {
        check_min_confidence(self.min_confidence)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn schedule_interval(&self) -> Duration {
        Duration::from_secs(self.schedule_interval_secs.max(1))
    }
}

/// Validate raw filter values into a query. Shared by config and HTTP params.
pub fn build_query(
    hours: u32,
    asset: Option<&str>,
    sentiment: Option<&str>,
) -> Result<AggregateQuery, ConfigError> {
    if hours == 0 || hours > MAX_LOOKBACK_HOURS {
        return Err(ConfigError::InvalidWindow {
            hours,
            max: MAX_LOOKBACK_HOURS,
        });
    }
    let asset = match asset {
        Some(a) => {
            let a = normalize_asset(a);
            if a.is_empty() {
                return Err(ConfigError::BlankAssetFilter);
            }
            Some(a)
        }
        None => None,
    };
    let sentiment = sentiment.map(str::parse::<Sentiment>).transpose()?;
    Ok(AggregateQuery {
        hours,
        asset,
        sentiment,
    })
}

/// Confidence threshold within 0..=100.
pub fn check_min_confidence(value: u32) -> Result<u8, ConfigError> {
    u8::try_from(value)
        .ok()
        .filter(|v| *v <= 100)
        .ok_or(ConfigError::InvalidMinConfidence { value })
}

/// Load from an explicit path. Supports TOML or JSON.
pub fn load_pipeline_config_from(path: &Path) -> Result<PipelineConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading pipeline config from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_config(&content, ext.as_str())
        .with_context(|| format!("parsing pipeline config {}", path.display()))
}

/// Load using env var + fallbacks:
/// 1) $NEWS_SIGNAL_CONFIG_PATH
/// 2) config/pipeline.toml
/// 3) config/pipeline.json
/// 4) built-in defaults
pub fn load_pipeline_config_default() -> Result<PipelineConfig> {
    if let Ok(p) = std::env::var(ENV_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_pipeline_config_from(&pb);
        } else {
            return Err(anyhow!("{ENV_PATH} points to non-existent path"));
        }
    }
    let toml_p = PathBuf::from("config/pipeline.toml");
    if toml_p.exists() {
        return load_pipeline_config_from(&toml_p);
    }
    let json_p = PathBuf::from("config/pipeline.json");
    if json_p.exists() {
        return load_pipeline_config_from(&json_p);
    }
    Ok(PipelineConfig::default())
}

fn parse_config(s: &str, hint_ext: &str) -> Result<PipelineConfig> {
    match hint_ext {
        "toml" => Ok(toml::from_str(s)?),
        "json" => Ok(serde_json::from_str(s)?),
        _ => serde_json::from_str(s)
            .map_err(anyhow::Error::from)
            .or_else(|_| toml::from_str(s).map_err(anyhow::Error::from))
            .map_err(|_| anyhow!("unsupported pipeline config format")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{env, fs};

    #[test]
    fn defaults_are_valid() {
        let cfg = PipelineConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.sources.len(), 4);
        assert_eq!(cfg.cache_ttl(), Duration::from_secs(7200));
        assert_eq!(cfg.query().unwrap(), AggregateQuery::default());
    }

    #[test]
    fn validate_rejects_bad_values() {
        let base = PipelineConfig::default();
        let cases: Vec<(PipelineConfig, ConfigError)> = vec![
            (
                PipelineConfig {
                    lookback_hours: 0,
                    ..base.clone()
                },
                ConfigError::InvalidWindow { hours: 0, max: 720 },
            ),
            (
                PipelineConfig {
                    min_confidence: 101,
                    ..base.clone()
                },
                ConfigError::InvalidMinConfidence { value: 101 },
            ),
            (
                PipelineConfig {
                    fetch_concurrency: 0,
                    ..base.clone()
                },
                ConfigError::InvalidConcurrency,
            ),
            (
                PipelineConfig {
                    asset: Some("  ".into()),
                    ..base.clone()
                },
                ConfigError::BlankAssetFilter,
            ),
            (
                PipelineConfig {
                    sentiment: Some("sideways".into()),
                    ..base.clone()
                },
                ConfigError::InvalidSentiment {
                    value: "sideways".into(),
                },
            ),
            (
                PipelineConfig {
                    sources: vec![],
                    ..base.clone()
                },
                ConfigError::NoSources,
            ),
        ];
        for (cfg, want) in cases {
            assert_eq!(cfg.validate(), Err(want));
        }

        for similarity in [0.0, -0.5, 1.5, f64::NAN] {
            let cfg = PipelineConfig {
                title_similarity: similarity,
                ..base.clone()
            };
            assert_eq!(cfg.validate(), Err(ConfigError::InvalidTitleSimilarity), "{similarity}");
        }

        let scoring = |f: fn(&mut ScoringParams)| {
            let mut cfg = base.clone();
            f(&mut cfg.scoring);
            cfg.validate()
        };
        fn bad_param(name: &str) -> impl Fn(Result<(), ConfigError>) -> bool + '_ {
            move |r| matches!(r, Err(ConfigError::InvalidScoringParam { name: n, .. }) if n == name)
        }
        assert!(bad_param("recency_floor")(scoring(|p| p.recency_floor = -0.1)));
        assert!(bad_param("recency_floor")(scoring(|p| p.recency_floor = 1.2)));
        assert!(bad_param("deadband")(scoring(|p| p.deadband = -0.01)));
        assert!(bad_param("deadband")(scoring(|p| p.deadband = 1.0)));
        assert!(bad_param("evidence_scale")(scoring(|p| p.evidence_scale = 0.0)));
        assert!(bad_param("evidence_scale")(scoring(|p| p.evidence_scale = f64::INFINITY)));
        assert!(bad_param("neutral_scale")(scoring(|p| p.neutral_scale = 130.0)));
        assert!(bad_param("strong_threshold")(scoring(|p| p.strong_threshold = 0)));
        assert!(bad_param("strong_threshold")(scoring(|p| p.strong_threshold = 101)));

        let mut dup = base;
        dup.sources.push(SourceDescriptor::new("coindesk", "CoinDesk 2", "-"));
        assert_eq!(
            dup.validate(),
            Err(ConfigError::DuplicateSourceKey {
                key: "coindesk".into()
            })
        );
    }

    #[test]
    fn toml_and_json_parse_with_defaults() {
        let toml = r#"
lookback_hours = 12
asset = "eth"

[[sources]]
key = "decrypt"
name = "Decrypt"
url = "https://decrypt.co/feed"
"#;
        let cfg = parse_config(toml, "toml").unwrap();
        assert_eq!(cfg.lookback_hours, 12);
        assert_eq!(cfg.sources.len(), 1);
        assert_eq!(cfg.fetch_concurrency, 4);
        assert_eq!(cfg.query().unwrap().asset.as_deref(), Some("ETH"));

        let json = r#"{"min_confidence": 60, "sentiment": "Bearish"}"#;
        let cfg = parse_config(json, "").unwrap();
        assert_eq!(cfg.min_confidence().unwrap(), 60);
        assert_eq!(cfg.query().unwrap().sentiment, Some(Sentiment::Bearish));
    }

    #[serial_test::serial]
    #[test]
    fn default_uses_env_then_fallbacks() {
        let old = env::current_dir().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        env::set_current_dir(tmp.path()).unwrap();
        env::remove_var(ENV_PATH);

        let v = load_pipeline_config_default().unwrap();
        assert_eq!(v, PipelineConfig::default());

        fs::create_dir_all(tmp.path().join("config")).unwrap();
        fs::write(tmp.path().join("config/pipeline.json"), r#"{"lookback_hours": 6}"#).unwrap();
        assert_eq!(load_pipeline_config_default().unwrap().lookback_hours, 6);

        fs::write(tmp.path().join("config/pipeline.toml"), "lookback_hours = 8\n").unwrap();
        assert_eq!(load_pipeline_config_default().unwrap().lookback_hours, 8);

        let p = tmp.path().join("custom.json");
        fs::write(&p, r#"{"lookback_hours": 48}"#).unwrap();
        env::set_var(ENV_PATH, p.display().to_string());
        assert_eq!(load_pipeline_config_default().unwrap().lookback_hours, 48);

        env::set_var(ENV_PATH, tmp.path().join("missing.toml").display().to_string());
        assert!(load_pipeline_config_default().is_err());
        env::remove_var(ENV_PATH);

        env::set_current_dir(&old).unwrap();
    }
}
