//! # Source Weights
//!
//! Configurable mapping from news outlets (e.g. "CoinDesk", "Decrypt") to
//! a fixed authority weight in the range `[0.0, 1.0]`.
//!
//! - Loads from JSON config (weights + aliases).
//! - Case-insensitive lookup with normalization of punctuation, dashes, etc.
//! - Aliases map alternative spellings/domains to canonical outlets.
//! - Fallback order: aliases → exact match → substring match → default.
//! - Includes a built-in `default_seed()` with common crypto outlets.

use serde::Deserialize;
use std::{collections::HashMap, fs, path::Path};

/// Configuration for source authority, loaded from JSON or defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceWeightsConfig {
    /// Default weight if no match is found.
    #[serde(default = "default_default_weight")]
    pub default_weight: f64,
    /// Explicit weights for canonical source names.
    #[serde(default)]
    pub weights: HashMap<String, f64>,
    /// Aliases mapping non-canonical names → canonical names.
    #[serde(default)]
    pub aliases: HashMap<String, String>,
}

fn default_default_weight() -> f64 {
    0.70
}

impl Default for SourceWeightsConfig {
    fn default() -> Self {
        Self::default_seed()
    }
}

impl SourceWeightsConfig {
    /// Load configuration from a JSON file.
    /// Falls back to `default_seed()` on error.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(s) => match serde_json::from_str::<Self>(&s) {
                Ok(cfg) => cfg.normalized(),
                Err(e) => {
                    tracing::warn!(error = %e, path = %path.display(), "invalid source weights, using seed");
                    Self::default_seed()
                }
            },
            Err(_) => Self::default_seed(),
        }
    }

    /// Keys in the JSON file may use any casing; lookups normalize both sides.
    fn normalized(self) -> Self {
        Self {
            default_weight: self.default_weight,
            weights: self
                .weights
                .into_iter()
                .map(|(k, v)| (normalize(&k), v))
                .collect(),
            aliases: self
                .aliases
                .into_iter()
                .map(|(k, v)| (normalize(&k), normalize(&v)))
                .collect(),
        }
    }

    /// Authority weight for a given source name.
    ///
    /// Steps:
    /// 1. Alias lookup (normalized) → canonical → weight.
    /// 2. Exact weight match.
    /// 3. Substring fallback (e.g. "CoinDesk Markets" → "coindesk").
    /// 4. Default weight.
    pub fn weight_for(&self, source: &str) -> f64 {
        let s = normalize(source);

        if let Some(canon) = self.aliases.get(&s) {
            if let Some(&w) = self.weights.get(canon) {
                return clamp01(w);
            }
        }

        if let Some(&w) = self.weights.get(&s) {
            return clamp01(w);
        }

        // Longest key first so "the block" beats a shorter accidental match;
        // equal lengths fall back to the alphabetically first key.
        let best = self
            .weights
            .iter()
            .filter(|(k, _)| s.contains(k.as_str()))
            .min_by(|(ka, _), (kb, _)| kb.len().cmp(&ka.len()).then_with(|| ka.cmp(kb)));
        if let Some((_, &w)) = best {
            return clamp01(w);
        }

        clamp01(self.default_weight)
    }

    /// Built-in seed with common crypto news outlets.
    /// Used as fallback if no config is found.
    pub fn default_seed() -> Self {
        let mut weights = HashMap::new();
        let mut aliases = HashMap::new();

        for (k, v) in [
            ("coindesk", 1.0),
            ("cointelegraph", 0.90),
            ("the block", 0.90),
            ("bitcoin magazine", 0.85),
            ("decrypt", 0.85),
            ("reuters", 0.90),
            ("bloomberg", 0.90),
            ("the defiant", 0.75),
            ("cryptoslate", 0.70),
        ] {
            weights.insert(k.to_string(), v);
        }

        for (a, c) in [
            ("coindesk com", "coindesk"),
            ("cointelegraph com", "cointelegraph"),
            ("ct", "cointelegraph"),
            ("theblock", "the block"),
            ("theblock co", "the block"),
            ("bitcoinmagazine", "bitcoin magazine"),
            ("bitcoinmagazine com", "bitcoin magazine"),
            ("btc magazine", "bitcoin magazine"),
            ("decrypt co", "decrypt"),
        ] {
            aliases.insert(a.to_string(), c.to_string());
        }

        Self {
            default_weight: default_default_weight(),
            weights,
            aliases,
        }
    }
}

/// Lowercase, replace punctuation/dashes with spaces, collapse spaces.
fn normalize(s: &str) -> String {
    let mut out = s.trim().to_ascii_lowercase();

    for ch in ['—', '–', '-', '_', '/', '\\'] {
        out = out.replace(ch, " ");
    }

    out = out.replace(['\n', '\r', '\t', '.', ',', '‚', '’', '\''], " ");

    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn clamp01(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> SourceWeightsConfig {
        SourceWeightsConfig::default_seed()
    }

    #[test]
    fn exact_match() {
        assert!((cfg().weight_for("CoinDesk") - 1.0).abs() < 1e-9);
    }

    #[test]
    fn alias_match() {
        let c = cfg();
        assert!((c.weight_for("bitcoinmagazine.com") - 0.85).abs() < 1e-9);
        assert!((c.weight_for("TheBlock") - 0.90).abs() < 1e-9);
    }

    #[test]
    fn substring_match() {
        assert!((cfg().weight_for("CoinDesk Markets Daily") - 1.0).abs() < 1e-9);
    }

    #[test]
    fn equal_length_substring_matches_are_stable() {
        // "decrypt" and "reuters" are both 7 chars; each fresh map hashes differently.
        for _ in 0..32 {
            let w = SourceWeightsConfig::default_seed().weight_for("Decrypt Reuters News");
            assert!((w - 0.85).abs() < 1e-9, "got {w}");
        }
    }

    #[test]
    fn default_weight_used() {
        let c = cfg();
        assert!((c.weight_for("TotallyUnknown") - c.default_weight).abs() < 1e-9);
    }

    #[test]
    fn case_and_dash_normalization() {
        let c = cfg();
        assert!((c.weight_for("BITCOIN-MAGAZINE") - 0.85).abs() < 1e-9);
        assert!((c.weight_for("Bitcoin—Magazine") - 0.85).abs() < 1e-9);
    }

    #[test]
    fn file_weights_are_clamped_and_normalized() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("w.json");
        fs::write(
            &p,
            r#"{"default_weight": 0.5, "weights": {"My Outlet": 1.7}, "aliases": {"MO": "my outlet"}}"#,
        )
        .unwrap();
        let c = SourceWeightsConfig::load_from_file(&p);
        assert!((c.weight_for("my outlet") - 1.0).abs() < 1e-9);
        assert!((c.weight_for("mo") - 1.0).abs() < 1e-9);
        assert!((c.weight_for("other") - 0.5).abs() < 1e-9);
    }

    #[test]
    fn missing_file_falls_back_to_seed() {
        let c = SourceWeightsConfig::load_from_file("does/not/exist.json");
        assert!((c.weight_for("Decrypt") - 0.85).abs() < 1e-9);
    }
}
