//! # Deduplicator
//! Collapses duplicate articles into one canonical record per story while
//! keeping every contributing source for attribution.
//!
//! Two articles are the same story when they share an `id`, or when the
//! configured `Similarity` strategy says so (cross-source matching of
//! differently worded headlines). Merge policy:
//! - earliest `published_at`, latest `fetched_at`
//! - union of `assets` and of contributing `sources`
//! - summary, sentiment, impact and canonical source from the
//!   highest-authority contributor (ties: lexicographically smaller source)
//!
//! Input order does not matter: articles are processed in
//! `(published_at, id)` order, so the output is the same for any arrival
//! order.

use std::collections::BTreeSet;

use chrono::Duration;
use metrics::counter;

use crate::article::{normalize_title, Article};
use crate::source_weights::SourceWeightsConfig;

/// Replaceable near-duplicate policy.
pub trait Similarity: Send + Sync {
    fn similar(&self, a: &Article, b: &Article) -> bool;
}

/// Only identical ids are duplicates.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdOnly;

impl Similarity for IdOnly {
    fn similar(&self, _a: &Article, _b: &Article) -> bool {
        false
    }
}

/// Normalized-Levenshtein title similarity within a publish-time horizon.
#[derive(Debug, Clone, Copy)]
pub struct TitleSimilarity {
    /// Similarity in [0.0, 1.0]; pairs at or above it are duplicates.
    pub threshold: f64,
    /// Only articles published this close together are compared.
    pub max_gap: Duration,
}

impl Default for TitleSimilarity {
    fn default() -> Self {
        Self {
            threshold: 0.88,
            max_gap: Duration::hours(12),
        }
    }
}

impl Similarity for TitleSimilarity {
    fn similar(&self, a: &Article, b: &Article) -> bool {
        if (a.published_at - b.published_at).abs() > self.max_gap {
            return false;
        }
        let ta = normalize_title(&a.title);
        let tb = normalize_title(&b.title);
        if ta.is_empty() || tb.is_empty() {
            return false;
        }
        strsim::normalized_levenshtein(&ta, &tb) >= self.threshold
    }
}

/// Result of a dedup pass.
#[derive(Debug, Clone, Default)]
pub struct DedupOutcome {
    pub articles: Vec<Article>,
    /// Input records folded into another record.
    pub merged: usize,
}

pub struct Deduplicator<'a> {
    authority: &'a SourceWeightsConfig,
    similarity: &'a dyn Similarity,
}

impl<'a> Deduplicator<'a> {
    pub fn new(authority: &'a SourceWeightsConfig, similarity: &'a dyn Similarity) -> Self {
        Self {
            authority,
            similarity,
        }
    }

    pub fn dedup(&self, mut input: Vec<Article>) -> DedupOutcome {
        input.sort_by(|a, b| {
            a.published_at
                .cmp(&b.published_at)
                .then_with(|| a.id.cmp(&b.id))
                .then_with(|| a.source.cmp(&b.source))
        });

        let mut canon: Vec<Article> = Vec::with_capacity(input.len());
        // Every id folded into canon[i], so later exact matches still land there.
        let mut ids: Vec<BTreeSet<String>> = Vec::with_capacity(input.len());
        let mut merged = 0usize;

        for art in input {
            let hit = ids
                .iter()
                .position(|set| set.contains(&art.id))
                .or_else(|| canon.iter().position(|c| self.similarity.similar(c, &art)));
            match hit {
                Some(i) => {
                    ids[i].insert(art.id.clone());
                    self.merge_into(&mut canon[i], art);
                    merged += 1;
                }
                None => {
                    ids.push(BTreeSet::from([art.id.clone()]));
                    canon.push(art);
                }
            }
        }

        if merged > 0 {
            counter!("dedup_merged_total").increment(merged as u64);
            tracing::debug!(target: "pipeline", merged, kept = canon.len(), "dedup merged duplicates");
        }

        DedupOutcome {
            articles: canon,
            merged,
        }
    }

    /// `true` if `a` outranks `b` as the canonical text source.
    fn outranks(&self, a: &Article, b: &Article) -> bool {
        let wa = self.authority.weight_for(&a.source);
        let wb = self.authority.weight_for(&b.source);
        match wa.partial_cmp(&wb) {
            Some(std::cmp::Ordering::Greater) => true,
            Some(std::cmp::Ordering::Less) => false,
            _ => a.source < b.source,
        }
    }

    fn merge_into(&self, keep: &mut Article, other: Article) {
        keep.published_at = keep.published_at.min(other.published_at);
        keep.fetched_at = keep.fetched_at.max(other.fetched_at);
        keep.assets.extend(other.assets.iter().cloned());
        keep.sources.extend(other.sources.iter().cloned());
        keep.sources.insert(other.source.clone());
        keep.actionable |= other.actionable;

        if self.outranks(&other, keep) {
            keep.source = other.source;
            keep.summary = other.summary;
            keep.sentiment = other.sentiment;
            keep.impact = other.impact;
        }
    }
}
