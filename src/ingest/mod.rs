// src/ingest/mod.rs
pub mod orchestrator;
pub mod providers;
pub mod scheduler;
pub mod types;

use metrics::{describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;

pub use orchestrator::{FetchOrchestrator, FetchOutcome, SourceFailure};
pub use scheduler::{spawn_scheduler, LatestReport};
pub use types::{RawArticle, SourceDescriptor, SourceFeed};

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_events_total", "Total raw articles parsed from feeds.");
        describe_counter!(
            "ingest_source_failures_total",
            "Sources that failed (timeout, unreachable, parse error) in a run."
        );
        describe_counter!(
            "ingest_classification_failures_total",
            "Articles dropped because classification failed."
        );
        describe_counter!(
            "ingest_cache_hits_total",
            "Articles served from the cache instead of being re-classified."
        );
        describe_histogram!("ingest_fetch_ms", "Per-source fetch time in milliseconds.");
        describe_histogram!("ingest_parse_ms", "Feed parse time in milliseconds.");
        describe_counter!("dedup_merged_total", "Raw articles merged into a canonical record.");
        describe_counter!("pipeline_runs_total", "Completed pipeline runs.");
        describe_counter!("pipeline_signals_total", "Signals emitted across runs.");
        describe_gauge!("pipeline_last_run_ts", "Unix ts when the pipeline last completed.");
        describe_gauge!("cache_entries", "Live cache entries after the last sweep.");
        describe_counter!("cache_swept_total", "Expired cache entries physically removed.");
    });
}

/// Normalize text: decode entities, strip tags, collapse whitespace, strip stray punctuation.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    if let Ok(re_tags) = RE_TAGS.get_or_try_init(|| regex::Regex::new(r"(?is)</?[^>]+>")) {
        out = re_tags.replace_all(&out, " ").to_string();
    }

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    out = out.split_whitespace().collect::<Vec<_>>().join(" ");

    // 5) Strip trailing sentence punctuation (keep quotes)
    while let Some(last) = out.chars().last() {
        if matches!(last, '!' | '?' | '.' | ',') {
            out.pop();
        } else {
            break;
        }
    }

    // 6) Length cap: 1500 chars
    if out.chars().count() > 1500 {
        out = out.chars().take(1500).collect();
    }

    out
}
