// tests/scoring_properties.rs
//
// Randomized (seeded) checks over the pure scoring path.

use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::{
    rngs::StdRng,
    seq::{IndexedRandom, SliceRandom},
    Rng, SeedableRng,
};

use news_signal_engine::aggregate::{aggregate, AggregateQuery, AssetGroup};
use news_signal_engine::dedup::{Deduplicator, IdOnly, TitleSimilarity};
use news_signal_engine::scoring::{ConfidenceScorer, ScoringParams};
use news_signal_engine::source_weights::SourceWeightsConfig;
use news_signal_engine::{Article, Direction, Impact, Sentiment};

const OUTLETS: &[&str] = &["CoinDesk", "Cointelegraph", "The Block", "Decrypt", "Unknown Blog"];
const ASSETS: &[&str] = &["BTC", "ETH", "SOL"];

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
}

fn random_article(rng: &mut StdRng, i: usize) -> Article {
    let sentiment = [Sentiment::Bullish, Sentiment::Bearish, Sentiment::Neutral][rng.random_range(0..3)];
    let impact = [Impact::High, Impact::Medium, Impact::Low][rng.random_range(0..3)];
    let source = OUTLETS[rng.random_range(0..OUTLETS.len())];
    let at = now() - Duration::minutes(rng.random_range(0..36 * 60));
    let n_assets = rng.random_range(1..=2);
    let assets: Vec<&str> = ASSETS.choose_multiple(rng, n_assets).copied().collect();
    // Small URL space so some ids collide and exercise dedup.
    let url = format!("https://news.test/{}", i % 17);
    Article::new(source, url, format!("story {}", i % 17), at, at, sentiment, impact, assets)
}

fn scorer(w: &SourceWeightsConfig) -> ConfidenceScorer<'_> {
    ConfidenceScorer::new(w, ScoringParams::default(), Duration::hours(24), now())
}

#[test]
fn confidence_is_bounded_and_scoring_is_idempotent() {
    let w = SourceWeightsConfig::default_seed();
    let mut rng = StdRng::seed_from_u64(0xC0FFEE);
    for round in 0..200 {
        let n = rng.random_range(1..25);
        let articles: Vec<Article> = (0..n).map(|i| random_article(&mut rng, i + round)).collect();
        let deduped = Deduplicator::new(&w, &IdOnly).dedup(articles).articles;
        for g in aggregate(&deduped, &AggregateQuery::default(), now()) {
            let s = scorer(&w).score(&g).expect("non-empty group");
            assert!(s.confidence <= 100);
            assert_eq!(Some(s), scorer(&w).score(&g));
            if s.direction == Direction::Neutral {
                assert!(s.confidence < 60, "neutral confidence {}", s.confidence);
            }
        }
    }
}

#[test]
fn group_order_does_not_change_the_score() {
    let w = SourceWeightsConfig::default_seed();
    let mut rng = StdRng::seed_from_u64(99);
    for round in 0..50 {
        let mut g = AssetGroup::new("BTC");
        g.articles = (0..12)
            .map(|i| {
                let mut a = random_article(&mut rng, i + round * 100);
                a.assets = ["BTC".to_string()].into_iter().collect();
                a
            })
            .collect();
        let key = |g: &AssetGroup| scorer(&w).score(g).map(|s| (s.direction, s.confidence));
        let base = key(&g);
        g.articles.shuffle(&mut rng);
        assert_eq!(base, key(&g));
    }
}

#[test]
fn dedup_keeps_one_record_per_id_with_asset_union() {
    let w = SourceWeightsConfig::default_seed();
    let sim = TitleSimilarity::default();
    let mut rng = StdRng::seed_from_u64(7);
    let articles: Vec<Article> = (0..60).map(|i| random_article(&mut rng, i)).collect();

    let out = Deduplicator::new(&w, &sim).dedup(articles.clone()).articles;
    let mut ids: Vec<&str> = out.iter().map(|a| a.id.as_str()).collect();
    ids.sort();
    let before = ids.len();
    ids.dedup();
    assert_eq!(before, ids.len());

    for m in &out {
        for a in articles.iter().filter(|a| a.id == m.id) {
            assert!(m.assets.is_superset(&a.assets));
        }
    }
}

#[test]
fn single_low_impact_article_is_never_strong() {
    let w = SourceWeightsConfig::default_seed();
    for source in OUTLETS {
        for s in [Sentiment::Bullish, Sentiment::Bearish] {
            let mut g = AssetGroup::new("BTC");
            g.articles = vec![Article::new(*source, "https://x.test/1", "t", now(), now(), s, Impact::Low, ["BTC"])];
            let score = scorer(&w).score(&g).unwrap();
            assert!(score.confidence < 60, "{source}: {}", score.confidence);
        }
    }
}

#[test]
fn conflict_never_scores_above_agreement_of_the_same_volume() {
    let w = SourceWeightsConfig::default_seed();
    let mut rng = StdRng::seed_from_u64(2024);
    for _ in 0..100 {
        let mut agreed = AssetGroup::new("BTC");
        agreed.articles = (0..rng.random_range(2..20))
            .map(|i| {
                let mut a = random_article(&mut rng, i);
                a.id = format!("a{i}");
                a.sentiment = Sentiment::Bullish;
                a
            })
            .collect();

        // Flip every other article: same weights, lower agreement.
        let mut conflicted = agreed.clone();
        for a in conflicted.articles.iter_mut().step_by(2) {
            a.sentiment = Sentiment::Bearish;
        }

        let one_sided = scorer(&w).score(&agreed).unwrap();
        let mixed = scorer(&w).score(&conflicted).unwrap();
        assert!(mixed.agreement <= one_sided.agreement);
        assert!(
            mixed.confidence <= one_sided.confidence,
            "mixed {} > agreed {}",
            mixed.confidence,
            one_sided.confidence
        );
    }
}
