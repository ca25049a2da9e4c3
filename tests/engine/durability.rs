use super::{config, Market, Mode};
use fetchguard::cache::DurableTier;
use fetchguard::{Engine, FetchSource, ResilientFetch};
use std::path::Path;
use std::time::Duration;

fn open(path: &Path, market: &Market) -> (Engine, ResilientFetch<String>) {
    let engine = Engine::builder(config())
        .tier(DurableTier::open(path).unwrap())
        .build()
        .unwrap();
    let quotes = market.build(
        engine
            .resource("quotes")
            .ttl(Duration::ZERO)
            .stale_window(Duration::ZERO)
            .max_attempts(1),
    );
    (engine, quotes)
}

#[tokio::test]
async fn restarted_process_falls_back_to_the_durable_copy() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.redb");
    let market = Market::default();

    {
        let (_engine, quotes) = open(&path, &market);
        assert_eq!(quotes.fetch("quote:ABC").await.unwrap(), "quote:ABC@1");
    }

    market.set(Mode::Down);
    let (_engine, quotes) = open(&path, &market);
    let fetched = quotes.fetch_detailed("quote:ABC").await.unwrap();

    assert_eq!(fetched.source, FetchSource::StaleFallback);
    assert_eq!(fetched.value, "quote:ABC@1");
    assert_eq!(market.calls(), 2);
    assert_eq!(quotes.cache_stats().stale_hits, 1);
}

#[tokio::test]
async fn cleanup_removes_expired_entries_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.redb");
    let market = Market::default();

    {
        let (engine, quotes) = open(&path, &market);
        quotes.fetch("quote:ABC").await.unwrap();
        assert!(engine.maintenance().run_cleanup().await >= 1);
    }

    market.set(Mode::Down);
    let (_engine, quotes) = open(&path, &market);
    let err = quotes.fetch("quote:ABC").await.unwrap_err();
    assert!(err.is_upstream());
}

#[tokio::test]
async fn resources_share_the_durable_tier_under_their_own_keys() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.redb");
    let market = Market::default();

    {
        let engine = Engine::builder(config())
            .tier(DurableTier::open(&path).unwrap())
            .build()
            .unwrap();
        let quotes = market.build(engine.resource("quotes"));
        let news = market.build(engine.resource("news"));
        quotes.fetch("quote:ABC").await.unwrap();
        news.fetch("news:ABC").await.unwrap();
    }

    let engine = Engine::builder(config())
        .tier(DurableTier::open(&path).unwrap())
        .build()
        .unwrap();
    let news = market.build(engine.resource("news"));

    let restored = news.fetch_detailed("news:ABC").await.unwrap();
    assert_eq!(restored.source, FetchSource::Cache);
    assert_eq!(restored.value, "news:ABC@2");
    assert_eq!(market.calls(), 2);
}
