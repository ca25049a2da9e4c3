//! Memory, redb and shared tiers working together.

use super::{hours_ago, FlakyTier};
use fetchguard_cache::{CacheConfig, CacheEntry, DurableTier, TierKind, TieredCache};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const MINUTE: Duration = Duration::from_secs(60);

fn durable_cache(tier: DurableTier) -> TieredCache<u64> {
    CacheConfig::builder().name("quotes").tier(tier).build()
}

#[tokio::test]
async fn durable_entries_survive_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.redb");

    {
        let cache = durable_cache(DurableTier::open(&path).unwrap());
        cache.set("quote:ABC", 42, MINUTE).await;
    }

    let cache = durable_cache(DurableTier::open(&path).unwrap());
    let hit = cache.get("quote:ABC", false).await.unwrap();
    assert_eq!(hit.value, 42);
    assert_eq!(hit.tier, TierKind::Durable);
    assert!(!hit.stale);

    let promoted = cache.get("quote:ABC", false).await.unwrap();
    assert_eq!(promoted.tier, TierKind::Memory);
    assert_eq!(cache.stats().lower_tier_hits, 1);
}

#[tokio::test]
async fn expired_entries_stay_readable_as_stale_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.redb");

    {
        let cache = durable_cache(DurableTier::open(&path).unwrap());
        cache
            .set_entry("quote:ABC", CacheEntry::at(7, hours_ago(2), MINUTE))
            .await;
    }

    let cache = durable_cache(DurableTier::open(&path).unwrap());
    assert!(cache.get("quote:ABC", false).await.is_none());

    let stale = cache.get("quote:ABC", true).await.unwrap();
    assert!(stale.stale);
    assert_eq!(stale.value, 7);
    assert!(stale.age() >= Duration::from_secs(7200));
}

#[tokio::test]
async fn caches_share_one_durable_tier() {
    let dir = tempfile::tempdir().unwrap();
    let tier = DurableTier::open(dir.path().join("cache.redb")).unwrap();

    let writer = durable_cache(tier.clone());
    let reader = durable_cache(tier);

    writer.set("quote:ABC", 10, MINUTE).await;
    let hit = reader.get("quote:ABC", false).await.unwrap();
    assert_eq!(hit.value, 10);
    assert_eq!(hit.tier, TierKind::Durable);

    writer.remove("quote:ABC").await;
    reader.clear();
    assert!(reader.get("quote:ABC", true).await.is_none());
}

#[tokio::test]
async fn evicted_entries_come_back_from_the_lower_tier() {
    let dir = tempfile::tempdir().unwrap();
    let cache: TieredCache<u64> = CacheConfig::builder()
        .max_entries(2)
        .tier(DurableTier::open(dir.path().join("cache.redb")).unwrap())
        .build();

    for (i, key) in ["a", "b", "c"].into_iter().enumerate() {
        cache.set(key, i as u64, MINUTE).await;
    }
    assert_eq!(cache.len(), 2);
    assert_eq!(cache.stats().evictions, 1);

    let hit = cache.get("a", false).await.unwrap();
    assert_eq!(hit.value, 0);
    assert_eq!(hit.tier, TierKind::Durable);
}

#[tokio::test]
async fn unreachable_tier_degrades_to_memory() {
    let flaky = FlakyTier::new();
    flaky.set_down(true);

    let failures = Arc::new(AtomicUsize::new(0));
    let f = Arc::clone(&failures);
    let cache: TieredCache<String> = CacheConfig::builder()
        .tier(flaky.clone())
        .on_tier_failure(move |tier, _message| {
            if tier == TierKind::Shared {
                f.fetch_add(1, Ordering::SeqCst);
            }
        })
        .build();

    cache.set("k", "v".to_string(), MINUTE).await;
    let hit = cache.get("k", false).await.unwrap();
    assert_eq!(hit.value, "v");
    assert_eq!(hit.tier, TierKind::Memory);

    assert!(cache.get("missing", false).await.is_none());
    assert_eq!(failures.load(Ordering::SeqCst), 2);
    assert_eq!(cache.stats().tier_errors, 2);
    assert_eq!(flaky.len(), 0);
}

#[tokio::test]
async fn recovered_tier_is_written_again() {
    let flaky = FlakyTier::new();
    let cache: TieredCache<String> = CacheConfig::builder().tier(flaky.clone()).build();

    flaky.set_down(true);
    cache.set("k", "first".to_string(), MINUTE).await;
    assert_eq!(flaky.len(), 0);

    flaky.set_down(false);
    cache.set("k", "second".to_string(), MINUTE).await;
    assert_eq!(flaky.len(), 1);

    let other: TieredCache<String> = CacheConfig::builder().tier(flaky).build();
    assert_eq!(other.get("k", false).await.unwrap().value, "second");
}

#[tokio::test]
async fn purge_reaches_every_tier() {
    let dir = tempfile::tempdir().unwrap();
    let flaky = FlakyTier::new();
    let cache: TieredCache<u64> = CacheConfig::builder()
        .tier(DurableTier::open(dir.path().join("cache.redb")).unwrap())
        .tier(flaky.clone())
        .build();

    cache
        .set_entry("old", CacheEntry::at(1, hours_ago(3), MINUTE))
        .await;
    cache.set("new", 2, MINUTE).await;

    assert_eq!(cache.purge_expired(Duration::from_secs(3600)).await, 3);
    assert_eq!(cache.len(), 1);
    assert_eq!(flaky.len(), 1);
    assert!(cache.get("old", true).await.is_none());
    assert_eq!(cache.get("new", false).await.unwrap().value, 2);
}

#[tokio::test]
async fn grace_keeps_recently_expired_entries() {
    let flaky = FlakyTier::new();
    let cache: TieredCache<u64> = CacheConfig::builder().tier(flaky.clone()).build();

    cache
        .set_entry("recent", CacheEntry::at(1, hours_ago(1), MINUTE))
        .await;

    assert_eq!(cache.purge_expired(Duration::from_secs(86_400)).await, 0);
    assert!(cache.get("recent", true).await.unwrap().stale);
}
