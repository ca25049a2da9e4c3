//! Cache metrics regression tests

use super::helpers::*;
use fetchguard_cache::{CacheConfig, CacheEntry, CacheTier, EnvelopeMeta, TierError, TierKind, TieredCache};
use futures::future::BoxFuture;
use serial_test::serial;
use std::time::{Duration, SystemTime};

/// A lower tier whose backend is always unreachable.
struct DownTier;

impl CacheTier for DownTier {
    fn kind(&self) -> TierKind {
        TierKind::Shared
    }

    fn get<'a>(&'a self, _key: &'a str) -> BoxFuture<'a, Result<Option<Vec<u8>>, TierError>> {
        Box::pin(async { Err(TierError::backend("shared", "connection refused")) })
    }

    fn set<'a>(
        &'a self,
        _key: &'a str,
        _envelope: Vec<u8>,
        _meta: EnvelopeMeta,
        _retain_for: Duration,
    ) -> BoxFuture<'a, Result<(), TierError>> {
        Box::pin(async { Err(TierError::backend("shared", "connection refused")) })
    }

    fn remove<'a>(&'a self, _key: &'a str) -> BoxFuture<'a, Result<(), TierError>> {
        Box::pin(async { Ok(()) })
    }

    fn purge_expired(&self, _grace: Duration) -> BoxFuture<'_, Result<usize, TierError>> {
        Box::pin(async { Ok(0) })
    }
}

#[tokio::test]
#[serial]
async fn cache_metrics_exist() {
    init_recorder();

    let cache: TieredCache<String> = CacheConfig::builder()
        .name("metrics_cache")
        .max_entries(1)
        .build();

    cache.set("a", "1".to_string(), Duration::from_secs(60)).await;
    cache.get("a", false).await;
    cache.get("missing", false).await;
    cache
        .set_entry(
            "old",
            CacheEntry::at(
                "2".to_string(),
                SystemTime::now() - Duration::from_secs(120),
                Duration::from_secs(60),
            ),
        )
        .await;
    cache.get("old", true).await;

    assert_counter_exists("fetchguard_cache_requests_total");
    assert_metric_has_label("fetchguard_cache_requests_total", "cache", "metrics_cache");
    assert_metric_has_label("fetchguard_cache_requests_total", "result", "hit");
    assert_metric_has_label("fetchguard_cache_requests_total", "result", "miss");
    assert_metric_has_label("fetchguard_cache_requests_total", "result", "stale");

    assert_counter_exists("fetchguard_cache_evictions_total");
    assert_metric_has_label("fetchguard_cache_evictions_total", "cache", "metrics_cache");

    assert_gauge_exists("fetchguard_cache_entries");
    assert_metric_has_label("fetchguard_cache_entries", "cache", "metrics_cache");
}

#[tokio::test]
#[serial]
async fn cache_tier_error_metrics() {
    init_recorder();

    let cache: TieredCache<String> = CacheConfig::builder()
        .name("degraded_cache")
        .tier(DownTier)
        .build();

    cache.set("a", "1".to_string(), Duration::from_secs(60)).await;
    cache.get("b", false).await;

    assert_counter_exists("fetchguard_cache_tier_errors_total");
    assert_metric_has_label("fetchguard_cache_tier_errors_total", "cache", "degraded_cache");
    assert_metric_has_label("fetchguard_cache_tier_errors_total", "tier", "shared");
}
