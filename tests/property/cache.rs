//! Property tests for the tiered cache.
//!
//! Invariants tested:
//! - The memory tier never holds more than `max_entries`
//! - The latest write for a key is what reads return
//! - Purging removes exactly the entries past `ttl + grace`

use fetchguard_cache::{CacheConfig, CacheEntry, TieredCache};
use proptest::prelude::*;
use std::collections::HashMap;
use std::time::{Duration, SystemTime};
use tokio::runtime::Runtime;

const HOUR: Duration = Duration::from_secs(3600);

proptest! {
    #![proptest_config(ProptestConfig::with_cases(40))]

    /// Property: size stays bounded and the newest key is always present
    #[test]
    fn memory_tier_stays_bounded(
        max_entries in 1usize..=16,
        keys in prop::collection::vec(0u8..32, 1..100),
    ) {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let cache: TieredCache<u32> = CacheConfig::builder()
                .max_entries(max_entries)
                .build();

            for (i, key) in keys.iter().enumerate() {
                cache.set(&format!("k{key}"), i as u32, HOUR).await;
                prop_assert!(cache.len() <= max_entries);
            }

            let last = keys.len() - 1;
            let newest = cache.get(&format!("k{}", keys[last]), false).await;
            prop_assert_eq!(newest.map(|hit| hit.value), Some(last as u32));
            Ok(())
        })?;
    }

    /// Property: with room for every key, reads return the last write
    #[test]
    fn last_write_wins(
        writes in prop::collection::vec((0u8..8, any::<u32>()), 1..60),
    ) {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let cache: TieredCache<u32> = CacheConfig::builder().max_entries(8).build();
            let mut expected = HashMap::new();

            for (key, value) in &writes {
                cache.set(&key.to_string(), *value, HOUR).await;
                expected.insert(*key, *value);
            }

            for (key, value) in expected {
                let hit = cache.get(&key.to_string(), false).await;
                prop_assert_eq!(hit.map(|hit| hit.value), Some(value));
            }
            Ok(())
        })?;
    }

    /// Property: purge keeps entries inside the grace period, drops the rest
    #[test]
    fn purge_respects_grace(
        entries in prop::collection::vec((0u64..200, 0u64..100), 1..30),
        grace in 0u64..100,
    ) {
        // Keep clear of the boundary so the test clock does not matter.
        prop_assume!(entries
            .iter()
            .all(|(age, ttl)| age.abs_diff(ttl + grace) >= 2));

        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let cache: TieredCache<u64> = CacheConfig::builder().max_entries(64).build();
            let now = SystemTime::now();

            for (i, (age, ttl)) in entries.iter().enumerate() {
                let cached_at = now - Duration::from_secs(*age);
                cache
                    .set_entry(
                        &format!("k{i}"),
                        CacheEntry::at(*age, cached_at, Duration::from_secs(*ttl)),
                    )
                    .await;
            }

            let doomed = entries
                .iter()
                .filter(|(age, ttl)| *age >= ttl + grace)
                .count();
            let purged = cache.purge_expired(Duration::from_secs(grace)).await;
            prop_assert_eq!(purged, doomed);
            prop_assert_eq!(cache.len(), entries.len() - doomed);

            for (i, (age, ttl)) in entries.iter().enumerate() {
                let kept = cache.get(&format!("k{i}"), true).await.is_some();
                prop_assert_eq!(kept, *age < ttl + grace);
            }
            Ok(())
        })?;
    }
}
