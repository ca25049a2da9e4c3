use crate::config::CacheConfig;
use crate::entry::{self, CacheEntry};
use crate::events::CacheEvent;
use crate::memory::{Insert, MemoryTier};
use crate::stats::{CacheStats, Counters};
use crate::tier::TierKind;
use crate::TierError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::{Duration, Instant, SystemTime};

#[cfg(feature = "metrics")]
use metrics::{counter, describe_counter, gauge};

/// The result of a successful lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct Lookup<V> {
    pub value: V,
    pub cached_at: SystemTime,
    pub ttl: Duration,
    /// The entry is past its TTL.
    pub stale: bool,
    pub tier: TierKind,
}

impl<V> Lookup<V> {
    pub fn age(&self) -> Duration {
        SystemTime::now()
            .duration_since(self.cached_at)
            .unwrap_or(Duration::ZERO)
    }

    fn from_entry(entry: CacheEntry<V>, stale: bool, tier: TierKind) -> Self {
        Self {
            value: entry.value,
            cached_at: entry.cached_at,
            ttl: entry.ttl,
            stale,
            tier,
        }
    }
}

/// A memory LRU in front of zero or more byte-oriented tiers.
///
/// Reads go memory first, then each lower tier in order; a lower-tier hit
/// is promoted into memory. Writes go to every tier. Lower tiers that fail
/// are logged and skipped, so the cache keeps working from memory alone.
///
/// ```
/// use fetchguard_cache::{CacheConfig, TieredCache};
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let cache: TieredCache<String> = CacheConfig::builder()
///     .name("quotes")
///     .max_entries(100)
///     .build();
///
/// cache.set("quote:ABC", "42.0".to_string(), Duration::from_secs(60)).await;
/// let hit = cache.get("quote:ABC", false).await.unwrap();
/// assert_eq!(hit.value, "42.0");
/// assert!(!hit.stale);
/// # }
/// ```
pub struct TieredCache<V> {
    config: CacheConfig,
    memory: MemoryTier<V>,
    counters: Counters,
}

impl<V> TieredCache<V>
where
    V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(config: CacheConfig) -> Self {
        #[cfg(feature = "metrics")]
        {
            describe_counter!(
                "fetchguard_cache_requests_total",
                "Cache lookups by result (hit, stale, miss)"
            );
            describe_counter!(
                "fetchguard_cache_evictions_total",
                "Entries dropped by the memory LRU"
            );
            describe_counter!(
                "fetchguard_cache_tier_errors_total",
                "Failed operations against lower cache tiers"
            );
        }

        Self {
            memory: MemoryTier::new(config.max_entries),
            config,
            counters: Counters::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn default_ttl(&self) -> Duration {
        self.config.default_ttl
    }

    /// Looks `key` up.
    ///
    /// With `allow_stale` an expired entry is returned with `stale = true`;
    /// without it an expired entry counts as a miss but is kept for later
    /// stale readers.
    pub async fn get(&self, key: &str, allow_stale: bool) -> Option<Lookup<V>> {
        let now = SystemTime::now();

        // A stale memory entry is only served if no lower tier holds a
        // fresh one.
        let mut stale_candidate: Option<(CacheEntry<V>, TierKind)> = None;
        if let Some(entry) = self.memory.get(key) {
            if entry.is_fresh_at(now) {
                self.record_hit(key, TierKind::Memory);
                return Some(Lookup::from_entry(entry, false, TierKind::Memory));
            }
            if allow_stale {
                stale_candidate = Some((entry, TierKind::Memory));
            }
        }

        for tier in &self.config.tiers {
            let bytes = match tier.get(key).await {
                Ok(Some(bytes)) => bytes,
                Ok(None) => continue,
                Err(err) => {
                    self.record_tier_error(tier.kind(), &err);
                    continue;
                }
            };
            let entry: CacheEntry<V> = match entry::decode(&bytes) {
                Ok(entry) => entry,
                Err(err) => {
                    self.record_tier_error(tier.kind(), &err);
                    continue;
                }
            };

            if entry.is_fresh_at(now) {
                Counters::bump(&self.counters.lower_tier_hits);
                self.promote(key, entry.clone());
                self.record_hit(key, tier.kind());
                return Some(Lookup::from_entry(entry, false, tier.kind()));
            }
            if allow_stale && stale_candidate.is_none() {
                stale_candidate = Some((entry, tier.kind()));
            }
        }

        if let Some((entry, kind)) = stale_candidate {
            if kind != TierKind::Memory {
                Counters::bump(&self.counters.lower_tier_hits);
                self.promote(key, entry.clone());
            }
            self.record_stale_hit(key, kind);
            return Some(Lookup::from_entry(entry, true, kind));
        }

        self.record_miss(key);
        None
    }

    /// Stores `value` under `key` in every tier, cached now with `ttl`.
    pub async fn set(&self, key: &str, value: V, ttl: Duration) {
        self.set_entry(key, CacheEntry::new(value, ttl)).await;
    }

    /// Stores `value` with the configured default TTL.
    pub async fn set_default(&self, key: &str, value: V) {
        self.set(key, value, self.config.default_ttl).await;
    }

    /// Stores a prepared entry. A tier already holding a newer entry for
    /// `key` keeps it.
    pub async fn set_entry(&self, key: &str, entry: CacheEntry<V>) {
        Counters::bump(&self.counters.sets);

        if !self.config.tiers.is_empty() {
            match entry::encode(&entry) {
                Ok(envelope) => {
                    let meta = entry.meta();
                    for tier in &self.config.tiers {
                        if let Err(err) = tier
                            .set(key, envelope.clone(), meta, self.config.stale_retention)
                            .await
                        {
                            self.record_tier_error(tier.kind(), &err);
                        }
                    }
                }
                Err(err) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(cache = %self.config.name, key = %key, error = %err, "value not serializable; stored in memory only");
                    #[cfg(not(feature = "tracing"))]
                    let _ = err;
                }
            }
        }

        self.store_in_memory(key, entry);
    }

    /// Removes `key` from every tier.
    pub async fn remove(&self, key: &str) {
        self.memory.remove(key);
        for tier in &self.config.tiers {
            if let Err(err) = tier.remove(key).await {
                self.record_tier_error(tier.kind(), &err);
            }
        }
    }

    /// Empties the memory tier. Lower tiers are left alone.
    pub fn clear(&self) {
        self.memory.clear();
        #[cfg(feature = "metrics")]
        gauge!("fetchguard_cache_entries", "cache" => self.config.name.clone()).set(0.0);
    }

    /// Number of entries in the memory tier.
    pub fn len(&self) -> usize {
        self.memory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.counters
            .snapshot(self.memory.len(), self.memory.capacity())
    }

    /// Deletes entries older than `ttl + grace` from memory and every lower
    /// tier. Returns how many were removed in total.
    pub async fn purge_expired(&self, grace: Duration) -> usize {
        let mut purged = self.memory.purge_expired(grace, SystemTime::now());
        for tier in &self.config.tiers {
            match tier.purge_expired(grace).await {
                Ok(n) => purged += n,
                Err(err) => self.record_tier_error(tier.kind(), &err),
            }
        }

        #[cfg(feature = "tracing")]
        if purged > 0 {
            tracing::info!(cache = %self.config.name, purged, "purged expired entries");
        }

        purged
    }

    fn promote(&self, key: &str, entry: CacheEntry<V>) {
        self.store_in_memory(key, entry);
    }

    fn store_in_memory(&self, key: &str, entry: CacheEntry<V>) {
        match self.memory.insert(key, entry) {
            Insert::Evicted(victim) => {
                Counters::bump(&self.counters.evictions);

                #[cfg(feature = "metrics")]
                counter!("fetchguard_cache_evictions_total", "cache" => self.config.name.clone())
                    .increment(1);

                #[cfg(feature = "tracing")]
                tracing::debug!(cache = %self.config.name, key = %victim, "evicted least recently used entry");

                self.config.event_listeners.emit(&CacheEvent::Eviction {
                    name: self.config.name.clone(),
                    timestamp: Instant::now(),
                    key: victim,
                });
            }
            Insert::Ignored => {
                #[cfg(feature = "tracing")]
                tracing::trace!(cache = %self.config.name, key = %key, "older write ignored");
            }
            Insert::Stored => {}
        }

        #[cfg(feature = "metrics")]
        gauge!("fetchguard_cache_entries", "cache" => self.config.name.clone())
            .set(self.memory.len() as f64);
    }

    fn record_hit(&self, key: &str, tier: TierKind) {
        Counters::bump(&self.counters.hits);

        #[cfg(feature = "metrics")]
        counter!("fetchguard_cache_requests_total", "cache" => self.config.name.clone(), "result" => "hit")
            .increment(1);

        #[cfg(feature = "tracing")]
        tracing::trace!(cache = %self.config.name, key = %key, %tier, "cache hit");

        self.config.event_listeners.emit(&CacheEvent::Hit {
            name: self.config.name.clone(),
            timestamp: Instant::now(),
            key: key.to_string(),
            tier,
        });
    }

    fn record_stale_hit(&self, key: &str, tier: TierKind) {
        Counters::bump(&self.counters.stale_hits);

        #[cfg(feature = "metrics")]
        counter!("fetchguard_cache_requests_total", "cache" => self.config.name.clone(), "result" => "stale")
            .increment(1);

        #[cfg(feature = "tracing")]
        tracing::debug!(cache = %self.config.name, key = %key, %tier, "stale cache hit");

        self.config.event_listeners.emit(&CacheEvent::StaleHit {
            name: self.config.name.clone(),
            timestamp: Instant::now(),
            key: key.to_string(),
            tier,
        });
    }

    fn record_miss(&self, key: &str) {
        Counters::bump(&self.counters.misses);

        #[cfg(feature = "metrics")]
        counter!("fetchguard_cache_requests_total", "cache" => self.config.name.clone(), "result" => "miss")
            .increment(1);

        #[cfg(feature = "tracing")]
        tracing::trace!(cache = %self.config.name, key = %key, "cache miss");

        self.config.event_listeners.emit(&CacheEvent::Miss {
            name: self.config.name.clone(),
            timestamp: Instant::now(),
            key: key.to_string(),
        });
    }

    fn record_tier_error(&self, tier: TierKind, err: &TierError) {
        Counters::bump(&self.counters.tier_errors);

        #[cfg(feature = "metrics")]
        counter!("fetchguard_cache_tier_errors_total", "cache" => self.config.name.clone(), "tier" => tier.as_str())
            .increment(1);

        #[cfg(feature = "tracing")]
        tracing::warn!(cache = %self.config.name, %tier, error = %err, "cache tier unavailable, continuing without it");

        self.config.event_listeners.emit(&CacheEvent::TierFailure {
            name: self.config.name.clone(),
            timestamp: Instant::now(),
            tier,
            message: err.to_string(),
        });
    }
}

impl<V> std::fmt::Debug for TieredCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TieredCache")
            .field("name", &self.config.name)
            .field("max_entries", &self.config.max_entries)
            .field("tiers", &self.config.tiers.len())
            .finish()
    }
}
