//! Configuration for the tiered cache.

use crate::events::CacheEvent;
use crate::tier::{CacheTier, TierKind};
use crate::TieredCache;
use fetchguard_core::{EventListeners, FnListener};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Configuration shared by every value type a cache can hold.
pub struct CacheConfig {
    pub(crate) name: String,
    pub(crate) max_entries: usize,
    pub(crate) default_ttl: Duration,
    pub(crate) stale_retention: Duration,
    pub(crate) tiers: Vec<Arc<dyn CacheTier>>,
    pub(crate) event_listeners: EventListeners<CacheEvent>,
}

impl CacheConfig {
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::new()
    }
}

/// Builder for a [`TieredCache`].
pub struct CacheConfigBuilder {
    name: String,
    max_entries: usize,
    default_ttl: Duration,
    stale_retention: Duration,
    tiers: Vec<Arc<dyn CacheTier>>,
    event_listeners: EventListeners<CacheEvent>,
}

impl CacheConfigBuilder {
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        Self {
            name: String::from("<unnamed>"),
            max_entries: 5000,
            default_ttl: Duration::from_secs(3600),
            stale_retention: Duration::from_secs(86_400),
            tiers: Vec::new(),
            event_listeners: EventListeners::new(),
        }
    }

    /// Sets the name of this cache instance for observability.
    ///
    /// Default: `"<unnamed>"`
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Capacity of the in-memory LRU.
    ///
    /// Default: 5000
    pub fn max_entries(mut self, max: usize) -> Self {
        self.max_entries = max.max(1);
        self
    }

    /// TTL used by [`TieredCache::set_default`].
    ///
    /// Default: 1 hour
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// How long past its TTL a lower tier with native expiry keeps an
    /// entry around for stale reads.
    ///
    /// Default: 24 hours
    pub fn stale_retention(mut self, retention: Duration) -> Self {
        self.stale_retention = retention;
        self
    }

    /// Adds a tier below memory. Tiers are consulted in the order added.
    pub fn tier<T: CacheTier + 'static>(self, tier: T) -> Self {
        self.shared_tier(Arc::new(tier))
    }

    pub fn shared_tier(mut self, tier: Arc<dyn CacheTier>) -> Self {
        self.tiers.push(tier);
        self
    }

    /// Registers a callback for fresh hits, with the tier that answered.
    pub fn on_hit<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, TierKind) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let CacheEvent::Hit { key, tier, .. } = event {
                f(key, *tier);
            }
        }));
        self
    }

    pub fn on_stale_hit<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let CacheEvent::StaleHit { key, .. } = event {
                f(key);
            }
        }));
        self
    }

    pub fn on_miss<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let CacheEvent::Miss { key, .. } = event {
                f(key);
            }
        }));
        self
    }

    /// Registers a callback invoked with the key the memory tier dropped.
    pub fn on_eviction<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let CacheEvent::Eviction { key, .. } = event {
                f(key);
            }
        }));
        self
    }

    pub fn on_tier_failure<F>(mut self, f: F) -> Self
    where
        F: Fn(TierKind, &str) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let CacheEvent::TierFailure { tier, message, .. } = event {
                f(*tier, message);
            }
        }));
        self
    }

    pub fn into_config(self) -> CacheConfig {
        CacheConfig {
            name: self.name,
            max_entries: self.max_entries,
            default_ttl: self.default_ttl,
            stale_retention: self.stale_retention,
            tiers: self.tiers,
            event_listeners: self.event_listeners,
        }
    }

    pub fn build<V>(self) -> TieredCache<V>
    where
        V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        TieredCache::new(self.into_config())
    }
}

impl Default for CacheConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
