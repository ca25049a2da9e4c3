use crate::tier::TierKind;
use fetchguard_core::EngineEvent;
use std::time::Instant;

/// Events emitted by a [`TieredCache`](crate::TieredCache).
#[derive(Debug, Clone)]
pub enum CacheEvent {
    /// A fresh entry was found.
    Hit {
        name: String,
        timestamp: Instant,
        key: String,
        tier: TierKind,
    },
    /// An expired entry was served to a caller that accepts staleness.
    StaleHit {
        name: String,
        timestamp: Instant,
        key: String,
        tier: TierKind,
    },
    Miss {
        name: String,
        timestamp: Instant,
        key: String,
    },
    /// The memory tier dropped its least recently used entry.
    Eviction {
        name: String,
        timestamp: Instant,
        key: String,
    },
    /// A lower tier failed; the cache continued without it.
    TierFailure {
        name: String,
        timestamp: Instant,
        tier: TierKind,
        message: String,
    },
}

impl EngineEvent for CacheEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CacheEvent::Hit { .. } => "hit",
            CacheEvent::StaleHit { .. } => "stale_hit",
            CacheEvent::Miss { .. } => "miss",
            CacheEvent::Eviction { .. } => "eviction",
            CacheEvent::TierFailure { .. } => "tier_failure",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            CacheEvent::Hit { timestamp, .. }
            | CacheEvent::StaleHit { timestamp, .. }
            | CacheEvent::Miss { timestamp, .. }
            | CacheEvent::Eviction { timestamp, .. }
            | CacheEvent::TierFailure { timestamp, .. } => *timestamp,
        }
    }

    fn component_name(&self) -> &str {
        match self {
            CacheEvent::Hit { name, .. }
            | CacheEvent::StaleHit { name, .. }
            | CacheEvent::Miss { name, .. }
            | CacheEvent::Eviction { name, .. }
            | CacheEvent::TierFailure { name, .. } => name,
        }
    }
}
