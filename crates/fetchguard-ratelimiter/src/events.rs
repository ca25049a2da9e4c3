use fetchguard_core::EngineEvent;
use std::time::{Duration, Instant};

/// Events emitted by a [`RateLimiter`](crate::RateLimiter).
#[derive(Debug, Clone)]
pub enum RateLimiterEvent {
    /// A caller was let through, possibly after waiting.
    PermitAcquired {
        name: String,
        timestamp: Instant,
        waited: Duration,
    },
    /// A caller arrived inside the minimum interval and had to sleep.
    Delayed {
        name: String,
        timestamp: Instant,
        delay: Duration,
    },
}

impl EngineEvent for RateLimiterEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RateLimiterEvent::PermitAcquired { .. } => "permit_acquired",
            RateLimiterEvent::Delayed { .. } => "delayed",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            RateLimiterEvent::PermitAcquired { timestamp, .. }
            | RateLimiterEvent::Delayed { timestamp, .. } => *timestamp,
        }
    }

    fn component_name(&self) -> &str {
        match self {
            RateLimiterEvent::PermitAcquired { name, .. }
            | RateLimiterEvent::Delayed { name, .. } => name,
        }
    }
}
