use crate::events::RateLimiterEvent;
use crate::RateLimiter;
use fetchguard_core::events::{EventListeners, FnListener};
use std::time::Duration;

/// Configuration for a [`RateLimiter`].
pub struct RateLimiterConfig {
    pub(crate) min_interval: Duration,
    pub(crate) jitter: f64,
    pub(crate) event_listeners: EventListeners<RateLimiterEvent>,
    pub(crate) name: String,
}

impl RateLimiterConfig {
    pub fn builder() -> RateLimiterConfigBuilder {
        RateLimiterConfigBuilder::new()
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    pub fn jitter(&self) -> f64 {
        self.jitter
    }
}

/// Builder for [`RateLimiterConfig`].
pub struct RateLimiterConfigBuilder {
    min_interval: Duration,
    jitter: f64,
    event_listeners: EventListeners<RateLimiterEvent>,
    name: String,
}

impl Default for RateLimiterConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiterConfigBuilder {
    /// Defaults: one call per second, no jitter.
    pub fn new() -> Self {
        Self {
            min_interval: Duration::from_secs(1),
            jitter: 0.0,
            event_listeners: EventListeners::new(),
            name: "<unnamed>".to_string(),
        }
    }

    /// Minimum spacing between two calls through the limiter.
    pub fn min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    /// Random spread applied to each delay, as a fraction of
    /// `min_interval`. Clamped to `0.0..=1.0`.
    pub fn jitter(mut self, fraction: f64) -> Self {
        self.jitter = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self
    }

    /// Name used in logs, metrics and events.
    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    /// Called after every permit with the time the caller waited.
    pub fn on_permit_acquired<F>(mut self, f: F) -> Self
    where
        F: Fn(Duration) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let RateLimiterEvent::PermitAcquired { waited, .. } = event {
                f(*waited);
            }
        }));
        self
    }

    /// Called whenever a caller has to sleep before proceeding.
    pub fn on_delayed<F>(mut self, f: F) -> Self
    where
        F: Fn(Duration) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let RateLimiterEvent::Delayed { delay, .. } = event {
                f(*delay);
            }
        }));
        self
    }

    pub fn build(self) -> RateLimiter {
        RateLimiter::new(RateLimiterConfig {
            min_interval: self.min_interval,
            jitter: self.jitter,
            event_listeners: self.event_listeners,
            name: self.name,
        })
    }
}
