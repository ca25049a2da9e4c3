use crate::backoff::{FixedInterval, IntervalFunction, SteppedBackoff};
use crate::coordinator::RetryCoordinator;
use crate::events::RetryEvent;
use crate::RetryLayer;
use fetchguard_core::events::{EventListeners, FnListener};
use fetchguard_core::BudgetScope;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for the retry stage.
pub struct RetryConfig {
    pub(crate) name: String,
    pub(crate) max_attempts: usize,
    pub(crate) backoff: Arc<dyn IntervalFunction>,
    pub(crate) jitter: f64,
    pub(crate) coordinator: RetryCoordinator,
    pub(crate) retry_on_rate_limit: bool,
    pub(crate) rate_limit_cooldown: (Duration, Duration),
    pub(crate) event_listeners: EventListeners<RetryEvent>,
}

impl RetryConfig {
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::new()
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    pub fn coordinator(&self) -> &RetryCoordinator {
        &self.coordinator
    }

    /// Cooldown to impose after a throttle that carried no hint: uniform
    /// in the configured range.
    pub(crate) fn sample_cooldown(&self) -> Duration {
        let (min, max) = self.rate_limit_cooldown;
        if max <= min {
            return min;
        }
        let secs = rand::rng().random_range(min.as_secs_f64()..=max.as_secs_f64());
        Duration::from_secs_f64(secs)
    }
}

/// Builder for [`RetryConfig`].
pub struct RetryConfigBuilder {
    name: String,
    max_attempts: usize,
    backoff: Arc<dyn IntervalFunction>,
    jitter: f64,
    coordinator: Option<RetryCoordinator>,
    retry_on_rate_limit: bool,
    rate_limit_cooldown: (Duration, Duration),
    event_listeners: EventListeners<RetryEvent>,
}

impl Default for RetryConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryConfigBuilder {
    /// Defaults: 3 attempts, 2s then 5s then doubling, 20% jitter, a
    /// 60 to 120 second cooldown after an unhinted throttle.
    pub fn new() -> Self {
        Self {
            name: "<unnamed>".to_string(),
            max_attempts: 3,
            backoff: Arc::new(SteppedBackoff::default()),
            jitter: 0.2,
            coordinator: None,
            retry_on_rate_limit: false,
            rate_limit_cooldown: (Duration::from_secs(60), Duration::from_secs(120)),
            event_listeners: EventListeners::new(),
        }
    }

    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    /// Total attempts including the first. At least 1.
    pub fn max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn backoff<I>(mut self, backoff: I) -> Self
    where
        I: IntervalFunction + 'static,
    {
        self.backoff = Arc::new(backoff);
        self
    }

    pub fn fixed_backoff(self, delay: Duration) -> Self {
        self.backoff(FixedInterval::new(delay))
    }

    pub fn stepped_backoff(self, first: Duration, second: Duration, factor: f64) -> Self {
        self.backoff(SteppedBackoff::new(first, second).factor(factor))
    }

    /// Uniform jitter added to each wait, as a fraction of the wait.
    pub fn jitter(mut self, fraction: f64) -> Self {
        self.jitter = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self
    }

    /// Shares per-key budgets and cooldowns with other pipelines.
    pub fn coordinator(mut self, coordinator: RetryCoordinator) -> Self {
        self.coordinator = Some(coordinator);
        self
    }

    /// Sleep out a throttle cooldown and try again (within `max_attempts`)
    /// instead of surfacing it at once.
    pub fn retry_on_rate_limit(mut self, enabled: bool) -> Self {
        self.retry_on_rate_limit = enabled;
        self
    }

    /// Range for cooldowns after throttles without a hint.
    pub fn rate_limit_cooldown(mut self, min: Duration, max: Duration) -> Self {
        self.rate_limit_cooldown = (min, max.max(min));
        self
    }

    pub fn on_retry<F>(mut self, f: F) -> Self
    where
        F: Fn(usize, Duration) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let RetryEvent::Retry { attempt, delay, .. } = event {
                f(*attempt, *delay);
            }
        }));
        self
    }

    pub fn on_throttled<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, Duration) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let RetryEvent::Throttled { key, cooldown, .. } = event {
                f(key, *cooldown);
            }
        }));
        self
    }

    pub fn on_budget_exhausted<F>(mut self, f: F) -> Self
    where
        F: Fn(&BudgetScope) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let RetryEvent::BudgetExhausted { scope, .. } = event {
                f(scope);
            }
        }));
        self
    }

    pub fn into_config(self) -> RetryConfig {
        RetryConfig {
            name: self.name,
            max_attempts: self.max_attempts,
            backoff: self.backoff,
            jitter: self.jitter,
            coordinator: self.coordinator.unwrap_or_default(),
            retry_on_rate_limit: self.retry_on_rate_limit,
            rate_limit_cooldown: self.rate_limit_cooldown,
            event_listeners: self.event_listeners,
        }
    }

    pub fn build(self) -> RetryLayer {
        RetryLayer::new(self.into_config())
    }
}
