use crate::circuit::CircuitState;
use crate::events::CircuitEvent;
use crate::CircuitBreaker;
use fetchguard_core::events::{EventListeners, FnListener};
use std::time::Duration;

/// Configuration for a [`CircuitBreaker`].
#[derive(Clone)]
pub struct CircuitBreakerConfig {
    pub(crate) failure_threshold: usize,
    pub(crate) window: Duration,
    pub(crate) recovery_timeout: Duration,
    pub(crate) event_listeners: EventListeners<CircuitEvent>,
    pub(crate) name: String,
}

impl CircuitBreakerConfig {
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::new()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn failure_threshold(&self) -> usize {
        self.failure_threshold
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn recovery_timeout(&self) -> Duration {
        self.recovery_timeout
    }

    /// Same settings and listeners, different name.
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        let mut config = self.clone();
        config.name = name.into();
        config
    }
}

impl std::fmt::Debug for CircuitBreakerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreakerConfig")
            .field("name", &self.name)
            .field("failure_threshold", &self.failure_threshold)
            .field("window", &self.window)
            .field("recovery_timeout", &self.recovery_timeout)
            .finish()
    }
}

/// Builder for [`CircuitBreakerConfig`].
pub struct CircuitBreakerConfigBuilder {
    failure_threshold: usize,
    window: Duration,
    recovery_timeout: Duration,
    event_listeners: EventListeners<CircuitEvent>,
    name: String,
}

impl Default for CircuitBreakerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CircuitBreakerConfigBuilder {
    /// Defaults: 3 failures within 300 seconds open the circuit for 300 seconds.
    pub fn new() -> Self {
        Self {
            failure_threshold: 3,
            window: Duration::from_secs(300),
            recovery_timeout: Duration::from_secs(300),
            event_listeners: EventListeners::new(),
            name: "<unnamed>".to_string(),
        }
    }

    /// Health failures inside the window needed to open the circuit. At least 1.
    pub fn failure_threshold(mut self, threshold: usize) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    /// Length of the sliding failure window.
    pub fn window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// How long the circuit stays open before admitting a probe.
    pub fn recovery_timeout(mut self, timeout: Duration) -> Self {
        self.recovery_timeout = timeout;
        self
    }

    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    pub fn on_state_transition<F>(mut self, f: F) -> Self
    where
        F: Fn(CircuitState, CircuitState) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let CircuitEvent::StateTransition { from, to, .. } = event {
                f(*from, *to);
            }
        }));
        self
    }

    pub fn on_call_rejected<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let CircuitEvent::CallRejected { .. } = event {
                f();
            }
        }));
        self
    }

    pub fn into_config(self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            window: self.window,
            recovery_timeout: self.recovery_timeout,
            event_listeners: self.event_listeners,
            name: self.name,
        }
    }

    pub fn build(self) -> CircuitBreaker {
        CircuitBreaker::new(self.into_config())
    }
}
