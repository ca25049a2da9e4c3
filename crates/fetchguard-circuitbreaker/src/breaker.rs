use crate::circuit::{Circuit, CircuitState, CircuitStatus};
use crate::classifier::{FailureClassifier, ThrottlingClassifier};
use crate::config::CircuitBreakerConfig;
use crate::events::CircuitEvent;
use crate::CircuitBreakerLayer;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::time::Instant;

#[cfg(feature = "metrics")]
use metrics::counter;

/// A shared circuit for one named upstream resource.
///
/// Clones refer to the same circuit. The lock only guards the state
/// machine; it is never held while a call is in flight.
#[derive(Clone)]
pub struct CircuitBreaker {
    config: Arc<CircuitBreakerConfig>,
    circuit: Arc<Mutex<Circuit>>,
    state: Arc<AtomicU8>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        let state = Arc::new(AtomicU8::new(CircuitState::Closed as u8));
        Self {
            config: Arc::new(config),
            circuit: Arc::new(Mutex::new(Circuit::new(Arc::clone(&state)))),
            state,
        }
    }

    pub fn builder() -> crate::CircuitBreakerConfigBuilder {
        crate::CircuitBreakerConfigBuilder::new()
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current state without taking the lock.
    pub fn state(&self) -> CircuitState {
        CircuitState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether a call may go to the upstream now.
    ///
    /// Returns false while open. Once the recovery timeout has passed the
    /// first caller gets true (the probe) and the circuit is half-open.
    pub fn allow_request(&self) -> bool {
        let permitted = self.circuit.lock().try_acquire(&self.config, Instant::now());
        if !permitted {
            #[cfg(feature = "tracing")]
            tracing::debug!(breaker = %self.config.name, "call rejected by open circuit");

            #[cfg(feature = "metrics")]
            counter!("fetchguard_circuit_calls_total", "circuit" => self.config.name.clone(), "outcome" => "rejected")
                .increment(1);

            self.config.event_listeners.emit(&CircuitEvent::CallRejected {
                name: self.config.name.clone(),
                timestamp: std::time::Instant::now(),
            });
        }
        permitted
    }

    pub fn record_success(&self) {
        self.circuit.lock().record_success(&self.config);
    }

    /// Counts a health failure (e.g. a throttling signal).
    pub fn record_failure(&self) {
        let count = self
            .circuit
            .lock()
            .record_failure(&self.config, Instant::now());

        #[cfg(feature = "tracing")]
        tracing::debug!(
            breaker = %self.config.name,
            failures = count,
            threshold = self.config.failure_threshold,
            "health failure recorded"
        );
        #[cfg(not(feature = "tracing"))]
        let _ = count;
    }

    /// Records a failure that does not reflect upstream health.
    pub fn record_ignored_failure(&self) {
        self.circuit.lock().record_ignored();
    }

    /// Records the outcome of a call, classifying errors with `classifier`.
    pub fn record_result<T, E, C>(&self, result: &Result<T, E>, classifier: &C)
    where
        C: FailureClassifier<E> + ?Sized,
    {
        match result {
            Ok(_) => self.record_success(),
            Err(e) if classifier.is_health_failure(e) => self.record_failure(),
            Err(_) => self.record_ignored_failure(),
        }
    }

    pub fn status(&self) -> CircuitStatus {
        self.circuit.lock().status(&self.config, Instant::now())
    }

    /// Closes the circuit and clears its failure history.
    pub fn reset(&self) {
        self.circuit.lock().reset(&self.config);
    }

    /// Opens the circuit for one recovery timeout starting now.
    pub fn force_open(&self) {
        self.circuit
            .lock()
            .force_open(&self.config, Instant::now());
    }

    /// Layer guarding a service with this circuit, counting only
    /// throttling signals.
    pub fn layer(&self) -> CircuitBreakerLayer<ThrottlingClassifier> {
        CircuitBreakerLayer::new(self.clone(), ThrottlingClassifier)
    }

    /// Layer guarding a service with this circuit and a custom classifier.
    pub fn layer_with<C>(&self, classifier: C) -> CircuitBreakerLayer<C> {
        CircuitBreakerLayer::new(self.clone(), classifier)
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.config.name)
            .field("state", &self.state())
            .finish()
    }
}
