use crate::config::CircuitBreakerConfig;
use crate::events::CircuitEvent;
#[cfg(feature = "metrics")]
use metrics::{counter, gauge};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// State of a circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum CircuitState {
    /// Calls flow normally.
    Closed = 0,
    /// Calls are refused until the recovery timeout passes.
    Open = 1,
    /// One probe call is allowed through to test the upstream.
    HalfOpen = 2,
}

impl CircuitState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a circuit for dashboards and health endpoints.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CircuitStatus {
    pub name: String,
    pub state: CircuitState,
    /// Health failures still inside the sliding window.
    pub failures_in_window: usize,
    /// Time left before an open circuit admits a probe. `None` unless open.
    pub cooldown_remaining: Option<Duration>,
}

pub(crate) struct Circuit {
    state: CircuitState,
    state_atomic: Arc<AtomicU8>,
    failures: VecDeque<Instant>,
    opened_until: Option<Instant>,
    probe_started: Option<Instant>,
}

impl Circuit {
    pub(crate) fn new(state_atomic: Arc<AtomicU8>) -> Self {
        Self {
            state: CircuitState::Closed,
            state_atomic,
            failures: VecDeque::new(),
            opened_until: None,
            probe_started: None,
        }
    }

    pub(crate) fn state(&self) -> CircuitState {
        self.state
    }

    /// Decides whether a call may proceed, moving OPEN to HALF_OPEN once
    /// the recovery timeout has passed.
    ///
    /// In HALF_OPEN exactly one probe is admitted. A probe whose outcome
    /// is never reported is written off after one recovery timeout so a
    /// cancelled probe cannot wedge the circuit.
    pub(crate) fn try_acquire(&mut self, config: &CircuitBreakerConfig, now: Instant) -> bool {
        match self.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let recovered = self.opened_until.map_or(true, |until| now >= until);
                if recovered {
                    self.transition_to(CircuitState::HalfOpen, config);
                    self.probe_started = Some(now);
                }
                recovered
            }
            CircuitState::HalfOpen => match self.probe_started {
                Some(started) if now.duration_since(started) < config.recovery_timeout => false,
                _ => {
                    self.probe_started = Some(now);
                    true
                }
            },
        }
    }

    /// Any success closes the circuit and forgets past failures.
    pub(crate) fn record_success(&mut self, config: &CircuitBreakerConfig) {
        self.failures.clear();
        self.opened_until = None;
        self.probe_started = None;
        self.transition_to(CircuitState::Closed, config);

        config.event_listeners.emit(&CircuitEvent::SuccessRecorded {
            name: config.name.clone(),
            timestamp: std::time::Instant::now(),
        });
    }

    /// Counts a health failure. Returns the failures left in the window.
    pub(crate) fn record_failure(&mut self, config: &CircuitBreakerConfig, now: Instant) -> usize {
        self.prune(config.window, now);
        self.failures.push_back(now);
        let count = self.failures.len();

        config.event_listeners.emit(&CircuitEvent::FailureRecorded {
            name: config.name.clone(),
            timestamp: std::time::Instant::now(),
            failures_in_window: count,
        });

        match self.state {
            CircuitState::HalfOpen => self.open(config, now),
            CircuitState::Closed if count >= config.failure_threshold => self.open(config, now),
            _ => {}
        }
        count
    }

    /// A failure that does not count against the circuit. It still ends
    /// a half-open probe so the next caller can try.
    pub(crate) fn record_ignored(&mut self) {
        if self.state == CircuitState::HalfOpen {
            self.probe_started = None;
        }
    }

    pub(crate) fn force_open(&mut self, config: &CircuitBreakerConfig, now: Instant) {
        self.open(config, now);
    }

    pub(crate) fn reset(&mut self, config: &CircuitBreakerConfig) {
        self.failures.clear();
        self.opened_until = None;
        self.probe_started = None;
        self.transition_to(CircuitState::Closed, config);
    }

    pub(crate) fn status(&mut self, config: &CircuitBreakerConfig, now: Instant) -> CircuitStatus {
        self.prune(config.window, now);
        let cooldown_remaining = match (self.state, self.opened_until) {
            (CircuitState::Open, Some(until)) => Some(until.saturating_duration_since(now)),
            _ => None,
        };
        CircuitStatus {
            name: config.name.clone(),
            state: self.state,
            failures_in_window: self.failures.len(),
            cooldown_remaining,
        }
    }

    fn open(&mut self, config: &CircuitBreakerConfig, now: Instant) {
        self.opened_until = Some(now + config.recovery_timeout);
        self.probe_started = None;
        self.transition_to(CircuitState::Open, config);
    }

    fn prune(&mut self, window: Duration, now: Instant) {
        while let Some(&oldest) = self.failures.front() {
            if now.duration_since(oldest) > window {
                self.failures.pop_front();
            } else {
                break;
            }
        }
    }

    fn transition_to(&mut self, state: CircuitState, config: &CircuitBreakerConfig) {
        if self.state == state {
            return;
        }
        let from = self.state;

        config
            .event_listeners
            .emit(&CircuitEvent::StateTransition {
                name: config.name.clone(),
                timestamp: std::time::Instant::now(),
                from,
                to: state,
            });

        #[cfg(feature = "tracing")]
        tracing::info!(breaker = %config.name, from = %from, to = %state, "circuit state transition");

        #[cfg(feature = "metrics")]
        {
            counter!(
                "fetchguard_circuit_transitions_total",
                "circuit" => config.name.clone(),
                "from" => from.as_str(),
                "to" => state.as_str()
            )
            .increment(1);
            gauge!("fetchguard_circuit_state", "circuit" => config.name.clone())
                .set(state as u8 as f64);
        }

        self.state = state;
        self.state_atomic.store(state as u8, Ordering::Release);
    }
}
