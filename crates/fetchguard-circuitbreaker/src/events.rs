use crate::circuit::CircuitState;
use fetchguard_core::EngineEvent;
use std::time::Instant;

/// Events emitted by a [`CircuitBreaker`](crate::CircuitBreaker).
#[derive(Debug, Clone)]
pub enum CircuitEvent {
    StateTransition {
        name: String,
        timestamp: Instant,
        from: CircuitState,
        to: CircuitState,
    },
    /// A call was refused without reaching the upstream.
    CallRejected { name: String, timestamp: Instant },
    /// A health failure was counted.
    FailureRecorded {
        name: String,
        timestamp: Instant,
        failures_in_window: usize,
    },
    SuccessRecorded { name: String, timestamp: Instant },
}

impl EngineEvent for CircuitEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CircuitEvent::StateTransition { .. } => "state_transition",
            CircuitEvent::CallRejected { .. } => "call_rejected",
            CircuitEvent::FailureRecorded { .. } => "failure_recorded",
            CircuitEvent::SuccessRecorded { .. } => "success_recorded",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            CircuitEvent::StateTransition { timestamp, .. }
            | CircuitEvent::CallRejected { timestamp, .. }
            | CircuitEvent::FailureRecorded { timestamp, .. }
            | CircuitEvent::SuccessRecorded { timestamp, .. } => *timestamp,
        }
    }

    fn component_name(&self) -> &str {
        match self {
            CircuitEvent::StateTransition { name, .. }
            | CircuitEvent::CallRejected { name, .. }
            | CircuitEvent::FailureRecorded { name, .. }
            | CircuitEvent::SuccessRecorded { name, .. } => name,
        }
    }
}
