use fetchguard_core::{BudgetScope, EngineEvent};
use std::time::{Duration, Instant};

/// Events emitted by the retry stage.
#[derive(Debug, Clone)]
pub enum RetryEvent {
    /// A transient failure will be retried after `delay`.
    Retry {
        name: String,
        timestamp: Instant,
        key: String,
        attempt: usize,
        delay: Duration,
    },
    /// The call succeeded after `attempts` tries.
    Success {
        name: String,
        timestamp: Instant,
        attempts: usize,
    },
    /// Every attempt failed; the last error is returned.
    Exhausted {
        name: String,
        timestamp: Instant,
        key: String,
        attempts: usize,
    },
    /// The upstream throttled `key`; it is cooling down for `cooldown`.
    Throttled {
        name: String,
        timestamp: Instant,
        key: String,
        cooldown: Duration,
    },
    /// A call was refused because `key` is still cooling down.
    CooldownActive {
        name: String,
        timestamp: Instant,
        key: String,
        remaining: Duration,
    },
    /// A per-key or per-request budget ran out.
    BudgetExhausted {
        name: String,
        timestamp: Instant,
        scope: BudgetScope,
    },
}

impl EngineEvent for RetryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RetryEvent::Retry { .. } => "retry",
            RetryEvent::Success { .. } => "success",
            RetryEvent::Exhausted { .. } => "exhausted",
            RetryEvent::Throttled { .. } => "throttled",
            RetryEvent::CooldownActive { .. } => "cooldown_active",
            RetryEvent::BudgetExhausted { .. } => "budget_exhausted",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            RetryEvent::Retry { timestamp, .. }
            | RetryEvent::Success { timestamp, .. }
            | RetryEvent::Exhausted { timestamp, .. }
            | RetryEvent::Throttled { timestamp, .. }
            | RetryEvent::CooldownActive { timestamp, .. }
            | RetryEvent::BudgetExhausted { timestamp, .. } => *timestamp,
        }
    }

    fn component_name(&self) -> &str {
        match self {
            RetryEvent::Retry { name, .. }
            | RetryEvent::Success { name, .. }
            | RetryEvent::Exhausted { name, .. }
            | RetryEvent::Throttled { name, .. }
            | RetryEvent::CooldownActive { name, .. }
            | RetryEvent::BudgetExhausted { name, .. } => name,
        }
    }
}
