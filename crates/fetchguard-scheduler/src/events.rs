use fetchguard_core::EngineEvent;
use std::time::{Duration, Instant};

/// Events emitted by a [`TaskScheduler`](crate::TaskScheduler).
#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    /// A submission was refused: its dedupe key was taken or the scheduler
    /// had stopped.
    Rejected {
        name: String,
        timestamp: Instant,
        dedupe_key: Option<String>,
    },
    Completed {
        name: String,
        timestamp: Instant,
        dedupe_key: Option<String>,
        duration: Duration,
    },
    /// The action returned an error or panicked.
    Failed {
        name: String,
        timestamp: Instant,
        dedupe_key: Option<String>,
        message: String,
        panicked: bool,
    },
}

impl EngineEvent for SchedulerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SchedulerEvent::Rejected { .. } => "rejected",
            SchedulerEvent::Completed { .. } => "completed",
            SchedulerEvent::Failed { .. } => "failed",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            SchedulerEvent::Rejected { timestamp, .. }
            | SchedulerEvent::Completed { timestamp, .. }
            | SchedulerEvent::Failed { timestamp, .. } => *timestamp,
        }
    }

    fn component_name(&self) -> &str {
        match self {
            SchedulerEvent::Rejected { name, .. }
            | SchedulerEvent::Completed { name, .. }
            | SchedulerEvent::Failed { name, .. } => name,
        }
    }
}
