use crate::events::SchedulerEvent;
use crate::TaskScheduler;
use fetchguard_core::{EventListeners, FnListener};
use std::time::Duration;

/// Configuration for a [`TaskScheduler`].
pub struct SchedulerConfig {
    pub(crate) name: String,
    pub(crate) wake_interval: Duration,
    pub(crate) event_listeners: EventListeners<SchedulerEvent>,
}

impl SchedulerConfig {
    pub fn builder() -> SchedulerConfigBuilder {
        SchedulerConfigBuilder::new()
    }
}

/// Builder for [`SchedulerConfig`].
pub struct SchedulerConfigBuilder {
    name: String,
    wake_interval: Duration,
    event_listeners: EventListeners<SchedulerEvent>,
}

impl SchedulerConfigBuilder {
    pub fn new() -> Self {
        Self {
            name: String::from("<unnamed>"),
            wake_interval: Duration::from_secs(1),
            event_listeners: EventListeners::new(),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Longest the idle worker sleeps before re-checking its queue. New
    /// submissions wake it immediately regardless.
    ///
    /// Default: 1 second
    pub fn wake_interval(mut self, interval: Duration) -> Self {
        self.wake_interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Called with the dedupe key and message of every failed or panicked
    /// task.
    pub fn on_task_failed<F>(mut self, f: F) -> Self
    where
        F: Fn(Option<&str>, &str) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let SchedulerEvent::Failed {
                dedupe_key,
                message,
                ..
            } = event
            {
                f(dedupe_key.as_deref(), message);
            }
        }));
        self
    }

    pub fn on_rejected<F>(mut self, f: F) -> Self
    where
        F: Fn(Option<&str>) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let SchedulerEvent::Rejected { dedupe_key, .. } = event {
                f(dedupe_key.as_deref());
            }
        }));
        self
    }

    pub fn into_config(self) -> SchedulerConfig {
        SchedulerConfig {
            name: self.name,
            wake_interval: self.wake_interval,
            event_listeners: self.event_listeners,
        }
    }

    pub fn build(self) -> TaskScheduler {
        TaskScheduler::new(self.into_config())
    }
}

impl Default for SchedulerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
