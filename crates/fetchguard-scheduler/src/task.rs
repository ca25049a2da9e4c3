use futures::future::BoxFuture;
use rand::Rng;
use std::cmp::Ordering;
use std::time::Duration;
use tokio::time::Instant;

/// Stand-in for a run time beyond what `Instant` can represent.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// How and when a submitted action should run.
///
/// Lower `priority` values run first among tasks due at the same instant.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitOptions {
    pub(crate) priority: u32,
    pub(crate) delay: Duration,
    pub(crate) dedupe_key: Option<String>,
    pub(crate) jitter: f64,
}

impl Default for SubmitOptions {
    fn default() -> Self {
        Self {
            priority: 1,
            delay: Duration::ZERO,
            dedupe_key: None,
            jitter: 0.0,
        }
    }
}

impl SubmitOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// While a task with this key is queued or running, further
    /// submissions with the same key are rejected.
    pub fn dedupe_key(mut self, key: impl Into<String>) -> Self {
        self.dedupe_key = Some(key.into());
        self
    }

    /// Spreads the start time by up to `±jitter × max(0.1s, delay)` (a zero
    /// delay counts as one second).
    pub fn jitter(mut self, jitter: f64) -> Self {
        self.jitter = if jitter.is_finite() { jitter.abs() } else { 0.0 };
        self
    }

    pub(crate) fn run_at(&self, now: Instant) -> Instant {
        if self.jitter == 0.0 {
            return after(now, self.delay);
        }
        let base = if self.delay.is_zero() {
            Duration::from_secs(1)
        } else {
            self.delay
        };
        let scale = base.max(Duration::from_millis(100)).as_secs_f64();
        let offset = rand::rng().random_range(-self.jitter..=self.jitter) * scale;
        let total = self.delay.as_secs_f64() + offset;
        if total <= 0.0 {
            now
        } else {
            after(now, Duration::try_from_secs_f64(total).unwrap_or(self.delay))
        }
    }
}

fn after(now: Instant, delay: Duration) -> Instant {
    now.checked_add(delay)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

pub(crate) type Action = BoxFuture<'static, Result<(), String>>;

pub(crate) struct QueuedTask {
    pub(crate) run_at: Instant,
    pub(crate) priority: u32,
    pub(crate) seq: u64,
    pub(crate) dedupe_key: Option<String>,
    pub(crate) action: Action,
}

impl QueuedTask {
    fn sort_key(&self) -> (Instant, u32, u64) {
        (self.run_at, self.priority, self.seq)
    }
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.sort_key() == other.sort_key()
    }
}

impl Eq for QueuedTask {}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}
