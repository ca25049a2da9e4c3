use rand::Rng;
use std::time::Duration;

/// Computes the wait before the next retry.
pub trait IntervalFunction: Send + Sync {
    /// `attempt` is 0 for the wait after the first failure.
    fn next_interval(&self, attempt: usize) -> Duration;
}

/// The same wait before every retry.
#[derive(Debug, Clone)]
pub struct FixedInterval {
    duration: Duration,
}

impl FixedInterval {
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }
}

impl IntervalFunction for FixedInterval {
    fn next_interval(&self, _attempt: usize) -> Duration {
        self.duration
    }
}

/// Hand-tuned first two waits, then geometric growth.
///
/// After the first failure wait `first`, after the second wait `second`,
/// and from then on `second × factor^(n-1)`, optionally capped.
///
/// ```rust
/// use fetchguard_retry::{IntervalFunction, SteppedBackoff};
/// use std::time::Duration;
///
/// let backoff = SteppedBackoff::new(Duration::from_secs(2), Duration::from_secs(5));
/// assert_eq!(backoff.next_interval(0), Duration::from_secs(2));
/// assert_eq!(backoff.next_interval(1), Duration::from_secs(5));
/// assert_eq!(backoff.next_interval(2), Duration::from_secs(10));
/// assert_eq!(backoff.next_interval(3), Duration::from_secs(20));
/// ```
#[derive(Debug, Clone)]
pub struct SteppedBackoff {
    first: Duration,
    second: Duration,
    factor: f64,
    max_interval: Option<Duration>,
}

impl SteppedBackoff {
    pub fn new(first: Duration, second: Duration) -> Self {
        Self {
            first,
            second,
            factor: 2.0,
            max_interval: None,
        }
    }

    /// Growth factor applied after the second wait. Values below 1.0 are
    /// raised to 1.0 so the schedule never shrinks.
    pub fn factor(mut self, factor: f64) -> Self {
        self.factor = if factor.is_finite() { factor.max(1.0) } else { 1.0 };
        self
    }

    pub fn max_interval(mut self, max: Duration) -> Self {
        self.max_interval = Some(max);
        self
    }
}

impl Default for SteppedBackoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(2), Duration::from_secs(5))
    }
}

impl IntervalFunction for SteppedBackoff {
    fn next_interval(&self, attempt: usize) -> Duration {
        let interval = match attempt {
            0 => self.first,
            1 => self.second,
            n => {
                let exp = i32::try_from(n - 1).unwrap_or(i32::MAX);
                let secs = self.second.as_secs_f64() * self.factor.powi(exp);
                Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
            }
        };
        match self.max_interval {
            Some(max) => interval.min(max),
            None => interval,
        }
    }
}

/// A closure as an [`IntervalFunction`].
pub struct FnInterval<F> {
    f: F,
}

impl<F> FnInterval<F>
where
    F: Fn(usize) -> Duration + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> IntervalFunction for FnInterval<F>
where
    F: Fn(usize) -> Duration + Send + Sync,
{
    fn next_interval(&self, attempt: usize) -> Duration {
        (self.f)(attempt)
    }
}

/// Adds uniform jitter in `[0, jitter × delay]` to `delay`.
pub fn jittered(delay: Duration, jitter: f64) -> Duration {
    if jitter <= 0.0 || delay.is_zero() {
        return delay;
    }
    let extra = rand::rng().random_range(0.0..=jitter);
    delay.saturating_add(delay.mul_f64(extra))
}
