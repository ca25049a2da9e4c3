use crate::config::RateLimiterConfig;
use crate::events::RateLimiterEvent;
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

#[cfg(feature = "metrics")]
use metrics::counter;

#[cfg(feature = "tracing")]
use tracing::debug;

/// Enforces a minimum spacing between calls to one upstream resource.
///
/// Clones share state: every clone paces against the same "last call"
/// timestamp, so one limiter instance serializes access to one upstream
/// across all callers.
#[derive(Clone)]
pub struct RateLimiter {
    config: Arc<RateLimiterConfig>,
    last_call: Arc<Mutex<Option<Instant>>>,
    counters: Arc<Counters>,
}

#[derive(Default)]
struct Counters {
    calls: AtomicU64,
    delayed: AtomicU64,
    waited_micros: AtomicU64,
}

/// Point-in-time view of a limiter's activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RateLimiterStats {
    /// Calls that passed through `wait`.
    pub calls: u64,
    /// Calls that arrived inside the minimum interval and had to sleep.
    pub delayed: u64,
    /// Total time spent sleeping.
    pub total_wait: Duration,
}

impl RateLimiter {
    pub(crate) fn new(config: RateLimiterConfig) -> Self {
        Self {
            config: Arc::new(config),
            last_call: Arc::new(Mutex::new(None)),
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn builder() -> crate::RateLimiterConfigBuilder {
        crate::RateLimiterConfigBuilder::new()
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    /// Waits until this caller may proceed and returns how long it slept.
    ///
    /// The lock is held across the sleep so concurrent callers queue up
    /// behind each other instead of all waking at the same instant.
    pub async fn wait(&self) -> Duration {
        let mut last_call = self.last_call.lock().await;

        let delay = match *last_call {
            Some(prev) => {
                let elapsed = prev.elapsed();
                let jitter = self.sample_jitter();
                pacing_delay(elapsed, self.config.min_interval, jitter)
            }
            None => Duration::ZERO,
        };

        if !delay.is_zero() {
            self.counters.delayed.fetch_add(1, Ordering::Relaxed);
            self.counters
                .waited_micros
                .fetch_add(delay.as_micros() as u64, Ordering::Relaxed);

            #[cfg(feature = "tracing")]
            debug!(limiter = %self.config.name, delay_ms = delay.as_millis() as u64, "pacing upstream call");

            #[cfg(feature = "metrics")]
            counter!("fetchguard_ratelimit_delayed_total", "limiter" => self.config.name.clone())
                .increment(1);

            self.config.event_listeners.emit(&RateLimiterEvent::Delayed {
                name: self.config.name.clone(),
                timestamp: std::time::Instant::now(),
                delay,
            });

            sleep(delay).await;
        }

        *last_call = Some(Instant::now());
        self.counters.calls.fetch_add(1, Ordering::Relaxed);

        self.config
            .event_listeners
            .emit(&RateLimiterEvent::PermitAcquired {
                name: self.config.name.clone(),
                timestamp: std::time::Instant::now(),
                waited: delay,
            });

        delay
    }

    pub fn stats(&self) -> RateLimiterStats {
        RateLimiterStats {
            calls: self.counters.calls.load(Ordering::Relaxed),
            delayed: self.counters.delayed.load(Ordering::Relaxed),
            total_wait: Duration::from_micros(self.counters.waited_micros.load(Ordering::Relaxed)),
        }
    }

    /// Wraps a service so every call is paced by this limiter.
    pub fn layer(&self) -> crate::RateLimitLayer {
        crate::RateLimitLayer::new(self.clone())
    }

    fn sample_jitter(&self) -> f64 {
        let j = self.config.jitter;
        if j > 0.0 {
            rand::rng().random_range(-j..=j)
        } else {
            0.0
        }
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("name", &self.config.name)
            .field("min_interval", &self.config.min_interval)
            .field("jitter", &self.config.jitter)
            .finish()
    }
}

/// How long a caller arriving `elapsed` after the previous one must sleep.
///
/// `jitter` is a signed fraction of `min_interval` added to the remaining
/// wait; the result never goes below zero. A caller arriving after the
/// interval has passed never waits, whatever the jitter.
pub(crate) fn pacing_delay(elapsed: Duration, min_interval: Duration, jitter: f64) -> Duration {
    if elapsed >= min_interval {
        return Duration::ZERO;
    }
    if jitter == 0.0 {
        return min_interval - elapsed;
    }
    let remaining = (min_interval - elapsed).as_secs_f64();
    let spread = jitter * min_interval.as_secs_f64();
    Duration::from_secs_f64((remaining + spread).max(0.0))
}
