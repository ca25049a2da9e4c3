//! Engine scenarios:
//!
//! - **scenarios**: bursts, throttling, slow and failing upstreams
//! - **durability**: entries surviving a restart through the durable tier
//! - **maintenance**: background cleanup and prefetch
//! - **config**: loading and validating settings

mod durability;

use fetchguard::{EngineConfig, ResilientFetch, ResourceBuilder, UpstreamError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Engine settings with pacing, jitter and coalescing windows removed so
/// that timings are exact.
pub fn config() -> EngineConfig {
    EngineConfig {
        min_interval_secs: 0.0,
        jitter: 0.0,
        backoff_first_secs: 1.0,
        backoff_second_secs: 1.0,
        backoff_jitter: 0.0,
        refresh_jitter: 0.0,
        coalesce_window_ms: 0,
        ..EngineConfig::default()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Mode {
    #[default]
    Healthy,
    Throttled,
    Down,
    Hanging,
}

/// A simulated quote service. Values are `"{key}@{call}"`.
#[derive(Clone, Default)]
pub struct Market {
    mode: Arc<Mutex<Mode>>,
    calls: Arc<AtomicUsize>,
}

impl Market {
    pub fn set(&self, mode: Mode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn build(&self, resource: ResourceBuilder) -> ResilientFetch<String> {
        let market = self.clone();
        resource.build(move |key: Arc<str>| {
            let market = market.clone();
            async move { market.quote(&key).await }
        })
        .unwrap()
    }

    async fn quote(&self, key: &str) -> Result<String, UpstreamError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let mode = *self.mode.lock().unwrap();
        match mode {
            Mode::Healthy => Ok(format!("{key}@{call}")),
            Mode::Throttled => Err(UpstreamError::throttled("429 Too Many Requests")),
            Mode::Down => Err(UpstreamError::transient("connection refused")),
            Mode::Hanging => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(format!("{key}@{call}"))
            }
        }
    }
}
