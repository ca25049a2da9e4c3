//! Periodic cache cleanup and popularity prefetch.

use crate::config::EngineConfig;
use crate::engine::{ManagedResource, Registry};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Intervals and limits for the [`MaintenanceSupervisor`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaintenanceSettings {
    pub cleanup_interval: Duration,
    pub prefetch_interval: Duration,
    pub prefetch_top_n: usize,
    pub prefetch_min_requests: u64,
}

impl From<&EngineConfig> for MaintenanceSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            cleanup_interval: config.cleanup_interval(),
            prefetch_interval: config.prefetch_interval(),
            prefetch_top_n: config.prefetch_top_n,
            prefetch_min_requests: config.prefetch_min_requests,
        }
    }
}

/// Counters for a [`MaintenanceSupervisor`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceStats {
    pub cleanup_runs: u64,
    /// Entries removed by cleanup, over all runs.
    pub purged: u64,
    pub prefetch_runs: u64,
    /// Refreshes queued by prefetch, over all runs.
    pub prefetched: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Idle,
    Running,
    Stopped,
}

struct SupervisorState {
    lifecycle: Lifecycle,
    worker: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct Counters {
    cleanup_runs: AtomicU64,
    purged: AtomicU64,
    prefetch_runs: AtomicU64,
    prefetched: AtomicU64,
}

struct Inner {
    settings: MaintenanceSettings,
    resources: Registry,
    state: Mutex<SupervisorState>,
    stop: Notify,
    counters: Counters,
}

impl Inner {
    fn resources(&self) -> Vec<Arc<dyn ManagedResource>> {
        self.resources.lock().values().cloned().collect()
    }

    async fn run_cleanup(&self) -> usize {
        let mut purged = 0;
        for resource in self.resources() {
            purged += resource.purge_expired().await;
        }
        self.counters.cleanup_runs.fetch_add(1, Ordering::Relaxed);
        self.counters
            .purged
            .fetch_add(purged as u64, Ordering::Relaxed);

        #[cfg(feature = "tracing")]
        if purged > 0 {
            tracing::info!(purged, "cache cleanup removed expired entries");
        }

        purged
    }

    fn run_prefetch(&self) -> usize {
        let settings = &self.settings;
        let scheduled: usize = self
            .resources()
            .iter()
            .map(|r| r.prefetch(settings.prefetch_top_n, settings.prefetch_min_requests))
            .sum();
        self.counters.prefetch_runs.fetch_add(1, Ordering::Relaxed);
        self.counters
            .prefetched
            .fetch_add(scheduled as u64, Ordering::Relaxed);

        #[cfg(feature = "tracing")]
        tracing::debug!(scheduled, "prefetch pass done");

        scheduled
    }
}

/// Runs cache cleanup and popularity prefetch for every resource of an
/// [`Engine`](crate::Engine) on a background task.
///
/// Cleanup runs right after [`start`](Self::start) and then every
/// `cleanup_interval`; prefetch runs every `prefetch_interval`. Both can
/// also be triggered by hand.
#[derive(Clone)]
pub struct MaintenanceSupervisor {
    inner: Arc<Inner>,
}

impl MaintenanceSupervisor {
    pub(crate) fn new(settings: MaintenanceSettings, resources: Registry) -> Self {
        Self {
            inner: Arc::new(Inner {
                settings,
                resources,
                state: Mutex::new(SupervisorState {
                    lifecycle: Lifecycle::Idle,
                    worker: None,
                }),
                stop: Notify::new(),
                counters: Counters::default(),
            }),
        }
    }

    pub fn settings(&self) -> &MaintenanceSettings {
        &self.inner.settings
    }

    /// Spawns the supervisor task. Returns false if it is already running
    /// or was stopped.
    pub fn start(&self) -> bool {
        let mut state = self.inner.state.lock();
        if state.lifecycle != Lifecycle::Idle {
            return false;
        }
        state.lifecycle = Lifecycle::Running;
        state.worker = Some(tokio::spawn(supervise(Arc::clone(&self.inner))));
        true
    }

    /// Asks the supervisor to exit after the pass it is running, if any.
    pub fn stop(&self) {
        let mut state = self.inner.state.lock();
        if state.lifecycle == Lifecycle::Running {
            self.inner.stop.notify_one();
        }
        state.lifecycle = Lifecycle::Stopped;
    }

    pub async fn join(&self) {
        let worker = self.inner.state.lock().worker.take();
        if let Some(worker) = worker {
            if let Err(err) = worker.await {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %err, "maintenance task ended abnormally");
                #[cfg(not(feature = "tracing"))]
                let _ = err;
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.state.lock().lifecycle == Lifecycle::Running
    }

    /// Purges expired entries of every resource now. Returns the number
    /// removed.
    pub async fn run_cleanup(&self) -> usize {
        self.inner.run_cleanup().await
    }

    /// Queues prefetches for every resource now. Returns the number queued.
    pub fn run_prefetch(&self) -> usize {
        self.inner.run_prefetch()
    }

    pub fn stats(&self) -> MaintenanceStats {
        let counters = &self.inner.counters;
        MaintenanceStats {
            cleanup_runs: counters.cleanup_runs.load(Ordering::Relaxed),
            purged: counters.purged.load(Ordering::Relaxed),
            prefetch_runs: counters.prefetch_runs.load(Ordering::Relaxed),
            prefetched: counters.prefetched.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for MaintenanceSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaintenanceSupervisor")
            .field("settings", &self.inner.settings)
            .field("lifecycle", &self.inner.state.lock().lifecycle)
            .finish()
    }
}

async fn supervise(inner: Arc<Inner>) {
    let settings = inner.settings;
    let mut cleanup = tokio::time::interval(settings.cleanup_interval);
    cleanup.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut prefetch = tokio::time::interval_at(
        Instant::now() + settings.prefetch_interval,
        settings.prefetch_interval,
    );
    prefetch.set_missed_tick_behavior(MissedTickBehavior::Delay);

    #[cfg(feature = "tracing")]
    tracing::info!(
        cleanup_s = settings.cleanup_interval.as_secs(),
        prefetch_s = settings.prefetch_interval.as_secs(),
        "maintenance started"
    );

    loop {
        tokio::select! {
            biased;
            _ = inner.stop.notified() => break,
            _ = cleanup.tick() => {
                inner.run_cleanup().await;
            }
            _ = prefetch.tick() => {
                inner.run_prefetch();
            }
        }
    }

    #[cfg(feature = "tracing")]
    tracing::info!("maintenance stopped");
}
