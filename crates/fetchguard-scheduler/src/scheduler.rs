use crate::config::{SchedulerConfig, SchedulerConfigBuilder};
use crate::events::SchedulerEvent;
use crate::task::{QueuedTask, SubmitOptions};
use futures::FutureExt;
use parking_lot::Mutex;
use std::any::Any;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;

#[cfg(feature = "metrics")]
use metrics::{counter, describe_gauge, gauge};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Idle,
    Running,
    /// Refusing submissions, running what is queued, then exiting.
    Draining,
    /// Refusing submissions, exiting after the current task.
    Aborting,
    Stopped,
}

#[derive(Default)]
struct Counts {
    submitted: u64,
    rejected_duplicates: u64,
    rejected_stopped: u64,
    executed: u64,
    failed: u64,
}

struct State {
    queue: BinaryHeap<Reverse<QueuedTask>>,
    dedupe_keys: HashSet<String>,
    lifecycle: Lifecycle,
    worker: Option<JoinHandle<()>>,
    executing: bool,
    next_seq: u64,
    counts: Counts,
}

impl State {
    /// Drops every queued task and frees its dedupe key.
    fn discard_queue(&mut self) -> usize {
        let discarded = self.queue.len();
        for Reverse(task) in self.queue.drain() {
            if let Some(key) = task.dedupe_key {
                self.dedupe_keys.remove(&key);
            }
        }
        discarded
    }
}

struct Inner {
    config: SchedulerConfig,
    state: Mutex<State>,
    wake: Notify,
}

/// A snapshot of scheduler activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub submitted: u64,
    /// Submissions refused because their dedupe key was taken.
    pub rejected_duplicates: u64,
    /// Submissions refused because the scheduler had stopped.
    pub rejected_stopped: u64,
    /// Actions that ran to completion without error.
    pub executed: u64,
    /// Actions that returned an error or panicked.
    pub failed: u64,
    pub queue_depth: usize,
    pub running: bool,
}

/// Runs background actions on a single worker task, earliest first.
///
/// Tasks are ordered by `(run_at, priority)`; a lower priority value is
/// more urgent. A task submitted with a dedupe key is refused while another
/// task with that key is queued or still running, so the same refresh is
/// never queued twice.
///
/// The worker sleeps until the next task is due or a submission wakes it.
/// Failing and panicking actions are logged and counted; they never take
/// the worker down. [`stop`](Self::stop) lets queued work finish;
/// [`abort`](Self::abort) drops it.
///
/// ```
/// use fetchguard_scheduler::{SubmitOptions, TaskScheduler};
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let scheduler = TaskScheduler::builder().name("refresh").build();
/// scheduler.start();
///
/// let accepted = scheduler.submit(
///     SubmitOptions::new().dedupe_key("quote:ABC").delay(Duration::from_millis(5)),
///     async { Ok::<_, std::io::Error>(()) },
/// );
/// assert!(accepted);
/// assert!(!scheduler.submit(
///     SubmitOptions::new().dedupe_key("quote:ABC"),
///     async { Ok::<_, std::io::Error>(()) },
/// ));
///
/// tokio::time::sleep(Duration::from_millis(50)).await;
/// scheduler.shutdown().await;
/// assert_eq!(scheduler.stats().executed, 1);
/// # }
/// ```
#[derive(Clone)]
pub struct TaskScheduler {
    inner: Arc<Inner>,
}

impl TaskScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        #[cfg(feature = "metrics")]
        describe_gauge!(
            "fetchguard_scheduler_queue_depth",
            "Background tasks waiting to run"
        );

        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(State {
                    queue: BinaryHeap::new(),
                    dedupe_keys: HashSet::new(),
                    lifecycle: Lifecycle::Idle,
                    worker: None,
                    executing: false,
                    next_seq: 0,
                    counts: Counts::default(),
                }),
                wake: Notify::new(),
            }),
        }
    }

    pub fn builder() -> SchedulerConfigBuilder {
        SchedulerConfigBuilder::new()
    }

    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    /// Spawns the worker on the current tokio runtime. Tasks submitted
    /// earlier start running now.
    ///
    /// Returns false if the scheduler is already running or has been
    /// stopped; a stopped scheduler cannot be restarted.
    pub fn start(&self) -> bool {
        let mut state = self.inner.state.lock();
        if state.lifecycle != Lifecycle::Idle {
            return false;
        }
        state.lifecycle = Lifecycle::Running;
        let inner = Arc::clone(&self.inner);
        state.worker = Some(tokio::spawn(run_worker(inner)));

        #[cfg(feature = "tracing")]
        tracing::info!(scheduler = %self.inner.config.name, queued = state.queue.len(), "scheduler started");

        true
    }

    /// Asks the worker to exit once the queue is empty. Queued tasks still
    /// run when they come due; new submissions are refused from now on.
    ///
    /// A scheduler that was never started has no worker to drain its
    /// queue, so its queued tasks are dropped.
    pub fn stop(&self) {
        self.shut(Lifecycle::Draining);
    }

    /// Asks the worker to exit as soon as the task it is running returns.
    /// Everything still queued is dropped and its dedupe keys are freed.
    pub fn abort(&self) {
        self.shut(Lifecycle::Aborting);
    }

    fn shut(&self, target: Lifecycle) {
        let mut state = self.inner.state.lock();
        let lifecycle = state.lifecycle;
        match lifecycle {
            Lifecycle::Running | Lifecycle::Draining => {
                state.lifecycle = target;
                drop(state);
                self.inner.wake.notify_one();
            }
            Lifecycle::Idle => {
                state.lifecycle = Lifecycle::Stopped;
                let discarded = state.discard_queue();

                #[cfg(feature = "tracing")]
                tracing::info!(scheduler = %self.inner.config.name, discarded, "scheduler stopped before starting");
                #[cfg(not(feature = "tracing"))]
                let _ = discarded;
            }
            Lifecycle::Aborting | Lifecycle::Stopped => {}
        }
    }

    /// Waits for the worker to exit. Returns at once if it never started
    /// or was already joined.
    pub async fn join(&self) {
        let worker = self.inner.state.lock().worker.take();
        if let Some(worker) = worker {
            if let Err(err) = worker.await {
                #[cfg(feature = "tracing")]
                tracing::warn!(scheduler = %self.inner.config.name, error = %err, "scheduler worker ended abnormally");
                #[cfg(not(feature = "tracing"))]
                let _ = err;
            }
        }
    }

    /// [`stop`](Self::stop) followed by [`join`](Self::join): returns once
    /// every queued task has run.
    pub async fn shutdown(&self) {
        self.stop();
        self.join().await;
    }

    /// Queues `action`. Returns false, dropping the action, when the
    /// dedupe key is taken or the scheduler has stopped.
    pub fn submit<F, E>(&self, options: SubmitOptions, action: F) -> bool
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        let mut state = self.inner.state.lock();

        if matches!(
            state.lifecycle,
            Lifecycle::Draining | Lifecycle::Aborting | Lifecycle::Stopped
        ) {
            state.counts.rejected_stopped += 1;
            drop(state);
            self.emit_rejected(options.dedupe_key);
            return false;
        }

        if let Some(key) = &options.dedupe_key {
            if state.dedupe_keys.contains(key) {
                state.counts.rejected_duplicates += 1;
                drop(state);

                #[cfg(feature = "tracing")]
                tracing::trace!(scheduler = %self.inner.config.name, key = %key, "duplicate task rejected");

                self.emit_rejected(options.dedupe_key);
                return false;
            }
            state.dedupe_keys.insert(key.clone());
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        state.counts.submitted += 1;
        state.queue.push(Reverse(QueuedTask {
            run_at: options.run_at(Instant::now()),
            priority: options.priority,
            seq,
            dedupe_key: options.dedupe_key,
            action: Box::pin(async move { action.await.map_err(|e| e.to_string()) }),
        }));

        #[cfg(feature = "metrics")]
        gauge!("fetchguard_scheduler_queue_depth", "scheduler" => self.inner.config.name.clone())
            .set(state.queue.len() as f64);

        drop(state);
        self.inner.wake.notify_one();
        true
    }

    pub fn queue_depth(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    /// Whether a task with `key` is queued or running.
    pub fn is_pending(&self, key: &str) -> bool {
        self.inner.state.lock().dedupe_keys.contains(key)
    }

    pub fn is_running(&self) -> bool {
        self.inner.state.lock().lifecycle == Lifecycle::Running
    }

    pub fn stats(&self) -> SchedulerStats {
        let state = self.inner.state.lock();
        SchedulerStats {
            submitted: state.counts.submitted,
            rejected_duplicates: state.counts.rejected_duplicates,
            rejected_stopped: state.counts.rejected_stopped,
            executed: state.counts.executed,
            failed: state.counts.failed,
            queue_depth: state.queue.len(),
            running: state.executing,
        }
    }

    fn emit_rejected(&self, dedupe_key: Option<String>) {
        self.inner.config.event_listeners.emit(&SchedulerEvent::Rejected {
            name: self.inner.config.name.clone(),
            timestamp: std::time::Instant::now(),
            dedupe_key,
        });
    }
}

impl fmt::Debug for TaskScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("TaskScheduler")
            .field("name", &self.inner.config.name)
            .field("lifecycle", &state.lifecycle)
            .field("queue_depth", &state.queue.len())
            .finish()
    }
}

enum Next {
    Run(QueuedTask),
    Wait(Option<Instant>),
    Exit,
}

async fn run_worker(inner: Arc<Inner>) {
    loop {
        let next = {
            let mut state = inner.state.lock();
            let draining = state.lifecycle == Lifecycle::Draining;
            if !(state.lifecycle == Lifecycle::Running || draining)
                || (draining && state.queue.is_empty())
            {
                Next::Exit
            } else {
                let now = Instant::now();
                let due = state.queue.peek().map(|Reverse(task)| task.run_at);
                match due {
                    Some(run_at) if run_at <= now => match state.queue.pop() {
                        Some(Reverse(task)) => {
                            state.executing = true;
                            Next::Run(task)
                        }
                        None => Next::Wait(None),
                    },
                    other => Next::Wait(other),
                }
            }
        };

        match next {
            Next::Exit => break,
            Next::Run(task) => execute(&inner, task).await,
            Next::Wait(due) => {
                let cap = Instant::now() + inner.config.wake_interval;
                let until = due.map_or(cap, |due| due.min(cap));
                tokio::select! {
                    _ = inner.wake.notified() => {}
                    _ = tokio::time::sleep_until(until) => {}
                }
            }
        }
    }

    let mut state = inner.state.lock();
    state.lifecycle = Lifecycle::Stopped;
    let discarded = state.discard_queue();

    #[cfg(feature = "metrics")]
    gauge!("fetchguard_scheduler_queue_depth", "scheduler" => inner.config.name.clone()).set(0.0);

    #[cfg(feature = "tracing")]
    tracing::info!(scheduler = %inner.config.name, discarded, "scheduler stopped");
    #[cfg(not(feature = "tracing"))]
    let _ = discarded;
}

async fn execute(inner: &Inner, task: QueuedTask) {
    let started = Instant::now();
    let outcome = AssertUnwindSafe(task.action).catch_unwind().await;
    let duration = started.elapsed();

    let failure = match outcome {
        Ok(Ok(())) => None,
        Ok(Err(message)) => Some((message, false)),
        Err(panic) => Some((panic_message(panic.as_ref()), true)),
    };

    {
        let mut state = inner.state.lock();
        state.executing = false;
        if let Some(key) = &task.dedupe_key {
            state.dedupe_keys.remove(key);
        }
        if failure.is_some() {
            state.counts.failed += 1;
        } else {
            state.counts.executed += 1;
        }

        #[cfg(feature = "metrics")]
        gauge!("fetchguard_scheduler_queue_depth", "scheduler" => inner.config.name.clone())
            .set(state.queue.len() as f64);
    }

    let name = inner.config.name.clone();
    let event = match failure {
        None => {
            #[cfg(feature = "metrics")]
            counter!("fetchguard_scheduler_tasks_total", "scheduler" => name.clone(), "outcome" => "ok")
                .increment(1);

            SchedulerEvent::Completed {
                name,
                timestamp: std::time::Instant::now(),
                dedupe_key: task.dedupe_key,
                duration,
            }
        }
        Some((message, panicked)) => {
            #[cfg(feature = "metrics")]
            counter!("fetchguard_scheduler_tasks_total", "scheduler" => name.clone(), "outcome" => if panicked { "panic" } else { "error" })
                .increment(1);

            #[cfg(feature = "tracing")]
            tracing::warn!(
                scheduler = %name,
                key = task.dedupe_key.as_deref().unwrap_or("-"),
                panicked,
                error = %message,
                "background task failed"
            );

            SchedulerEvent::Failed {
                name,
                timestamp: std::time::Instant::now(),
                dedupe_key: task.dedupe_key,
                message,
                panicked,
            }
        }
    };
    inner.config.event_listeners.emit(&event);
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked".to_string()
    }
}

impl Default for TaskScheduler {
    fn default() -> Self {
        TaskScheduler::new(SchedulerConfigBuilder::new().into_config())
    }
}
