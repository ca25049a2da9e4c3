use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Per-key retry budgets and cooldowns, shared by every caller of a
/// resource.
///
/// Each key may be retried at most `max_retries` times within a sliding
/// `window`. Independently, a key can be put on cooldown (typically after
/// the upstream throttled it); a key on cooldown is never retried, whatever
/// its remaining budget.
#[derive(Clone)]
pub struct RetryCoordinator {
    state: Arc<Mutex<CoordinatorState>>,
    max_retries: usize,
    window: Duration,
}

#[derive(Default)]
struct CoordinatorState {
    retries: HashMap<String, VecDeque<Instant>>,
    cooldowns: HashMap<String, Instant>,
}

impl CoordinatorState {
    fn cooldown_remaining(&mut self, key: &str, now: Instant) -> Option<Duration> {
        match self.cooldowns.get(key) {
            Some(&until) if until > now => Some(until - now),
            Some(_) => {
                self.cooldowns.remove(key);
                None
            }
            None => None,
        }
    }

    fn retries_in_window(&mut self, key: &str, window: Duration, now: Instant) -> usize {
        let Some(stamps) = self.retries.get_mut(key) else {
            return 0;
        };
        while let Some(&oldest) = stamps.front() {
            if now.duration_since(oldest) > window {
                stamps.pop_front();
            } else {
                break;
            }
        }
        let count = stamps.len();
        if count == 0 {
            self.retries.remove(key);
        }
        count
    }

    fn can_retry(&mut self, key: &str, max: usize, window: Duration, now: Instant) -> bool {
        self.cooldown_remaining(key, now).is_none() && self.retries_in_window(key, window, now) < max
    }
}

impl RetryCoordinator {
    pub fn new(max_retries: usize, window: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(CoordinatorState::default())),
            max_retries,
            window,
        }
    }

    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Whether `key` has retry budget left and is not cooling down.
    ///
    /// This only checks. Callers racing on the same key can both see
    /// `true`; use [`try_acquire_retry`](Self::try_acquire_retry) when the
    /// budget must hold exactly.
    pub fn can_retry(&self, key: &str) -> bool {
        self.state
            .lock()
            .can_retry(key, self.max_retries, self.window, Instant::now())
    }

    /// Spends one retry for `key`.
    pub fn record_retry(&self, key: &str) {
        self.state
            .lock()
            .retries
            .entry(key.to_string())
            .or_default()
            .push_back(Instant::now());
    }

    /// Checks and spends one retry under a single lock. Returns false,
    /// spending nothing, if the key is out of budget or cooling down.
    pub fn try_acquire_retry(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut state = self.state.lock();
        if !state.can_retry(key, self.max_retries, self.window, now) {
            return false;
        }
        state
            .retries
            .entry(key.to_string())
            .or_default()
            .push_back(now);
        true
    }

    /// Forbids retries of `key` for `duration`. An existing longer cooldown
    /// is kept.
    pub fn set_cooldown(&self, key: &str, duration: Duration) {
        let until = Instant::now() + duration;
        let mut state = self.state.lock();
        state
            .cooldowns
            .entry(key.to_string())
            .and_modify(|current| {
                if until > *current {
                    *current = until;
                }
            })
            .or_insert(until);
    }

    pub fn in_cooldown(&self, key: &str) -> bool {
        self.cooldown_remaining(key).is_some()
    }

    pub fn cooldown_remaining(&self, key: &str) -> Option<Duration> {
        self.state.lock().cooldown_remaining(key, Instant::now())
    }

    /// Retries of `key` still inside the window.
    pub fn retries_used(&self, key: &str) -> usize {
        self.state
            .lock()
            .retries_in_window(key, self.window, Instant::now())
    }

    /// Forgets both the retry history and any cooldown for `key`.
    pub fn clear(&self, key: &str) {
        let mut state = self.state.lock();
        state.retries.remove(key);
        state.cooldowns.remove(key);
    }
}

impl Default for RetryCoordinator {
    /// Two retries per key per five minutes.
    fn default() -> Self {
        Self::new(2, Duration::from_secs(300))
    }
}

impl std::fmt::Debug for RetryCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryCoordinator")
            .field("max_retries", &self.max_retries)
            .field("window", &self.window)
            .finish()
    }
}
