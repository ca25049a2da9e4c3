use crate::CoalesceConfig;
use fetchguard_core::AttemptBudget;
use hashbrown::HashMap;
use parking_lot::Mutex;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;

#[cfg(feature = "metrics")]
use metrics::{counter, describe_counter, gauge};

/// Why a coalesced call produced no value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoalesceError<E> {
    /// The fetch ran and failed; every caller sees the same error.
    #[error("{0}")]
    Upstream(E),
    /// The owning fetch task panicked or was aborted before publishing.
    #[error("coalesced fetch was aborted before completing")]
    OwnerAborted,
}

impl<E> CoalesceError<E> {
    pub fn into_upstream(self) -> Option<E> {
        match self {
            CoalesceError::Upstream(e) => Some(e),
            CoalesceError::OwnerAborted => None,
        }
    }
}

type Outcome<V, E> = Result<V, E>;

/// Pending fetches, one broadcast sender per key.
struct InFlight<K, V, E> {
    requests: Mutex<HashMap<K, broadcast::Sender<Outcome<V, E>>>>,
}

enum Role<V, E> {
    Owner(broadcast::Receiver<Outcome<V, E>>),
    Waiter(broadcast::Receiver<Outcome<V, E>>),
}

impl<K, V, E> InFlight<K, V, E>
where
    K: Hash + Eq + Clone,
    V: Clone,
    E: Clone,
{
    fn new() -> Self {
        Self {
            requests: Mutex::new(HashMap::new()),
        }
    }

    /// Joins the pending fetch for `key`, or registers a new one owned by
    /// the caller. Either way the caller gets a receiver subscribed before
    /// any result can be sent.
    fn join(&self, key: K) -> Role<V, E> {
        let mut requests = self.requests.lock();
        if let Some(sender) = requests.get(&key) {
            Role::Waiter(sender.subscribe())
        } else {
            // One result is ever sent per key.
            let (tx, rx) = broadcast::channel(1);
            requests.insert(key, tx);
            Role::Owner(rx)
        }
    }

    /// Publishes the outcome and forgets the key.
    fn complete(&self, key: &K, outcome: Outcome<V, E>) {
        let sender = self.requests.lock().remove(key);
        if let Some(sender) = sender {
            // No receivers left is fine: every caller went away.
            let _ = sender.send(outcome);
        }
    }

    /// Forgets the key without a result; waiters see `OwnerAborted`.
    fn abandon(&self, key: &K) {
        self.requests.lock().remove(key);
    }

    fn len(&self) -> usize {
        self.requests.lock().len()
    }
}

/// Removes the pending entry if the owner task ends without publishing.
struct Publish<K, V, E>
where
    K: Hash + Eq + Clone,
    V: Clone,
    E: Clone,
{
    key: Option<K>,
    in_flight: Arc<InFlight<K, V, E>>,
}

impl<K, V, E> Publish<K, V, E>
where
    K: Hash + Eq + Clone,
    V: Clone,
    E: Clone,
{
    fn send(mut self, outcome: Outcome<V, E>) {
        if let Some(key) = self.key.take() {
            self.in_flight.complete(&key, outcome);
        }
    }
}

impl<K, V, E> Drop for Publish<K, V, E>
where
    K: Hash + Eq + Clone,
    V: Clone,
    E: Clone,
{
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.in_flight.abandon(&key);
        }
    }
}

/// Counters for a [`Coalescer`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoalesceStats {
    /// Calls that started a fetch.
    pub owners: u64,
    /// Calls that joined someone else's fetch.
    pub waiters: u64,
    /// Keys with a fetch pending right now.
    pub in_flight: usize,
}

/// Runs at most one fetch per key at a time and shares its outcome with
/// every caller that asked for the key meanwhile.
///
/// The first caller for a key (the owner) spawns the fetch as its own task
/// and then waits like everyone else, so a caller giving up never cancels
/// a fetch other callers are waiting on. The task waits the configured
/// window before fetching to gather near-simultaneous callers.
///
/// ```rust
/// use fetchguard_coalesce::{CoalesceConfig, Coalescer};
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let coalescer: Coalescer<String, u64, String> = Coalescer::new(
///     CoalesceConfig::builder().window(Duration::from_millis(10)).build(),
/// );
///
/// let (a, b) = tokio::join!(
///     coalescer.coalesce("AAPL".to_string(), || async { Ok(190) }),
///     coalescer.coalesce("AAPL".to_string(), || async { Ok(0) }),
/// );
/// assert_eq!(a.unwrap(), 190);
/// assert_eq!(b.unwrap(), 190);
/// assert_eq!(coalescer.stats().owners, 1);
/// # }
/// ```
pub struct Coalescer<K, V, E> {
    config: Arc<CoalesceConfig>,
    in_flight: Arc<InFlight<K, V, E>>,
    owners: Arc<AtomicU64>,
    waiters: Arc<AtomicU64>,
}

impl<K, V, E> Clone for Coalescer<K, V, E> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            in_flight: Arc::clone(&self.in_flight),
            owners: Arc::clone(&self.owners),
            waiters: Arc::clone(&self.waiters),
        }
    }
}

impl<K, V, E> Coalescer<K, V, E>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    pub fn new(config: CoalesceConfig) -> Self {
        #[cfg(feature = "metrics")]
        describe_counter!(
            "fetchguard_coalesce_requests_total",
            "Coalesced calls by role (owner or waiter)"
        );

        Self {
            config: Arc::new(config),
            in_flight: Arc::new(InFlight::new()),
            owners: Arc::new(AtomicU64::new(0)),
            waiters: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn config(&self) -> &CoalesceConfig {
        &self.config
    }

    /// Returns the outcome of the single fetch for `key`, starting it with
    /// `fetch` if none is pending.
    ///
    /// An [`AttemptBudget`] attached to the calling task follows the fetch
    /// into the spawned task.
    pub async fn coalesce<F, Fut>(&self, key: K, fetch: F) -> Result<V, CoalesceError<E>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let mut receiver = match self.in_flight.join(key.clone()) {
            Role::Waiter(receiver) => {
                self.waiters.fetch_add(1, Ordering::Relaxed);

                #[cfg(feature = "metrics")]
                counter!("fetchguard_coalesce_requests_total", "coalesce" => self.config.name.clone(), "role" => "waiter")
                    .increment(1);

                #[cfg(feature = "tracing")]
                tracing::trace!(coalesce = %self.config.name, "joined pending fetch");

                receiver
            }
            Role::Owner(receiver) => {
                self.owners.fetch_add(1, Ordering::Relaxed);

                #[cfg(feature = "metrics")]
                counter!("fetchguard_coalesce_requests_total", "coalesce" => self.config.name.clone(), "role" => "owner")
                    .increment(1);

                #[cfg(feature = "tracing")]
                tracing::trace!(coalesce = %self.config.name, "starting fetch as owner");

                self.spawn_owner(key, fetch);
                receiver
            }
        };

        #[cfg(feature = "metrics")]
        gauge!("fetchguard_coalesce_in_flight", "coalesce" => self.config.name.clone())
            .set(self.in_flight.len() as f64);

        match receiver.recv().await {
            Ok(outcome) => outcome.map_err(CoalesceError::Upstream),
            Err(_) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(coalesce = %self.config.name, "coalesced fetch ended without a result");
                Err(CoalesceError::OwnerAborted)
            }
        }
    }

    fn spawn_owner<F, Fut>(&self, key: K, fetch: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let publish = Publish {
            key: Some(key),
            in_flight: Arc::clone(&self.in_flight),
        };
        let window = self.config.window;
        let budget = AttemptBudget::current();

        let task = async move {
            if !window.is_zero() {
                tokio::time::sleep(window).await;
            }
            let outcome = fetch().await;
            publish.send(outcome);
        };

        match budget {
            Some(budget) => tokio::spawn(budget.scope(task)),
            None => tokio::spawn(task),
        };
    }

    pub fn stats(&self) -> CoalesceStats {
        CoalesceStats {
            owners: self.owners.load(Ordering::Relaxed),
            waiters: self.waiters.load(Ordering::Relaxed),
            in_flight: self.in_flight.len(),
        }
    }

    /// Whether a fetch for `key` is pending.
    pub fn is_in_flight(&self, key: &K) -> bool {
        self.in_flight.requests.lock().contains_key(key)
    }
}

impl<K, V, E> std::fmt::Debug for Coalescer<K, V, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coalescer")
            .field("name", &self.config.name)
            .field("window", &self.config.window)
            .finish()
    }
}
