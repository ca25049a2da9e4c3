//! Request popularity, used for adaptive TTLs and prefetching.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Requests remembered per tracker; older ones are forgotten first.
pub const DEFAULT_CAPACITY: usize = 10_000;

const HOUR: Duration = Duration::from_secs(3600);

/// A bounded log of recent key requests.
///
/// Clones share the same log.
#[derive(Clone)]
pub struct PopularityTracker {
    events: Arc<Mutex<VecDeque<(Arc<str>, Instant)>>>,
    capacity: usize,
}

impl PopularityTracker {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: Arc::new(Mutex::new(VecDeque::with_capacity(capacity.min(1024)))),
            capacity,
        }
    }

    pub fn record(&self, key: &str) {
        let mut events = self.events.lock();
        if events.len() == self.capacity {
            events.pop_front();
        }
        events.push_back((Arc::from(key), Instant::now()));
    }

    /// Requests for `key` within the last `window`.
    pub fn score(&self, key: &str, window: Duration) -> u64 {
        let now = Instant::now();
        let events = self.events.lock();
        events
            .iter()
            .rev()
            .take_while(|(_, at)| now.saturating_duration_since(*at) <= window)
            .filter(|(k, _)| k.as_ref() == key)
            .count() as u64
    }

    /// The `top_n` keys with at least `min_requests` requests in `window`,
    /// most popular first.
    ///
    /// Recent requests weigh more: within the last hour a request counts
    /// three times, within six hours twice, otherwise once. Ties are broken
    /// by key so the order is stable.
    pub fn ranked(&self, top_n: usize, min_requests: u64, window: Duration) -> Vec<(String, u64)> {
        let now = Instant::now();
        let mut tally: HashMap<Arc<str>, (u64, u64)> = HashMap::new();
        {
            let events = self.events.lock();
            for (key, at) in events.iter().rev() {
                let age = now.saturating_duration_since(*at);
                if age > window {
                    break;
                }
                let weight = if age <= HOUR {
                    3
                } else if age <= 6 * HOUR {
                    2
                } else {
                    1
                };
                let entry = tally.entry(Arc::clone(key)).or_default();
                entry.0 += 1;
                entry.1 += weight;
            }
        }

        let mut ranked: Vec<(String, u64)> = tally
            .into_iter()
            .filter(|(_, (count, _))| *count >= min_requests)
            .map(|(key, (_, weighted))| (key.to_string(), weighted))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(top_n);
        ranked
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl Default for PopularityTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PopularityTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PopularityTracker")
            .field("events", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}
