//! The bounded in-memory tier.

use crate::entry::CacheEntry;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::time::{Duration, SystemTime};

/// What happened to a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Insert {
    Stored,
    /// Stored, and the least recently used key was dropped to make room.
    Evicted(String),
    /// A newer entry was already present; nothing changed.
    Ignored,
}

/// An LRU of typed entries. Expired entries stay until evicted, replaced,
/// removed or purged so stale reads can still find them.
pub(crate) struct MemoryTier<V> {
    entries: Mutex<LruCache<String, CacheEntry<V>>>,
    capacity: usize,
}

impl<V: Clone> MemoryTier<V> {
    pub(crate) fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(cap)),
            capacity: cap.get(),
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns a copy of the entry and marks it most recently used.
    pub(crate) fn get(&self, key: &str) -> Option<CacheEntry<V>> {
        self.entries.lock().get(key).cloned()
    }

    /// Inserts unless the stored entry is newer (last write wins by
    /// `cached_at`).
    pub(crate) fn insert(&self, key: &str, entry: CacheEntry<V>) -> Insert {
        let mut entries = self.entries.lock();
        if let Some(existing) = entries.peek(key) {
            if existing.cached_at > entry.cached_at {
                return Insert::Ignored;
            }
        }
        match entries.push(key.to_string(), entry) {
            Some((old_key, _)) if old_key != key => Insert::Evicted(old_key),
            _ => Insert::Stored,
        }
    }

    pub(crate) fn remove(&self, key: &str) -> bool {
        self.entries.lock().pop(key).is_some()
    }

    pub(crate) fn clear(&self) {
        self.entries.lock().clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Drops entries past `ttl + grace` at `now`.
    pub(crate) fn purge_expired(&self, grace: Duration, now: SystemTime) -> usize {
        let mut entries = self.entries.lock();
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| entry.is_expired_beyond(grace, now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            entries.pop(key);
        }
        expired.len()
    }
}
