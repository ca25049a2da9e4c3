use std::sync::atomic::{AtomicU64, Ordering};

/// A point-in-time view of a cache's counters.
///
/// Stale hits are counted apart from `hits`, and `hit_rate` is
/// `hits / (hits + misses)` (0 when nothing was looked up).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub stale_hits: u64,
    pub sets: u64,
    /// Fresh or stale entries found below the memory tier and promoted.
    pub lower_tier_hits: u64,
    pub tier_errors: u64,
    pub evictions: u64,
    pub entries: usize,
    pub max_entries: usize,
    pub hit_rate: f64,
}

#[derive(Default)]
pub(crate) struct Counters {
    pub(crate) hits: AtomicU64,
    pub(crate) misses: AtomicU64,
    pub(crate) stale_hits: AtomicU64,
    pub(crate) sets: AtomicU64,
    pub(crate) lower_tier_hits: AtomicU64,
    pub(crate) tier_errors: AtomicU64,
    pub(crate) evictions: AtomicU64,
}

impl Counters {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, entries: usize, max_entries: usize) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        CacheStats {
            hits,
            misses,
            stale_hits: self.stale_hits.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            lower_tier_hits: self.lower_tier_hits.load(Ordering::Relaxed),
            tier_errors: self.tier_errors.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entries,
            max_entries,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
        }
    }
}
