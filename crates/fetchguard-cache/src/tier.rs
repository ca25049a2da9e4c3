use crate::entry::EnvelopeMeta;
use crate::error::TierError;
use futures::future::BoxFuture;
use std::fmt;
use std::time::Duration;

/// Which tier answered a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TierKind {
    Memory,
    Durable,
    Shared,
}

impl TierKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TierKind::Memory => "memory",
            TierKind::Durable => "durable",
            TierKind::Shared => "shared",
        }
    }
}

impl fmt::Display for TierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A byte-oriented store below the in-memory LRU.
///
/// Tiers store encoded envelopes and know nothing about the value type.
/// They are expected to apply last-write-wins using the envelope's
/// `cached_at`: a `set` older than the stored envelope is dropped.
pub trait CacheTier: Send + Sync {
    fn kind(&self) -> TierKind;

    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Vec<u8>>, TierError>>;

    /// Stores `envelope`. `retain_for` is how long past its TTL the entry
    /// should stay readable as stale; tiers with native expiry use it.
    fn set<'a>(
        &'a self,
        key: &'a str,
        envelope: Vec<u8>,
        meta: EnvelopeMeta,
        retain_for: Duration,
    ) -> BoxFuture<'a, Result<(), TierError>>;

    fn remove<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<(), TierError>>;

    /// Deletes entries past `ttl + grace` and returns how many went.
    fn purge_expired(&self, grace: Duration) -> BoxFuture<'_, Result<usize, TierError>>;
}
