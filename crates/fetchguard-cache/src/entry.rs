//! Cache entries and their persisted envelope.

use crate::error::TierError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A cached value with the wall-clock time it was written and its TTL.
///
/// Entries are immutable once written. An entry is fresh while its age is
/// strictly below its TTL, so a zero TTL is never fresh.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<V> {
    pub value: V,
    pub cached_at: SystemTime,
    pub ttl: Duration,
}

impl<V> CacheEntry<V> {
    /// An entry written now.
    pub fn new(value: V, ttl: Duration) -> Self {
        Self::at(value, SystemTime::now(), ttl)
    }

    pub fn at(value: V, cached_at: SystemTime, ttl: Duration) -> Self {
        Self {
            value,
            cached_at,
            ttl,
        }
    }

    /// Age at `now`. A `cached_at` in the future counts as age zero.
    pub fn age_at(&self, now: SystemTime) -> Duration {
        now.duration_since(self.cached_at).unwrap_or(Duration::ZERO)
    }

    pub fn is_fresh_at(&self, now: SystemTime) -> bool {
        self.age_at(now) < self.ttl
    }

    pub fn is_fresh(&self) -> bool {
        self.is_fresh_at(SystemTime::now())
    }

    /// Whether the entry is past `ttl + grace` at `now`.
    pub fn is_expired_beyond(&self, grace: Duration, now: SystemTime) -> bool {
        self.age_at(now) >= self.ttl.saturating_add(grace)
    }

    pub(crate) fn meta(&self) -> EnvelopeMeta {
        EnvelopeMeta {
            cached_at: unix_secs(self.cached_at),
            ttl: self.ttl.as_secs_f64(),
        }
    }
}

/// The JSON document lower tiers store: `{"value", "cached_at", "ttl"}`
/// with times in (fractional) seconds since the Unix epoch.
#[derive(Serialize, Deserialize)]
struct Envelope<V> {
    value: V,
    cached_at: f64,
    ttl: f64,
}

#[derive(Serialize)]
struct EnvelopeRef<'a, V> {
    value: &'a V,
    cached_at: f64,
    ttl: f64,
}

/// Envelope metadata without the value, for tiers that need to compare or
/// expire entries without knowing the value type.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct EnvelopeMeta {
    pub cached_at: f64,
    pub ttl: f64,
}

impl EnvelopeMeta {
    pub fn parse(bytes: &[u8]) -> Result<Self, TierError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Whether the entry is past `ttl + grace` at `now`.
    pub fn is_expired_beyond(&self, grace: Duration, now: SystemTime) -> bool {
        unix_secs(now) - self.cached_at >= self.ttl + grace.as_secs_f64()
    }
}

pub(crate) fn encode<V: Serialize>(entry: &CacheEntry<V>) -> Result<Vec<u8>, TierError> {
    let meta = entry.meta();
    Ok(serde_json::to_vec(&EnvelopeRef {
        value: &entry.value,
        cached_at: meta.cached_at,
        ttl: meta.ttl,
    })?)
}

pub(crate) fn decode<V: DeserializeOwned>(bytes: &[u8]) -> Result<CacheEntry<V>, TierError> {
    let envelope: Envelope<V> = serde_json::from_slice(bytes)?;
    let cached_at = from_unix_secs(envelope.cached_at)?;
    let ttl = Duration::try_from_secs_f64(envelope.ttl)
        .map_err(|_| TierError::InvalidEnvelope(format!("bad ttl {}", envelope.ttl)))?;
    Ok(CacheEntry::at(envelope.value, cached_at, ttl))
}

fn unix_secs(at: SystemTime) -> f64 {
    match at.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs_f64(),
        Err(e) => -e.duration().as_secs_f64(),
    }
}

fn from_unix_secs(secs: f64) -> Result<SystemTime, TierError> {
    let offset = Duration::try_from_secs_f64(secs)
        .map_err(|_| TierError::InvalidEnvelope(format!("bad cached_at {secs}")))?;
    UNIX_EPOCH
        .checked_add(offset)
        .ok_or_else(|| TierError::InvalidEnvelope(format!("cached_at out of range {secs}")))
}
