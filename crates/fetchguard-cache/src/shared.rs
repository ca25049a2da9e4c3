//! Shared tier on Redis, for several processes reading one cache.
//!
//! Envelopes are stored under `<prefix><key>` with a native expiry of
//! `ttl + retain_for`, so Redis reclaims entries on its own and
//! [`CacheTier::purge_expired`] has nothing to do.

use crate::entry::EnvelopeMeta;
use crate::error::TierError;
use crate::tier::{CacheTier, TierKind};
use futures::future::BoxFuture;
use redis::aio::ConnectionManager;
use std::time::Duration;

const TIER: &str = "shared";

fn backend(err: impl std::fmt::Display) -> TierError {
    TierError::backend(TIER, err)
}

/// A [`CacheTier`] backed by a Redis server.
#[derive(Clone)]
pub struct SharedTier {
    conn: ConnectionManager,
    prefix: String,
}

impl SharedTier {
    /// Connects to `url` (e.g. `redis://127.0.0.1:6379`).
    pub async fn connect(url: &str) -> Result<Self, TierError> {
        let client = redis::Client::open(url).map_err(backend)?;
        let conn = client.get_connection_manager().await.map_err(backend)?;
        Ok(Self {
            conn,
            prefix: "fetchguard:".to_string(),
        })
    }

    /// Namespace for keys written by this tier. Default `fetchguard:`.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    fn redis_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}

/// Native expiry in whole seconds, never zero.
fn expiry_secs(meta: &EnvelopeMeta, retain_for: Duration) -> u64 {
    let secs = (meta.ttl + retain_for.as_secs_f64()).ceil();
    if secs.is_finite() && secs >= 1.0 {
        secs as u64
    } else {
        1
    }
}

impl CacheTier for SharedTier {
    fn kind(&self) -> TierKind {
        TierKind::Shared
    }

    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Vec<u8>>, TierError>> {
        let mut conn = self.conn.clone();
        let redis_key = self.redis_key(key);
        Box::pin(async move {
            redis::cmd("GET")
                .arg(&redis_key)
                .query_async::<_, Option<Vec<u8>>>(&mut conn)
                .await
                .map_err(backend)
        })
    }

    fn set<'a>(
        &'a self,
        key: &'a str,
        envelope: Vec<u8>,
        meta: EnvelopeMeta,
        retain_for: Duration,
    ) -> BoxFuture<'a, Result<(), TierError>> {
        let mut conn = self.conn.clone();
        let redis_key = self.redis_key(key);
        Box::pin(async move {
            // Last write wins across processes only on a best-effort basis:
            // the compare and the write are separate round trips.
            let stored: Option<Vec<u8>> = redis::cmd("GET")
                .arg(&redis_key)
                .query_async(&mut conn)
                .await
                .map_err(backend)?;
            if let Some(existing) = stored.and_then(|bytes| EnvelopeMeta::parse(&bytes).ok()) {
                if existing.cached_at > meta.cached_at {
                    return Ok(());
                }
            }

            redis::cmd("SET")
                .arg(&redis_key)
                .arg(envelope)
                .arg("EX")
                .arg(expiry_secs(&meta, retain_for))
                .query_async::<_, ()>(&mut conn)
                .await
                .map_err(backend)
        })
    }

    fn remove<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<(), TierError>> {
        let mut conn = self.conn.clone();
        let redis_key = self.redis_key(key);
        Box::pin(async move {
            redis::cmd("DEL")
                .arg(&redis_key)
                .query_async::<_, ()>(&mut conn)
                .await
                .map_err(backend)
        })
    }

    fn purge_expired(&self, _grace: Duration) -> BoxFuture<'_, Result<usize, TierError>> {
        Box::pin(async { Ok(0) })
    }
}

impl std::fmt::Debug for SharedTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedTier")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}
