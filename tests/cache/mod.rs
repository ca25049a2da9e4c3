//! Tests for `fetchguard-cache` across its tiers:
//!
//! - **tiers**: memory over redb, restarts, shared tiers and failing tiers
//! - **events**: listener callbacks and statistics

mod tiers;

use fetchguard_cache::{CacheTier, EnvelopeMeta, TierError, TierKind};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

/// An in-process lower tier that can be switched off to simulate an
/// unreachable backend.
#[derive(Clone, Default)]
pub struct FlakyTier {
    data: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    down: Arc<AtomicBool>,
}

impl FlakyTier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.data.lock().unwrap().len()
    }

    pub fn insert_raw(&self, key: &str, bytes: &[u8]) {
        self.data
            .lock()
            .unwrap()
            .insert(key.to_string(), bytes.to_vec());
    }

    fn check(&self) -> Result<(), TierError> {
        if self.down.load(Ordering::SeqCst) {
            Err(TierError::backend("shared", "connection refused"))
        } else {
            Ok(())
        }
    }
}

impl CacheTier for FlakyTier {
    fn kind(&self) -> TierKind {
        TierKind::Shared
    }

    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Vec<u8>>, TierError>> {
        Box::pin(async move {
            self.check()?;
            Ok(self.data.lock().unwrap().get(key).cloned())
        })
    }

    fn set<'a>(
        &'a self,
        key: &'a str,
        envelope: Vec<u8>,
        _meta: EnvelopeMeta,
        _retain_for: Duration,
    ) -> BoxFuture<'a, Result<(), TierError>> {
        Box::pin(async move {
            self.check()?;
            self.data.lock().unwrap().insert(key.to_string(), envelope);
            Ok(())
        })
    }

    fn remove<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<(), TierError>> {
        Box::pin(async move {
            self.check()?;
            self.data.lock().unwrap().remove(key);
            Ok(())
        })
    }

    fn purge_expired(&self, grace: Duration) -> BoxFuture<'_, Result<usize, TierError>> {
        Box::pin(async move {
            self.check()?;
            let now = SystemTime::now();
            let mut data = self.data.lock().unwrap();
            let before = data.len();
            data.retain(|_, bytes| match EnvelopeMeta::parse(bytes) {
                Ok(meta) => !meta.is_expired_beyond(grace, now),
                Err(_) => false,
            });
            Ok(before - data.len())
        })
    }
}

/// A time far enough in the past that any short TTL has run out.
pub fn hours_ago(hours: u64) -> SystemTime {
    SystemTime::now() - Duration::from_secs(hours * 3600)
}
