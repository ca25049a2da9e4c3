//! Durable tier on an embedded redb file.
//!
//! Every operation is one redb transaction run on the blocking pool, so a
//! slow disk never stalls the async workers. Entries survive a restart.

use crate::entry::EnvelopeMeta;
use crate::error::TierError;
use crate::tier::{CacheTier, TierKind};
use futures::future::BoxFuture;
use redb::{Database, ReadableTable, TableDefinition};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

const ENTRIES: TableDefinition<&str, &[u8]> = TableDefinition::new("fetchguard_entries");

const TIER: &str = "durable";

fn backend(err: impl std::fmt::Display) -> TierError {
    TierError::backend(TIER, err)
}

/// A [`CacheTier`] persisted in a redb database.
#[derive(Clone)]
pub struct DurableTier {
    db: Arc<Database>,
}

impl DurableTier {
    /// Opens or creates the database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, TierError> {
        let db = Database::create(path).map_err(backend)?;

        let write_txn = db.begin_write().map_err(backend)?;
        {
            let _table = write_txn.open_table(ENTRIES).map_err(backend)?;
        }
        write_txn.commit().map_err(backend)?;

        Ok(Self { db: Arc::new(db) })
    }

    fn get_blocking(db: &Database, key: &str) -> Result<Option<Vec<u8>>, TierError> {
        let read_txn = db.begin_read().map_err(backend)?;
        let table = read_txn.open_table(ENTRIES).map_err(backend)?;
        let value = table.get(key).map_err(backend)?;
        Ok(value.map(|guard| guard.value().to_vec()))
    }

    fn set_blocking(
        db: &Database,
        key: &str,
        envelope: &[u8],
        meta: EnvelopeMeta,
    ) -> Result<(), TierError> {
        let write_txn = db.begin_write().map_err(backend)?;
        {
            let mut table = write_txn.open_table(ENTRIES).map_err(backend)?;
            let stored = table
                .get(key)
                .map_err(backend)?
                .map(|guard| guard.value().to_vec());
            if let Some(stored) = stored {
                // An unreadable stored envelope is overwritten.
                if let Ok(existing) = EnvelopeMeta::parse(&stored) {
                    if existing.cached_at > meta.cached_at {
                        return Ok(());
                    }
                }
            }
            table.insert(key, envelope).map_err(backend)?;
        }
        write_txn.commit().map_err(backend)?;
        Ok(())
    }

    fn remove_blocking(db: &Database, key: &str) -> Result<(), TierError> {
        let write_txn = db.begin_write().map_err(backend)?;
        {
            let mut table = write_txn.open_table(ENTRIES).map_err(backend)?;
            table.remove(key).map_err(backend)?;
        }
        write_txn.commit().map_err(backend)?;
        Ok(())
    }

    fn purge_blocking(db: &Database, grace: Duration) -> Result<usize, TierError> {
        let now = SystemTime::now();
        let write_txn = db.begin_write().map_err(backend)?;
        let purged = {
            let mut table = write_txn.open_table(ENTRIES).map_err(backend)?;
            let mut expired = Vec::new();
            for item in table.iter().map_err(backend)? {
                let (key, value) = item.map_err(backend)?;
                let drop_it = match EnvelopeMeta::parse(value.value()) {
                    Ok(meta) => meta.is_expired_beyond(grace, now),
                    Err(_) => true,
                };
                if drop_it {
                    expired.push(key.value().to_string());
                }
            }
            for key in &expired {
                table.remove(key.as_str()).map_err(backend)?;
            }
            expired.len()
        };
        write_txn.commit().map_err(backend)?;
        Ok(purged)
    }
}

impl CacheTier for DurableTier {
    fn kind(&self) -> TierKind {
        TierKind::Durable
    }

    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Vec<u8>>, TierError>> {
        let db = Arc::clone(&self.db);
        let key = key.to_string();
        Box::pin(async move {
            tokio::task::spawn_blocking(move || Self::get_blocking(&db, &key)).await?
        })
    }

    fn set<'a>(
        &'a self,
        key: &'a str,
        envelope: Vec<u8>,
        meta: EnvelopeMeta,
        _retain_for: Duration,
    ) -> BoxFuture<'a, Result<(), TierError>> {
        let db = Arc::clone(&self.db);
        let key = key.to_string();
        Box::pin(async move {
            tokio::task::spawn_blocking(move || Self::set_blocking(&db, &key, &envelope, meta))
                .await?
        })
    }

    fn remove<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<(), TierError>> {
        let db = Arc::clone(&self.db);
        let key = key.to_string();
        Box::pin(async move {
            tokio::task::spawn_blocking(move || Self::remove_blocking(&db, &key)).await?
        })
    }

    fn purge_expired(&self, grace: Duration) -> BoxFuture<'_, Result<usize, TierError>> {
        let db = Arc::clone(&self.db);
        Box::pin(async move {
            tokio::task::spawn_blocking(move || Self::purge_blocking(&db, grace)).await?
        })
    }
}

impl std::fmt::Debug for DurableTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableTier").finish_non_exhaustive()
    }
}
