//! Tiered caching for fetched values.
//!
//! A [`TieredCache`] keeps typed entries in a bounded in-memory LRU and
//! mirrors them, as JSON envelopes, into slower tiers below it:
//!
//! - [`DurableTier`]: an embedded redb file that survives restarts
//!   (feature `durable`, on by default)
//! - [`SharedTier`]: a Redis server shared between processes (feature
//!   `redis`)
//!
//! Every entry records when it was written and its TTL. Lookups can accept
//! stale entries, which is what stale-while-revalidate and stale fallback
//! build on; expired entries therefore stay readable until they are evicted
//! or purged with [`TieredCache::purge_expired`].
//!
//! # Examples
//!
//! ```
//! use fetchguard_cache::{CacheConfig, CacheEntry, TieredCache};
//! use std::time::{Duration, SystemTime};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let cache: TieredCache<u64> = CacheConfig::builder()
//!     .name("prices")
//!     .max_entries(1_000)
//!     .on_stale_hit(|key| println!("serving stale {key}"))
//!     .build();
//!
//! let an_hour_ago = SystemTime::now() - Duration::from_secs(3600);
//! cache
//!     .set_entry("AAPL", CacheEntry::at(190, an_hour_ago, Duration::from_secs(60)))
//!     .await;
//!
//! assert!(cache.get("AAPL", false).await.is_none());
//! assert!(cache.get("AAPL", true).await.unwrap().stale);
//! # }
//! ```

mod config;
#[cfg(feature = "durable")]
mod durable;
mod entry;
mod error;
mod events;
mod memory;
#[cfg(feature = "redis")]
mod shared;
mod stats;
mod tier;
mod tiered;

pub use config::{CacheConfig, CacheConfigBuilder};
#[cfg(feature = "durable")]
pub use durable::DurableTier;
pub use entry::{CacheEntry, EnvelopeMeta};
pub use error::TierError;
pub use events::CacheEvent;
#[cfg(feature = "redis")]
pub use shared::SharedTier;
pub use stats::CacheStats;
pub use tier::{CacheTier, TierKind};
pub use tiered::{Lookup, TieredCache};
