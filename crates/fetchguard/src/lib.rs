//! Cache-first, resilient fetching of expensive, rate-limited upstream data.
//!
//! `fetchguard` serves many concurrent callers from a tiered cache and makes
//! sure the upstream behind it sees at most one load per key at a time,
//! paced calls and bounded retries, and no traffic at all while it is
//! throttling us.
//!
//! # Components
//!
//! Each concern is its own crate, re-exported here:
//!
//! - [`cache`]: memory LRU in front of a redb file and an optional Redis
//!   store, with stale reads
//! - [`coalesce`]: single-flight loads; concurrent callers share one fetch
//! - [`ratelimiter`]: minimum spacing between upstream calls
//! - [`retry`]: stepped backoff, per-key retry budgets, throttle cooldowns
//! - [`circuitbreaker`]: stop calling an upstream that keeps throttling
//! - [`scheduler`]: background refreshes, de-duplicated by key
//! - [`core`]: the error taxonomy, events and per-request attempt budgets
//!
//! The [`Engine`] wires them together and hands out one [`ResilientFetch`]
//! per upstream resource:
//!
//! ```text
//! fetch(key) → cache ─ fresh ─────────────────────────────→ value
//!                    ├ stale, within window ─ schedule refresh → value
//!                    └ miss ─ coalesce ─ circuit → retry → pace → timeout → fetch fn
//!                                      └ on failure: stale entry if any, else error
//! ```
//!
//! # Example
//!
//! ```rust
//! use fetchguard::{Engine, EngineConfig, FetchSource, PopularityTtl, UpstreamError};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = Engine::open(EngineConfig::from_env()?).await?;
//! engine.start();
//!
//! let quotes = engine
//!     .resource("quotes")
//!     .ttl(Duration::from_secs(300))
//!     .ttl_policy(PopularityTtl::new())
//!     .build(|symbol: Arc<str>| async move {
//!         // an HTTP call in real code; classify its errors so throttling
//!         // is recognised
//!         Ok::<_, UpstreamError>(format!("{symbol}: 101.5"))
//!     })?;
//!
//! let first = quotes.fetch_detailed("ABC").await?;
//! assert_eq!(first.source, FetchSource::Upstream);
//! let second = quotes.fetch_detailed("ABC").await?;
//! assert_eq!(second.source, FetchSource::Cache);
//!
//! // bound the upstream attempts spent on one inbound request
//! let budget = engine.request_budget();
//! quotes.fetch_with_budget("XYZ", budget).await?;
//!
//! engine.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - `tracing` (default): structured logs from every component
//! - `metrics`: counters and gauges through the `metrics` facade
//! - `redis`: the shared Redis tier, enabled by `FETCHGUARD_REDIS_URL`

pub use fetchguard_cache as cache;
pub use fetchguard_circuitbreaker as circuitbreaker;
pub use fetchguard_coalesce as coalesce;
pub use fetchguard_core as core;
pub use fetchguard_ratelimiter as ratelimiter;
pub use fetchguard_retry as retry;
pub use fetchguard_scheduler as scheduler;

pub use fetchguard_core::{AttemptBudget, BudgetScope, FailureKind, FetchError, UpstreamError};

mod config;
mod engine;
mod fetch;
mod maintenance;
mod pipeline;
mod policy;
mod popularity;

pub use config::{ConfigError, EngineConfig, ENV_PREFIX};
pub use engine::{Engine, EngineBuilder, EngineSnapshot, ResourceBuilder, ResourceSnapshot};
pub use fetch::{
    FetchSource, Fetched, ResilientFetch, PREFETCH_DELAY, PREFETCH_PRIORITY, REFRESH_PRIORITY,
};
pub use maintenance::{MaintenanceSettings, MaintenanceStats, MaintenanceSupervisor};
pub use pipeline::{fetch_fn, AttemptTimeout, AttemptTimeoutLayer, FetchFn};
pub use policy::{FixedTtl, PopularityTtl, TtlPolicy};
pub use popularity::PopularityTracker;
