//! The cache-first fetch façade.

use crate::pipeline::Pipeline;
use crate::policy::TtlPolicy;
use crate::popularity::PopularityTracker;
use fetchguard_cache::{CacheStats, Lookup, TieredCache};
use fetchguard_circuitbreaker::{CircuitBreaker, CircuitStatus};
use fetchguard_coalesce::{CoalesceError, CoalesceStats, Coalescer};
use fetchguard_core::{AttemptBudget, FetchError, FetchRequest, UpstreamError};
use fetchguard_ratelimiter::{RateLimiter, RateLimiterStats};
use fetchguard_scheduler::{SubmitOptions, TaskScheduler};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "metrics")]
use metrics::counter;

/// Scheduler priority of stale-while-revalidate refreshes.
pub const REFRESH_PRIORITY: u32 = 1;
/// Scheduler priority of popularity prefetches.
pub const PREFETCH_PRIORITY: u32 = 5;
/// Delay before a prefetch runs.
pub const PREFETCH_DELAY: Duration = Duration::from_secs(30);

/// Where a value returned by [`ResilientFetch::fetch_detailed`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchSource {
    /// A fresh cache entry.
    Cache,
    /// An expired entry inside the stale window; a refresh was scheduled.
    Stale,
    /// Loaded from the upstream just now.
    Upstream,
    /// The load failed and an expired entry was served instead.
    StaleFallback,
}

impl FetchSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchSource::Cache => "cache",
            FetchSource::Stale => "stale",
            FetchSource::Upstream => "upstream",
            FetchSource::StaleFallback => "stale_fallback",
        }
    }

    /// Whether the value is past its TTL.
    pub fn is_stale(&self) -> bool {
        matches!(self, FetchSource::Stale | FetchSource::StaleFallback)
    }
}

impl fmt::Display for FetchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A value together with its [`FetchSource`].
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<V> {
    pub value: V,
    pub source: FetchSource,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Settings {
    pub(crate) base_ttl: Duration,
    pub(crate) stale_window: Duration,
    pub(crate) refresh_delay: Duration,
    pub(crate) refresh_jitter: f64,
    pub(crate) popularity_window: Duration,
}

pub(crate) struct Parts<V> {
    pub(crate) name: String,
    pub(crate) cache: TieredCache<V>,
    pub(crate) coalescer: Coalescer<String, V, FetchError>,
    pub(crate) pipeline: Pipeline<V>,
    pub(crate) scheduler: TaskScheduler,
    pub(crate) breaker: CircuitBreaker,
    pub(crate) limiter: RateLimiter,
    pub(crate) ttl_policy: Arc<dyn TtlPolicy>,
    pub(crate) settings: Settings,
}

struct Inner<V> {
    parts: Parts<V>,
    popularity: PopularityTracker,
}

/// Cache-first, single-flight, resilient access to one upstream resource.
///
/// Built by [`Engine::resource`](crate::Engine::resource). Clones share all
/// state.
///
/// A lookup goes:
///
/// 1. fresh cache entry: returned as is
/// 2. expired entry younger than `ttl + stale_window`: returned at once and
///    a de-duplicated background refresh is scheduled
/// 3. otherwise one coalesced load through circuit breaker, retries, rate
///    limiting and the per-attempt timeout; the result is cached with the
///    TTL chosen by the resource's [`TtlPolicy`]
///
/// If the load fails, any expired entry the cache still holds is served
/// instead of the error.
pub struct ResilientFetch<V> {
    inner: Arc<Inner<V>>,
}

impl<V> Clone for ResilientFetch<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> ResilientFetch<V>
where
    V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub(crate) fn new(parts: Parts<V>) -> Self {
        Self {
            inner: Arc::new(Inner {
                parts,
                popularity: PopularityTracker::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.parts.name
    }

    pub async fn fetch(&self, key: &str) -> Result<V, FetchError> {
        self.fetch_detailed(key).await.map(|fetched| fetched.value)
    }

    /// Like [`fetch`](Self::fetch), also reporting where the value came from.
    pub async fn fetch_detailed(&self, key: &str) -> Result<Fetched<V>, FetchError> {
        let parts = &self.inner.parts;
        self.inner.popularity.record(key);

        let expired = match parts.cache.get(key, true).await {
            Some(hit) if !hit.stale => return Ok(self.served(key, hit.value, FetchSource::Cache)),
            Some(hit) if self.within_stale_window(&hit) => {
                self.schedule_refresh(key, parts.settings.refresh_delay, REFRESH_PRIORITY);
                return Ok(self.served(key, hit.value, FetchSource::Stale));
            }
            other => other,
        };

        match self.load(key).await {
            Ok(value) => Ok(self.served(key, value, FetchSource::Upstream)),
            Err(err) => match expired {
                Some(hit) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(resource = %parts.name, key = %key, error = %err, age_s = hit.age().as_secs(), "load failed, serving stale entry");

                    Ok(self.served(key, hit.value, FetchSource::StaleFallback))
                }
                None => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(resource = %parts.name, key = %key, error = %err, "load failed with nothing cached");

                    #[cfg(feature = "metrics")]
                    counter!("fetchguard_fetch_errors_total", "resource" => parts.name.clone())
                        .increment(1);

                    Err(err)
                }
            },
        }
    }

    /// [`fetch`](Self::fetch) with every upstream attempt drawn from
    /// `budget`, including attempts made by a load this call joins.
    pub async fn fetch_with_budget(&self, key: &str, budget: AttemptBudget) -> Result<V, FetchError> {
        budget.scope(self.fetch(key)).await
    }

    /// Loads `key` from the upstream regardless of what is cached and
    /// stores the result. Joins a load already in flight.
    pub async fn refresh(&self, key: &str) -> Result<V, FetchError> {
        self.load(key).await
    }

    /// Queues a background [`refresh`](Self::refresh), its start spread by the
    /// engine's `refresh_jitter`. Returns false when a
    /// refresh of `key` is already queued or running, or the scheduler has
    /// stopped.
    pub fn schedule_refresh(&self, key: &str, delay: Duration, priority: u32) -> bool {
        let this = self.clone();
        let owned = key.to_string();
        let accepted = self.inner.parts.scheduler.submit(
            SubmitOptions::new()
                .priority(priority)
                .delay(delay)
                .jitter(self.inner.parts.settings.refresh_jitter)
                .dedupe_key(key),
            async move { this.refresh(&owned).await.map(|_| ()) },
        );

        #[cfg(feature = "tracing")]
        tracing::trace!(resource = %self.inner.parts.name, key = %key, accepted, "background refresh requested");

        accepted
    }

    /// Drops `key` from every cache tier.
    pub async fn invalidate(&self, key: &str) {
        self.inner.parts.cache.remove(key).await;
    }

    /// The TTL a value for `key` would be stored with right now.
    pub fn effective_ttl(&self, key: &str) -> Duration {
        let parts = &self.inner.parts;
        let popularity = self
            .inner
            .popularity
            .score(key, parts.settings.popularity_window);
        parts
            .ttl_policy
            .effective_ttl(key, parts.settings.base_ttl, popularity)
    }

    /// Deletes entries that left the stale window, in every tier.
    pub async fn purge_expired(&self) -> usize {
        let parts = &self.inner.parts;
        parts.cache.purge_expired(parts.settings.stale_window).await
    }

    /// Schedules low-priority refreshes for the `top_n` most requested keys
    /// with at least `min_requests` requests in the popularity window.
    /// Returns how many were queued.
    pub fn prefetch(&self, top_n: usize, min_requests: u64) -> usize {
        let window = self.inner.parts.settings.popularity_window;
        self.inner
            .popularity
            .ranked(top_n, min_requests, window)
            .into_iter()
            .filter(|(key, _)| self.schedule_refresh(key, PREFETCH_DELAY, PREFETCH_PRIORITY))
            .count()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.inner.parts.cache.stats()
    }

    pub fn circuit_status(&self) -> CircuitStatus {
        self.inner.parts.breaker.status()
    }

    /// Closes this resource's circuit and forgets its failures.
    pub fn reset_circuit(&self) {
        self.inner.parts.breaker.reset();
    }

    pub fn rate_limiter_stats(&self) -> RateLimiterStats {
        self.inner.parts.limiter.stats()
    }

    pub fn coalesce_stats(&self) -> CoalesceStats {
        self.inner.parts.coalescer.stats()
    }

    pub fn popularity(&self) -> &PopularityTracker {
        &self.inner.popularity
    }

    pub fn cache(&self) -> &TieredCache<V> {
        &self.inner.parts.cache
    }

    fn within_stale_window(&self, hit: &Lookup<V>) -> bool {
        hit.age() < hit.ttl.saturating_add(self.inner.parts.settings.stale_window)
    }

    fn served(&self, key: &str, value: V, source: FetchSource) -> Fetched<V> {
        #[cfg(feature = "tracing")]
        tracing::trace!(resource = %self.inner.parts.name, key = %key, source = %source, "fetch served");
        #[cfg(not(feature = "tracing"))]
        let _ = key;

        #[cfg(feature = "metrics")]
        counter!("fetchguard_fetch_total", "resource" => self.inner.parts.name.clone(), "source" => source.as_str())
            .increment(1);

        Fetched { value, source }
    }

    async fn load(&self, key: &str) -> Result<V, FetchError> {
        let this = self.clone();
        let owned = key.to_string();
        self.inner
            .parts
            .coalescer
            .coalesce(key.to_string(), move || async move {
                this.fetch_and_store(&owned).await
            })
            .await
            .map_err(|err| match err {
                CoalesceError::Upstream(err) => err,
                CoalesceError::OwnerAborted => FetchError::Upstream(UpstreamError::transient(
                    "load ended before publishing a result",
                )),
            })
    }

    /// Runs inside the coalescer's owner task, which carries the caller's
    /// attempt budget.
    async fn fetch_and_store(&self, key: &str) -> Result<V, FetchError> {
        let parts = &self.inner.parts;
        let request = FetchRequest::new(key).with_budget(AttemptBudget::current());
        let value = parts.pipeline.call(request).await?;

        let ttl = self.effective_ttl(key);
        parts.cache.set(key, value.clone(), ttl).await;

        #[cfg(feature = "tracing")]
        tracing::debug!(resource = %parts.name, key = %key, ttl_s = ttl.as_secs_f64(), "stored fresh value");

        Ok(value)
    }
}

impl<V> fmt::Debug for ResilientFetch<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResilientFetch")
            .field("name", &self.inner.parts.name)
            .field("settings", &self.inner.parts.settings)
            .finish()
    }
}
