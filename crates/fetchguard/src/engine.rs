//! The composition root.

use crate::config::{check, fraction, ConfigError, EngineConfig};
use crate::fetch::{Parts, ResilientFetch, Settings};
use crate::maintenance::{MaintenanceSettings, MaintenanceSupervisor};
use crate::pipeline::{fetch_fn, Pipeline};
use crate::policy::{FixedTtl, TtlPolicy};
use fetchguard_cache::{CacheConfig, CacheStats, CacheTier, TieredCache};
use fetchguard_circuitbreaker::{CircuitBreakerConfig, CircuitRegistry, CircuitStatus};
use fetchguard_coalesce::{CoalesceConfig, CoalesceStats, Coalescer};
use fetchguard_core::{AttemptBudget, UpstreamError};
use fetchguard_ratelimiter::{RateLimiter, RateLimiterStats};
use fetchguard_retry::{RetryCoordinator, RetryLayer};
use fetchguard_scheduler::{SchedulerStats, TaskScheduler};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// What the engine needs from a resource, whatever its value type.
pub(crate) trait ManagedResource: Send + Sync {
    fn snapshot(&self) -> ResourceSnapshot;
    fn purge_expired(&self) -> BoxFuture<'_, usize>;
    fn prefetch(&self, top_n: usize, min_requests: u64) -> usize;
}

impl<V> ManagedResource for ResilientFetch<V>
where
    V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn snapshot(&self) -> ResourceSnapshot {
        ResourceSnapshot {
            name: self.name().to_string(),
            cache: self.cache_stats(),
            circuit: self.circuit_status(),
            rate_limiter: self.rate_limiter_stats(),
            coalesce: self.coalesce_stats(),
            tracked_requests: self.popularity().len(),
        }
    }

    fn purge_expired(&self) -> BoxFuture<'_, usize> {
        Box::pin(ResilientFetch::purge_expired(self))
    }

    fn prefetch(&self, top_n: usize, min_requests: u64) -> usize {
        ResilientFetch::prefetch(self, top_n, min_requests)
    }
}

pub(crate) type Registry = Arc<Mutex<BTreeMap<String, Arc<dyn ManagedResource>>>>;

/// Activity of one resource.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceSnapshot {
    pub name: String,
    pub cache: CacheStats,
    pub circuit: CircuitStatus,
    pub rate_limiter: RateLimiterStats,
    pub coalesce: CoalesceStats,
    /// Requests currently in the popularity log.
    pub tracked_requests: usize,
}

/// Point-in-time view of the whole engine.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSnapshot {
    /// Every registered resource, ordered by name.
    pub resources: Vec<ResourceSnapshot>,
    /// Every circuit the registry knows about, ordered by name.
    pub circuits: Vec<CircuitStatus>,
    pub scheduler: SchedulerStats,
}

impl EngineSnapshot {
    /// Upstream calls that had to wait for the rate limiter, over all
    /// resources.
    pub fn rate_limit_triggers(&self) -> u64 {
        self.resources.iter().map(|r| r.rate_limiter.delayed).sum()
    }

    pub fn resource(&self, name: &str) -> Option<&ResourceSnapshot> {
        self.resources.iter().find(|r| r.name == name)
    }
}

struct EngineInner {
    config: EngineConfig,
    tiers: Vec<Arc<dyn CacheTier>>,
    scheduler: TaskScheduler,
    circuits: CircuitRegistry,
    coordinator: RetryCoordinator,
    resources: Registry,
    maintenance: MaintenanceSupervisor,
}

/// Owns the components shared by every resource.
///
/// One engine per process: a single background scheduler, one circuit per
/// resource name, one retry coordinator, the lower cache tiers and the
/// maintenance supervisor. Resources are created with
/// [`resource`](Self::resource).
///
/// ```
/// use fetchguard::{Engine, EngineConfig, UpstreamError};
/// use std::sync::Arc;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let engine = Engine::open(EngineConfig::default()).await?;
/// engine.start();
///
/// let quotes = engine.resource("quotes").build(|key: Arc<str>| async move {
///     // call the real upstream here
///     Ok::<_, UpstreamError>(format!("price of {key}"))
/// })?;
///
/// assert_eq!(quotes.fetch("quote:ABC").await?, "price of quote:ABC");
/// engine.shutdown().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    /// Opens the lower tiers named by `config` (`cache_path`, `redis_url`)
    /// and builds the engine.
    pub async fn open(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut builder = Self::builder(config.clone());

        if let Some(path) = config.cache_path.clone() {
            let durable = tokio::task::spawn_blocking(move || fetchguard_cache::DurableTier::open(path))
                .await
                .map_err(fetchguard_cache::TierError::from)??;
            builder = builder.tier(durable);
        }

        if let Some(url) = config.redis_url.as_deref() {
            #[cfg(feature = "redis")]
            {
                builder = builder.tier(fetchguard_cache::SharedTier::connect(url).await?);
            }
            #[cfg(not(feature = "redis"))]
            {
                let _ = url;
                return Err(ConfigError::FeatureDisabled("FETCHGUARD_REDIS_URL"));
            }
        }

        builder.build()
    }

    /// Builds an engine over explicitly supplied tiers, ignoring
    /// `cache_path` and `redis_url`.
    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder {
            config,
            tiers: Vec::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Starts the background scheduler and the maintenance supervisor.
    pub fn start(&self) {
        self.inner.scheduler.start();
        self.inner.maintenance.start();

        #[cfg(feature = "tracing")]
        tracing::info!(
            resources = self.inner.resources.lock().len(),
            tiers = self.inner.tiers.len(),
            "engine started"
        );
    }

    /// Stops maintenance and the scheduler and waits for both. Refreshes
    /// already queued run before this returns.
    pub async fn shutdown(&self) {
        self.inner.maintenance.stop();
        self.inner.scheduler.stop();
        self.inner.maintenance.join().await;
        self.inner.scheduler.join().await;

        #[cfg(feature = "tracing")]
        tracing::info!("engine stopped");
    }

    /// Starts describing a resource. Settings default to the engine
    /// configuration.
    pub fn resource(&self, name: impl Into<String>) -> ResourceBuilder {
        let config = &self.inner.config;
        ResourceBuilder {
            engine: self.clone(),
            name: name.into(),
            ttl: config.cache_default_ttl(),
            stale_window: config.stale_window(),
            refresh_delay: config.refresh_delay(),
            min_interval: config.min_interval(),
            jitter: config.jitter,
            fetch_timeout: config.fetch_timeout(),
            max_attempts: config.max_attempts,
            max_entries: config.cache_max_entries,
            retry_on_rate_limit: false,
            ttl_policy: Arc::new(FixedTtl),
        }
    }

    /// A fresh per-request attempt budget of the configured size.
    pub fn request_budget(&self) -> AttemptBudget {
        AttemptBudget::new(self.inner.config.request_attempt_budget)
    }

    pub fn scheduler(&self) -> &TaskScheduler {
        &self.inner.scheduler
    }

    pub fn circuits(&self) -> &CircuitRegistry {
        &self.inner.circuits
    }

    pub fn retry_coordinator(&self) -> &RetryCoordinator {
        &self.inner.coordinator
    }

    pub fn maintenance(&self) -> &MaintenanceSupervisor {
        &self.inner.maintenance
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        let resources: Vec<Arc<dyn ManagedResource>> =
            self.inner.resources.lock().values().cloned().collect();
        EngineSnapshot {
            resources: resources.iter().map(|r| r.snapshot()).collect(),
            circuits: self.inner.circuits.snapshot(),
            scheduler: self.inner.scheduler.stats(),
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("resources", &self.inner.resources.lock().len())
            .field("tiers", &self.inner.tiers.len())
            .field("scheduler", &self.inner.scheduler)
            .finish()
    }
}

/// Builder returned by [`Engine::builder`].
pub struct EngineBuilder {
    config: EngineConfig,
    tiers: Vec<Arc<dyn CacheTier>>,
}

impl EngineBuilder {
    /// Adds a cache tier below memory, shared by every resource. Tiers are
    /// consulted in the order added.
    pub fn tier<T: CacheTier + 'static>(self, tier: T) -> Self {
        self.shared_tier(Arc::new(tier))
    }

    pub fn shared_tier(mut self, tier: Arc<dyn CacheTier>) -> Self {
        self.tiers.push(tier);
        self
    }

    pub fn build(self) -> Result<Engine, ConfigError> {
        let config = self.config;
        config.validate()?;

        let scheduler = TaskScheduler::builder()
            .name("fetchguard")
            .wake_interval(config.scheduler_wake())
            .build();
        let circuits = CircuitRegistry::new(
            CircuitBreakerConfig::builder()
                .failure_threshold(config.circuit_failure_threshold)
                .window(config.circuit_window())
                .recovery_timeout(config.circuit_recovery())
                .into_config(),
        );
        let coordinator = RetryCoordinator::new(config.max_retries, config.retry_window());
        let resources: Registry = Arc::default();
        let maintenance =
            MaintenanceSupervisor::new(MaintenanceSettings::from(&config), Arc::clone(&resources));

        Ok(Engine {
            inner: Arc::new(EngineInner {
                config,
                tiers: self.tiers,
                scheduler,
                circuits,
                coordinator,
                resources,
                maintenance,
            }),
        })
    }
}

/// Per-resource settings, returned by [`Engine::resource`].
pub struct ResourceBuilder {
    engine: Engine,
    name: String,
    ttl: Duration,
    stale_window: Duration,
    refresh_delay: Duration,
    min_interval: Duration,
    jitter: f64,
    fetch_timeout: Duration,
    max_attempts: usize,
    max_entries: usize,
    retry_on_rate_limit: bool,
    ttl_policy: Arc<dyn TtlPolicy>,
}

impl ResourceBuilder {
    /// Base TTL handed to the TTL policy.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// How long past its TTL an entry is served while it refreshes.
    pub fn stale_window(mut self, window: Duration) -> Self {
        self.stale_window = window;
        self
    }

    pub fn refresh_delay(mut self, delay: Duration) -> Self {
        self.refresh_delay = delay;
        self
    }

    /// Minimum spacing between upstream calls, and its jitter fraction.
    pub fn pacing(mut self, min_interval: Duration, jitter: f64) -> Self {
        self.min_interval = min_interval;
        self.jitter = jitter;
        self
    }

    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn max_entries(mut self, max: usize) -> Self {
        self.max_entries = max;
        self
    }

    /// Sleep out throttle cooldowns and retry instead of failing fast.
    pub fn retry_on_rate_limit(mut self, enabled: bool) -> Self {
        self.retry_on_rate_limit = enabled;
        self
    }

    pub fn ttl_policy<P: TtlPolicy + 'static>(mut self, policy: P) -> Self {
        self.ttl_policy = Arc::new(policy);
        self
    }

    /// Checks the per-resource overrides against the same ranges as
    /// [`EngineConfig::validate`].
    fn validate(&self) -> Result<(), ConfigError> {
        check(fraction(self.jitter), "jitter", "must be within 0..=1")?;
        check(!self.fetch_timeout.is_zero(), "fetch_timeout_secs", "must be > 0")?;
        check(
            (1..=20).contains(&self.max_attempts),
            "max_attempts",
            "must be within 1..=20",
        )?;
        check(self.max_entries >= 1, "cache_max_entries", "must be >= 1")
    }

    /// Creates the resource and registers it with the engine, replacing any
    /// resource with the same name. Fails if an override is out of range.
    pub fn build<V, F, Fut>(self, fetch: F) -> Result<ResilientFetch<V>, ConfigError>
    where
        V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
        F: Fn(Arc<str>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, UpstreamError>> + Send + 'static,
    {
        self.validate()?;
        let engine = &self.engine.inner;
        let config = &engine.config;
        let name = self.name;

        let limiter = RateLimiter::builder()
            .name(name.clone())
            .min_interval(self.min_interval)
            .jitter(self.jitter)
            .build();
        let (cooldown_min, cooldown_max) = config.rate_limit_cooldown();
        let retry = RetryLayer::builder()
            .name(name.clone())
            .max_attempts(self.max_attempts)
            .stepped_backoff(config.backoff_first(), config.backoff_second(), config.backoff_factor)
            .jitter(config.backoff_jitter)
            .coordinator(engine.coordinator.clone())
            .retry_on_rate_limit(self.retry_on_rate_limit)
            .rate_limit_cooldown(cooldown_min, cooldown_max)
            .build();
        let breaker = engine.circuits.get(&name);
        let pipeline = Pipeline::new(
            &breaker,
            retry,
            limiter.clone(),
            self.fetch_timeout,
            fetch_fn(fetch),
        );

        let cache: TieredCache<V> = engine
            .tiers
            .iter()
            .fold(
                CacheConfig::builder()
                    .name(name.clone())
                    .max_entries(self.max_entries)
                    .default_ttl(self.ttl)
                    .stale_retention(self.stale_window),
                |builder, tier| builder.shared_tier(Arc::clone(tier)),
            )
            .build();
        let coalescer = Coalescer::new(
            CoalesceConfig::builder()
                .name(name.clone())
                .window(config.coalesce_window())
                .build(),
        );

        let resource = ResilientFetch::new(Parts {
            name: name.clone(),
            cache,
            coalescer,
            pipeline,
            scheduler: engine.scheduler.clone(),
            breaker,
            limiter,
            ttl_policy: self.ttl_policy,
            settings: Settings {
                base_ttl: self.ttl,
                stale_window: self.stale_window,
                refresh_delay: self.refresh_delay,
                refresh_jitter: config.refresh_jitter,
                popularity_window: config.popularity_window(),
            },
        });

        #[cfg(feature = "tracing")]
        tracing::debug!(resource = %name, "resource registered");

        engine
            .resources
            .lock()
            .insert(name, Arc::new(resource.clone()));
        Ok(resource)
    }
}
