//! TTL policies applied when a fetched value is stored.

use std::sync::Arc;
use std::time::Duration;

/// Decides how long a freshly fetched value stays fresh.
///
/// Evaluated at write time with the resource's base TTL and the key's
/// recent request count. Any `Fn(&str, Duration, u64) -> Duration` is a
/// policy.
pub trait TtlPolicy: Send + Sync {
    fn effective_ttl(&self, key: &str, base_ttl: Duration, popularity: u64) -> Duration;
}

impl<F> TtlPolicy for F
where
    F: Fn(&str, Duration, u64) -> Duration + Send + Sync,
{
    fn effective_ttl(&self, key: &str, base_ttl: Duration, popularity: u64) -> Duration {
        self(key, base_ttl, popularity)
    }
}

/// Always the base TTL.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FixedTtl;

impl TtlPolicy for FixedTtl {
    fn effective_ttl(&self, _key: &str, base_ttl: Duration, _popularity: u64) -> Duration {
        base_ttl
    }
}

type VolatilityFn = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Stretches the TTL of hot, stable keys and shortens it for hot, volatile
/// ones.
///
/// A key is hot once its popularity reaches `hot_threshold`. Hot keys get
/// `base × extend_factor`, or `base × shrink_factor` when the volatility
/// predicate flags them, clamped to `[min_ttl, max_ttl]`. Cold keys keep
/// the base TTL.
///
/// ```
/// use fetchguard::{PopularityTtl, TtlPolicy};
/// use std::time::Duration;
///
/// let policy = PopularityTtl::new()
///     .hot_threshold(5)
///     .volatile_when(|key| key.starts_with("intraday:"));
/// let base = Duration::from_secs(600);
///
/// assert_eq!(policy.effective_ttl("quote:ABC", base, 1), base);
/// assert_eq!(policy.effective_ttl("quote:ABC", base, 9), Duration::from_secs(1200));
/// assert_eq!(policy.effective_ttl("intraday:ABC", base, 9), Duration::from_secs(300));
/// ```
#[derive(Clone)]
pub struct PopularityTtl {
    hot_threshold: u64,
    extend_factor: f64,
    shrink_factor: f64,
    min_ttl: Duration,
    max_ttl: Duration,
    volatile: Option<VolatilityFn>,
}

impl PopularityTtl {
    /// Defaults: hot at 10 requests, ×2 when stable, ×0.5 when volatile,
    /// clamped to one minute..one day.
    pub fn new() -> Self {
        Self {
            hot_threshold: 10,
            extend_factor: 2.0,
            shrink_factor: 0.5,
            min_ttl: Duration::from_secs(60),
            max_ttl: Duration::from_secs(86_400),
            volatile: None,
        }
    }

    pub fn hot_threshold(mut self, requests: u64) -> Self {
        self.hot_threshold = requests;
        self
    }

    pub fn extend_factor(mut self, factor: f64) -> Self {
        self.extend_factor = sanitize_factor(factor);
        self
    }

    pub fn shrink_factor(mut self, factor: f64) -> Self {
        self.shrink_factor = sanitize_factor(factor);
        self
    }

    pub fn bounds(mut self, min_ttl: Duration, max_ttl: Duration) -> Self {
        self.min_ttl = min_ttl;
        self.max_ttl = max_ttl.max(min_ttl);
        self
    }

    /// Marks keys whose values change quickly.
    pub fn volatile_when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.volatile = Some(Arc::new(predicate));
        self
    }
}

fn sanitize_factor(factor: f64) -> f64 {
    if factor.is_finite() && factor >= 0.0 {
        factor
    } else {
        1.0
    }
}

impl Default for PopularityTtl {
    fn default() -> Self {
        Self::new()
    }
}

impl TtlPolicy for PopularityTtl {
    fn effective_ttl(&self, key: &str, base_ttl: Duration, popularity: u64) -> Duration {
        if popularity < self.hot_threshold {
            return base_ttl;
        }
        let volatile = self.volatile.as_ref().is_some_and(|f| f(key));
        let factor = if volatile {
            self.shrink_factor
        } else {
            self.extend_factor
        };
        base_ttl
            .mul_f64(factor)
            .clamp(self.min_ttl, self.max_ttl)
    }
}

impl std::fmt::Debug for PopularityTtl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PopularityTtl")
            .field("hot_threshold", &self.hot_threshold)
            .field("extend_factor", &self.extend_factor)
            .field("shrink_factor", &self.shrink_factor)
            .field("min_ttl", &self.min_ttl)
            .field("max_ttl", &self.max_ttl)
            .field("volatile", &self.volatile.is_some())
            .finish()
    }
}
