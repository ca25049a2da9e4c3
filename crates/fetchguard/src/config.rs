//! Engine-wide configuration.

use serde::Deserialize;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Prefix of every recognised environment variable.
pub const ENV_PREFIX: &str = "FETCHGUARD_";

/// Errors raised while loading or validating an [`EngineConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown configuration variable {0}")]
    UnknownVariable(String),

    #[error("cannot parse {variable}={value:?}: {message}")]
    Unparsable {
        variable: String,
        value: String,
        message: String,
    },

    #[error("{option} is out of range: {message}")]
    OutOfRange {
        option: &'static str,
        message: String,
    },

    #[error("{0} requires the `redis` feature")]
    FeatureDisabled(&'static str),

    #[error("cannot open cache backend: {0}")]
    Backend(#[from] fetchguard_cache::TierError),
}

/// Every tunable of the engine, with its default.
///
/// Durations are expressed in seconds (or milliseconds where the name
/// says so) so the struct can be filled from environment variables or any
/// serde format.
///
/// ```
/// use fetchguard::EngineConfig;
///
/// let config = EngineConfig::from_vars([
///     ("FETCHGUARD_MAX_ATTEMPTS", "5"),
///     ("FETCHGUARD_CACHE_DEFAULT_TTL_SECS", "600"),
///     ("PATH", "/usr/bin"),
/// ])
/// .unwrap();
/// assert_eq!(config.max_attempts, 5);
/// assert_eq!(config.cache_default_ttl().as_secs(), 600);
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Minimum spacing between two upstream calls of one resource.
    pub min_interval_secs: f64,
    /// Spread of the spacing, as a fraction of `min_interval_secs`.
    pub jitter: f64,
    /// Attempts per load, including the first.
    pub max_attempts: usize,
    /// Retries allowed per key within `retry_window_secs`.
    pub max_retries: usize,
    pub retry_window_secs: f64,
    pub backoff_first_secs: f64,
    pub backoff_second_secs: f64,
    pub backoff_factor: f64,
    pub backoff_jitter: f64,
    /// Cooldown range after a throttle without a retry hint.
    pub rate_limit_cooldown_min_secs: f64,
    pub rate_limit_cooldown_max_secs: f64,
    pub circuit_failure_threshold: usize,
    pub circuit_window_secs: f64,
    pub circuit_recovery_secs: f64,
    /// Memory tier capacity, per resource.
    pub cache_max_entries: usize,
    pub cache_default_ttl_secs: f64,
    /// How long past its TTL an entry is still served while it refreshes.
    pub stale_window_secs: f64,
    pub refresh_delay_secs: f64,
    /// Spread of background refresh and prefetch start times, as a
    /// fraction of their delay.
    pub refresh_jitter: f64,
    pub coalesce_window_ms: u64,
    /// Limit for a single upstream attempt.
    pub fetch_timeout_secs: f64,
    pub scheduler_wake_secs: f64,
    /// Size of budgets handed out by [`Engine::request_budget`](crate::Engine::request_budget).
    pub request_attempt_budget: usize,
    /// redb file for the durable tier. No durable tier when unset.
    pub cache_path: Option<PathBuf>,
    /// Redis URL for the shared tier. No shared tier when unset.
    pub redis_url: Option<String>,
    pub cleanup_interval_secs: f64,
    pub prefetch_interval_secs: f64,
    pub prefetch_top_n: usize,
    pub prefetch_min_requests: u64,
    pub popularity_window_secs: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_interval_secs: 1.0,
            jitter: 0.25,
            max_attempts: 3,
            max_retries: 2,
            retry_window_secs: 300.0,
            backoff_first_secs: 2.0,
            backoff_second_secs: 5.0,
            backoff_factor: 2.0,
            backoff_jitter: 0.2,
            rate_limit_cooldown_min_secs: 60.0,
            rate_limit_cooldown_max_secs: 120.0,
            circuit_failure_threshold: 3,
            circuit_window_secs: 300.0,
            circuit_recovery_secs: 300.0,
            cache_max_entries: 5000,
            cache_default_ttl_secs: 3600.0,
            stale_window_secs: 86400.0,
            refresh_delay_secs: 1.0,
            refresh_jitter: 0.2,
            coalesce_window_ms: 50,
            fetch_timeout_secs: 20.0,
            scheduler_wake_secs: 1.0,
            request_attempt_budget: 3,
            cache_path: None,
            redis_url: None,
            cleanup_interval_secs: 21600.0,
            prefetch_interval_secs: 3600.0,
            prefetch_top_n: 5,
            prefetch_min_requests: 3,
            popularity_window_secs: 86400.0,
        }
    }
}

fn parse<T>(variable: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|err: T::Err| ConfigError::Unparsable {
        variable: variable.to_string(),
        value: value.to_string(),
        message: err.to_string(),
    })
}

fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

pub(crate) fn check(ok: bool, option: &'static str, message: impl Into<String>) -> Result<(), ConfigError> {
    if ok {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            option,
            message: message.into(),
        })
    }
}

pub(crate) fn fraction(value: f64) -> bool {
    (0.0..=1.0).contains(&value)
}

fn non_negative(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}

fn positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

impl EngineConfig {
    /// Reads `FETCHGUARD_*` variables from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(std::env::vars())
    }

    /// Builds a configuration from `(name, value)` pairs, starting from the
    /// defaults. Names without the `FETCHGUARD_` prefix are ignored;
    /// prefixed names that are not recognised are an error.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = Self::default();
        for (name, value) in vars {
            let name = name.as_ref();
            let Some(option) = name.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            config.apply(name, option, value.as_ref())?;
        }
        config.validate()?;
        Ok(config)
    }

    fn apply(&mut self, name: &str, option: &str, value: &str) -> Result<(), ConfigError> {
        match option {
            "MIN_INTERVAL_SECS" => self.min_interval_secs = parse(name, value)?,
            "JITTER" => self.jitter = parse(name, value)?,
            "MAX_ATTEMPTS" => self.max_attempts = parse(name, value)?,
            "MAX_RETRIES" => self.max_retries = parse(name, value)?,
            "RETRY_WINDOW_SECS" => self.retry_window_secs = parse(name, value)?,
            "BACKOFF_FIRST_SECS" => self.backoff_first_secs = parse(name, value)?,
            "BACKOFF_SECOND_SECS" => self.backoff_second_secs = parse(name, value)?,
            "BACKOFF_FACTOR" => self.backoff_factor = parse(name, value)?,
            "BACKOFF_JITTER" => self.backoff_jitter = parse(name, value)?,
            "RATE_LIMIT_COOLDOWN_MIN_SECS" => {
                self.rate_limit_cooldown_min_secs = parse(name, value)?
            }
            "RATE_LIMIT_COOLDOWN_MAX_SECS" => {
                self.rate_limit_cooldown_max_secs = parse(name, value)?
            }
            "CIRCUIT_FAILURE_THRESHOLD" => self.circuit_failure_threshold = parse(name, value)?,
            "CIRCUIT_WINDOW_SECS" => self.circuit_window_secs = parse(name, value)?,
            "CIRCUIT_RECOVERY_SECS" => self.circuit_recovery_secs = parse(name, value)?,
            "CACHE_MAX_ENTRIES" => self.cache_max_entries = parse(name, value)?,
            "CACHE_DEFAULT_TTL_SECS" => self.cache_default_ttl_secs = parse(name, value)?,
            "STALE_WINDOW_SECS" => self.stale_window_secs = parse(name, value)?,
            "REFRESH_DELAY_SECS" => self.refresh_delay_secs = parse(name, value)?,
            "REFRESH_JITTER" => self.refresh_jitter = parse(name, value)?,
            "COALESCE_WINDOW_MS" => self.coalesce_window_ms = parse(name, value)?,
            "FETCH_TIMEOUT_SECS" => self.fetch_timeout_secs = parse(name, value)?,
            "SCHEDULER_WAKE_SECS" => self.scheduler_wake_secs = parse(name, value)?,
            "REQUEST_ATTEMPT_BUDGET" => self.request_attempt_budget = parse(name, value)?,
            "CACHE_PATH" => self.cache_path = non_empty(value).map(PathBuf::from),
            "REDIS_URL" => self.redis_url = non_empty(value).map(str::to_string),
            "CLEANUP_INTERVAL_SECS" => self.cleanup_interval_secs = parse(name, value)?,
            "PREFETCH_INTERVAL_SECS" => self.prefetch_interval_secs = parse(name, value)?,
            "PREFETCH_TOP_N" => self.prefetch_top_n = parse(name, value)?,
            "PREFETCH_MIN_REQUESTS" => self.prefetch_min_requests = parse(name, value)?,
            "POPULARITY_WINDOW_SECS" => self.popularity_window_secs = parse(name, value)?,
            _ => return Err(ConfigError::UnknownVariable(name.to_string())),
        }
        Ok(())
    }

    /// Checks every option against its allowed range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check(non_negative(self.min_interval_secs), "min_interval_secs", "must be >= 0")?;
        check(fraction(self.jitter), "jitter", "must be within 0..=1")?;
        check(
            (1..=20).contains(&self.max_attempts),
            "max_attempts",
            "must be within 1..=20",
        )?;
        check(positive(self.retry_window_secs), "retry_window_secs", "must be > 0")?;
        check(non_negative(self.backoff_first_secs), "backoff_first_secs", "must be >= 0")?;
        check(non_negative(self.backoff_second_secs), "backoff_second_secs", "must be >= 0")?;
        check(
            self.backoff_factor.is_finite() && self.backoff_factor >= 1.0,
            "backoff_factor",
            "must be >= 1",
        )?;
        check(fraction(self.backoff_jitter), "backoff_jitter", "must be within 0..=1")?;
        check(
            non_negative(self.rate_limit_cooldown_min_secs),
            "rate_limit_cooldown_min_secs",
            "must be >= 0",
        )?;
        check(
            non_negative(self.rate_limit_cooldown_max_secs)
                && self.rate_limit_cooldown_min_secs <= self.rate_limit_cooldown_max_secs,
            "rate_limit_cooldown_max_secs",
            "must be >= rate_limit_cooldown_min_secs",
        )?;
        check(
            self.circuit_failure_threshold >= 1,
            "circuit_failure_threshold",
            "must be >= 1",
        )?;
        check(positive(self.circuit_window_secs), "circuit_window_secs", "must be > 0")?;
        check(positive(self.circuit_recovery_secs), "circuit_recovery_secs", "must be > 0")?;
        check(self.cache_max_entries >= 1, "cache_max_entries", "must be >= 1")?;
        check(
            non_negative(self.cache_default_ttl_secs),
            "cache_default_ttl_secs",
            "must be >= 0",
        )?;
        check(non_negative(self.stale_window_secs), "stale_window_secs", "must be >= 0")?;
        check(non_negative(self.refresh_delay_secs), "refresh_delay_secs", "must be >= 0")?;
        check(fraction(self.refresh_jitter), "refresh_jitter", "must be within 0..=1")?;
        check(
            self.coalesce_window_ms <= 5000,
            "coalesce_window_ms",
            "must be <= 5000",
        )?;
        check(positive(self.fetch_timeout_secs), "fetch_timeout_secs", "must be > 0")?;
        check(positive(self.scheduler_wake_secs), "scheduler_wake_secs", "must be > 0")?;
        check(
            self.request_attempt_budget >= 1,
            "request_attempt_budget",
            "must be >= 1",
        )?;
        check(positive(self.cleanup_interval_secs), "cleanup_interval_secs", "must be > 0")?;
        check(positive(self.prefetch_interval_secs), "prefetch_interval_secs", "must be > 0")?;
        check(self.prefetch_top_n >= 1, "prefetch_top_n", "must be >= 1")?;
        check(self.prefetch_min_requests >= 1, "prefetch_min_requests", "must be >= 1")?;
        check(positive(self.popularity_window_secs), "popularity_window_secs", "must be > 0")?;
        Ok(())
    }

    pub fn min_interval(&self) -> Duration {
        secs(self.min_interval_secs)
    }

    pub fn retry_window(&self) -> Duration {
        secs(self.retry_window_secs)
    }

    pub fn backoff_first(&self) -> Duration {
        secs(self.backoff_first_secs)
    }

    pub fn backoff_second(&self) -> Duration {
        secs(self.backoff_second_secs)
    }

    pub fn rate_limit_cooldown(&self) -> (Duration, Duration) {
        (
            secs(self.rate_limit_cooldown_min_secs),
            secs(self.rate_limit_cooldown_max_secs),
        )
    }

    pub fn circuit_window(&self) -> Duration {
        secs(self.circuit_window_secs)
    }

    pub fn circuit_recovery(&self) -> Duration {
        secs(self.circuit_recovery_secs)
    }

    pub fn cache_default_ttl(&self) -> Duration {
        secs(self.cache_default_ttl_secs)
    }

    pub fn stale_window(&self) -> Duration {
        secs(self.stale_window_secs)
    }

    pub fn refresh_delay(&self) -> Duration {
        secs(self.refresh_delay_secs)
    }

    pub fn coalesce_window(&self) -> Duration {
        Duration::from_millis(self.coalesce_window_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        secs(self.fetch_timeout_secs)
    }

    pub fn scheduler_wake(&self) -> Duration {
        secs(self.scheduler_wake_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        secs(self.cleanup_interval_secs)
    }

    pub fn prefetch_interval(&self) -> Duration {
        secs(self.prefetch_interval_secs)
    }

    pub fn popularity_window(&self) -> Duration {
        secs(self.popularity_window_secs)
    }
}

fn non_empty(value: &str) -> Option<&str> {
    let value = value.trim();
    (!value.is_empty()).then_some(value)
}
