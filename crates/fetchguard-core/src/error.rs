//! The fetch error taxonomy.
//!
//! Every stage of a fetch pipeline reports failures as a [`FetchError`].
//! The variants are deliberately distinct so callers can tell "the
//! upstream said slow down" apart from "we refused to call the upstream"
//! and from "the upstream call itself failed":
//!
//! ```rust
//! use fetchguard_core::{FetchError, UpstreamError};
//!
//! fn describe(err: &FetchError) -> &'static str {
//!     match err {
//!         FetchError::RateLimited { .. } => "back off",
//!         FetchError::CircuitOpen { .. } => "try another provider",
//!         FetchError::RetryBudgetExceeded { .. } => "give up for this request",
//!         FetchError::Upstream(_) => "upstream failed",
//!     }
//! }
//!
//! let err = FetchError::from(UpstreamError::throttled("HTTP 429"));
//! assert_eq!(describe(&err), "upstream failed");
//! assert!(err.is_throttling_signal());
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// How an upstream failure should be treated by retry and circuit logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Ordinary failure. Retried through the backoff schedule, never opens a circuit.
    Transient,
    /// The attempt exceeded its own timeout. Treated like [`FailureKind::Transient`].
    Timeout,
    /// The upstream explicitly throttled us, optionally saying for how long.
    Throttled { cooldown_hint: Option<Duration> },
}

/// A failure reported by a caller-supplied fetch function.
#[derive(Debug, Clone)]
pub struct UpstreamError {
    kind: FailureKind,
    message: Arc<str>,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for UpstreamError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

impl UpstreamError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into().into(),
            source: None,
        }
    }

    /// An ordinary, retryable failure.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Transient, message)
    }

    /// An explicit throttling signal without a cooldown hint.
    pub fn throttled(message: impl Into<String>) -> Self {
        Self::new(
            FailureKind::Throttled {
                cooldown_hint: None,
            },
            message,
        )
    }

    /// An explicit throttling signal carrying the upstream's cooldown hint
    /// (for example a `Retry-After` header).
    pub fn throttled_for(message: impl Into<String>, cooldown: Duration) -> Self {
        Self::new(
            FailureKind::Throttled {
                cooldown_hint: Some(cooldown),
            },
            message,
        )
    }

    /// An attempt that did not finish within `after`.
    pub fn timeout(after: Duration) -> Self {
        Self::new(
            FailureKind::Timeout,
            format!("upstream attempt timed out after {after:?}"),
        )
    }

    /// Wraps an arbitrary error, classifying it from its message.
    ///
    /// Messages mentioning HTTP 429, "too many requests" or "rate limit"
    /// become throttling signals; everything else is transient.
    pub fn classify<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        let message = err.to_string();
        let kind = if looks_throttled(&message) {
            FailureKind::Throttled {
                cooldown_hint: None,
            }
        } else {
            FailureKind::Transient
        };
        Self {
            kind,
            message: message.into(),
            source: Some(Arc::new(err)),
        }
    }

    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_throttled(&self) -> bool {
        matches!(self.kind, FailureKind::Throttled { .. })
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == FailureKind::Timeout
    }

    /// The cooldown the upstream asked for, if any.
    pub fn cooldown_hint(&self) -> Option<Duration> {
        match self.kind {
            FailureKind::Throttled { cooldown_hint } => cooldown_hint,
            _ => None,
        }
    }
}

fn looks_throttled(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("429") || lower.contains("too many requests") || lower.contains("rate limit")
}

/// Which budget ran out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BudgetScope {
    /// The per-key retry window of a retry coordinator.
    Key(String),
    /// The attempt budget attached to one external request.
    Request { max_attempts: usize },
}

impl fmt::Display for BudgetScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BudgetScope::Key(key) => write!(f, "retry budget for key '{key}'"),
            BudgetScope::Request { max_attempts } => {
                write!(f, "request attempt budget of {max_attempts}")
            }
        }
    }
}

/// Error returned by fetch pipelines and the façade.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    /// The upstream throttled this key; do not hammer it.
    #[error("rate limited on '{key}'{}", retry_hint(.retry_after))]
    RateLimited {
        key: String,
        retry_after: Option<Duration>,
    },

    /// The key is still cooling down from an earlier throttle. Produced
    /// locally without calling the upstream, so it says nothing new about
    /// upstream health.
    #[error("'{key}' is cooling down (retry after {:.1}s)", .remaining.as_secs_f64())]
    Cooldown { key: String, remaining: Duration },

    /// The named circuit is open and no stale fallback existed.
    #[error("circuit '{name}' is open")]
    CircuitOpen { name: String },

    /// A per-key or per-request attempt budget is exhausted.
    #[error("{scope} exhausted")]
    RetryBudgetExceeded { scope: BudgetScope },

    /// The fetch function's own failure, after retries were exhausted.
    #[error("upstream error: {0}")]
    Upstream(#[from] UpstreamError),
}

fn retry_hint(retry_after: &Option<Duration>) -> String {
    match retry_after {
        Some(d) => format!(" (retry after {:.1}s)", d.as_secs_f64()),
        None => String::new(),
    }
}

impl FetchError {
    /// True when the key is throttled, either by the upstream just now or
    /// by a cooldown still in effect.
    pub fn is_rate_limited(&self) -> bool {
        matches!(
            self,
            FetchError::RateLimited { .. } | FetchError::Cooldown { .. }
        )
    }

    pub fn is_cooldown(&self) -> bool {
        matches!(self, FetchError::Cooldown { .. })
    }

    pub fn is_circuit_open(&self) -> bool {
        matches!(self, FetchError::CircuitOpen { .. })
    }

    pub fn is_budget_exceeded(&self) -> bool {
        matches!(self, FetchError::RetryBudgetExceeded { .. })
    }

    pub fn is_upstream(&self) -> bool {
        matches!(self, FetchError::Upstream(_))
    }

    /// The wrapped upstream error, if this is one.
    pub fn upstream(&self) -> Option<&UpstreamError> {
        match self {
            FetchError::Upstream(e) => Some(e),
            _ => None,
        }
    }

    /// True for failures that indicate upstream health trouble: a
    /// throttled key, or a raw throttling signal. A [`FetchError::Cooldown`]
    /// is not one; the upstream was never asked.
    pub fn is_throttling_signal(&self) -> bool {
        match self {
            FetchError::RateLimited { .. } => true,
            FetchError::Upstream(e) => e.is_throttled(),
            _ => false,
        }
    }
}
