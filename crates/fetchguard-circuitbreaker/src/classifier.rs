//! Deciding which failures count against a circuit.
//!
//! A circuit only opens on failures that say something about the health
//! of the upstream. By default that means throttling signals: a parse
//! error or a single connection reset retries through the backoff
//! schedule, but it should never take a whole upstream offline.

use fetchguard_core::FetchError;
use std::sync::Arc;

/// Decides whether an error counts toward opening the circuit.
pub trait FailureClassifier<Err>: Send + Sync {
    /// Returns true if `err` is an upstream-health failure.
    fn is_health_failure(&self, err: &Err) -> bool;
}

/// Counts only throttling signals: [`FetchError::RateLimited`] and
/// upstream errors classified as throttled. Cooldown fast-fails never
/// reached the upstream and are ignored.
///
/// ```rust
/// use fetchguard_circuitbreaker::classifier::{FailureClassifier, ThrottlingClassifier};
/// use fetchguard_core::{FetchError, UpstreamError};
///
/// let c = ThrottlingClassifier;
/// assert!(c.is_health_failure(&FetchError::from(UpstreamError::throttled("429"))));
/// assert!(!c.is_health_failure(&FetchError::from(UpstreamError::transient("reset"))));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct ThrottlingClassifier;

impl FailureClassifier<FetchError> for ThrottlingClassifier {
    fn is_health_failure(&self, err: &FetchError) -> bool {
        err.is_throttling_signal()
    }
}

/// Counts every error.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnyErrorClassifier;

impl<Err> FailureClassifier<Err> for AnyErrorClassifier {
    fn is_health_failure(&self, _err: &Err) -> bool {
        true
    }
}

/// A classifier backed by a closure.
pub struct FnClassifier<F> {
    f: Arc<F>,
}

impl<F> FnClassifier<F> {
    pub fn new(f: F) -> Self {
        Self { f: Arc::new(f) }
    }
}

impl<F> Clone for FnClassifier<F> {
    fn clone(&self) -> Self {
        Self {
            f: Arc::clone(&self.f),
        }
    }
}

impl<F, Err> FailureClassifier<Err> for FnClassifier<F>
where
    F: Fn(&Err) -> bool + Send + Sync,
{
    fn is_health_failure(&self, err: &Err) -> bool {
        (self.f)(err)
    }
}
