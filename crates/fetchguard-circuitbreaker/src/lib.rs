//! Circuit breaking for throttle-prone upstreams.
//!
//! A [`CircuitBreaker`] watches a named upstream resource. It opens after
//! `failure_threshold` health failures inside a sliding `window`, refuses
//! calls for `recovery_timeout`, then lets a single probe through:
//!
//! ```text
//!  CLOSED --(threshold failures in window)--> OPEN
//!    ^                                          |
//!    |                              (recovery timeout passes)
//!    |                                          v
//!    +------(probe succeeds)------------- HALF_OPEN --(probe throttled)--> OPEN
//! ```
//!
//! Only failures the [`FailureClassifier`](classifier::FailureClassifier)
//! marks as health signals are counted. The default,
//! [`ThrottlingClassifier`](classifier::ThrottlingClassifier), counts
//! explicit throttling only; generic errors are left to the retry stage.
//!
//! Breakers are usually obtained from a [`CircuitRegistry`] so that every
//! pipeline calling the same upstream shares one circuit.
//!
//! ```rust
//! use fetchguard_circuitbreaker::{CircuitBreaker, CircuitState};
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread", start_paused = true)]
//! # async fn main() {
//! let breaker = CircuitBreaker::builder()
//!     .name("upstream-x")
//!     .failure_threshold(3)
//!     .window(Duration::from_secs(300))
//!     .recovery_timeout(Duration::from_secs(300))
//!     .build();
//!
//! for _ in 0..3 {
//!     breaker.record_failure();
//! }
//! assert_eq!(breaker.state(), CircuitState::Open);
//! assert!(!breaker.allow_request());
//! # }
//! ```

mod breaker;
mod circuit;
pub mod classifier;
mod config;
mod events;
mod layer;
mod registry;

pub use breaker::CircuitBreaker;
pub use circuit::{CircuitState, CircuitStatus};
pub use classifier::{AnyErrorClassifier, FailureClassifier, FnClassifier, ThrottlingClassifier};
pub use config::{CircuitBreakerConfig, CircuitBreakerConfigBuilder};
pub use events::CircuitEvent;
pub use layer::CircuitBreakerLayer;
pub use registry::CircuitRegistry;

use fetchguard_core::FetchError;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::Service;

/// A service guarded by a [`CircuitBreaker`].
///
/// While the circuit is open calls fail with [`FetchError::CircuitOpen`]
/// without reaching the inner service.
pub struct CircuitGuard<S, C> {
    inner: S,
    breaker: CircuitBreaker,
    classifier: Arc<C>,
}

impl<S, C> CircuitGuard<S, C> {
    pub(crate) fn new(inner: S, breaker: CircuitBreaker, classifier: Arc<C>) -> Self {
        Self {
            inner,
            breaker,
            classifier,
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }
}

impl<S: Clone, C> Clone for CircuitGuard<S, C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            breaker: self.breaker.clone(),
            classifier: Arc::clone(&self.classifier),
        }
    }
}

impl<S, C, Req> Service<Req> for CircuitGuard<S, C>
where
    S: Service<Req, Error = FetchError> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
    C: classifier::FailureClassifier<FetchError> + 'static,
    Req: Send + 'static,
{
    type Response = S::Response;
    type Error = FetchError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let breaker = self.breaker.clone();
        let classifier = Arc::clone(&self.classifier);
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            if !breaker.allow_request() {
                return Err(FetchError::CircuitOpen {
                    name: breaker.name().to_string(),
                });
            }

            let result = inner.call(req).await;
            breaker.record_result(&result, classifier.as_ref());
            result
        })
    }
}
