//! The per-resource fetch pipeline.
//!
//! ```text
//! FetchRequest → [CircuitGuard] → [Retry] → [Paced] → [AttemptTimeout] → fetch fn
//! ```
//!
//! The circuit check is outermost so an open circuit never waits for a
//! rate-limit slot. Pacing and the timeout sit inside the retry loop, so
//! every attempt is paced and each attempt gets the full timeout.

use fetchguard_circuitbreaker::CircuitBreaker;
use fetchguard_core::{FetchError, FetchRequest, UpstreamError};
use fetchguard_ratelimiter::{RateLimitLayer, RateLimiter};
use fetchguard_retry::RetryLayer;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tower::util::BoxCloneService;
use tower::{Layer, Service, ServiceBuilder, ServiceExt};

/// A caller-supplied upstream fetch: key in, value or classified failure out.
pub type FetchFn<V> =
    Arc<dyn Fn(Arc<str>) -> BoxFuture<'static, Result<V, UpstreamError>> + Send + Sync>;

/// Boxes an async closure into a [`FetchFn`].
pub fn fetch_fn<V, F, Fut>(f: F) -> FetchFn<V>
where
    F: Fn(Arc<str>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<V, UpstreamError>> + Send + 'static,
{
    Arc::new(move |key| Box::pin(f(key)))
}

/// Fails an attempt that runs longer than the configured limit with a
/// timeout [`UpstreamError`], which the retry stage treats as transient.
#[derive(Debug, Clone, Copy)]
pub struct AttemptTimeoutLayer {
    timeout: Duration,
}

impl AttemptTimeoutLayer {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl<S> Layer<S> for AttemptTimeoutLayer {
    type Service = AttemptTimeout<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AttemptTimeout {
            inner,
            timeout: self.timeout,
        }
    }
}

/// See [`AttemptTimeoutLayer`].
#[derive(Debug, Clone)]
pub struct AttemptTimeout<S> {
    inner: S,
    timeout: Duration,
}

impl<S> Service<FetchRequest> for AttemptTimeout<S>
where
    S: Service<FetchRequest, Error = FetchError> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = FetchError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: FetchRequest) -> Self::Future {
        let timeout = self.timeout;
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            #[cfg(feature = "tracing")]
            let key = req.shared_key();

            match tokio::time::timeout(timeout, inner.call(req)).await {
                Ok(result) => result,
                Err(_) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(key = %key, timeout_ms = timeout.as_millis() as u64, "upstream attempt timed out");

                    #[cfg(feature = "metrics")]
                    metrics::counter!("fetchguard_attempt_timeouts_total").increment(1);

                    Err(FetchError::Upstream(UpstreamError::timeout(timeout)))
                }
            }
        })
    }
}

/// The assembled stages for one resource, type-erased.
pub(crate) struct Pipeline<V> {
    service: Mutex<BoxCloneService<FetchRequest, V, FetchError>>,
}

impl<V> Pipeline<V>
where
    V: Send + 'static,
{
    pub(crate) fn new(
        breaker: &CircuitBreaker,
        retry: RetryLayer,
        limiter: RateLimiter,
        attempt_timeout: Duration,
        fetch: FetchFn<V>,
    ) -> Self {
        let upstream = tower::service_fn(move |req: FetchRequest| {
            let fetch = Arc::clone(&fetch);
            async move { fetch(req.shared_key()).await.map_err(FetchError::Upstream) }
        });

        let service = ServiceBuilder::new()
            .layer(breaker.layer())
            .layer(retry)
            .layer(RateLimitLayer::new(limiter))
            .layer(AttemptTimeoutLayer::new(attempt_timeout))
            .service(upstream);

        Self {
            service: Mutex::new(BoxCloneService::new(service)),
        }
    }

    pub(crate) async fn call(&self, req: FetchRequest) -> Result<V, FetchError> {
        let service = self.service.lock().clone();
        service.oneshot(req).await
    }
}
