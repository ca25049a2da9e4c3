//! Minimum-interval pacing for calls to a rate-limited upstream.
//!
//! A [`RateLimiter`] guarantees that two calls through the same instance
//! are at least `min_interval` apart, optionally spreading the delays with
//! a random jitter so many processes hitting one site do not fall into
//! lock-step. Unlike a token bucket there is no burst allowance: scraped
//! sites tend to punish bursts even when the average rate is low.
//!
//! ```
//! use fetchguard_ratelimiter::RateLimiter;
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread", start_paused = true)]
//! # async fn main() {
//! let limiter = RateLimiter::builder()
//!     .min_interval(Duration::from_secs(1))
//!     .build();
//!
//! let start = tokio::time::Instant::now();
//! limiter.wait().await;
//! limiter.wait().await;
//! assert!(start.elapsed() >= Duration::from_secs(1));
//! # }
//! ```
//!
//! Use [`RateLimiter::layer`] to put the limiter in front of a Tower
//! service. Waiting never fails, so the wrapped service keeps its own
//! error type.

mod config;
mod events;
mod layer;
mod limiter;

pub use config::{RateLimiterConfig, RateLimiterConfigBuilder};
pub use events::RateLimiterEvent;
pub use layer::RateLimitLayer;
pub use limiter::{RateLimiter, RateLimiterStats};

use futures::future::BoxFuture;
use std::task::{Context, Poll};
use tower::Service;

/// A service whose calls are paced by a [`RateLimiter`].
#[derive(Clone, Debug)]
pub struct Paced<S> {
    inner: S,
    limiter: RateLimiter,
}

impl<S> Paced<S> {
    pub fn new(inner: S, limiter: RateLimiter) -> Self {
        Self { inner, limiter }
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }
}

impl<S, Req> Service<Req> for Paced<S>
where
    S: Service<Req> + Clone + Send + 'static,
    S::Future: Send + 'static,
    Req: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let limiter = self.limiter.clone();
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            limiter.wait().await;
            inner.call(req).await
        })
    }
}
