use crate::{Paced, RateLimiter};
use tower::Layer;

/// A Tower [`Layer`] that paces every call through a shared [`RateLimiter`].
///
/// All services produced by one layer (and all clones of the limiter)
/// share the same pacing state.
///
/// ```
/// use fetchguard_ratelimiter::RateLimiter;
/// use tower::ServiceBuilder;
/// use std::time::Duration;
///
/// let limiter = RateLimiter::builder()
///     .name("quotes-site")
///     .min_interval(Duration::from_millis(1500))
///     .jitter(0.25)
///     .build();
///
/// let service = ServiceBuilder::new()
///     .layer(limiter.layer())
///     .service(tower::service_fn(|key: String| async move {
///         Ok::<_, std::io::Error>(key)
///     }));
/// # let _ = service;
/// ```
#[derive(Clone, Debug)]
pub struct RateLimitLayer {
    limiter: RateLimiter,
}

impl RateLimitLayer {
    pub fn new(limiter: RateLimiter) -> Self {
        Self { limiter }
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = Paced<S>;

    fn layer(&self, service: S) -> Self::Service {
        Paced::new(service, self.limiter.clone())
    }
}
