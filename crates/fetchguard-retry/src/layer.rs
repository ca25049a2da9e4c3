use crate::{Retry, RetryConfig};
use std::sync::Arc;
use tower::Layer;

/// A Tower [`Layer`] that retries failed fetches.
///
/// ```
/// use fetchguard_retry::{RetryCoordinator, RetryLayer};
/// use fetchguard_core::{FetchError, FetchRequest};
/// use tower::ServiceBuilder;
/// use std::time::Duration;
///
/// let coordinator = RetryCoordinator::new(2, Duration::from_secs(300));
/// let retry = RetryLayer::builder()
///     .name("quotes")
///     .max_attempts(3)
///     .stepped_backoff(Duration::from_secs(2), Duration::from_secs(5), 2.0)
///     .coordinator(coordinator)
///     .build();
///
/// let service = ServiceBuilder::new()
///     .layer(retry)
///     .service(tower::service_fn(|req: FetchRequest| async move {
///         Ok::<_, FetchError>(req.key().to_uppercase())
///     }));
/// # let _ = service;
/// ```
#[derive(Clone)]
pub struct RetryLayer {
    config: Arc<RetryConfig>,
}

impl RetryLayer {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn builder() -> crate::RetryConfigBuilder {
        crate::RetryConfigBuilder::new()
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }
}

impl<S> Layer<S> for RetryLayer {
    type Service = Retry<S>;

    fn layer(&self, service: S) -> Self::Service {
        Retry::new(service, Arc::clone(&self.config))
    }
}
