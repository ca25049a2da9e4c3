use crate::{CircuitBreaker, CircuitGuard};
use std::sync::Arc;
use tower::Layer;

/// A Tower Layer that refuses calls while a [`CircuitBreaker`] is open.
///
/// `C` decides which errors count against the circuit; see
/// [`classifier`](crate::classifier).
///
/// ```rust
/// use fetchguard_circuitbreaker::CircuitBreaker;
/// use fetchguard_core::{FetchError, FetchRequest};
/// use tower::{ServiceBuilder, service_fn};
///
/// let breaker = CircuitBreaker::builder().name("upstream-x").build();
///
/// let service = ServiceBuilder::new()
///     .layer(breaker.layer())
///     .service(service_fn(|req: FetchRequest| async move {
///         Ok::<_, FetchError>(req.key().len())
///     }));
/// # let _ = service;
/// ```
pub struct CircuitBreakerLayer<C> {
    breaker: CircuitBreaker,
    classifier: Arc<C>,
}

impl<C> CircuitBreakerLayer<C> {
    pub fn new(breaker: CircuitBreaker, classifier: C) -> Self {
        Self {
            breaker,
            classifier: Arc::new(classifier),
        }
    }
}

impl<C> Clone for CircuitBreakerLayer<C> {
    fn clone(&self) -> Self {
        Self {
            breaker: self.breaker.clone(),
            classifier: Arc::clone(&self.classifier),
        }
    }
}

impl<S, C> Layer<S> for CircuitBreakerLayer<C> {
    type Service = CircuitGuard<S, C>;

    fn layer(&self, service: S) -> Self::Service {
        CircuitGuard::new(service, self.breaker.clone(), Arc::clone(&self.classifier))
    }
}
