//! Bounded retries for upstream fetches.
//!
//! The [`Retry`] stage wraps a fetch service and decides, per failure,
//! whether to try again:
//!
//! - **Transient failures and timeouts** are retried through an
//!   [`IntervalFunction`] schedule (by default [`SteppedBackoff`]: 2s, 5s,
//!   then doubling) with jitter, up to `max_attempts`. Each retry must also
//!   be granted by the shared [`RetryCoordinator`], which caps retries per
//!   key in a sliding window so many callers cannot turn one bad key into
//!   a retry storm.
//! - **Throttling signals** put the key on cooldown (the upstream's hint,
//!   or a random 60 to 120 seconds) and surface as
//!   [`FetchError::RateLimited`]. Later calls for that key fail fast with
//!   [`FetchError::Cooldown`] until the cooldown ends.
//! - **Every attempt** draws from the request's [`AttemptBudget`] when one
//!   is attached, failing with [`FetchError::RetryBudgetExceeded`] once it
//!   is empty.
//!
//! [`AttemptBudget`]: fetchguard_core::AttemptBudget

mod backoff;
mod config;
mod coordinator;
mod events;
mod layer;

pub use backoff::{jittered, FixedInterval, FnInterval, IntervalFunction, SteppedBackoff};
pub use config::{RetryConfig, RetryConfigBuilder};
pub use coordinator::RetryCoordinator;
pub use events::RetryEvent;
pub use layer::RetryLayer;

use fetchguard_core::{BudgetScope, FetchError, FetchRequest};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;
use tower::Service;

#[cfg(feature = "metrics")]
use metrics::counter;

/// A service that retries failed fetches according to a [`RetryConfig`].
pub struct Retry<S> {
    inner: S,
    config: Arc<RetryConfig>,
}

impl<S> Retry<S> {
    pub fn new(inner: S, config: Arc<RetryConfig>) -> Self {
        Self { inner, config }
    }
}

impl<S: Clone> Clone for Retry<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            config: Arc::clone(&self.config),
        }
    }
}

impl<S> Service<FetchRequest> for Retry<S>
where
    S: Service<FetchRequest, Error = FetchError> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
{
    type Response = S::Response;
    type Error = FetchError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: FetchRequest) -> Self::Future {
        let mut service = self.inner.clone();
        let config = Arc::clone(&self.config);

        Box::pin(async move {
            let key = req.key().to_string();
            let coordinator = &config.coordinator;

            if let Some(remaining) = coordinator.cooldown_remaining(&key) {
                #[cfg(feature = "tracing")]
                tracing::debug!(retry = %config.name, key = %key, remaining_ms = remaining.as_millis() as u64, "key cooling down");

                config.event_listeners.emit(&RetryEvent::CooldownActive {
                    name: config.name.clone(),
                    timestamp: Instant::now(),
                    key: key.clone(),
                    remaining,
                });
                return Err(FetchError::Cooldown { key, remaining });
            }

            let mut attempts = 0usize;
            loop {
                if let Some(budget) = req.budget() {
                    if !budget.try_consume() {
                        let scope = BudgetScope::Request {
                            max_attempts: budget.max_attempts(),
                        };
                        emit_budget_exhausted(&config, &scope);
                        return Err(FetchError::RetryBudgetExceeded { scope });
                    }
                }
                attempts += 1;

                let error = match service.call(req.clone()).await {
                    Ok(response) => {
                        config.event_listeners.emit(&RetryEvent::Success {
                            name: config.name.clone(),
                            timestamp: Instant::now(),
                            attempts,
                        });
                        return Ok(response);
                    }
                    Err(FetchError::Upstream(error)) => error,
                    Err(other) => return Err(other),
                };

                if error.is_throttled() {
                    let cooldown = error
                        .cooldown_hint()
                        .unwrap_or_else(|| config.sample_cooldown());
                    coordinator.set_cooldown(&key, cooldown);

                    #[cfg(feature = "tracing")]
                    tracing::warn!(retry = %config.name, key = %key, cooldown_s = cooldown.as_secs_f64(), "upstream throttled key");

                    #[cfg(feature = "metrics")]
                    counter!("fetchguard_retry_throttled_total", "retry" => config.name.clone())
                        .increment(1);

                    config.event_listeners.emit(&RetryEvent::Throttled {
                        name: config.name.clone(),
                        timestamp: Instant::now(),
                        key: key.clone(),
                        cooldown,
                    });

                    if config.retry_on_rate_limit && attempts < config.max_attempts {
                        tokio::time::sleep(cooldown).await;
                        continue;
                    }
                    return Err(FetchError::RateLimited {
                        key,
                        retry_after: Some(cooldown),
                    });
                }

                if attempts >= config.max_attempts {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(retry = %config.name, key = %key, attempts, error = %error, "retries exhausted");

                    config.event_listeners.emit(&RetryEvent::Exhausted {
                        name: config.name.clone(),
                        timestamp: Instant::now(),
                        key: key.clone(),
                        attempts,
                    });
                    return Err(FetchError::Upstream(error));
                }

                if !coordinator.try_acquire_retry(&key) {
                    let scope = BudgetScope::Key(key.clone());
                    emit_budget_exhausted(&config, &scope);
                    return Err(FetchError::RetryBudgetExceeded { scope });
                }

                let delay = jittered(config.backoff.next_interval(attempts - 1), config.jitter);

                #[cfg(feature = "tracing")]
                tracing::debug!(retry = %config.name, key = %key, attempt = attempts, delay_ms = delay.as_millis() as u64, error = %error, "retrying after failure");

                #[cfg(feature = "metrics")]
                counter!("fetchguard_retry_attempts_total", "retry" => config.name.clone())
                    .increment(1);

                config.event_listeners.emit(&RetryEvent::Retry {
                    name: config.name.clone(),
                    timestamp: Instant::now(),
                    key: key.clone(),
                    attempt: attempts,
                    delay,
                });

                tokio::time::sleep(delay).await;
            }
        })
    }
}

fn emit_budget_exhausted(config: &RetryConfig, scope: &BudgetScope) {
    #[cfg(feature = "tracing")]
    tracing::warn!(retry = %config.name, %scope, "attempt budget exhausted");

    config.event_listeners.emit(&RetryEvent::BudgetExhausted {
        name: config.name.clone(),
        timestamp: Instant::now(),
        scope: scope.clone(),
    });
}
