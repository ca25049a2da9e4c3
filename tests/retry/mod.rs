//! Tests for `fetchguard-retry`:
//!
//! - **backoff**: the delay schedule seen by callers
//! - **budgets**: per-key and per-request attempt limits
//! - **cooldown**: what a throttled key does to later calls

mod backoff;

use fetchguard_core::{FetchError, FetchRequest, UpstreamError};
use futures::future::BoxFuture;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::Service;

/// An upstream answering from a script, then succeeding once the script
/// runs out.
#[derive(Clone, Default)]
pub struct Scripted {
    script: Arc<Mutex<VecDeque<UpstreamError>>>,
    calls: Arc<AtomicUsize>,
}

impl Scripted {
    pub fn failing_with(errors: impl IntoIterator<Item = UpstreamError>) -> Self {
        Self {
            script: Arc::new(Mutex::new(errors.into_iter().collect())),
            calls: Arc::default(),
        }
    }

    /// Fails `n` times with a transient error.
    pub fn transient(n: usize) -> Self {
        Self::failing_with((0..n).map(|i| UpstreamError::transient(format!("reset #{i}"))))
    }

    pub fn push(&self, error: UpstreamError) {
        self.script.lock().unwrap().push_back(error);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn service(
        &self,
    ) -> impl Service<
        FetchRequest,
        Response = String,
        Error = FetchError,
        Future = BoxFuture<'static, Result<String, FetchError>>,
    > + Clone
           + Send
           + 'static {
        let upstream = self.clone();
        tower::service_fn(move |req: FetchRequest| {
            upstream.calls.fetch_add(1, Ordering::SeqCst);
            let next = upstream.script.lock().unwrap().pop_front();
            let fut: BoxFuture<'static, Result<String, FetchError>> = Box::pin(async move {
                match next {
                    Some(error) => Err(FetchError::Upstream(error)),
                    None => Ok(format!("value of {}", req.key())),
                }
            });
            fut
        })
    }
}

pub const WINDOW: Duration = Duration::from_secs(300);
