//! Retry metrics regression tests

use super::helpers::*;
use fetchguard_core::{FetchError, FetchRequest, UpstreamError};
use fetchguard_retry::{RetryCoordinator, RetryLayer};
use futures::future::BoxFuture;
use serial_test::serial;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower::{Layer, ServiceExt};

#[tokio::test(start_paused = true)]
#[serial]
async fn retry_metrics_exist() {
    init_recorder();

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let upstream = tower::service_fn(move |req: FetchRequest| {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        let fut: BoxFuture<'static, Result<&'static str, FetchError>> = Box::pin(async move {
            match (req.key(), n) {
                ("flaky", 0) => Err(UpstreamError::transient("reset").into()),
                ("limited", _) => Err(UpstreamError::throttled("429").into()),
                _ => Ok("ok"),
            }
        });
        fut
    });

    let service = RetryLayer::builder()
        .name("metrics_retry")
        .fixed_backoff(Duration::from_millis(10))
        .coordinator(RetryCoordinator::new(5, Duration::from_secs(60)))
        .build()
        .layer(upstream);

    service.clone().oneshot(FetchRequest::new("flaky")).await.unwrap();
    service.oneshot(FetchRequest::new("limited")).await.unwrap_err();

    assert_counter_exists("fetchguard_retry_attempts_total");
    assert_metric_has_label("fetchguard_retry_attempts_total", "retry", "metrics_retry");

    assert_counter_exists("fetchguard_retry_throttled_total");
    assert_metric_has_label("fetchguard_retry_throttled_total", "retry", "metrics_retry");
}
