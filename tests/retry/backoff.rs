use super::{Scripted, WINDOW};
use fetchguard_core::FetchRequest;
use fetchguard_retry::{RetryCoordinator, RetryLayer};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tower::{Layer, ServiceExt};

#[tokio::test(start_paused = true)]
async fn stepped_schedule_waits_two_then_five_seconds() {
    let upstream = Scripted::transient(2);
    let delays = Arc::new(Mutex::new(Vec::new()));
    let d = Arc::clone(&delays);

    let service = RetryLayer::builder()
        .name("quotes")
        .stepped_backoff(Duration::from_secs(2), Duration::from_secs(5), 2.0)
        .jitter(0.0)
        .coordinator(RetryCoordinator::new(5, WINDOW))
        .on_retry(move |attempt, delay| d.lock().unwrap().push((attempt, delay)))
        .build()
        .layer(upstream.service());

    let start = Instant::now();
    let value = service.oneshot(FetchRequest::new("ABC")).await.unwrap();

    assert_eq!(value, "value of ABC");
    assert_eq!(start.elapsed(), Duration::from_secs(7));
    assert_eq!(
        *delays.lock().unwrap(),
        [(1, Duration::from_secs(2)), (2, Duration::from_secs(5))]
    );
}

#[tokio::test(start_paused = true)]
async fn later_retries_grow_by_the_factor() {
    let upstream = Scripted::transient(4);
    let service = RetryLayer::builder()
        .max_attempts(5)
        .stepped_backoff(Duration::from_secs(2), Duration::from_secs(5), 3.0)
        .jitter(0.0)
        .coordinator(RetryCoordinator::new(10, WINDOW))
        .build()
        .layer(upstream.service());

    let start = Instant::now();
    service.oneshot(FetchRequest::new("k")).await.unwrap();

    // 2 + 5 + 15 + 45
    assert_eq!(start.elapsed(), Duration::from_secs(67));
    assert_eq!(upstream.calls(), 5);
}

#[tokio::test(start_paused = true)]
async fn jitter_only_lengthens_the_wait() {
    let upstream = Scripted::transient(1);
    let delays = Arc::new(Mutex::new(Vec::new()));
    let d = Arc::clone(&delays);

    let service = RetryLayer::builder()
        .fixed_backoff(Duration::from_secs(10))
        .jitter(0.2)
        .coordinator(RetryCoordinator::new(5, WINDOW))
        .on_retry(move |_attempt, delay| d.lock().unwrap().push(delay))
        .build()
        .layer(upstream.service());

    service.oneshot(FetchRequest::new("k")).await.unwrap();

    let delays = delays.lock().unwrap();
    assert_eq!(delays.len(), 1);
    assert!(delays[0] >= Duration::from_secs(10), "{:?}", delays[0]);
    assert!(delays[0] <= Duration::from_secs(12), "{:?}", delays[0]);
}
