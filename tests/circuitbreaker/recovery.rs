use super::{Reply, Upstream};
use fetchguard_circuitbreaker::{CircuitBreaker, CircuitState};
use fetchguard_core::FetchRequest;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::{Layer, ServiceExt};

const RECOVERY: Duration = Duration::from_secs(300);

fn recording_breaker() -> (CircuitBreaker, Arc<Mutex<Vec<(CircuitState, CircuitState)>>>) {
    let transitions = Arc::new(Mutex::new(Vec::new()));
    let t = Arc::clone(&transitions);
    let breaker = CircuitBreaker::builder()
        .name("upstream")
        .failure_threshold(3)
        .window(Duration::from_secs(300))
        .recovery_timeout(RECOVERY)
        .on_state_transition(move |from, to| t.lock().unwrap().push((from, to)))
        .build();
    (breaker, transitions)
}

#[tokio::test(start_paused = true)]
async fn probe_after_recovery_timeout_closes_the_circuit() {
    let upstream = Upstream::new();
    let (breaker, transitions) = recording_breaker();
    let service = breaker.layer().layer(upstream.service());

    upstream.set(Reply::Throttle);
    for _ in 0..3 {
        let _ = service.clone().oneshot(FetchRequest::new("k")).await;
    }
    assert_eq!(breaker.status().cooldown_remaining, Some(RECOVERY));

    tokio::time::advance(RECOVERY - Duration::from_secs(1)).await;
    assert!(service
        .clone()
        .oneshot(FetchRequest::new("k"))
        .await
        .unwrap_err()
        .is_circuit_open());

    tokio::time::advance(Duration::from_secs(1)).await;
    upstream.set(Reply::Ok);
    assert!(service.oneshot(FetchRequest::new("k")).await.is_ok());

    assert_eq!(
        *transitions.lock().unwrap(),
        [
            (CircuitState::Closed, CircuitState::Open),
            (CircuitState::Open, CircuitState::HalfOpen),
            (CircuitState::HalfOpen, CircuitState::Closed),
        ]
    );
    assert_eq!(upstream.calls(), 4);
}

#[tokio::test(start_paused = true)]
async fn throttled_probe_reopens_for_a_full_timeout() {
    let upstream = Upstream::new();
    let (breaker, _) = recording_breaker();
    let service = breaker.layer().layer(upstream.service());

    upstream.set(Reply::Throttle);
    for _ in 0..3 {
        let _ = service.clone().oneshot(FetchRequest::new("k")).await;
    }
    tokio::time::advance(RECOVERY).await;

    let _ = service.clone().oneshot(FetchRequest::new("k")).await;
    assert_eq!(breaker.state(), CircuitState::Open);
    assert_eq!(breaker.status().cooldown_remaining, Some(RECOVERY));
}

#[tokio::test(start_paused = true)]
async fn half_open_admits_one_probe_at_a_time() {
    let upstream = Upstream::new();
    let (breaker, _) = recording_breaker();
    let service = breaker.layer().layer(upstream.service());

    breaker.force_open();
    tokio::time::advance(RECOVERY).await;

    upstream.set(Reply::Slow);
    let probe = tokio::spawn(service.clone().oneshot(FetchRequest::new("probe")));
    tokio::task::yield_now().await;
    assert_eq!(breaker.state(), CircuitState::HalfOpen);

    let rejected = service.clone().oneshot(FetchRequest::new("other")).await;
    assert!(rejected.unwrap_err().is_circuit_open());

    assert!(probe.await.unwrap().is_ok());
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(upstream.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn throttles_outside_the_window_are_forgotten() {
    let upstream = Upstream::new();
    let (breaker, _) = recording_breaker();
    let service = breaker.layer().layer(upstream.service());

    upstream.set(Reply::Throttle);
    for _ in 0..2 {
        let _ = service.clone().oneshot(FetchRequest::new("k")).await;
    }
    tokio::time::advance(Duration::from_secs(301)).await;

    for _ in 0..2 {
        let _ = service.clone().oneshot(FetchRequest::new("k")).await;
    }
    assert_eq!(breaker.state(), CircuitState::Closed);

    let _ = service.oneshot(FetchRequest::new("k")).await;
    assert_eq!(breaker.state(), CircuitState::Open);
}
