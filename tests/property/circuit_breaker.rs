//! Property tests for the circuit breaker.
//!
//! Invariants tested:
//! - Opens exactly when failures in the window reach the threshold
//! - Rejects every call until the recovery timeout passes
//! - Admits a single probe once it has
//! - A success forgets earlier failures

use super::paused_runtime;
use fetchguard_circuitbreaker::{CircuitBreaker, CircuitState};
use proptest::prelude::*;
use std::time::Duration;

fn breaker(threshold: usize, window_secs: u64, recovery_secs: u64) -> CircuitBreaker {
    CircuitBreaker::builder()
        .name("prop")
        .failure_threshold(threshold)
        .window(Duration::from_secs(window_secs))
        .recovery_timeout(Duration::from_secs(recovery_secs))
        .build()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    /// Property: the circuit opens at the threshold, not before
    #[test]
    fn opens_exactly_at_threshold(
        threshold in 1usize..=10,
        failures in 0usize..=20,
    ) {
        let rt = paused_runtime();
        rt.block_on(async {
            let breaker = breaker(threshold, 300, 300);
            for _ in 0..failures {
                if breaker.allow_request() {
                    breaker.record_failure();
                }
            }

            let expected = if failures >= threshold {
                CircuitState::Open
            } else {
                CircuitState::Closed
            };
            prop_assert_eq!(breaker.state(), expected);
            Ok(())
        })?;
    }

    /// Property: failures spread wider than the window never open it
    #[test]
    fn spaced_failures_are_forgotten(
        threshold in 2usize..=6,
        window_secs in 1u64..=120,
        rounds in 1usize..=30,
    ) {
        let rt = paused_runtime();
        rt.block_on(async {
            let breaker = breaker(threshold, window_secs, 300);
            let gap = Duration::from_secs(window_secs) / (threshold as u32 - 1) + Duration::from_millis(1);
            for _ in 0..rounds {
                prop_assert!(breaker.allow_request());
                breaker.record_failure();
                tokio::time::advance(gap).await;
            }
            prop_assert_eq!(breaker.state(), CircuitState::Closed);
            Ok(())
        })?;
    }

    /// Property: an open circuit rejects until recovery, then admits one probe
    #[test]
    fn open_circuit_admits_one_probe_after_recovery(
        threshold in 1usize..=5,
        recovery_secs in 1u64..=600,
        early_checks in 1usize..=10,
    ) {
        let rt = paused_runtime();
        rt.block_on(async {
            let breaker = breaker(threshold, 300, recovery_secs);
            for _ in 0..threshold {
                breaker.record_failure();
            }
            prop_assert_eq!(breaker.state(), CircuitState::Open);

            let step = Duration::from_secs(recovery_secs) / (early_checks as u32 + 1);
            for _ in 0..early_checks {
                tokio::time::advance(step).await;
                if breaker.status().cooldown_remaining.is_some_and(|d| !d.is_zero()) {
                    prop_assert!(!breaker.allow_request());
                }
            }

            tokio::time::advance(Duration::from_secs(recovery_secs)).await;
            prop_assert!(breaker.allow_request());
            prop_assert_eq!(breaker.state(), CircuitState::HalfOpen);
            prop_assert!(!breaker.allow_request());

            breaker.record_success();
            prop_assert_eq!(breaker.state(), CircuitState::Closed);
            prop_assert!(breaker.allow_request());
            Ok(())
        })?;
    }

    /// Property: a success in between keeps the count below the threshold
    #[test]
    fn success_resets_the_count(
        threshold in 2usize..=10,
        before in 0usize..10,
    ) {
        let before = before.min(threshold - 1);
        let rt = paused_runtime();
        rt.block_on(async {
            let breaker = breaker(threshold, 300, 300);
            for _ in 0..before {
                breaker.record_failure();
            }
            breaker.record_success();
            for _ in 0..threshold - 1 {
                breaker.record_failure();
            }
            prop_assert_eq!(breaker.state(), CircuitState::Closed);
            prop_assert_eq!(breaker.status().failures_in_window, threshold - 1);
            Ok(())
        })?;
    }
}
