//! Property tests for retry scheduling and budgets.
//!
//! Invariants tested:
//! - The stepped schedule follows 2s, 5s, then grows by the factor
//! - The coordinator never grants more than `max_retries` in a window
//! - An attempt budget is never overdrawn, however it is shared

use super::paused_runtime;
use fetchguard_core::AttemptBudget;
use fetchguard_retry::{IntervalFunction, RetryCoordinator, SteppedBackoff};
use proptest::prelude::*;
use std::time::Duration;
use tokio::time::Instant;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    /// Property: stepped intervals never shrink once past the first two
    #[test]
    fn stepped_schedule_grows(
        first_ms in 0u64..10_000,
        second_ms in 0u64..10_000,
        factor in 1.0f64..4.0,
        attempts in 3usize..12,
    ) {
        let backoff = SteppedBackoff::new(
            Duration::from_millis(first_ms),
            Duration::from_millis(second_ms),
        )
        .factor(factor);

        prop_assert_eq!(backoff.next_interval(0), Duration::from_millis(first_ms));
        prop_assert_eq!(backoff.next_interval(1), Duration::from_millis(second_ms));
        for n in 2..attempts {
            prop_assert!(backoff.next_interval(n) >= backoff.next_interval(n - 1));
        }
    }

    /// Property: grants inside any window never exceed the budget
    #[test]
    fn coordinator_never_overgrants(
        max_retries in 1usize..=5,
        window_secs in 1u64..=60,
        gaps in prop::collection::vec(0u64..30, 1..80),
    ) {
        let rt = paused_runtime();
        rt.block_on(async {
            let coordinator = RetryCoordinator::new(max_retries, Duration::from_secs(window_secs));
            let window = Duration::from_secs(window_secs);
            let mut granted: Vec<Instant> = Vec::new();

            for gap in gaps {
                tokio::time::advance(Duration::from_secs(gap)).await;
                let now = Instant::now();
                let in_window = granted.iter().filter(|t| now.duration_since(**t) <= window).count();

                let ok = coordinator.try_acquire_retry("key");
                prop_assert_eq!(ok, in_window < max_retries);
                if ok {
                    granted.push(now);
                }
                prop_assert!(coordinator.retries_used("key") <= max_retries);
            }
            Ok(())
        })?;
    }

    /// Property: clones of one budget hand out exactly `max_attempts`
    #[test]
    fn budget_is_never_overdrawn(
        max_attempts in 1usize..=20,
        holders in 1usize..=8,
        tries in 1usize..=10,
    ) {
        let budget = AttemptBudget::new(max_attempts);
        let clones: Vec<AttemptBudget> = (0..holders).map(|_| budget.clone()).collect();

        let mut consumed = 0;
        for _ in 0..tries {
            for holder in &clones {
                if holder.try_consume() {
                    consumed += 1;
                }
            }
        }

        prop_assert_eq!(consumed, max_attempts.min(holders * tries));
        prop_assert_eq!(budget.used(), consumed);
        prop_assert_eq!(budget.remaining(), max_attempts - consumed);
    }
}
