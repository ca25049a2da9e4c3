//! Coalescer metrics regression tests

use super::helpers::*;
use fetchguard_coalesce::{CoalesceConfig, Coalescer};
use serial_test::serial;
use std::time::Duration;

#[tokio::test]
#[serial]
async fn coalesce_metrics_exist() {
    init_recorder();

    let coalescer: Coalescer<String, u32, String> = Coalescer::new(
        CoalesceConfig::builder()
            .name("metrics_coalesce")
            .window(Duration::from_millis(20))
            .build(),
    );

    let (a, b) = tokio::join!(
        coalescer.coalesce("k".to_string(), || async { Ok::<_, String>(1) }),
        coalescer.coalesce("k".to_string(), || async { Ok::<_, String>(2) }),
    );
    assert_eq!(a.unwrap(), b.unwrap());

    assert_counter_exists("fetchguard_coalesce_requests_total");
    assert_metric_has_label("fetchguard_coalesce_requests_total", "coalesce", "metrics_coalesce");
    assert_metric_has_label("fetchguard_coalesce_requests_total", "role", "owner");
    assert_metric_has_label("fetchguard_coalesce_requests_total", "role", "waiter");

    assert_gauge_exists("fetchguard_coalesce_in_flight");
    assert_metric_has_label("fetchguard_coalesce_in_flight", "coalesce", "metrics_coalesce");
}
