//! Scheduler metrics regression tests

use super::helpers::*;
use fetchguard_scheduler::{SubmitOptions, TaskScheduler};
use serial_test::serial;
use std::time::Duration;

#[tokio::test(start_paused = true)]
#[serial]
async fn scheduler_metrics_exist() {
    init_recorder();

    let scheduler = TaskScheduler::builder().name("metrics_scheduler").build();
    scheduler.submit(SubmitOptions::new(), async { Ok::<_, String>(()) });
    scheduler.submit(SubmitOptions::new(), async { Err::<(), _>("boom") });
    scheduler.submit(SubmitOptions::new(), async {
        if true {
            panic!("exploded");
        }
        Ok::<_, String>(())
    });

    scheduler.start();
    tokio::time::sleep(Duration::from_millis(10)).await;
    scheduler.shutdown().await;

    assert_gauge_exists("fetchguard_scheduler_queue_depth");
    assert_metric_has_label("fetchguard_scheduler_queue_depth", "scheduler", "metrics_scheduler");

    assert_counter_exists("fetchguard_scheduler_tasks_total");
    assert_metric_has_label("fetchguard_scheduler_tasks_total", "scheduler", "metrics_scheduler");
    assert_metric_has_label("fetchguard_scheduler_tasks_total", "outcome", "ok");
    assert_metric_has_label("fetchguard_scheduler_tasks_total", "outcome", "error");
    assert_metric_has_label("fetchguard_scheduler_tasks_total", "outcome", "panic");
}
