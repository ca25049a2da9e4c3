use super::RunLog;
use fetchguard_scheduler::{SubmitOptions, TaskScheduler};
use std::time::Duration;
use tokio::sync::oneshot;

#[tokio::test(start_paused = true)]
async fn work_queued_before_start_waits_for_the_worker() {
    let log = RunLog::new();
    let scheduler = TaskScheduler::builder().name("refresh").build();

    assert!(scheduler.submit(SubmitOptions::new(), log.task("a")));
    assert!(scheduler.submit(SubmitOptions::new().dedupe_key("b"), log.task("b")));
    assert!(scheduler.is_pending("b"));

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(log.labels().is_empty());
    assert_eq!(scheduler.queue_depth(), 2);

    assert!(scheduler.start());
    assert!(!scheduler.start());
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(log.labels(), ["a", "b"]);
    assert!(!scheduler.is_pending("b"));
    assert_eq!(scheduler.stats().executed, 2);
    scheduler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn delayed_tasks_run_when_due() {
    let log = RunLog::new();
    let scheduler = TaskScheduler::builder()
        .wake_interval(Duration::from_secs(60))
        .build();
    scheduler.start();

    scheduler.submit(
        SubmitOptions::new().delay(Duration::from_secs(30)),
        log.task("prefetch"),
    );
    scheduler.submit(
        SubmitOptions::new().delay(Duration::from_secs(5)),
        log.task("refresh"),
    );

    tokio::time::sleep(Duration::from_secs(40)).await;
    assert_eq!(
        log.runs(),
        [
            ("refresh", Duration::from_secs(5)),
            ("prefetch", Duration::from_secs(30)),
        ]
    );
    scheduler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn jitter_spreads_a_batch() {
    let log = RunLog::new();
    let scheduler = TaskScheduler::default();
    scheduler.start();

    for _ in 0..20 {
        scheduler.submit(
            SubmitOptions::new()
                .delay(Duration::from_secs(10))
                .jitter(0.5),
            log.task("refresh"),
        );
    }
    tokio::time::sleep(Duration::from_secs(20)).await;

    let times: Vec<Duration> = log.runs().into_iter().map(|(_, at)| at).collect();
    assert_eq!(times.len(), 20);
    assert!(times.iter().all(|t| *t >= Duration::from_secs(5)));
    assert!(times.iter().all(|t| *t <= Duration::from_secs(15)));
    assert!(times.windows(2).any(|w| w[0] != w[1]));
    scheduler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn running_flag_tracks_the_current_task() {
    let scheduler = TaskScheduler::default();
    scheduler.start();

    let (release, gate) = oneshot::channel::<()>();
    scheduler.submit(SubmitOptions::new().dedupe_key("slow"), async move {
        gate.await.map_err(|e| e.to_string())
    });
    tokio::time::sleep(Duration::from_millis(1)).await;

    let stats = scheduler.stats();
    assert!(stats.running);
    assert_eq!(stats.queue_depth, 0);
    assert!(scheduler.is_pending("slow"));

    release.send(()).unwrap();
    tokio::time::sleep(Duration::from_millis(1)).await;

    let stats = scheduler.stats();
    assert!(!stats.running);
    assert_eq!(stats.executed, 1);
    scheduler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn stopped_scheduler_stays_stopped() {
    let log = RunLog::new();
    let scheduler = TaskScheduler::default();
    scheduler.start();
    scheduler.submit(
        SubmitOptions::new().delay(Duration::from_secs(60)),
        log.task("queued"),
    );

    scheduler.shutdown().await;
    assert_eq!(log.labels(), ["queued"]);
    assert!(!scheduler.is_running());
    assert_eq!(scheduler.queue_depth(), 0);

    assert!(!scheduler.start());
    assert!(!scheduler.submit(SubmitOptions::new(), log.task("late")));

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(log.labels(), ["queued"]);
    assert_eq!(scheduler.stats().rejected_stopped, 1);
}

#[tokio::test(start_paused = true)]
async fn shutdown_finishes_refreshes_still_queued() {
    let log = RunLog::new();
    let scheduler = TaskScheduler::builder().name("refresh").build();
    scheduler.start();

    for key in ["quote:A", "quote:B", "quote:C"] {
        assert!(scheduler.submit(
            SubmitOptions::new()
                .dedupe_key(key)
                .delay(Duration::from_secs(1)),
            log.task(key),
        ));
    }
    assert_eq!(scheduler.queue_depth(), 3);

    scheduler.shutdown().await;
    assert_eq!(log.labels(), ["quote:A", "quote:B", "quote:C"]);
    assert!(!scheduler.is_pending("quote:B"));
    assert_eq!(scheduler.stats().executed, 3);
}

#[tokio::test(start_paused = true)]
async fn abort_drops_queued_work() {
    let log = RunLog::new();
    let scheduler = TaskScheduler::default();
    scheduler.start();
    scheduler.submit(
        SubmitOptions::new()
            .dedupe_key("quote:A")
            .delay(Duration::from_secs(5)),
        log.task("dropped"),
    );

    scheduler.abort();
    scheduler.join().await;
    assert_eq!(scheduler.queue_depth(), 0);
    assert!(!scheduler.is_pending("quote:A"));

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(log.labels().is_empty());
}

#[tokio::test(start_paused = true)]
async fn clones_share_one_queue() {
    let log = RunLog::new();
    let scheduler = TaskScheduler::default();
    let handle = scheduler.clone();
    scheduler.start();

    assert!(handle.submit(SubmitOptions::new().dedupe_key("k"), log.task("first")));
    assert!(!scheduler.submit(SubmitOptions::new().dedupe_key("k"), log.task("second")));

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(log.labels(), ["first"]);
    handle.shutdown().await;
    assert!(!scheduler.is_running());
}
