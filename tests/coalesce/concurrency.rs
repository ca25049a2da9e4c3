use super::coalescer;
use fetchguard_coalesce::CoalesceError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

const KEYS: usize = 8;
const CALLERS_PER_KEY: usize = 25;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn each_key_is_fetched_once_under_contention() {
    let c = coalescer::<String>(0);
    let calls: Arc<Mutex<HashMap<String, usize>>> = Arc::default();
    let gate = Arc::new(Semaphore::new(0));

    let mut handles = Vec::new();
    for caller in 0..KEYS * CALLERS_PER_KEY {
        let key = format!("key-{}", caller % KEYS);
        let c = c.clone();
        let calls = Arc::clone(&calls);
        let gate = Arc::clone(&gate);
        handles.push(tokio::spawn(async move {
            let k = key.clone();
            c.coalesce(key, move || async move {
                *calls.lock().unwrap().entry(k.clone()).or_default() += 1;
                let Ok(_permit) = gate.acquire().await else {
                    return Err("gate closed".to_string());
                };
                Ok(format!("value of {k}"))
            })
            .await
            .map(|value| (caller % KEYS, value))
        }));
    }

    // Hold every fetch until all callers have joined one.
    let total = (KEYS * CALLERS_PER_KEY) as u64;
    loop {
        let stats = c.stats();
        if stats.owners + stats.waiters == total {
            break;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    gate.add_permits(KEYS);

    for handle in handles {
        let (key, value) = handle.await.unwrap().unwrap();
        assert_eq!(value, format!("value of key-{key}"));
    }

    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), KEYS);
    assert!(calls.values().all(|&n| n == 1), "{calls:?}");

    let stats = c.stats();
    assert_eq!(stats.owners, KEYS as u64);
    assert_eq!(stats.waiters, (KEYS * (CALLERS_PER_KEY - 1)) as u64);
    assert_eq!(stats.in_flight, 0);
}

#[tokio::test(start_paused = true)]
async fn failed_fetch_is_not_remembered() {
    let c = coalescer::<u32>(10);
    let (a, b) = tokio::join!(
        c.coalesce("k".to_string(), || async { Err("503".to_string()) }),
        c.coalesce("k".to_string(), || async { Ok(1) }),
    );
    assert_eq!(a, Err(CoalesceError::Upstream("503".to_string())));
    assert_eq!(b, a);
    assert!(!c.is_in_flight(&"k".to_string()));

    let retry = c.coalesce("k".to_string(), || async { Ok(2) }).await;
    assert_eq!(retry, Ok(2));
}

#[tokio::test(start_paused = true)]
async fn window_lets_late_callers_join() {
    let c = coalescer::<u32>(50);
    let first = {
        let c = c.clone();
        tokio::spawn(async move { c.coalesce("k".to_string(), || async { Ok(1) }).await })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(c.is_in_flight(&"k".to_string()));
    let late = c.coalesce("k".to_string(), || async { Ok(2) }).await;

    assert_eq!(late, Ok(1));
    assert_eq!(first.await.unwrap(), Ok(1));
    assert_eq!(c.stats().waiters, 1);
}
