use super::coalescer;
use fetchguard::{Engine, EngineConfig, UpstreamError};
use fetchguard_core::AttemptBudget;
use std::sync::Arc;

#[tokio::test(start_paused = true)]
async fn fetch_draws_from_the_owners_budget_only() {
    let c = coalescer::<usize>(10);
    let owner_budget = AttemptBudget::new(3);
    let waiter_budget = AttemptBudget::new(3);

    let fetch = || async {
        match AttemptBudget::current() {
            Some(budget) => {
                budget.try_consume();
                Ok(budget.used())
            }
            None => Err("no budget in scope".to_string()),
        }
    };

    let (owner, waiter) = tokio::join!(
        owner_budget.clone().scope(c.coalesce("k".to_string(), fetch)),
        waiter_budget.clone().scope(c.coalesce("k".to_string(), fetch)),
    );

    assert_eq!(owner, Ok(1));
    assert_eq!(waiter, Ok(1));
    assert_eq!(owner_budget.used(), 1);
    assert_eq!(waiter_budget.used(), 0);
}

#[tokio::test(start_paused = true)]
async fn request_budget_spans_resources() {
    let engine = Engine::builder(EngineConfig {
        min_interval_secs: 0.0,
        backoff_first_secs: 1.0,
        backoff_second_secs: 1.0,
        backoff_jitter: 0.0,
        request_attempt_budget: 2,
        ..EngineConfig::default()
    })
    .build()
    .unwrap();

    let quotes = engine
        .resource("quotes")
        .build(|key: Arc<str>| async move { Ok::<_, UpstreamError>(format!("quote {key}")) })
        .unwrap();
    let news = engine.resource("news").build(|_key: Arc<str>| async move {
        Err::<String, _>(UpstreamError::transient("reset"))
    })
    .unwrap();

    let budget = engine.request_budget();
    quotes
        .fetch_with_budget("quote:ABC", budget.clone())
        .await
        .unwrap();
    assert_eq!(budget.remaining(), 1);

    let err = news
        .fetch_with_budget("news:ABC", budget.clone())
        .await
        .unwrap_err();
    assert!(err.is_budget_exceeded(), "{err}");
    assert!(budget.is_exhausted());
}
