use fetchguard_core::{FetchError, FetchRequest};
use fetchguard_ratelimiter::{RateLimitLayer, RateLimiter};
use futures::future::BoxFuture;
use std::time::Duration;
use tokio::time::Instant;
use tower::{service_fn, Layer, Service, ServiceBuilder, ServiceExt};

fn echo() -> impl Service<
    FetchRequest,
    Response = String,
    Error = FetchError,
    Future = BoxFuture<'static, Result<String, FetchError>>,
> + Clone
       + Send
       + 'static {
    service_fn(|req: FetchRequest| {
        let fut: BoxFuture<'static, Result<String, FetchError>> =
            Box::pin(async move { Ok(req.key().to_string()) });
        fut
    })
}

#[tokio::test(start_paused = true)]
async fn one_limiter_paces_every_service_it_wraps() {
    let limiter = RateLimiter::builder()
        .min_interval(Duration::from_secs(1))
        .build();
    let quotes = limiter.layer().layer(echo());
    let history = ServiceBuilder::new()
        .layer(RateLimitLayer::new(limiter.clone()))
        .service(echo());

    let start = Instant::now();
    for i in 0..4 {
        let key = format!("k{i}");
        let response = if i % 2 == 0 {
            quotes.clone().oneshot(FetchRequest::new(key.as_str())).await
        } else {
            history.clone().oneshot(FetchRequest::new(key.as_str())).await
        };
        assert_eq!(response.unwrap(), key);
    }

    assert_eq!(start.elapsed(), Duration::from_secs(3));
    assert_eq!(limiter.stats().calls, 4);
}

#[tokio::test(start_paused = true)]
async fn separate_limiters_do_not_wait_for_each_other() {
    let a = RateLimiter::builder()
        .min_interval(Duration::from_secs(10))
        .build();
    let b = RateLimiter::builder()
        .min_interval(Duration::from_secs(10))
        .build();

    let start = Instant::now();
    let (x, y) = tokio::join!(
        a.layer().layer(echo()).oneshot(FetchRequest::new("x")),
        b.layer().layer(echo()).oneshot(FetchRequest::new("y")),
    );
    assert_eq!(x.unwrap(), "x");
    assert_eq!(y.unwrap(), "y");
    assert_eq!(start.elapsed(), Duration::ZERO);
}
