//! A quote service behind fetchguard.
//! Run with: cargo run --example quote_service
//! With logs: RUST_LOG=debug cargo run --example quote_service

use fetchguard::{Engine, EngineConfig, FetchSource, UpstreamError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = EngineConfig {
        min_interval_secs: 0.2,
        ..EngineConfig::from_env()?
    };
    let engine = Engine::open(config).await?;
    engine.start();

    // Every third call is throttled.
    let calls = Arc::new(AtomicUsize::new(0));
    let quotes = engine
        .resource("quotes")
        .ttl(Duration::from_secs(60))
        .build(move |symbol: Arc<str>| {
            let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if call % 3 == 0 {
                    Err(UpstreamError::throttled("429 Too Many Requests"))
                } else {
                    Ok(format!("{symbol}: {:.2}", 100.0 + call as f64 / 4.0))
                }
            }
        })?;

    for symbol in ["ABC", "XYZ", "ABC", "QRS", "XYZ", "LMN"] {
        match quotes.fetch_detailed(symbol).await {
            Ok(fetched) if fetched.source == FetchSource::Upstream => {
                println!("{symbol}: loaded {}", fetched.value)
            }
            Ok(fetched) => println!("{symbol}: {} from {}", fetched.value, fetched.source.as_str()),
            Err(err) => println!("{symbol}: failed: {err}"),
        }
    }

    let snapshot = engine.snapshot();
    println!("rate limit triggers: {}", snapshot.rate_limit_triggers());
    println!("circuit: {:?}", quotes.circuit_status().state);
    println!("cache: {:?}", quotes.cache_stats());

    engine.shutdown().await;
    Ok(())
}
