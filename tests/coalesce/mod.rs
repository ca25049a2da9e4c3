//! Tests for `fetchguard-coalesce`:
//!
//! - **concurrency**: many keys and many callers on a multi-threaded runtime
//! - **budgets**: attempt budgets crossing into the shared fetch

mod budgets;
mod concurrency;

use fetchguard_coalesce::{CoalesceConfig, Coalescer};
use std::time::Duration;

pub fn coalescer<V: Clone + Send + 'static>(window_ms: u64) -> Coalescer<String, V, String> {
    Coalescer::new(
        CoalesceConfig::builder()
            .name("test")
            .window(Duration::from_millis(window_ms))
            .build(),
    )
}
