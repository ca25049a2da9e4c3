//! A priority task scheduler for background work.
//!
//! [`TaskScheduler`] runs submitted futures one at a time on a single
//! worker task, ordered by due time and then priority. It is meant for
//! background refreshes: the caller has already been answered (often from
//! a stale cache entry) and the scheduler brings the entry up to date later
//! without stampeding the upstream.
//!
//! - **Dedupe keys**: a key that is queued or running cannot be submitted
//!   again until its task finishes, fails or panics
//! - **Delay and jitter**: tasks can be deferred, and spread out so that
//!   many refreshes scheduled together do not fire together
//! - **Graceful stop**: [`stop`](TaskScheduler::stop) refuses new work and
//!   lets everything already queued run when due;
//!   [`abort`](TaskScheduler::abort) drops the queue instead;
//!   [`join`](TaskScheduler::join) waits for the worker to exit
//!
//! # Example
//!
//! ```rust
//! use fetchguard_scheduler::{SubmitOptions, TaskScheduler};
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let scheduler = TaskScheduler::builder()
//!     .name("refresh")
//!     .on_task_failed(|key, err| eprintln!("refresh of {key:?} failed: {err}"))
//!     .build();
//! scheduler.start();
//!
//! scheduler.submit(
//!     SubmitOptions::new()
//!         .priority(5)
//!         .delay(Duration::from_millis(10))
//!         .dedupe_key("quote:ABC"),
//!     async {
//!         // re-fetch and store quote:ABC
//!         Ok::<_, String>(())
//!     },
//! );
//!
//! scheduler.shutdown().await;
//! # }
//! ```

mod config;
mod events;
mod scheduler;
mod task;

pub use config::{SchedulerConfig, SchedulerConfigBuilder};
pub use events::SchedulerEvent;
pub use scheduler::{SchedulerStats, TaskScheduler};
pub use task::SubmitOptions;
