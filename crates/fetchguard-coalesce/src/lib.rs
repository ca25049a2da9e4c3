//! Single-flight request coalescing.
//!
//! When many callers miss the cache for the same key at once, only one of
//! them should reach the upstream. A [`Coalescer`] makes that so:
//!
//! 1. The first caller for a key becomes the owner and spawns the fetch
//! 2. Callers arriving while it is pending subscribe to its outcome
//! 3. Everyone receives a clone of the same value or the same error
//! 4. The key is forgotten as soon as the outcome is published, so the
//!    next caller starts a fresh fetch
//!
//! The fetch runs in its own task. If the caller that started it is
//! cancelled the fetch carries on for the others; if the fetch itself
//! panics, every caller gets [`CoalesceError::OwnerAborted`].
//!
//! This pattern is also known as singleflight (Go's
//! `golang.org/x/sync/singleflight`) or request collapsing.

mod coalescer;
mod config;

pub use coalescer::{CoalesceError, CoalesceStats, Coalescer};
pub use config::{CoalesceConfig, CoalesceConfigBuilder};
