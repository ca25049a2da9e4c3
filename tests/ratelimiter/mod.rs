//! Tests for `fetchguard-ratelimiter`:
//!
//! - **pacing**: spacing between callers, with and without jitter
//! - **layer**: limiters shared by several tower services

mod layer;
