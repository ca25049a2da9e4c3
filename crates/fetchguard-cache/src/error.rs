//! Errors raised by lower cache tiers.

use thiserror::Error;

/// A lower tier failed to read, write or decode an entry.
///
/// [`TieredCache`](crate::TieredCache) never surfaces these to callers: it
/// logs them, counts them in [`CacheStats::tier_errors`](crate::CacheStats)
/// and carries on with the tiers that still work.
#[derive(Debug, Error)]
pub enum TierError {
    /// The backing store reported an error.
    #[error("{tier} tier failed: {message}")]
    Backend { tier: &'static str, message: String },

    /// The stored bytes are not a valid envelope.
    #[error("undecodable envelope: {0}")]
    Decode(#[from] serde_json::Error),

    /// The envelope parsed but holds impossible metadata.
    #[error("invalid envelope: {0}")]
    InvalidEnvelope(String),

    /// A blocking tier operation could not be joined.
    #[error("tier task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl TierError {
    pub fn backend(tier: &'static str, err: impl std::fmt::Display) -> Self {
        TierError::Backend {
            tier,
            message: err.to_string(),
        }
    }
}
