//! Shared building blocks for the fetchguard crates.
//!
//! - [`events`]: typed events and panic-isolated listener collections
//! - [`error`]: the [`FetchError`] taxonomy and classified [`UpstreamError`]
//! - [`request`]: [`FetchRequest`] and the request-scoped [`AttemptBudget`]

pub mod error;
pub mod events;
pub mod request;

pub use error::{BudgetScope, FailureKind, FetchError, UpstreamError};
pub use events::{EngineEvent, EventListener, EventListeners, FnListener};
pub use request::{AttemptBudget, FetchRequest};
