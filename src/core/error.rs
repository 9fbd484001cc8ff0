//! Error types for resolution and dispatch.

use std::time::Duration;

use thiserror::Error;

use crate::core::overrides::OverlapReport;
use crate::core::schema::ValidationErrors;

/// Errors produced by the dispatch engine.
///
/// Validation-class variants fail a template deterministically and are never worth
/// redelivering. I/O-class variants are transient; see [`DispatchError::is_retryable`].
#[derive(Debug, Error)]
pub enum DispatchError {
    /// An account filter combines criteria that cannot be combined.
    #[error("malformed filter: {0}")]
    MalformedFilter(String),
    /// The template document does not satisfy the worker's payload schema.
    #[error("schema validation failed: {0}")]
    SchemaValidation(ValidationErrors),
    /// Two override blocks resolve to intersecting targets.
    #[error("overlapping override configurations: {0}")]
    Overlap(OverlapReport),
    /// The template object store could not be reached.
    #[error("template store unavailable: {0}")]
    StoreUnavailable(String),
    /// The requested template key does not exist.
    #[error("template not found: {0}")]
    TemplateNotFound(String),
    /// The account inventory snapshot could not be loaded.
    #[error("account inventory unavailable: {0}")]
    InventoryUnavailable(String),
    /// A single message could not be placed on a queue.
    #[error("enqueue to `{queue}` failed: {reason}")]
    EnqueueFailure {
        /// Target queue identifier.
        queue: String,
        /// Backend-specific reason.
        reason: String,
    },
    /// A message referenced a worker that is not registered.
    #[error("unknown worker: {0}")]
    UnknownWorker(String),
    /// A queue message body could not be decoded.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
    /// An invocation ran past its wall-clock budget.
    #[error("time budget of {0:?} exceeded")]
    BudgetExceeded(Duration),
    /// Process configuration is invalid.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// Backend-specific failure with context.
    #[error("backend error: {0}")]
    Backend(String),
}

impl DispatchError {
    /// Whether redelivering the same job could succeed.
    ///
    /// Validation failures (`MalformedFilter`, `SchemaValidation`, `Overlap`, unknown
    /// workers, undecodable messages, missing templates) fail identically every time.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::StoreUnavailable(_)
                | Self::InventoryUnavailable(_)
                | Self::EnqueueFailure { .. }
                | Self::BudgetExceeded(_)
                | Self::Backend(_)
        )
    }

    /// Short machine-readable label used in logs and audit events.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::MalformedFilter(_) => "malformed_filter",
            Self::SchemaValidation(_) => "schema_validation",
            Self::Overlap(_) => "overlap",
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::TemplateNotFound(_) => "template_not_found",
            Self::InventoryUnavailable(_) => "inventory_unavailable",
            Self::EnqueueFailure { .. } => "enqueue_failure",
            Self::UnknownWorker(_) => "unknown_worker",
            Self::InvalidMessage(_) => "invalid_message",
            Self::BudgetExceeded(_) => "budget_exceeded",
            Self::Config(_) => "config",
            Self::Backend(_) => "backend",
        }
    }
}

impl From<ValidationErrors> for DispatchError {
    fn from(errors: ValidationErrors) -> Self {
        Self::SchemaValidation(errors)
    }
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
