//! Executor and spawner seams.
//!
//! Executors own all infrastructure mutation; the dispatcher only hands them tasks.

use std::future::Future;

use async_trait::async_trait;

use crate::core::dispatcher::TaskMessage;
use crate::core::AppResult;

/// Business logic bound to a worker's task queue.
///
/// Tasks may be delivered more than once and in any order, so implementations must be
/// idempotent.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use fleet_dispatch::core::{AppResult, TaskExecutor, TaskMessage};
///
/// struct DryRunLogger;
///
/// #[async_trait]
/// impl TaskExecutor for DryRunLogger {
///     async fn execute(&self, task: TaskMessage, commit: bool) -> AppResult<()> {
///         tracing::info!(account = ?task.account_id, commit, "would apply");
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait TaskExecutor: Send + Sync + 'static {
    /// Execute one task. `commit` is false for dry runs.
    ///
    /// Returning an error releases the task for redelivery.
    async fn execute(&self, task: TaskMessage, commit: bool) -> AppResult<()>;
}

/// Spawner abstraction used to launch background consumers.
pub trait Spawn: Send + Sync {
    /// Spawn a future.
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static;
}
