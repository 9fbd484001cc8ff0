//! Dead-letter storage and manual replay.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::DispatchError;
use crate::infra::queue::MessageQueue;

pub mod memory;

pub use memory::InMemoryDeadLetterQueue;

/// A message that will not be redelivered automatically.
///
/// The body is kept verbatim, so render jobs keep their worker name and template key
/// and tasks keep their account and region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetter {
    /// Original message id.
    pub id: String,
    /// Queue the message came from.
    pub queue: String,
    /// Message body.
    pub body: String,
    /// Receives before dead-lettering.
    pub receive_count: u32,
    /// Why the message was dead-lettered.
    pub reason: String,
    /// Timestamp milliseconds.
    pub dead_lettered_at_ms: u128,
}

/// Dead-letter storage abstraction.
pub trait DeadLetterQueue: Send + Sync {
    /// Store an entry.
    fn push(&self, entry: DeadLetter);

    /// Snapshot of stored entries, oldest first.
    fn list(&self) -> Vec<DeadLetter>;

    /// Remove and return an entry.
    fn take(&self, id: &str) -> Option<DeadLetter>;
}

/// Put a dead-lettered message back on `queue`.
///
/// The entry is restored if the send fails.
///
/// # Errors
///
/// [`DispatchError::Backend`] if no entry has `id` or it belongs to another queue, or the
/// queue's send error.
pub async fn replay(
    dead_letters: &dyn DeadLetterQueue,
    id: &str,
    queue: &dyn MessageQueue,
) -> Result<(), DispatchError> {
    let entry = dead_letters
        .take(id)
        .ok_or_else(|| DispatchError::Backend(format!("no dead letter with id `{id}`")))?;
    if entry.queue != queue.name() {
        let message = format!(
            "dead letter `{id}` came from `{}`, not `{}`",
            entry.queue,
            queue.name()
        );
        dead_letters.push(entry);
        return Err(DispatchError::Backend(message));
    }
    if let Err(e) = queue.send(entry.body.clone()).await {
        dead_letters.push(entry);
        return Err(e);
    }
    info!(queue = %entry.queue, id, "dead letter replayed");
    Ok(())
}
