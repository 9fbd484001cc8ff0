//! Queue substrate: at-least-once delivery with visibility timeouts.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::core::DispatchError;

pub mod memory;

pub use memory::InMemoryQueue;

/// Largest number of messages one `send_batch` call carries.
pub const MAX_BATCH_SIZE: usize = 10;

/// A delivered message, invisible to other consumers until acked, released or its
/// visibility timeout elapses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    /// Stable message id.
    pub message_id: String,
    /// Handle for this delivery; stale after redelivery.
    pub receipt: String,
    /// Message body.
    pub body: String,
    /// How many times the message has been received, this delivery included.
    pub receive_count: u32,
}

/// Message queue abstraction.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Queue identifier.
    fn name(&self) -> &str;

    /// Enqueue one message.
    async fn send(&self, body: String) -> Result<(), DispatchError>;

    /// Enqueue up to [`MAX_BATCH_SIZE`] messages.
    async fn send_batch(&self, bodies: Vec<String>) -> Result<(), DispatchError> {
        for body in bodies {
            self.send(body).await?;
        }
        Ok(())
    }

    /// Receive up to `max` visible messages.
    async fn receive(&self, max: usize) -> Result<Vec<ReceivedMessage>, DispatchError>;

    /// Delete a processed message.
    async fn ack(&self, receipt: &str) -> Result<(), DispatchError>;

    /// Make a message visible again immediately for redelivery.
    async fn release(&self, receipt: &str) -> Result<(), DispatchError>;

    /// Move a message to the dead-letter queue without further redelivery.
    async fn dead_letter(&self, receipt: &str, reason: &str) -> Result<(), DispatchError>;
}

/// Queues by identifier.
#[derive(Clone, Default)]
pub struct QueueRegistry {
    queues: HashMap<String, Arc<dyn MessageQueue>>,
}

impl QueueRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a queue under its own name.
    pub fn insert(&mut self, queue: Arc<dyn MessageQueue>) {
        self.queues.insert(queue.name().to_string(), queue);
    }

    /// Look up a queue.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn MessageQueue>> {
        self.queues.get(name).cloned()
    }

    /// Look up a queue or fail with [`DispatchError::Config`].
    ///
    /// # Errors
    ///
    /// When no queue is registered under `name`.
    pub fn require(&self, name: &str) -> Result<Arc<dyn MessageQueue>, DispatchError> {
        self.get(name)
            .ok_or_else(|| DispatchError::Config(format!("no queue named `{name}`")))
    }

    /// Registered queue names.
    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.queues.keys()
    }
}

impl std::fmt::Debug for QueueRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueRegistry")
            .field("queues", &self.queues.keys().collect::<Vec<_>>())
            .finish()
    }
}
