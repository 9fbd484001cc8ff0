//! In-memory queue with visibility timeouts and dead-lettering.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::warn;
use uuid::Uuid;

use crate::core::DispatchError;
use crate::infra::dead_letter::{DeadLetter, DeadLetterQueue};
use crate::infra::queue::{MessageQueue, ReceivedMessage, MAX_BATCH_SIZE};
use crate::util::clock::now_ms;

struct StoredMessage {
    id: String,
    body: String,
    receive_count: u32,
    visible_at: Instant,
    receipt: Option<String>,
}

/// In-memory queue.
///
/// A received message stays invisible for the visibility timeout. A message already
/// received `max_receive_count` times is moved to the dead-letter queue instead of
/// being delivered again.
pub struct InMemoryQueue {
    name: String,
    visibility_timeout: Duration,
    max_receive_count: u32,
    dead_letters: Arc<dyn DeadLetterQueue>,
    messages: Mutex<Vec<StoredMessage>>,
}

impl InMemoryQueue {
    /// Create a queue.
    pub fn new(
        name: impl Into<String>,
        visibility_timeout: Duration,
        max_receive_count: u32,
        dead_letters: Arc<dyn DeadLetterQueue>,
    ) -> Self {
        Self {
            name: name.into(),
            visibility_timeout,
            max_receive_count,
            dead_letters,
            messages: Mutex::new(Vec::new()),
        }
    }

    /// Messages held, visible or not.
    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    /// Whether the queue holds no messages.
    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }

    /// Messages currently received and not yet acked.
    pub fn in_flight(&self) -> usize {
        let now = Instant::now();
        self.messages
            .lock()
            .iter()
            .filter(|m| m.receipt.is_some() && m.visible_at > now)
            .count()
    }

    /// Bodies of every held message, in arrival order.
    pub fn bodies(&self) -> Vec<String> {
        self.messages.lock().iter().map(|m| m.body.clone()).collect()
    }

    fn to_dead_letter(&self, message: StoredMessage, reason: &str) {
        warn!(
            queue = %self.name,
            message_id = %message.id,
            receive_count = message.receive_count,
            reason,
            "message dead-lettered"
        );
        self.dead_letters.push(DeadLetter {
            id: message.id,
            queue: self.name.clone(),
            body: message.body,
            receive_count: message.receive_count,
            reason: reason.to_string(),
            dead_lettered_at_ms: now_ms(),
        });
    }

    fn take_by_receipt(&self, receipt: &str) -> Result<StoredMessage, DispatchError> {
        let mut messages = self.messages.lock();
        let position = messages
            .iter()
            .position(|m| m.receipt.as_deref() == Some(receipt))
            .ok_or_else(|| self.stale(receipt))?;
        Ok(messages.remove(position))
    }

    fn stale(&self, receipt: &str) -> DispatchError {
        DispatchError::Backend(format!(
            "receipt `{receipt}` is unknown or stale on queue `{}`",
            self.name
        ))
    }
}

#[async_trait]
impl MessageQueue for InMemoryQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, body: String) -> Result<(), DispatchError> {
        self.messages.lock().push(StoredMessage {
            id: Uuid::new_v4().to_string(),
            body,
            receive_count: 0,
            visible_at: Instant::now(),
            receipt: None,
        });
        Ok(())
    }

    async fn send_batch(&self, bodies: Vec<String>) -> Result<(), DispatchError> {
        if bodies.len() > MAX_BATCH_SIZE {
            return Err(DispatchError::EnqueueFailure {
                queue: self.name.clone(),
                reason: format!("batch of {} exceeds {MAX_BATCH_SIZE}", bodies.len()),
            });
        }
        for body in bodies {
            self.send(body).await?;
        }
        Ok(())
    }

    async fn receive(&self, max: usize) -> Result<Vec<ReceivedMessage>, DispatchError> {
        let now = Instant::now();
        let mut received = Vec::new();
        let mut exhausted = Vec::new();
        {
            let mut messages = self.messages.lock();
            let mut i = 0;
            while i < messages.len() && received.len() < max {
                if messages[i].visible_at > now {
                    i += 1;
                    continue;
                }
                if messages[i].receive_count >= self.max_receive_count {
                    exhausted.push(messages.remove(i));
                    continue;
                }
                let message = &mut messages[i];
                let receipt = Uuid::new_v4().to_string();
                message.receive_count += 1;
                message.visible_at = now + self.visibility_timeout;
                message.receipt = Some(receipt.clone());
                received.push(ReceivedMessage {
                    message_id: message.id.clone(),
                    receipt,
                    body: message.body.clone(),
                    receive_count: message.receive_count,
                });
                i += 1;
            }
        }
        for message in exhausted {
            self.to_dead_letter(message, "maximum receive count exceeded");
        }
        Ok(received)
    }

    async fn ack(&self, receipt: &str) -> Result<(), DispatchError> {
        self.take_by_receipt(receipt).map(|_| ())
    }

    async fn release(&self, receipt: &str) -> Result<(), DispatchError> {
        let mut messages = self.messages.lock();
        let message = messages
            .iter_mut()
            .find(|m| m.receipt.as_deref() == Some(receipt))
            .ok_or_else(|| self.stale(receipt))?;
        message.receipt = None;
        message.visible_at = Instant::now();
        Ok(())
    }

    async fn dead_letter(&self, receipt: &str, reason: &str) -> Result<(), DispatchError> {
        let message = self.take_by_receipt(receipt)?;
        self.to_dead_letter(message, reason);
        Ok(())
    }
}
