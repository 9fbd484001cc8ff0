//! In-memory dead-letter queue.

use parking_lot::Mutex;

use crate::infra::dead_letter::{DeadLetter, DeadLetterQueue};

/// Simple in-memory dead-letter queue for development/testing.
#[derive(Default)]
pub struct InMemoryDeadLetterQueue {
    entries: Mutex<Vec<DeadLetter>>,
}

impl InMemoryDeadLetterQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Entries that came from `queue`, optionally since a timestamp.
    pub fn fetch(&self, queue: &str, since_ms: Option<u128>) -> Vec<DeadLetter> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.queue == queue)
            .filter(|e| since_ms.is_none_or(|s| e.dead_lettered_at_ms >= s))
            .cloned()
            .collect()
    }
}

impl DeadLetterQueue for InMemoryDeadLetterQueue {
    fn push(&self, entry: DeadLetter) {
        self.entries.lock().push(entry);
    }

    fn list(&self) -> Vec<DeadLetter> {
        self.entries.lock().clone()
    }

    fn take(&self, id: &str) -> Option<DeadLetter> {
        let mut entries = self.entries.lock();
        let position = entries.iter().position(|e| e.id == id)?;
        Some(entries.remove(position))
    }
}
