//! Infrastructure adapters for queues, dead letters, object stores and inventory.

pub mod dead_letter;
pub mod inventory;
pub mod queue;
pub mod store;

pub use dead_letter::{DeadLetter, DeadLetterQueue, InMemoryDeadLetterQueue};
pub use inventory::{FileInventory, InventorySource, StaticInventory, StoreInventory};
pub use queue::{InMemoryQueue, MessageQueue, QueueRegistry, ReceivedMessage};
pub use store::{FileSystemStore, InMemoryStore, ObjectStore, TemplateStoreClient};
