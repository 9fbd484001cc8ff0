//! Inventory generator worker: a single task that rebuilds the account inventory.

use serde_json::json;

use crate::core::fanout::FanOutStrategy;
use crate::core::registry::WorkerDefinition;
use crate::core::schema::{FieldSpec, FieldType, PayloadSchema};

/// Registered worker name.
pub const NAME: &str = "AccountIndexWorker";

/// Registration entry.
#[must_use]
pub fn definition() -> WorkerDefinition {
    WorkerDefinition::new(NAME, FanOutStrategy::Single, schema())
}

/// Payload schema.
#[must_use]
pub fn schema() -> PayloadSchema {
    PayloadSchema::new(vec![
        FieldSpec::required("AccountInventoryBucket", FieldType::String),
        FieldSpec::required("InventoryBucketRegion", FieldType::String),
        FieldSpec::optional("InventoryObjectPrefix", FieldType::String)
            .with_default(json!("accountIndex.json")),
    ])
}
