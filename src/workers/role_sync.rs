//! Role synchronization worker: one task per account.

use serde_json::json;

use crate::core::fanout::FanOutStrategy;
use crate::core::registry::WorkerDefinition;
use crate::core::schema::{Constraint, FieldSpec, FieldType, ObjectSchema, PayloadSchema};

/// Registered worker name.
pub const NAME: &str = "RoleSyncWorker";

/// Registration entry.
#[must_use]
pub fn definition() -> WorkerDefinition {
    WorkerDefinition::new(NAME, FanOutStrategy::Account, schema())
}

/// Payload schema.
#[must_use]
pub fn schema() -> PayloadSchema {
    let variable = ObjectSchema::closed(vec![
        FieldSpec::required("Key", FieldType::String).constrain(Constraint::Length { min: 1, max: 128 }),
        FieldSpec::required("Value", FieldType::String)
            .substitutable()
            .constrain(Constraint::Length { min: 1, max: 1024 }),
    ]);
    PayloadSchema::new(vec![
        FieldSpec::required("RoleTemplate", FieldType::Any),
        FieldSpec::optional("RoleVariables", FieldType::ObjectList(variable)).with_default(json!([])),
    ])
}
