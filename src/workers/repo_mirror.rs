//! Repository mirror worker: a single task per template.

use serde_json::json;

use crate::core::fanout::FanOutStrategy;
use crate::core::registry::WorkerDefinition;
use crate::core::schema::{FieldSpec, FieldType, PayloadSchema};

/// Registered worker name.
pub const NAME: &str = "RepoMirrorWorker";

/// Registration entry.
#[must_use]
pub fn definition() -> WorkerDefinition {
    WorkerDefinition::new(NAME, FanOutStrategy::Single, schema())
}

/// Payload schema.
#[must_use]
pub fn schema() -> PayloadSchema {
    PayloadSchema::new(vec![
        FieldSpec::required("Organization", FieldType::String),
        FieldSpec::required("Repository", FieldType::String),
        FieldSpec::required("BranchName", FieldType::String),
        FieldSpec::required("AppId", FieldType::String),
        FieldSpec::required("InstallationId", FieldType::String),
        FieldSpec::required("BucketName", FieldType::String),
        FieldSpec::required("BucketRegion", FieldType::String),
        FieldSpec::required("ExtractZipContents", FieldType::Boolean),
        FieldSpec::optional("IncludeRepoPaths", FieldType::StringList).with_default(json!(["^.+$"])),
        FieldSpec::optional("ExcludeRepoPaths", FieldType::StringList).with_default(json!([])),
        FieldSpec::optional("KeyPrefix", FieldType::String),
        FieldSpec::optional("DeleteMissingFiles", FieldType::Boolean).with_default(json!(false)),
    ])
}
