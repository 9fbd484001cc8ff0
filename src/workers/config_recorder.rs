//! Configuration-recorder worker: one task per account and region.
//!
//! The template carries a `DefaultConfiguration` describing the delivery channel and
//! recorder settings, and may carry per-account/region override blocks.

use serde_json::json;

use crate::core::fanout::FanOutStrategy;
use crate::core::registry::WorkerDefinition;
use crate::core::schema::{Constraint, FieldSpec, FieldType, ObjectSchema, PayloadSchema};

/// Registered worker name.
pub const NAME: &str = "ConfigRecorderWorker";

/// Accepted delivery frequencies.
pub const DELIVERY_FREQUENCIES: &[&str] = &[
    "One_Hour",
    "Three_Hours",
    "Six_Hours",
    "Twelve_Hours",
    "TwentyFour_Hours",
];

/// Registration entry.
#[must_use]
pub fn definition() -> WorkerDefinition {
    WorkerDefinition::new(NAME, FanOutStrategy::AccountRegion, schema())
}

/// Payload schema.
#[must_use]
pub fn schema() -> PayloadSchema {
    PayloadSchema::new(vec![]).with_configuration(configuration_schema())
}

fn configuration_schema() -> ObjectSchema {
    let delivery_channel = ObjectSchema::closed(vec![
        FieldSpec::required("BucketName", FieldType::String)
            .substitutable()
            .constrain(Constraint::Length { min: 3, max: 63 }),
        FieldSpec::required("S3DeliveryFrequency", FieldType::String)
            .constrain(Constraint::OneOf(DELIVERY_FREQUENCIES)),
        FieldSpec::optional("PreferredName", FieldType::String).with_default(json!("default")),
        FieldSpec::optional("BucketKeyPrefix", FieldType::String).substitutable(),
        FieldSpec::optional("S3KmsKeyArn", FieldType::String).substitutable(),
        FieldSpec::optional("SnsTopicArn", FieldType::String).substitutable(),
    ]);

    let record_everything = ObjectSchema::closed(vec![FieldSpec::required(
        "RecordGlobalsInTheseRegions",
        FieldType::StringList,
    )]);

    let recording_group = ObjectSchema::closed(vec![
        FieldSpec::optional("RecordEverything", FieldType::Object(record_everything)),
        FieldSpec::optional("RecordSpecificResources", FieldType::StringList),
        FieldSpec::optional("RecordEverythingExcept", FieldType::StringList),
    ])
    .exactly_one_of(&[
        "RecordEverything",
        "RecordSpecificResources",
        "RecordEverythingExcept",
    ]);

    let recorder = ObjectSchema::closed(vec![
        FieldSpec::required("ConfigRoleName", FieldType::String).substitutable(),
        FieldSpec::optional("RecordingEnabled", FieldType::Boolean).with_default(json!(false)),
        FieldSpec::required("RecordingGroup", FieldType::Object(recording_group)),
        FieldSpec::optional("PreferredName", FieldType::String).with_default(json!("default")),
    ]);

    ObjectSchema::closed(vec![
        FieldSpec::required("DeliveryChannelDetails", FieldType::Object(delivery_channel)),
        FieldSpec::required("RecorderConfiguration", FieldType::Object(recorder)),
        FieldSpec::required("RetentionPeriodInDays", FieldType::Integer)
            .constrain(Constraint::Range { min: 30, max: 2557 }),
    ])
}
