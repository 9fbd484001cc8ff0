//! Tests for error types

use std::time::Duration;

use fleet_dispatch::core::{DispatchError, ValidationErrors};

#[test]
fn test_enqueue_failure_display() {
    let err = DispatchError::EnqueueFailure {
        queue: "role-sync".to_string(),
        reason: "throttled".to_string(),
    };
    assert_eq!(format!("{}", err), "enqueue to `role-sync` failed: throttled");
    assert_eq!(err.kind(), "enqueue_failure");
}

#[test]
fn test_schema_validation_display_lists_paths() {
    let mut errors = ValidationErrors::default();
    errors.add("IncludeAccounts.ByTags[0].Name", "is required");
    errors.add("TemplateName", "is required");
    let err = DispatchError::from(errors);
    assert_eq!(
        format!("{}", err),
        "schema validation failed: IncludeAccounts.ByTags[0].Name: is required; TemplateName: is required"
    );
}

#[test]
fn test_retryable_classification() {
    let retryable = [
        DispatchError::StoreUnavailable("down".into()),
        DispatchError::InventoryUnavailable("down".into()),
        DispatchError::EnqueueFailure {
            queue: "q".into(),
            reason: "r".into(),
        },
        DispatchError::BudgetExceeded(Duration::from_secs(1)),
        DispatchError::Backend("x".into()),
    ];
    for err in &retryable {
        assert!(err.is_retryable(), "{err}");
    }

    let permanent = [
        DispatchError::MalformedFilter("x".into()),
        DispatchError::SchemaValidation(ValidationErrors::single("", "bad")),
        DispatchError::TemplateNotFound("a.yaml".into()),
        DispatchError::UnknownWorker("w".into()),
        DispatchError::InvalidMessage("m".into()),
        DispatchError::Config("c".into()),
    ];
    for err in &permanent {
        assert!(!err.is_retryable(), "{err}");
    }
}
