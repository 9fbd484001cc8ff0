//! Tests for audit sink

use fleet_dispatch::core::{build_audit_event, AuditAction, AuditSink, InMemoryAuditSink};

#[test]
fn test_in_memory_audit_sink() {
    let sink = InMemoryAuditSink::new(10);

    let event = build_audit_event(
        "RoleSyncWorker",
        Some("RoleSync/admins.yaml".to_string()),
        AuditAction::Enqueued,
        Some("12 tasks".to_string()),
    );

    sink.record(event.clone());
    assert_eq!(sink.events(), vec![event]);
    assert_eq!(sink.events_with(AuditAction::Enqueued).len(), 1);
    assert!(sink.events_with(AuditAction::Failed).is_empty());
}

#[test]
fn test_audit_sink_overflow() {
    let sink = InMemoryAuditSink::new(2);

    sink.record(build_audit_event("w1", None, AuditAction::Enumerated, None));
    sink.record(build_audit_event("w2", None, AuditAction::Rendered, None));
    sink.record(build_audit_event("w3", None, AuditAction::Enqueued, None));

    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].worker, "w2"); // First one popped
    assert_eq!(events[1].worker, "w3");
}

#[test]
fn test_build_audit_event() {
    let a = build_audit_event("w", None, AuditAction::DeadLettered, Some("overlap".into()));
    let b = build_audit_event("w", None, AuditAction::DeadLettered, None);
    assert_ne!(a.event_id, b.event_id);
    assert!(a.created_at_ms > 0);
    assert_eq!(a.action.to_string(), "dead_lettered");

    let json = serde_json::to_value(&a).unwrap();
    assert_eq!(json["action"], "dead_lettered");
}
