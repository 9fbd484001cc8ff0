//! Tests for dead-letter storage

use fleet_dispatch::infra::{DeadLetter, DeadLetterQueue, InMemoryDeadLetterQueue};

fn entry(id: &str, queue: &str, at: u128) -> DeadLetter {
    DeadLetter {
        id: id.to_string(),
        queue: queue.to_string(),
        body: format!("{{\"workerName\":\"w\",\"templateKey\":\"{id}.yaml\"}}"),
        receive_count: 4,
        reason: "maximum receive count exceeded".to_string(),
        dead_lettered_at_ms: at,
    }
}

#[test]
fn test_push_and_list() {
    let dlq = InMemoryDeadLetterQueue::new();
    assert!(dlq.is_empty());
    dlq.push(entry("a", "render-jobs", 1));
    dlq.push(entry("b", "role-sync-tasks", 2));
    assert_eq!(dlq.len(), 2);
    assert_eq!(dlq.list()[0].id, "a");
}

#[test]
fn test_fetch_by_queue_and_time() {
    let dlq = InMemoryDeadLetterQueue::new();
    dlq.push(entry("a", "render-jobs", 100));
    dlq.push(entry("b", "render-jobs", 200));
    dlq.push(entry("c", "role-sync-tasks", 300));

    assert_eq!(dlq.fetch("render-jobs", None).len(), 2);
    let recent = dlq.fetch("render-jobs", Some(150));
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].id, "b");
}

#[test]
fn test_take_removes_entry() {
    let dlq = InMemoryDeadLetterQueue::new();
    dlq.push(entry("a", "render-jobs", 1));
    assert_eq!(dlq.take("a").map(|e| e.receive_count), Some(4));
    assert!(dlq.take("a").is_none());
    assert!(dlq.is_empty());
}
