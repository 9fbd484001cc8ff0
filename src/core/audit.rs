//! Audit trail of dispatch decisions.

use std::collections::VecDeque;
use std::fmt;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::util::clock::now_ms;

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Phase 1 emitted a render job.
    Enumerated,
    /// Phase 2 produced tasks for a template.
    Rendered,
    /// Tasks were placed on a worker queue.
    Enqueued,
    /// A job or task failed.
    Failed,
    /// A message was moved to a dead-letter queue.
    DeadLettered,
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Enumerated => "enumerated",
            Self::Rendered => "rendered",
            Self::Enqueued => "enqueued",
            Self::Failed => "failed",
            Self::DeadLettered => "dead_lettered",
        };
        f.write_str(label)
    }
}

/// Audit event structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Event identifier.
    pub event_id: String,
    /// Worker name, or the queue name for queue-level events.
    pub worker: String,
    /// Template key, when known.
    pub template_key: Option<String>,
    /// Action taken.
    pub action: AuditAction,
    /// Timestamp milliseconds.
    pub created_at_ms: u128,
    /// Additional context (counts, error text).
    pub detail: Option<String>,
}

/// Audit sink abstraction.
pub trait AuditSink: Send + Sync {
    /// Record an audit event.
    fn record(&self, event: AuditEvent);
}

/// In-memory audit sink for testing and dev.
pub struct InMemoryAuditSink {
    events: Mutex<VecDeque<AuditEvent>>,
    max_events: usize,
}

impl InMemoryAuditSink {
    /// Create a new in-memory sink with a bounded buffer.
    #[must_use]
    pub fn new(max_events: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(max_events)),
            max_events,
        }
    }

    /// Retrieve a snapshot of stored events.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().iter().cloned().collect()
    }

    /// Events with the given action.
    pub fn events_with(&self, action: AuditAction) -> Vec<AuditEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.action == action)
            .cloned()
            .collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&self, event: AuditEvent) {
        let mut events = self.events.lock();
        if events.len() >= self.max_events {
            events.pop_front();
        }
        events.push_back(event);
    }
}

/// Sink that forwards events to `tracing` at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        tracing::info!(
            target: "fleet_dispatch::audit",
            event_id = %event.event_id,
            worker = %event.worker,
            template_key = event.template_key.as_deref().unwrap_or("-"),
            action = %event.action,
            detail = event.detail.as_deref().unwrap_or(""),
            "audit"
        );
    }
}

/// Helper to build an audit event with a fresh id and timestamp.
pub fn build_audit_event(
    worker: impl Into<String>,
    template_key: Option<String>,
    action: AuditAction,
    detail: Option<String>,
) -> AuditEvent {
    AuditEvent {
        event_id: Uuid::new_v4().to_string(),
        worker: worker.into(),
        template_key,
        action,
        created_at_ms: now_ms(),
        detail,
    }
}
