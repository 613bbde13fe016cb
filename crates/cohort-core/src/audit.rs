//! # Audit Sink
//!
//! Fire-and-forget notifications of repository activity. Recording an event
//! never blocks the calling operation and cannot fail it.

use crate::{Guid, Operation};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Severity of an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditSeverity {
    Information,
    Event,
    Decision,
    Action,
    Error,
    Security,
    Startup,
    Shutdown,
}

/// One audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub severity: AuditSeverity,
    /// Operation that produced the event, if any.
    pub operation: Option<Operation>,
    pub user_id: Option<String>,
    pub guid: Option<Guid>,
    pub message: String,
}

impl AuditEvent {
    #[must_use]
    pub fn new(severity: AuditSeverity, message: impl Into<String>) -> Self {
        Self {
            severity,
            operation: None,
            user_id: None,
            guid: None,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn for_operation(mut self, operation: Operation, user_id: &str) -> Self {
        self.operation = Some(operation);
        self.user_id = Some(user_id.to_string());
        self
    }

    #[must_use]
    pub fn with_guid(mut self, guid: &Guid) -> Self {
        self.guid = Some(guid.clone());
        self
    }
}

/// Receiver of audit events.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: &AuditEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullAuditSink;

impl AuditSink for NullAuditSink {
    fn record(&self, _event: &AuditEvent) {}
}

/// Keeps every event in memory, for inspection.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of all events recorded so far.
    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }

    /// Events recorded for one operation.
    #[must_use]
    pub fn events_for(&self, operation: Operation) -> Vec<AuditEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.operation == Some(operation))
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: &AuditEvent) {
        self.events.lock().push(event.clone());
    }
}
