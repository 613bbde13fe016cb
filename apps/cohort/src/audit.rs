//! # Audit Forwarding
//!
//! Sends repository audit events to the tracing subscriber.

use cohort_core::{AuditEvent, AuditSeverity, AuditSink};

/// Audit sink that logs every event under the `cohort::audit` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: &AuditEvent) {
        let operation = event.operation.map(|op| op.name()).unwrap_or("-");
        let user = event.user_id.as_deref().unwrap_or("-");
        let guid = event.guid.as_ref().map(|g| g.as_str()).unwrap_or("-");

        match event.severity {
            AuditSeverity::Error | AuditSeverity::Security => tracing::warn!(
                target: "cohort::audit",
                severity = ?event.severity,
                operation,
                user,
                guid,
                "{}",
                event.message
            ),
            AuditSeverity::Information => tracing::debug!(
                target: "cohort::audit",
                severity = ?event.severity,
                operation,
                user,
                guid,
                "{}",
                event.message
            ),
            _ => tracing::info!(
                target: "cohort::audit",
                severity = ?event.severity,
                operation,
                user,
                guid,
                "{}",
                event.message
            ),
        }
    }
}
