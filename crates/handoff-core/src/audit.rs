//! Audit sinks and the best-effort audit trail.
//!
//! Audit writes never block or fail a lifecycle operation. [`AuditTrail`]
//! fans each event out to its sinks and logs (then drops) any sink error.

use std::sync::Arc;

use handoff_types::{AuditEvent, AuditKind, TokenId};
use parking_lot::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit sink is closed")]
    Closed,

    #[error("audit sink is full")]
    Full,

    #[error("audit sink failed: {0}")]
    Backend(String),
}

/// Destination for audit events.
pub trait AuditSink: Send + Sync {
    /// Append one event. Must not block for long.
    fn append(&self, event: &AuditEvent) -> Result<(), AuditError>;
}

/// Emits every event as a structured `tracing` record under the
/// `handoff::audit` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn append(&self, event: &AuditEvent) -> Result<(), AuditError> {
        tracing::info!(
            target: "handoff::audit",
            event_id = %event.id,
            kind = %event.kind,
            token = %event.token_id,
            actor = %event.actor,
            detail = event.detail.as_deref().unwrap_or(""),
            refund = ?event.refund,
            at = %event.at,
            "audit"
        );
        Ok(())
    }
}

/// In-process sink that keeps every event, queryable by token.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }

    pub fn for_token(&self, token_id: &TokenId) -> Vec<AuditEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| &e.token_id == token_id)
            .cloned()
            .collect()
    }

    pub fn count(&self, token_id: &TokenId, kind: AuditKind) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| &e.token_id == token_id && e.kind == kind)
            .count()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl AuditSink for MemoryAuditSink {
    fn append(&self, event: &AuditEvent) -> Result<(), AuditError> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}

/// Fans events out to every attached sink.
#[derive(Default, Clone)]
pub struct AuditTrail {
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl AuditTrail {
    /// A trail with no sinks; events are dropped.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Best-effort append. Sink failures are logged and swallowed.
    pub fn record(&self, event: &AuditEvent) {
        for sink in &self.sinks {
            if let Err(e) = sink.append(event) {
                tracing::warn!(
                    kind = %event.kind,
                    token = %event.token_id.short(),
                    error = %e,
                    "audit write failed, event dropped"
                );
            }
        }
    }

    pub fn record_all(&self, events: &[AuditEvent]) {
        for event in events {
            self.record(event);
        }
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }
}

impl std::fmt::Debug for AuditTrail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditTrail")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use handoff_types::ActorId;

    use super::*;

    struct BrokenSink;

    impl AuditSink for BrokenSink {
        fn append(&self, _event: &AuditEvent) -> Result<(), AuditError> {
            Err(AuditError::Backend("disk full".into()))
        }
    }

    fn event(kind: AuditKind, byte: u8) -> AuditEvent {
        AuditEvent::new(
            kind,
            TokenId::from_bytes([byte; 32]),
            ActorId::new("ServerA"),
            Utc::now(),
        )
    }

    #[test]
    fn memory_sink_queries() {
        let sink = MemoryAuditSink::new();
        sink.append(&event(AuditKind::Minted, 1)).unwrap();
        sink.append(&event(AuditKind::ClaimSucceeded, 1)).unwrap();
        sink.append(&event(AuditKind::Minted, 2)).unwrap();

        let id = TokenId::from_bytes([1u8; 32]);
        assert_eq!(sink.len(), 3);
        assert_eq!(sink.for_token(&id).len(), 2);
        assert_eq!(sink.count(&id, AuditKind::Minted), 1);
    }

    #[test]
    fn failing_sink_does_not_stop_others() {
        let memory = Arc::new(MemoryAuditSink::new());
        let trail = AuditTrail::new()
            .with_sink(Arc::new(BrokenSink))
            .with_sink(memory.clone());
        trail.record(&event(AuditKind::Expired, 3));
        assert_eq!(memory.len(), 1);
        assert_eq!(trail.sink_count(), 2);
    }

    #[test]
    fn tracing_sink_never_fails() {
        assert!(TracingAuditSink.append(&event(AuditKind::Cancelled, 4)).is_ok());
    }
}
