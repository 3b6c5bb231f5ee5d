//! Audit sink backed by a bounded tokio channel.
//!
//! `append` uses `try_send`, so a slow consumer costs dropped audit events
//! (logged by the trail), never blocked claims.

use handoff_core::{AuditError, AuditSink};
use handoff_types::AuditEvent;
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub struct ChannelAuditSink {
    tx: mpsc::Sender<AuditEvent>,
}

impl ChannelAuditSink {
    /// A sink and the receiver the embedding application drains.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<AuditEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl AuditSink for ChannelAuditSink {
    fn append(&self, event: &AuditEvent) -> Result<(), AuditError> {
        self.tx.try_send(event.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => AuditError::Full,
            mpsc::error::TrySendError::Closed(_) => AuditError::Closed,
        })
    }
}
