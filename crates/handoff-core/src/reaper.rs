//! Expiry reaper.
//!
//! Moves overdue pending tokens to `expired` in bounded batches. Each expiry
//! is its own conditional update, so any number of reapers may run against
//! one store, and a claim racing the sweep yields exactly one of
//! `claimed` / `expired`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use handoff_store::TokenStore;
use handoff_types::{ActorId, ReaperConfig, Refund, Result, TokenId, constants};
use serde::{Deserialize, Serialize};

use crate::{AuditTrail, Clock, Closure, closure_events};

/// Outcome of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Tokens moved to `expired`.
    pub expired: Vec<TokenId>,
    /// Stakes returned from expired escrow tokens.
    pub refunds: Vec<Refund>,
    /// `ExpireBatch` calls made.
    pub batches: usize,
}

impl SweepReport {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.expired.is_empty()
    }
}

pub struct ExpiryReaper {
    store: Arc<dyn TokenStore>,
    clock: Arc<dyn Clock>,
    audit: AuditTrail,
    batch_limit: usize,
    max_batches: usize,
}

impl ExpiryReaper {
    #[must_use]
    pub fn new(
        store: Arc<dyn TokenStore>,
        clock: Arc<dyn Clock>,
        audit: AuditTrail,
        config: &ReaperConfig,
    ) -> Self {
        Self {
            store,
            clock,
            audit,
            batch_limit: config.batch_limit.max(1),
            max_batches: config.max_batches_per_sweep.max(1),
        }
    }

    /// Sweep at the clock's current time.
    pub fn sweep(&self) -> Result<SweepReport> {
        self.sweep_at(self.clock.now())
    }

    /// Expire everything overdue at `now`, batch by batch, until a batch
    /// comes back short or the per-sweep batch cap is reached.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let reaper = ActorId::new(constants::REAPER_ACTOR);
        let mut report = SweepReport::default();

        while report.batches < self.max_batches {
            let batch = self.store.expire_batch(now, self.batch_limit)?;
            report.batches += 1;

            // Rows in `expired` have left the pending index; their events
            // must be recorded now or never.
            for token in &batch.expired {
                self.audit.record_all(&closure_events(token, &reaper, now));
                let closure = Closure::of(token);
                report.expired.push(token.id);
                report.refunds.extend(closure.refunds);
            }

            if let Some(err) = batch.error {
                tracing::warn!(
                    expired = report.expired.len(),
                    refunds = report.refunds.len(),
                    "sweep interrupted by store failure"
                );
                return Err(err.into());
            }
            if batch.scanned < self.batch_limit {
                break;
            }
        }

        if report.batches == self.max_batches {
            tracing::warn!(
                batches = report.batches,
                expired = report.expired.len(),
                "sweep hit batch cap, backlog remains"
            );
        }
        if !report.is_empty() {
            tracing::info!(
                expired = report.expired.len(),
                refunds = report.refunds.len(),
                batches = report.batches,
                "expiry sweep"
            );
        }
        Ok(report)
    }
}
