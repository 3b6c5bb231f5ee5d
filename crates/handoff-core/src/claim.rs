//! Claim processor.
//!
//! A claim is exactly one conditional update in the store. The processor
//! never reads the token first: the store decides, and a rejection is only
//! classified afterwards for the caller's benefit.
//!
//! Concurrent claims on one token yield one winner; every loser observes
//! `AlreadyClaimed`. There is no automatic retry. A caller that timed out
//! and re-submits will see `AlreadyClaimed` if its first attempt won.

use std::sync::Arc;

use handoff_store::{Swap, TokenStore};
use handoff_types::{
    ActorId, AuditEvent, AuditKind, HandoffError, Payload, Payout, Result, SettlementRule,
    TokenId, TokenView,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::{AuditTrail, Clock, Closure, FailedClaimMonitor, closure_events, compute_payout};

/// What a successful claim delivers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Redemption {
    /// The stored payload, byte-for-byte.
    Payload(Payload),
    /// Payout breakdown of a settled escrow token.
    Payout(Payout),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimReceipt {
    /// The token as written by the winning claim.
    pub token: TokenView,
    pub redemption: Redemption,
}

impl ClaimReceipt {
    /// Payload bytes, for plain tokens.
    #[must_use]
    pub fn payload(&self) -> Option<&Payload> {
        match &self.redemption {
            Redemption::Payload(p) => Some(p),
            Redemption::Payout(_) => None,
        }
    }

    #[must_use]
    pub fn payout(&self) -> Option<&Payout> {
        match &self.redemption {
            Redemption::Payout(p) => Some(p),
            Redemption::Payload(_) => None,
        }
    }
}

pub struct ClaimProcessor {
    store: Arc<dyn TokenStore>,
    clock: Arc<dyn Clock>,
    audit: AuditTrail,
    monitor: Mutex<FailedClaimMonitor>,
}

impl ClaimProcessor {
    #[must_use]
    pub fn new(
        store: Arc<dyn TokenStore>,
        clock: Arc<dyn Clock>,
        audit: AuditTrail,
        monitor: FailedClaimMonitor,
    ) -> Self {
        Self {
            store,
            clock,
            audit,
            monitor: Mutex::new(monitor),
        }
    }

    /// Redeem `token_id` for `claimant`.
    ///
    /// Plain tokens are claimed without a rule and deliver their payload.
    /// Escrow tokens require a `rule` and deliver its payout.
    pub fn claim(
        &self,
        token_id: &TokenId,
        claimant: ActorId,
        rule: Option<SettlementRule>,
    ) -> Result<ClaimReceipt> {
        if let Some(rule) = &rule {
            rule.validate()?;
        }
        let now = self.clock.now();

        let swap = self
            .store
            .try_claim(token_id, claimant.clone(), now, rule.is_some())
            .inspect_err(|e| {
                tracing::warn!(token = %token_id.short(), error = %e, "claim store call failed");
            })?;

        let token = match swap {
            Swap::Applied(token) => token,
            Swap::Rejected(rejection) => {
                let err = rejection.into_error(*token_id);
                self.on_rejected(token_id, claimant, &err, now);
                return Err(err);
            }
        };

        if !token.payload_intact() {
            tracing::error!(token = %token_id.short(), "stored payload does not match its digest");
            self.audit.record(
                &AuditEvent::new(AuditKind::ClaimSucceeded, *token_id, claimant, now)
                    .with_detail("payload_corrupted"),
            );
            return Err(HandoffError::PayloadCorrupted(*token_id));
        }

        let redemption = match (&token.escrow, rule) {
            (Some(escrow), Some(rule)) => Redemption::Payout(compute_payout(escrow, &rule)),
            // The store admits a rule only for escrow tokens and vice versa.
            _ => Redemption::Payload(token.payload.clone()),
        };

        tracing::info!(
            token = %token_id.short(),
            claimant = %claimant,
            escrow = token.escrow.is_some(),
            "token claimed"
        );
        self.audit
            .record(&AuditEvent::new(AuditKind::ClaimSucceeded, *token_id, claimant, now));

        Ok(ClaimReceipt {
            token: token.view(),
            redemption,
        })
    }

    fn on_rejected(
        &self,
        token_id: &TokenId,
        claimant: ActorId,
        err: &HandoffError,
        now: chrono::DateTime<chrono::Utc>,
    ) {
        tracing::debug!(
            token = %token_id.short(),
            claimant = %claimant,
            kind = err.kind(),
            "claim rejected"
        );
        self.audit.record(
            &AuditEvent::new(AuditKind::ClaimRejected, *token_id, claimant.clone(), now)
                .with_detail(err.kind()),
        );
        let flagged = self.monitor.lock().record_failure(*token_id, now);
        if let Some(signal) = flagged {
            self.audit.record(
                &AuditEvent::new(AuditKind::ClaimsFlagged, *token_id, claimant, now).with_detail(
                    format!("{} failures in {}s", signal.failures, signal.window.num_seconds()),
                ),
            );
        }
    }

    /// Operator cancellation of a pending token. Escrow stakes already
    /// contributed are refunded.
    pub fn cancel(&self, token_id: &TokenId, operator: ActorId) -> Result<Closure> {
        let now = self.clock.now();
        match self.store.cancel(token_id, operator.clone(), now)? {
            Swap::Applied(token) => {
                tracing::info!(token = %token_id.short(), operator = %operator, "token cancelled");
                self.audit.record_all(&closure_events(&token, &operator, now));
                Ok(Closure::of(&token))
            }
            Swap::Rejected(rejection) => {
                let err = rejection.into_error(*token_id);
                tracing::debug!(token = %token_id.short(), kind = err.kind(), "cancel rejected");
                Err(err)
            }
        }
    }

    /// Failed claims currently counted for `token_id`.
    pub fn recent_failures(&self, token_id: &TokenId) -> usize {
        self.monitor.lock().failures(token_id)
    }

    /// Drop failure windows that have gone quiet.
    pub fn prune_monitor(&self) {
        let now = self.clock.now();
        self.monitor.lock().prune(now);
    }
}
