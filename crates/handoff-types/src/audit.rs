//! Audit event types for the Handoff audit trail.
//!
//! Every mint, claim attempt (won or lost), stake contribution, expiry,
//! cancellation, per-stake refund, and failed-claim monitor trip produces
//! one [`AuditEvent`]. Events
//! are append-only; they back wager dispute resolution and intrusion
//! detection (repeated failed claims on one token).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ActorId, AuditEventId, Refund, TokenId};

/// The kind of action an audit event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    /// A token was durably inserted.
    Minted,
    /// A mint was answered from an existing idempotency key.
    MintReplayed,
    /// A claim won the conditional update.
    ClaimSucceeded,
    /// A claim attempt was rejected (detail carries the error kind).
    ClaimRejected,
    /// A participant's stake was appended to an escrow token.
    StakeContributed,
    /// The reaper expired a plain token (or an escrow token with no stakes).
    Expired,
    /// An operator cancelled a token.
    Cancelled,
    /// One contributed stake returned after expiry or cancellation.
    StakeRefunded,
    /// Failed claims on one token crossed the monitor threshold.
    ClaimsFlagged,
}

impl std::fmt::Display for AuditKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Minted => write!(f, "MINTED"),
            Self::MintReplayed => write!(f, "MINT_REPLAYED"),
            Self::ClaimSucceeded => write!(f, "CLAIM_SUCCEEDED"),
            Self::ClaimRejected => write!(f, "CLAIM_REJECTED"),
            Self::StakeContributed => write!(f, "STAKE_CONTRIBUTED"),
            Self::Expired => write!(f, "EXPIRED"),
            Self::Cancelled => write!(f, "CANCELLED"),
            Self::StakeRefunded => write!(f, "STAKE_REFUNDED"),
            Self::ClaimsFlagged => write!(f, "CLAIMS_FLAGGED"),
        }
    }
}

/// One append-only audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: AuditEventId,
    pub kind: AuditKind,
    pub token_id: TokenId,
    /// Who caused the event (issuer, claimant, participant, operator, reaper).
    pub actor: ActorId,
    /// Rejection kind for failed attempts, free-form context otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// The refunded stake, for `StakeRefunded` events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refund: Option<Refund>,
    pub at: DateTime<Utc>,
}

impl AuditEvent {
    #[must_use]
    pub fn new(kind: AuditKind, token_id: TokenId, actor: ActorId, at: DateTime<Utc>) -> Self {
        Self {
            id: AuditEventId::new(),
            kind,
            token_id,
            actor,
            detail: None,
            refund: None,
            at,
        }
    }

    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// A `StakeRefunded` event paying `refund` back to its contributor.
    #[must_use]
    pub fn refund(token_id: TokenId, actor: ActorId, refund: Refund, at: DateTime<Utc>) -> Self {
        Self {
            refund: Some(refund),
            ..Self::new(AuditKind::StakeRefunded, token_id, actor, at)
        }
    }

    /// `true` for records of a rejected claim attempt.
    #[must_use]
    pub fn is_failed_claim(&self) -> bool {
        self.kind == AuditKind::ClaimRejected
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    #[test]
    fn audit_kind_display() {
        assert_eq!(format!("{}", AuditKind::ClaimSucceeded), "CLAIM_SUCCEEDED");
        assert_eq!(format!("{}", AuditKind::StakeRefunded), "STAKE_REFUNDED");
        assert_eq!(format!("{}", AuditKind::ClaimsFlagged), "CLAIMS_FLAGGED");
    }

    #[test]
    fn refund_event_carries_stake() {
        let refund = Refund {
            participant: ActorId::new("alice"),
            amount: Decimal::new(25, 0),
            currency: "GOLD".into(),
        };
        let event = AuditEvent::refund(
            TokenId::from_bytes([4u8; 32]),
            ActorId::new("reaper"),
            refund.clone(),
            Utc::now(),
        );
        assert_eq!(event.kind, AuditKind::StakeRefunded);
        assert_eq!(event.refund, Some(refund));
        assert!(!event.is_failed_claim());
    }

    #[test]
    fn serde_roundtrip_skips_empty_fields() {
        let event = AuditEvent::new(
            AuditKind::ClaimRejected,
            TokenId::from_bytes([5u8; 32]),
            ActorId::new("ServerC"),
            Utc::now(),
        )
        .with_detail("already_claimed");
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"kind\":\"claim_rejected\""));
        assert!(!json.contains("refund"));
        let back: AuditEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, back);
        assert!(back.is_failed_claim());
    }
}
