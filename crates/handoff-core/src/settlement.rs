//! Escrow settlement: stake collection, payout computation, and refunds.
//!
//! Stakes are appended through the store's conditional update, so the
//! `Collecting → Funded` flip happens in the same step as the last stake.
//! Payouts are pure functions of the stake set and the settlement rule and
//! always sum exactly to the pooled stake per currency.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use handoff_store::{Swap, TokenStore};
use handoff_types::{
    ActorId, AuditEvent, AuditKind, Escrow, HandoffError, Payout, PayoutLine, Refund, Result,
    SettlementRule, Stake, Token, TokenId, TokenStatus, TokenView,
};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::{AuditTrail, Clock};

/// Result of an expiry or cancellation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Closure {
    pub token: TokenView,
    /// One entry per contributed stake; empty for plain tokens.
    pub refunds: Vec<Refund>,
}

impl Closure {
    #[must_use]
    pub fn of(token: &Token) -> Self {
        Self {
            token: token.view(),
            refunds: token.escrow.as_ref().map(Escrow::refunds).unwrap_or_default(),
        }
    }
}

/// Audit events for a token that just moved to `expired` or `cancelled`.
///
/// Escrow tokens with contributed stakes produce one `StakeRefunded` event
/// per stake instead of the generic event. Participants who never staked
/// get nothing.
#[must_use]
pub fn closure_events(token: &Token, actor: &ActorId, at: DateTime<Utc>) -> Vec<AuditEvent> {
    let (kind, detail) = match token.status {
        TokenStatus::Cancelled => (AuditKind::Cancelled, "cancelled"),
        _ => (AuditKind::Expired, "expired"),
    };
    let refunds = token.escrow.as_ref().map(Escrow::refunds).unwrap_or_default();
    if refunds.is_empty() {
        return vec![AuditEvent::new(kind, token.id, actor.clone(), at)];
    }
    refunds
        .into_iter()
        .map(|refund| AuditEvent::refund(token.id, actor.clone(), refund, at).with_detail(detail))
        .collect()
}

/// Payout breakdown for a funded escrow under `rule`.
///
/// `rule` must already have passed [`SettlementRule::validate`]. Currencies
/// are processed in sorted order; within `EvenSplit` each share is
/// truncated to the pool's scale and the remainder goes to the first winner.
#[must_use]
pub fn compute_payout(escrow: &Escrow, rule: &SettlementRule) -> Payout {
    let pool = escrow.pooled();
    let mut lines = Vec::new();

    match rule {
        SettlementRule::WinnerTakesAll { winner } => {
            for (currency, total) in &pool {
                lines.push(PayoutLine {
                    recipient: winner.clone(),
                    amount: *total,
                    currency: currency.clone(),
                });
            }
        }
        SettlementRule::EvenSplit { winners } => {
            let n = Decimal::from(winners.len());
            for (currency, total) in &pool {
                let share = (*total / n).round_dp_with_strategy(total.scale(), RoundingStrategy::ToZero);
                let remainder = *total - share * n;
                for (i, winner) in winners.iter().enumerate() {
                    let amount = if i == 0 { share + remainder } else { share };
                    if amount.is_zero() {
                        continue;
                    }
                    lines.push(PayoutLine {
                        recipient: winner.clone(),
                        amount,
                        currency: currency.clone(),
                    });
                }
            }
        }
        SettlementRule::Refund => {
            lines.extend(escrow.refunds().into_iter().map(|r| PayoutLine {
                recipient: r.participant,
                amount: r.amount,
                currency: r.currency,
            }));
        }
    }

    Payout { lines, pool }
}

/// Collects stakes on escrow tokens.
pub struct EscrowSettlement {
    store: Arc<dyn TokenStore>,
    clock: Arc<dyn Clock>,
    audit: AuditTrail,
}

impl EscrowSettlement {
    #[must_use]
    pub fn new(store: Arc<dyn TokenStore>, clock: Arc<dyn Clock>, audit: AuditTrail) -> Self {
        Self { store, clock, audit }
    }

    /// Append `participant`'s stake.
    ///
    /// Succeeds only while the token is pending, unexpired and collecting,
    /// the participant is declared and has not staked, and amount and
    /// currency equal the requirement.
    pub fn contribute(
        &self,
        token_id: &TokenId,
        participant: ActorId,
        amount: Decimal,
        currency: impl Into<String>,
    ) -> Result<TokenView> {
        let currency = currency.into();
        if amount <= Decimal::ZERO {
            return Err(HandoffError::InvalidStake {
                reason: format!("stake amount must be positive, got {amount}"),
            });
        }
        if currency.trim().is_empty() {
            return Err(HandoffError::InvalidStake {
                reason: "stake currency is empty".into(),
            });
        }

        let now = self.clock.now();
        let stake = Stake {
            participant: participant.clone(),
            amount,
            currency,
            staked_at: now,
        };

        match self.store.contribute_stake(token_id, stake)? {
            Swap::Applied(token) => {
                let phase = token.escrow.as_ref().map(|e| e.phase);
                tracing::info!(
                    token = %token_id.short(),
                    participant = %participant,
                    %amount,
                    ?phase,
                    "stake contributed"
                );
                self.audit.record(
                    &AuditEvent::new(AuditKind::StakeContributed, *token_id, participant, now)
                        .with_detail(format!("{amount}")),
                );
                Ok(token.view())
            }
            Swap::Rejected(rejection) => {
                let err = rejection.into_error(*token_id);
                tracing::debug!(
                    token = %token_id.short(),
                    participant = %participant,
                    kind = err.kind(),
                    "stake rejected"
                );
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use handoff_store::MemoryTokenStore;
    use handoff_types::StakeRequirement;

    use super::*;
    use crate::{ManualClock, MemoryAuditSink};

    fn funded(amounts: &[(&str, i64, u32, &str)]) -> Escrow {
        let reqs = amounts
            .iter()
            .map(|(who, m, s, cur)| StakeRequirement::new(*who, Decimal::new(*m, *s), *cur))
            .collect();
        let mut escrow = Escrow::open(reqs, 16).unwrap();
        for (who, m, s, cur) in amounts {
            escrow.record_stake(Stake {
                participant: ActorId::new(*who),
                amount: Decimal::new(*m, *s),
                currency: (*cur).into(),
                staked_at: Utc::now(),
            });
        }
        escrow
    }

    #[test]
    fn winner_takes_all_per_currency() {
        let escrow = funded(&[("alice", 10, 0, "GOLD"), ("bob", 10, 0, "GOLD"), ("carol", 3, 0, "GEMS")]);
        let payout = compute_payout(
            &escrow,
            &SettlementRule::WinnerTakesAll {
                winner: ActorId::new("alice"),
            },
        );
        assert_eq!(payout.paid_to(&ActorId::new("alice"), "GOLD"), Decimal::new(20, 0));
        assert_eq!(payout.paid_to(&ActorId::new("alice"), "GEMS"), Decimal::new(3, 0));
        assert_eq!(payout.lines.len(), 2);
        assert_eq!(payout.lines[0].currency, "GEMS", "currencies in sorted order");
    }

    #[test]
    fn even_split_remainder_to_first_winner() {
        let escrow = funded(&[("a", 100, 2, "USD"), ("b", 100, 2, "USD"), ("c", 0_01, 2, "USD")]);
        // pool = 2.01 USD over three winners: 0.67 each, exact.
        let winners = vec![ActorId::new("a"), ActorId::new("b"), ActorId::new("c")];
        let payout = compute_payout(&escrow, &SettlementRule::EvenSplit { winners: winners.clone() });
        assert_eq!(payout.total_for("USD"), Decimal::new(201, 2));
        assert_eq!(payout.paid_to(&winners[1], "USD"), Decimal::new(67, 2));

        let escrow = funded(&[("a", 1, 0, "GOLD"), ("b", 1, 0, "GOLD")]);
        let winners = vec![ActorId::new("a"), ActorId::new("b"), ActorId::new("c")];
        let payout = compute_payout(&escrow, &SettlementRule::EvenSplit { winners: winners.clone() });
        // 2 GOLD at scale 0 over three: shares of 0, remainder 2 to the first.
        assert_eq!(payout.paid_to(&winners[0], "GOLD"), Decimal::new(2, 0));
        assert_eq!(payout.total_for("GOLD"), Decimal::new(2, 0));
        assert_eq!(payout.lines.len(), 1);
    }

    #[test]
    fn refund_rule_returns_each_stake() {
        let escrow = funded(&[("alice", 7, 0, "GOLD"), ("bob", 9, 0, "GOLD")]);
        let payout = compute_payout(&escrow, &SettlementRule::Refund);
        assert_eq!(payout.paid_to(&ActorId::new("alice"), "GOLD"), Decimal::new(7, 0));
        assert_eq!(payout.paid_to(&ActorId::new("bob"), "GOLD"), Decimal::new(9, 0));
    }

    #[test]
    fn closure_events_refund_only_contributors() {
        let now = Utc::now();
        let mut token = Token::dummy_at(b"wager", now, Duration::minutes(1));
        let mut escrow = Escrow::open(
            vec![
                StakeRequirement::new("alice", Decimal::ONE, "GOLD"),
                StakeRequirement::new("bob", Decimal::ONE, "GOLD"),
            ],
            4,
        )
        .unwrap();
        escrow.record_stake(Stake {
            participant: ActorId::new("alice"),
            amount: Decimal::ONE,
            currency: "GOLD".into(),
            staked_at: now,
        });
        token.escrow = Some(escrow);
        token.status = TokenStatus::Expired;

        let events = closure_events(&token, &ActorId::new("reaper"), now);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, AuditKind::StakeRefunded);
        assert_eq!(
            events[0].refund.as_ref().map(|r| r.participant.clone()),
            Some(ActorId::new("alice"))
        );

        let plain = Token::dummy(b"plain");
        let events = closure_events(&plain, &ActorId::new("ops"), now);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, AuditKind::Expired);
    }

    #[test]
    fn contribute_validates_before_store() {
        let store = Arc::new(MemoryTokenStore::new());
        store.set_unavailable(true);
        let settlement = EscrowSettlement::new(
            store,
            Arc::new(ManualClock::new(Utc::now())),
            AuditTrail::new(),
        );
        let id = TokenId::from_bytes([1u8; 32]);
        let err = settlement
            .contribute(&id, ActorId::new("alice"), Decimal::ZERO, "GOLD")
            .unwrap_err();
        assert!(matches!(err, HandoffError::InvalidStake { .. }));
        let err = settlement
            .contribute(&id, ActorId::new("alice"), Decimal::ONE, "  ")
            .unwrap_err();
        assert!(matches!(err, HandoffError::InvalidStake { .. }));
    }

    #[test]
    fn contribute_records_audit() {
        let now = Utc::now();
        let mut token = Token::dummy_at(b"wager", now, Duration::minutes(1));
        token.escrow = Some(
            Escrow::open(vec![StakeRequirement::new("alice", Decimal::TEN, "GOLD")], 4).unwrap(),
        );
        let store = Arc::new(MemoryTokenStore::new());
        store.insert(token.clone()).unwrap();
        let sink = Arc::new(MemoryAuditSink::new());
        let settlement = EscrowSettlement::new(
            store,
            Arc::new(ManualClock::new(now)),
            AuditTrail::new().with_sink(sink.clone()),
        );

        let view = settlement
            .contribute(&token.id, ActorId::new("alice"), Decimal::TEN, "GOLD")
            .unwrap();
        assert_eq!(view.escrow_phase, Some(handoff_types::EscrowPhase::Funded));
        assert_eq!(sink.count(&token.id, AuditKind::StakeContributed), 1);

        let err = settlement
            .contribute(&token.id, ActorId::new("mallory"), Decimal::TEN, "GOLD")
            .unwrap_err();
        assert!(matches!(err, HandoffError::NotAParticipant { .. }));
    }
}
