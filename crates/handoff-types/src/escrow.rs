//! Escrow (multi-party wager) types.
//!
//! An escrow token declares the stakes it needs at mint time. While any
//! declared participant has not contributed, the token sits in the
//! `Collecting` sub-state of `pending` and cannot be claimed.
//!
//! ```text
//!   pending ┌────────────┐  last stake   ┌────────┐  claim(rule)
//!           │ COLLECTING ├──────────────▶│ FUNDED ├─────────────▶ claimed
//!           └─────┬──────┘               └───┬────┘
//!                 │ expire / cancel          │ expire / cancel
//!                 ▼                          ▼
//!        one refund per contributed stake (never for absent participants)
//! ```

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{ActorId, HandoffError, Rejection, Result};

/// Currency or asset code of a stake (e.g. "GOLD", "USD").
pub type Currency = String;

/// A stake a participant must contribute before the token becomes claimable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeRequirement {
    pub participant: ActorId,
    pub amount: Decimal,
    pub currency: Currency,
}

impl StakeRequirement {
    #[must_use]
    pub fn new(participant: impl Into<String>, amount: Decimal, currency: impl Into<String>) -> Self {
        Self {
            participant: ActorId::new(participant),
            amount,
            currency: currency.into(),
        }
    }
}

/// A contributed stake. Immutable once appended to the stake set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stake {
    pub participant: ActorId,
    pub amount: Decimal,
    pub currency: Currency,
    pub staked_at: DateTime<Utc>,
}

/// Collecting/funded sub-state of a pending escrow token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EscrowPhase {
    /// At least one declared participant has not staked yet.
    Collecting,
    /// Every declared participant has staked. Claimable.
    Funded,
}

impl std::fmt::Display for EscrowPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Collecting => write!(f, "COLLECTING"),
            Self::Funded => write!(f, "FUNDED"),
        }
    }
}

/// Escrow state attached to a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Escrow {
    /// Declared stakes, in declaration order.
    pub requirements: Vec<StakeRequirement>,
    /// Contributed stakes, in contribution order.
    pub stakes: Vec<Stake>,
    pub phase: EscrowPhase,
}

impl Escrow {
    /// Validate declared requirements and open an escrow in `Collecting`.
    ///
    /// # Errors
    /// Returns `InvalidStake` for an empty or oversized participant list,
    /// duplicate participants, non-positive amounts, or blank currencies.
    pub fn open(requirements: Vec<StakeRequirement>, max_participants: usize) -> Result<Self> {
        if requirements.is_empty() {
            return Err(HandoffError::InvalidStake {
                reason: "escrow needs at least one participant".into(),
            });
        }
        if requirements.len() > max_participants {
            return Err(HandoffError::InvalidStake {
                reason: format!(
                    "{} participants exceeds limit of {max_participants}",
                    requirements.len()
                ),
            });
        }
        let mut seen = HashSet::with_capacity(requirements.len());
        for req in &requirements {
            if req.participant.as_str().is_empty() {
                return Err(HandoffError::InvalidStake {
                    reason: "participant id is empty".into(),
                });
            }
            if !seen.insert(&req.participant) {
                return Err(HandoffError::InvalidStake {
                    reason: format!("participant {} declared twice", req.participant),
                });
            }
            if req.amount <= Decimal::ZERO {
                return Err(HandoffError::InvalidStake {
                    reason: format!("stake for {} must be positive, got {}", req.participant, req.amount),
                });
            }
            if req.currency.trim().is_empty() {
                return Err(HandoffError::InvalidStake {
                    reason: format!("stake for {} has no currency", req.participant),
                });
            }
        }
        Ok(Self {
            requirements,
            stakes: Vec::new(),
            phase: EscrowPhase::Collecting,
        })
    }

    #[must_use]
    pub fn is_funded(&self) -> bool {
        self.phase == EscrowPhase::Funded
    }

    /// Declared participants that have not staked yet.
    #[must_use]
    pub fn outstanding(&self) -> Vec<&ActorId> {
        self.requirements
            .iter()
            .map(|r| &r.participant)
            .filter(|p| !self.has_staked(p))
            .collect()
    }

    #[must_use]
    pub fn requirement_for(&self, participant: &ActorId) -> Option<&StakeRequirement> {
        self.requirements.iter().find(|r| &r.participant == participant)
    }

    #[must_use]
    pub fn has_staked(&self, participant: &ActorId) -> bool {
        self.stakes.iter().any(|s| &s.participant == participant)
    }

    /// Why `stake` cannot be appended, or `None` if it can.
    #[must_use]
    pub fn stake_rejection(&self, stake: &Stake) -> Option<Rejection> {
        let Some(req) = self.requirement_for(&stake.participant) else {
            return Some(Rejection::NotAParticipant(stake.participant.clone()));
        };
        if self.has_staked(&stake.participant) {
            return Some(Rejection::AlreadyStaked(stake.participant.clone()));
        }
        if req.currency != stake.currency || req.amount != stake.amount {
            return Some(Rejection::StakeMismatch {
                reason: format!(
                    "{} must stake {} {}, offered {} {}",
                    stake.participant, req.amount, req.currency, stake.amount, stake.currency
                ),
            });
        }
        None
    }

    /// Append an admitted stake; the last declared stake flips the phase to
    /// `Funded`. Callers must have checked [`Escrow::stake_rejection`].
    pub fn record_stake(&mut self, stake: Stake) {
        self.stakes.push(stake);
        if self.outstanding().is_empty() {
            self.phase = EscrowPhase::Funded;
        }
    }

    /// Pooled stake per currency (sorted for deterministic iteration).
    #[must_use]
    pub fn pooled(&self) -> BTreeMap<Currency, Decimal> {
        let mut pool = BTreeMap::new();
        for stake in &self.stakes {
            *pool.entry(stake.currency.clone()).or_insert(Decimal::ZERO) += stake.amount;
        }
        pool
    }

    /// One refund per contributed stake, in contribution order.
    #[must_use]
    pub fn refunds(&self) -> Vec<Refund> {
        self.stakes
            .iter()
            .map(|s| Refund {
                participant: s.participant.clone(),
                amount: s.amount,
                currency: s.currency.clone(),
            })
            .collect()
    }
}

/// A stake returned to its contributor after expiry or cancellation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Refund {
    pub participant: ActorId,
    pub amount: Decimal,
    pub currency: Currency,
}

/// Settlement rule supplied by the claimant of an escrow token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum SettlementRule {
    /// The whole pool, per currency, goes to `winner`.
    WinnerTakesAll { winner: ActorId },
    /// The pool is divided evenly; rounding remainder goes to the first winner.
    EvenSplit { winners: Vec<ActorId> },
    /// Every stake goes back to its contributor (draw).
    Refund,
}

impl SettlementRule {
    /// Syntactic validation, done before any store interaction.
    ///
    /// # Errors
    /// Returns `InvalidSettlement` for blank winners or an empty/duplicated
    /// winner list.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::WinnerTakesAll { winner } => {
                if winner.as_str().is_empty() {
                    return Err(HandoffError::InvalidSettlement {
                        reason: "winner id is empty".into(),
                    });
                }
            }
            Self::EvenSplit { winners } => {
                if winners.is_empty() {
                    return Err(HandoffError::InvalidSettlement {
                        reason: "even split needs at least one winner".into(),
                    });
                }
                let mut seen = HashSet::with_capacity(winners.len());
                for w in winners {
                    if w.as_str().is_empty() || !seen.insert(w) {
                        return Err(HandoffError::InvalidSettlement {
                            reason: format!("winner list has blank or duplicate entry {w:?}"),
                        });
                    }
                }
            }
            Self::Refund => {}
        }
        Ok(())
    }
}

/// One line of a payout breakdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutLine {
    pub recipient: ActorId,
    pub amount: Decimal,
    pub currency: Currency,
}

/// Payout breakdown returned by a successful escrow claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    pub lines: Vec<PayoutLine>,
    /// Pooled stake per currency the lines were computed from.
    pub pool: BTreeMap<Currency, Decimal>,
}

impl Payout {
    /// Sum of all lines paid in `currency`.
    #[must_use]
    pub fn total_for(&self, currency: &str) -> Decimal {
        self.lines
            .iter()
            .filter(|l| l.currency == currency)
            .map(|l| l.amount)
            .sum()
    }

    /// Sum paid to `recipient` in `currency`.
    #[must_use]
    pub fn paid_to(&self, recipient: &ActorId, currency: &str) -> Decimal {
        self.lines
            .iter()
            .filter(|l| &l.recipient == recipient && l.currency == currency)
            .map(|l| l.amount)
            .sum()
    }
}
