//! # Token: the exactly-once handoff primitive
//!
//! A `Token` carries an opaque payload that can be redeemed exactly once.
//!
//! ## State Machine
//!
//! ```text
//!   ┌─────────┐   claim    ┌─────────┐
//!   │ PENDING ├───────────▶│ CLAIMED │
//!   └────┬────┘            └─────────┘
//!        │ expire (reaper)  ┌─────────┐
//!        ├─────────────────▶│ EXPIRED │
//!        │ cancel (operator)┌───────────┐
//!        └─────────────────▶│ CANCELLED │
//!                           └───────────┘
//! ```
//!
//! Transitions are expressed as [`Mutation`]s. Each mutation carries its own
//! precondition ([`Token::rejection`]); stores evaluate the precondition and
//! apply the mutation in one indivisible step ([`Token::apply`] under a row
//! lock, or `UPDATE … WHERE <precondition>` in SQL). Nothing outside that
//! step may decide whether a transition happens.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use sha2::{Digest, Sha256};

use crate::{
    ActorId, Escrow, EscrowPhase, HandoffError, Result, Stake, TokenId, constants,
};

// ---------------------------------------------------------------------------
// TokenStatus
// ---------------------------------------------------------------------------

/// The lifecycle state of a token.
///
/// Transitions are **monotonic**: only `Pending` has exits, and every exit
/// is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenStatus {
    /// Minted, not yet redeemed. The only non-terminal state.
    Pending,
    /// Redeemed. **Irreversible.** This is what prevents double delivery.
    Claimed,
    /// Deadline passed before any claim.
    Expired,
    /// Withdrawn by an operator.
    Cancelled,
}

impl TokenStatus {
    /// Can a token in this state transition to `target`?
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Pending, Self::Claimed | Self::Expired | Self::Cancelled)
        )
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::fmt::Display for TokenStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Claimed => write!(f, "CLAIMED"),
            Self::Expired => write!(f, "EXPIRED"),
            Self::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// Opaque payload bytes. Never interpreted by the core, only stored and
/// returned verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(Vec<u8>);

impl Payload {
    #[must_use]
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Encode a structured value as compact JSON bytes.
    pub fn from_json<T: Serialize>(value: &T) -> Result<Self> {
        Ok(Self(serde_json::to_vec(value)?))
    }

    /// Decode the bytes as JSON. Purely a caller convenience.
    pub fn to_json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.0)?)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// SHA-256 over the raw bytes.
    #[must_use]
    pub fn digest(&self) -> [u8; 32] {
        Sha256::digest(&self.0).into()
    }
}

// ---------------------------------------------------------------------------
// IssuerContext
// ---------------------------------------------------------------------------

/// Provenance of a mint. Audit only; never used to authorize a claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuerContext {
    /// Verified identity of the minting party.
    pub issuer: ActorId,
    /// Free-form note (e.g. `"src=ServerA dst=ServerB steam=7656…"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl IssuerContext {
    #[must_use]
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: ActorId::new(issuer),
            note: None,
        }
    }

    #[must_use]
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Mutation / Rejection
// ---------------------------------------------------------------------------

/// A single-row conditional update. The precondition is implied by the
/// variant; see [`Token::rejection`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// `status = claimed WHERE status = pending AND expires_at > at
    ///  AND escrow shape matches AND (no escrow OR escrow funded)`.
    Claim {
        claimant: ActorId,
        at: DateTime<Utc>,
        /// The claimant supplied a settlement rule (escrow claims only).
        settles_escrow: bool,
    },
    /// `status = expired WHERE status = pending AND expires_at <= at`.
    Expire { at: DateTime<Utc> },
    /// `status = cancelled WHERE status = pending`.
    Cancel { operator: ActorId, at: DateTime<Utc> },
    /// Append to the stake set `WHERE status = pending AND expires_at > at
    /// AND participant declared AND not yet staked AND amount matches`.
    ContributeStake { stake: Stake },
}

impl Mutation {
    /// Short name for logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Claim { .. } => "claim",
            Self::Expire { .. } => "expire",
            Self::Cancel { .. } => "cancel",
            Self::ContributeStake { .. } => "contribute_stake",
        }
    }
}

/// Why a conditional update affected zero rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// No row with this id.
    Missing,
    Claimed,
    Expired,
    Cancelled,
    /// Escrow claim while stakes are still being collected.
    StakesIncomplete { missing: usize },
    /// Expire attempted before the deadline.
    NotYetDue,
    /// Stake offered on a token without escrow.
    NotEscrow,
    /// A settlement rule was given for a plain token, or omitted for an
    /// escrow token. `escrow` tells which side the token is on.
    SettlementMismatch { escrow: bool },
    NotAParticipant(ActorId),
    AlreadyStaked(ActorId),
    StakeMismatch { reason: String },
}

impl Rejection {
    /// Map to the caller-facing error for `token_id`.
    #[must_use]
    pub fn into_error(self, token_id: TokenId) -> HandoffError {
        match self {
            Self::Missing => HandoffError::NotFound(token_id),
            Self::Claimed => HandoffError::AlreadyClaimed(token_id),
            Self::Expired => HandoffError::Expired(token_id),
            Self::Cancelled => HandoffError::Cancelled(token_id),
            Self::StakesIncomplete { missing } => {
                HandoffError::StakesIncomplete { token_id, missing }
            }
            Self::NotYetDue => {
                HandoffError::Internal(format!("token {token_id} is not yet due for expiry"))
            }
            Self::NotEscrow => HandoffError::InvalidStake {
                reason: format!("token {token_id} does not take stakes"),
            },
            Self::SettlementMismatch { escrow: true } => HandoffError::InvalidSettlement {
                reason: format!("escrow token {token_id} requires a settlement rule"),
            },
            Self::SettlementMismatch { escrow: false } => HandoffError::InvalidSettlement {
                reason: format!("token {token_id} is not an escrow token"),
            },
            Self::NotAParticipant(participant) => HandoffError::NotAParticipant {
                token_id,
                participant,
            },
            Self::AlreadyStaked(participant) => HandoffError::AlreadyStaked {
                token_id,
                participant,
            },
            Self::StakeMismatch { reason } => HandoffError::InvalidStake { reason },
        }
    }
}

// ---------------------------------------------------------------------------
// Token
// ---------------------------------------------------------------------------

/// A minted token and its full lifecycle record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub id: TokenId,
    /// Immutable after mint.
    pub payload: Payload,
    /// SHA-256 of `payload`, recorded at mint.
    pub payload_digest: [u8; 32],
    pub status: TokenStatus,
    pub created_at: DateTime<Utc>,
    /// `created_at + ttl`.
    pub expires_at: DateTime<Utc>,
    /// Set exactly once, by the winning claim.
    pub claimed_at: Option<DateTime<Utc>>,
    pub claimed_by: Option<ActorId>,
    /// Set exactly once, by expiry or cancellation.
    pub closed_at: Option<DateTime<Utc>>,
    pub closed_by: Option<ActorId>,
    pub issuer_context: IssuerContext,
    /// Caller-supplied mint dedup key, unique per issuer.
    pub idempotency_key: Option<String>,
    pub escrow: Option<Escrow>,
}

impl Token {
    /// Build a fresh `pending` token. Validation of `ttl` and payload size
    /// happens in the minter, before this is called.
    #[must_use]
    pub fn mint(
        id: TokenId,
        payload: Payload,
        issuer_context: IssuerContext,
        created_at: DateTime<Utc>,
        ttl: Duration,
        idempotency_key: Option<String>,
        escrow: Option<Escrow>,
    ) -> Self {
        let payload_digest = payload.digest();
        Self {
            id,
            payload,
            payload_digest,
            status: TokenStatus::Pending,
            created_at,
            expires_at: created_at + ttl,
            claimed_at: None,
            claimed_by: None,
            closed_at: None,
            closed_by: None,
            issuer_context,
            idempotency_key,
            escrow,
        }
    }

    /// `true` once `now` has reached the deadline.
    #[must_use]
    pub fn is_past_deadline(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// `true` if stored bytes still match the digest taken at mint.
    #[must_use]
    pub fn payload_intact(&self) -> bool {
        self.payload.digest() == self.payload_digest
    }

    /// Evaluate the precondition of `mutation` against this row.
    ///
    /// Returns `None` when the mutation may be applied.
    #[must_use]
    pub fn rejection(&self, mutation: &Mutation) -> Option<Rejection> {
        match self.status {
            TokenStatus::Pending => {}
            TokenStatus::Claimed => return Some(Rejection::Claimed),
            TokenStatus::Expired => return Some(Rejection::Expired),
            TokenStatus::Cancelled => return Some(Rejection::Cancelled),
        }

        match mutation {
            Mutation::Claim {
                at, settles_escrow, ..
            } => {
                if self.is_past_deadline(*at) {
                    return Some(Rejection::Expired);
                }
                match (&self.escrow, settles_escrow) {
                    (None, false) => None,
                    (None, true) => Some(Rejection::SettlementMismatch { escrow: false }),
                    (Some(_), false) => Some(Rejection::SettlementMismatch { escrow: true }),
                    (Some(escrow), true) => match escrow.phase {
                        EscrowPhase::Funded => None,
                        EscrowPhase::Collecting => Some(Rejection::StakesIncomplete {
                            missing: escrow.outstanding().len(),
                        }),
                    },
                }
            }
            Mutation::Expire { at } => {
                if self.is_past_deadline(*at) {
                    None
                } else {
                    Some(Rejection::NotYetDue)
                }
            }
            Mutation::Cancel { .. } => None,
            Mutation::ContributeStake { stake } => {
                if self.is_past_deadline(stake.staked_at) {
                    return Some(Rejection::Expired);
                }
                match &self.escrow {
                    None => Some(Rejection::NotEscrow),
                    Some(escrow) => escrow.stake_rejection(stake),
                }
            }
        }
    }

    /// Check the precondition and, if it holds, apply the mutation.
    ///
    /// Stores must call this while holding exclusive access to the row so
    /// that check and write are one step.
    ///
    /// # Errors
    /// Returns the [`Rejection`] when the precondition does not hold; the
    /// token is left untouched.
    pub fn apply(&mut self, mutation: Mutation) -> std::result::Result<(), Rejection> {
        if let Some(rejection) = self.rejection(&mutation) {
            return Err(rejection);
        }
        match mutation {
            Mutation::Claim { claimant, at, .. } => {
                debug_assert!(self.status.can_transition_to(TokenStatus::Claimed));
                self.status = TokenStatus::Claimed;
                self.claimed_at = Some(at);
                self.claimed_by = Some(claimant);
            }
            Mutation::Expire { at } => {
                self.status = TokenStatus::Expired;
                self.closed_at = Some(at);
                self.closed_by = Some(ActorId::new(constants::REAPER_ACTOR));
            }
            Mutation::Cancel { operator, at } => {
                self.status = TokenStatus::Cancelled;
                self.closed_at = Some(at);
                self.closed_by = Some(operator);
            }
            Mutation::ContributeStake { stake } => {
                if let Some(escrow) = self.escrow.as_mut() {
                    escrow.record_stake(stake);
                }
            }
        }
        Ok(())
    }

    /// Read-only projection without payload bytes.
    #[must_use]
    pub fn view(&self) -> TokenView {
        TokenView {
            id: self.id,
            status: self.status,
            created_at: self.created_at,
            expires_at: self.expires_at,
            claimed_at: self.claimed_at,
            claimed_by: self.claimed_by.clone(),
            closed_at: self.closed_at,
            closed_by: self.closed_by.clone(),
            issuer_context: self.issuer_context.clone(),
            payload_len: self.payload.len(),
            escrow_phase: self.escrow.as_ref().map(|e| e.phase),
            stakes: self
                .escrow
                .as_ref()
                .map(|e| e.stakes.clone())
                .unwrap_or_default(),
        }
    }
}

/// Read-only view of a token for status/audit queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenView {
    pub id: TokenId,
    pub status: TokenStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub claimed_by: Option<ActorId>,
    pub closed_at: Option<DateTime<Utc>>,
    pub closed_by: Option<ActorId>,
    pub issuer_context: IssuerContext,
    pub payload_len: usize,
    pub escrow_phase: Option<EscrowPhase>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stakes: Vec<Stake>,
}

/// Dummy token for testing. **Never use in production.**
#[cfg(any(test, feature = "test-helpers"))]
impl Token {
    /// Pending plain token minted now with a one-hour TTL.
    pub fn dummy(payload: &[u8]) -> Self {
        Self::dummy_at(payload, Utc::now(), Duration::hours(1))
    }

    /// Pending plain token with explicit mint time and TTL. The id is derived
    /// from the payload and time, so distinct inputs give distinct ids.
    pub fn dummy_at(payload: &[u8], created_at: DateTime<Utc>, ttl: Duration) -> Self {
        let payload = Payload::new(payload);
        let id = TokenId::derive(&payload.digest(), created_at);
        Self::mint(
            id,
            payload,
            IssuerContext::new("test-issuer"),
            created_at,
            ttl,
            None,
            None,
        )
    }
}
