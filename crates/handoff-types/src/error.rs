//! Error types for the Handoff token transfer core.
//!
//! All errors use the `HO_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by class:
//! - 1xx: Terminal claim outcomes (permanent, never retry for a different result)
//! - 2xx: Validation errors (rejected before any store interaction)
//! - 3xx: Escrow participation errors
//! - 4xx: Mint identity errors
//! - 5xx: Store errors (transient or integrity)
//! - 9xx: General / internal errors

use thiserror::Error;

use crate::{ActorId, TokenId};

/// Central error enum for all Handoff operations.
#[derive(Debug, Error)]
pub enum HandoffError {
    // =================================================================
    // Terminal claim outcomes (1xx)
    // =================================================================
    /// No token with this id was ever minted.
    #[error("HO_ERR_100: Token not found: {0}")]
    NotFound(TokenId),

    /// The token was already redeemed. After a client-side timeout this is
    /// the positive signal that the earlier attempt most likely won.
    #[error("HO_ERR_101: Token already claimed: {0}")]
    AlreadyClaimed(TokenId),

    /// The token passed its deadline without being claimed.
    #[error("HO_ERR_102: Token expired: {0}")]
    Expired(TokenId),

    /// An operator cancelled the token.
    #[error("HO_ERR_103: Token cancelled: {0}")]
    Cancelled(TokenId),

    /// Escrow token is still collecting stakes.
    #[error("HO_ERR_104: Stakes incomplete for {token_id}: {missing} participant(s) outstanding")]
    StakesIncomplete { token_id: TokenId, missing: usize },

    // =================================================================
    // Validation (2xx)
    // =================================================================
    #[error("HO_ERR_200: Payload too large: {size} bytes exceeds limit of {max}")]
    PayloadTooLarge { size: usize, max: usize },

    /// TTL must satisfy `0 < ttl <= max_ttl`.
    #[error("HO_ERR_201: Invalid TTL: {ttl_secs}s (allowed 1..={max_secs}s)")]
    InvalidTtl { ttl_secs: i64, max_secs: i64 },

    #[error("HO_ERR_202: Invalid stake: {reason}")]
    InvalidStake { reason: String },

    #[error("HO_ERR_203: Invalid settlement: {reason}")]
    InvalidSettlement { reason: String },

    #[error("HO_ERR_204: Invalid token id: {reason}")]
    InvalidTokenId { reason: String },

    // =================================================================
    // Escrow participation (3xx)
    // =================================================================
    #[error("HO_ERR_300: {participant} is not a declared participant of {token_id}")]
    NotAParticipant {
        token_id: TokenId,
        participant: ActorId,
    },

    #[error("HO_ERR_301: {participant} already staked on {token_id}")]
    AlreadyStaked {
        token_id: TokenId,
        participant: ActorId,
    },

    // =================================================================
    // Mint identity (4xx)
    // =================================================================
    /// Token id collision on insert. The minter regenerates once.
    #[error("HO_ERR_400: Duplicate token id: {0}")]
    DuplicateId(TokenId),

    /// The idempotency key was already used with a different payload.
    #[error("HO_ERR_401: Idempotency key {key} already bound to a different payload")]
    IdempotencyConflict { key: String },

    // =================================================================
    // Store (5xx)
    // =================================================================
    /// Transient: the store could not be reached or timed out. The outcome
    /// of a mutating call is unknown.
    #[error("HO_ERR_500: Store unavailable: {reason}")]
    StoreUnavailable { reason: String },

    /// Stored payload bytes no longer match the digest recorded at mint.
    #[error("HO_ERR_501: Payload digest mismatch for {0}")]
    PayloadCorrupted(TokenId),

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Configuration error (invalid config file, bad env override, etc.).
    #[error("HO_ERR_900: Configuration error: {0}")]
    Configuration(String),

    /// Unrecoverable internal error.
    #[error("HO_ERR_901: Internal error: {0}")]
    Internal(String),

    /// Serialization / deserialization error.
    #[error("HO_ERR_902: Serialization error: {0}")]
    Serialization(String),
}

impl HandoffError {
    /// Worth retrying the same call: only store unavailability qualifies.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::StoreUnavailable { .. })
    }

    /// Permanent claim outcomes. Retrying never yields a different answer.
    #[must_use]
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_) | Self::AlreadyClaimed(_) | Self::Expired(_) | Self::Cancelled(_)
        )
    }

    /// Short machine-readable kind, used as the `outcome` of audit records
    /// and as the error tag of transport responses.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::AlreadyClaimed(_) => "already_claimed",
            Self::Expired(_) => "expired",
            Self::Cancelled(_) => "cancelled",
            Self::StakesIncomplete { .. } => "stakes_incomplete",
            Self::PayloadTooLarge { .. } => "payload_too_large",
            Self::InvalidTtl { .. } => "invalid_ttl",
            Self::InvalidStake { .. } => "invalid_stake",
            Self::InvalidSettlement { .. } => "invalid_settlement",
            Self::InvalidTokenId { .. } => "invalid_token_id",
            Self::NotAParticipant { .. } => "not_a_participant",
            Self::AlreadyStaked { .. } => "already_staked",
            Self::DuplicateId(_) => "duplicate_id",
            Self::IdempotencyConflict { .. } => "idempotency_conflict",
            Self::StoreUnavailable { .. } => "store_unavailable",
            Self::PayloadCorrupted(_) => "payload_corrupted",
            Self::Configuration(_) => "configuration",
            Self::Internal(_) => "internal",
            Self::Serialization(_) => "serialization",
        }
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, HandoffError>;

impl From<serde_json::Error> for HandoffError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
