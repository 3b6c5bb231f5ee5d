//! # handoff-store
//!
//! The durable backend interface for Handoff tokens.
//!
//! Every lifecycle change goes through one primitive,
//! [`TokenStore::compare_and_swap`]: the backend evaluates the mutation's
//! precondition ([`Token::rejection`]) and applies it in a single
//! indivisible step. A SQL backend maps this to
//! `UPDATE tokens SET … WHERE id = $1 AND <precondition> RETURNING *`;
//! [`MemoryTokenStore`] holds its table lock across check and write.
//!
//! Claims, cancellations, stake contributions, and expiry are all thin
//! wrappers over that primitive, so no caller ever decides a transition from
//! a prior read.

pub mod error;
pub mod memory;

use chrono::{DateTime, Utc};
use handoff_types::{ActorId, Mutation, Rejection, Stake, Token, TokenId};

pub use error::{StoreError, StoreResult};
pub use memory::MemoryTokenStore;

/// Outcome of a conditional update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Swap {
    /// The precondition held; carries the row as written.
    Applied(Box<Token>),
    /// Zero rows affected; carries the reason.
    Rejected(Rejection),
}

impl Swap {
    #[must_use]
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

/// Result of one [`TokenStore::expire_batch`] call.
#[derive(Debug, Default)]
pub struct ExpiryBatch {
    /// Records moved to `expired` by this batch. Their transitions are
    /// durable even when `error` is set.
    pub expired: Vec<Token>,
    /// Candidates examined. Equal to the limit when more may remain.
    pub scanned: usize,
    /// Store failure that cut the batch short.
    pub error: Option<StoreError>,
}

/// Durable token storage.
///
/// Implementations must be safe to share across threads and processes: the
/// only synchronization point in the system is `compare_and_swap`.
pub trait TokenStore: Send + Sync {
    /// Insert a fresh record.
    ///
    /// Fails with [`StoreError::AlreadyExists`] on id collision and
    /// [`StoreError::IdempotencyKeyTaken`] when the record's
    /// `(issuer, idempotency_key)` is already bound.
    fn insert(&self, token: Token) -> StoreResult<()>;

    /// Atomically check the precondition of `mutation` against the row and
    /// apply it.
    fn compare_and_swap(&self, id: &TokenId, mutation: Mutation) -> StoreResult<Swap>;

    /// Read-only lookup. Never used to gate a transition.
    fn get(&self, id: &TokenId) -> StoreResult<Option<Token>>;

    fn find_by_idempotency_key(&self, issuer: &ActorId, key: &str) -> StoreResult<Option<Token>>;

    /// Up to `limit` ids of pending rows with `expires_at <= now`, oldest
    /// deadline first.
    fn expiry_candidates(&self, now: DateTime<Utc>, limit: usize) -> StoreResult<Vec<TokenId>>;

    fn try_claim(
        &self,
        id: &TokenId,
        claimant: ActorId,
        now: DateTime<Utc>,
        settles_escrow: bool,
    ) -> StoreResult<Swap> {
        self.compare_and_swap(
            id,
            Mutation::Claim {
                claimant,
                at: now,
                settles_escrow,
            },
        )
    }

    fn cancel(&self, id: &TokenId, operator: ActorId, now: DateTime<Utc>) -> StoreResult<Swap> {
        self.compare_and_swap(id, Mutation::Cancel { operator, at: now })
    }

    /// Append a stake. `stake.staked_at` is the `now` of the precondition.
    fn contribute_stake(&self, id: &TokenId, stake: Stake) -> StoreResult<Swap> {
        self.compare_and_swap(id, Mutation::ContributeStake { stake })
    }

    /// Expire up to `limit` overdue pending rows, each through its own
    /// conditional update. A row claimed between candidate selection and
    /// its update is skipped.
    ///
    /// A failing update stops the batch; rows already expired are still
    /// returned, with the failure in [`ExpiryBatch::error`]. Only a failed
    /// candidate scan is returned as `Err`.
    fn expire_batch(&self, now: DateTime<Utc>, limit: usize) -> StoreResult<ExpiryBatch> {
        let candidates = self.expiry_candidates(now, limit)?;
        let scanned = candidates.len();
        let mut batch = ExpiryBatch {
            expired: Vec::with_capacity(scanned),
            scanned,
            error: None,
        };
        for id in candidates {
            match self.compare_and_swap(&id, Mutation::Expire { at: now }) {
                Ok(Swap::Applied(token)) => batch.expired.push(*token),
                Ok(Swap::Rejected(rejection)) => {
                    tracing::debug!(token = %id.short(), ?rejection, "expiry lost race");
                }
                Err(err) => {
                    tracing::warn!(token = %id.short(), error = %err, "expiry batch interrupted");
                    batch.error = Some(err);
                    break;
                }
            }
        }
        Ok(batch)
    }
}
