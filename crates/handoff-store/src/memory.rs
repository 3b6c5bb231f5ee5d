//! In-memory reference backend.
//!
//! One table behind a single `RwLock`. Every conditional update takes the
//! write lock, evaluates the precondition, and writes before releasing it,
//! which gives the same guarantee as a row-level `UPDATE … WHERE`.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use handoff_types::{ActorId, Mutation, Rejection, Token, TokenId};
use parking_lot::RwLock;

use crate::{StoreError, StoreResult, Swap, TokenStore};

#[derive(Debug, Default)]
struct Tables {
    tokens: HashMap<TokenId, Token>,
    /// Secondary index over pending rows: `(expires_at, id)`.
    pending_by_expiry: BTreeSet<(DateTime<Utc>, TokenId)>,
    /// Unique index `(issuer, idempotency_key) → id`.
    idempotency: HashMap<(ActorId, String), TokenId>,
}

/// Thread-safe in-memory [`TokenStore`].
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    tables: RwLock<Tables>,
    unavailable: AtomicBool,
    latency_ms: AtomicU64,
}

impl MemoryTokenStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total records ever inserted.
    pub fn len(&self) -> usize {
        self.tables.read().tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.read().tokens.is_empty()
    }

    /// Rows still in the expiry index.
    pub fn pending_count(&self) -> usize {
        self.tables.read().pending_by_expiry.len()
    }

    /// Injected faults, applied before every call.
    fn gate(&self) -> StoreResult<()> {
        let latency = self.latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            std::thread::sleep(Duration::from_millis(latency));
        }
        if self.unavailable.load(Ordering::Relaxed) {
            return Err(StoreError::Unavailable("memory store marked unavailable".into()));
        }
        Ok(())
    }
}

/// Fault injection for tests. **Never use in production.**
#[cfg(any(test, feature = "test-helpers"))]
impl MemoryTokenStore {
    /// Every subsequent call fails with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Relaxed);
    }

    /// Every subsequent call blocks for `latency` first.
    pub fn set_latency(&self, latency: Duration) {
        let ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.latency_ms.store(ms, Ordering::Relaxed);
    }

    /// Overwrite stored payload bytes without touching the digest.
    pub fn corrupt_payload(&self, id: &TokenId, bytes: &[u8]) {
        if let Some(token) = self.tables.write().tokens.get_mut(id) {
            token.payload = handoff_types::Payload::new(bytes);
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn insert(&self, token: Token) -> StoreResult<()> {
        self.gate()?;
        let mut tables = self.tables.write();

        if tables.tokens.contains_key(&token.id) {
            return Err(StoreError::AlreadyExists(token.id));
        }
        let idem = token
            .idempotency_key
            .as_ref()
            .map(|key| (token.issuer_context.issuer.clone(), key.clone()));
        if let Some(idem) = &idem {
            if let Some(existing) = tables.idempotency.get(idem) {
                let existing = tables
                    .tokens
                    .get(existing)
                    .cloned()
                    .ok_or_else(|| StoreError::Unavailable("idempotency index out of sync".into()))?;
                return Err(StoreError::IdempotencyKeyTaken {
                    existing: Box::new(existing),
                });
            }
        }

        if !token.status.is_terminal() {
            tables.pending_by_expiry.insert((token.expires_at, token.id));
        }
        if let Some(idem) = idem {
            tables.idempotency.insert(idem, token.id);
        }
        tracing::trace!(token = %token.id.short(), "inserted");
        tables.tokens.insert(token.id, token);
        Ok(())
    }

    fn compare_and_swap(&self, id: &TokenId, mutation: Mutation) -> StoreResult<Swap> {
        self.gate()?;
        let mut guard = self.tables.write();
        let tables = &mut *guard;

        let Some(token) = tables.tokens.get_mut(id) else {
            return Ok(Swap::Rejected(Rejection::Missing));
        };
        let op = mutation.name();
        if let Err(rejection) = token.apply(mutation) {
            tracing::trace!(token = %id.short(), op, ?rejection, "conditional update rejected");
            return Ok(Swap::Rejected(rejection));
        }
        if token.status.is_terminal() {
            tables.pending_by_expiry.remove(&(token.expires_at, token.id));
        }
        Ok(Swap::Applied(Box::new(token.clone())))
    }

    fn get(&self, id: &TokenId) -> StoreResult<Option<Token>> {
        self.gate()?;
        Ok(self.tables.read().tokens.get(id).cloned())
    }

    fn find_by_idempotency_key(&self, issuer: &ActorId, key: &str) -> StoreResult<Option<Token>> {
        self.gate()?;
        let tables = self.tables.read();
        Ok(tables
            .idempotency
            .get(&(issuer.clone(), key.to_owned()))
            .and_then(|id| tables.tokens.get(id))
            .cloned())
    }

    fn expiry_candidates(&self, now: DateTime<Utc>, limit: usize) -> StoreResult<Vec<TokenId>> {
        self.gate()?;
        Ok(self
            .tables
            .read()
            .pending_by_expiry
            .iter()
            .take_while(|(expires_at, _)| *expires_at <= now)
            .take(limit)
            .map(|(_, id)| *id)
            .collect())
    }
}
