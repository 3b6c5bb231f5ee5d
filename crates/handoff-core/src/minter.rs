//! Minter: validates a mint request, generates the token id, and performs
//! the single durable insert.
//!
//! The id is returned only after the insert succeeded. An id collision is
//! retried once with fresh entropy; a second collision is reported as
//! `StoreUnavailable`.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use handoff_store::{StoreError, TokenStore};
use handoff_types::{
    ActorId, AuditEvent, AuditKind, Escrow, HandoffError, IssuerContext, MintConfig, Payload,
    Result, StakeRequirement, Token, TokenId, TokenView,
};
use rand::{RngCore, rngs::OsRng};
use serde::{Deserialize, Serialize};

use crate::{AuditTrail, Clock};

/// Source of id entropy.
pub trait IdSource: Send + Sync {
    fn entropy(&self) -> [u8; 32];
}

/// Operating-system CSPRNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsIdSource;

impl IdSource for OsIdSource {
    fn entropy(&self) -> [u8; 32] {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        bytes
    }
}

/// Optional mint parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintOptions {
    /// Free-form provenance note, audit only.
    #[serde(default)]
    pub note: Option<String>,
    /// Caller-chosen dedup key, unique per issuer.
    #[serde(default)]
    pub idempotency_key: Option<String>,
    /// Declared stakes; makes this an escrow token.
    #[serde(default)]
    pub escrow: Option<Vec<StakeRequirement>>,
}

impl MintOptions {
    #[must_use]
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    #[must_use]
    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn with_escrow(mut self, requirements: Vec<StakeRequirement>) -> Self {
        self.escrow = Some(requirements);
        self
    }
}

/// What the issuer gets back from a mint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintReceipt {
    pub token_id: TokenId,
    pub expires_at: DateTime<Utc>,
    /// `true` when an earlier mint with the same idempotency key and payload
    /// was returned instead of creating a new token.
    pub replayed: bool,
}

pub struct Minter {
    store: Arc<dyn TokenStore>,
    ids: Arc<dyn IdSource>,
    clock: Arc<dyn Clock>,
    audit: AuditTrail,
    config: MintConfig,
}

impl Minter {
    #[must_use]
    pub fn new(
        store: Arc<dyn TokenStore>,
        ids: Arc<dyn IdSource>,
        clock: Arc<dyn Clock>,
        audit: AuditTrail,
        config: MintConfig,
    ) -> Self {
        Self {
            store,
            ids,
            clock,
            audit,
            config,
        }
    }

    /// Configured default TTL, for callers that do not choose one.
    #[must_use]
    pub fn default_ttl(&self) -> Duration {
        self.config.default_ttl()
    }

    /// Mint a token carrying `payload` that expires after `ttl`.
    ///
    /// Payload size, TTL, and escrow terms are checked before any store
    /// interaction.
    pub fn mint(
        &self,
        issuer: ActorId,
        payload: Payload,
        ttl: Duration,
        options: MintOptions,
    ) -> Result<MintReceipt> {
        if payload.len() > self.config.max_payload_bytes {
            return Err(HandoffError::PayloadTooLarge {
                size: payload.len(),
                max: self.config.max_payload_bytes,
            });
        }
        if ttl <= Duration::zero() || ttl > self.config.max_ttl() {
            return Err(HandoffError::InvalidTtl {
                ttl_secs: ttl.num_seconds(),
                max_secs: self.config.max_ttl_secs,
            });
        }
        let escrow = options
            .escrow
            .map(|reqs| Escrow::open(reqs, self.config.max_escrow_participants))
            .transpose()?;

        let now = self.clock.now();
        if now.checked_add_signed(ttl).is_none() {
            return Err(HandoffError::InvalidTtl {
                ttl_secs: ttl.num_seconds(),
                max_secs: self.config.max_ttl_secs,
            });
        }
        let issuer_context = IssuerContext {
            issuer: issuer.clone(),
            note: options.note,
        };
        let mut token = Token::mint(
            TokenId::derive(&self.ids.entropy(), now),
            payload,
            issuer_context,
            now,
            ttl,
            options.idempotency_key,
            escrow,
        );

        let mut collided = false;
        loop {
            match self.store.insert(token.clone()) {
                Ok(()) => break,
                Err(StoreError::AlreadyExists(id)) if !collided => {
                    tracing::warn!(token = %id.short(), "token id collision, regenerating");
                    collided = true;
                    token.id = TokenId::derive(&self.ids.entropy(), now);
                }
                Err(StoreError::AlreadyExists(id)) => {
                    tracing::error!(token = %id.short(), "second token id collision");
                    return Err(HandoffError::StoreUnavailable {
                        reason: "token id collided twice".into(),
                    });
                }
                Err(StoreError::IdempotencyKeyTaken { existing }) => {
                    return self.replay(&token, &existing, now);
                }
                Err(err) => return Err(err.into()),
            }
        }

        tracing::info!(
            token = %token.id.short(),
            issuer = %issuer,
            ttl_secs = ttl.num_seconds(),
            escrow = token.escrow.is_some(),
            "token minted"
        );
        self.audit
            .record(&AuditEvent::new(AuditKind::Minted, token.id, issuer, now));

        Ok(MintReceipt {
            token_id: token.id,
            expires_at: token.expires_at,
            replayed: false,
        })
    }

    /// Resolve an idempotency-key hit: same payload is a replay, anything
    /// else a conflict.
    fn replay(&self, attempted: &Token, existing: &Token, now: DateTime<Utc>) -> Result<MintReceipt> {
        let key = attempted.idempotency_key.clone().unwrap_or_default();
        if existing.payload_digest != attempted.payload_digest {
            tracing::warn!(
                issuer = %attempted.issuer_context.issuer,
                key = %key,
                existing = %existing.id.short(),
                "idempotency key reused with different payload"
            );
            return Err(HandoffError::IdempotencyConflict { key });
        }
        tracing::info!(token = %existing.id.short(), key = %key, "mint replayed");
        self.audit.record(
            &AuditEvent::new(
                AuditKind::MintReplayed,
                existing.id,
                attempted.issuer_context.issuer.clone(),
                now,
            )
            .with_detail(key),
        );
        Ok(MintReceipt {
            token_id: existing.id,
            expires_at: existing.expires_at,
            replayed: true,
        })
    }

    /// Look up the token an earlier mint created under `key`, for recovery
    /// after a mint timed out.
    pub fn find_by_idempotency_key(&self, issuer: &ActorId, key: &str) -> Result<Option<TokenView>> {
        Ok(self
            .store
            .find_by_idempotency_key(issuer, key)?
            .map(|t| t.view()))
    }
}

/// Replays a fixed sequence of entropy values, then repeats the last.
/// Lets tests force id collisions.
#[cfg(any(test, feature = "test-helpers"))]
#[derive(Debug)]
pub struct ScriptedIdSource {
    script: parking_lot::Mutex<std::collections::VecDeque<[u8; 32]>>,
    last: parking_lot::Mutex<[u8; 32]>,
}

#[cfg(any(test, feature = "test-helpers"))]
impl ScriptedIdSource {
    pub fn new(script: Vec<[u8; 32]>) -> Self {
        Self {
            script: parking_lot::Mutex::new(script.into()),
            last: parking_lot::Mutex::new([0u8; 32]),
        }
    }
}

#[cfg(any(test, feature = "test-helpers"))]
impl IdSource for ScriptedIdSource {
    fn entropy(&self) -> [u8; 32] {
        let mut last = self.last.lock();
        if let Some(next) = self.script.lock().pop_front() {
            *last = next;
        }
        *last
    }
}
