//! Identifiers used throughout Handoff.
//!
//! Token ids are 256-bit digests rendered as lowercase hex, which is a
//! URL-safe alphabet. Audit events use UUIDv7 for time-ordered sorting.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::HandoffError;

// ---------------------------------------------------------------------------
// TokenId
// ---------------------------------------------------------------------------

/// Opaque, unguessable token identifier (32 bytes).
///
/// Always generated server-side at mint time. The textual form is exactly
/// 64 hex characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TokenId(pub [u8; 32]);

impl TokenId {
    /// Derive an id from fresh entropy and the mint timestamp.
    ///
    /// Format: `SHA-256("handoff:token_id:v1:" || entropy || minted_at_nanos)`
    #[must_use]
    pub fn derive(entropy: &[u8; 32], minted_at: DateTime<Utc>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"handoff:token_id:v1:");
        hasher.update(entropy);
        hasher.update(
            minted_at
                .timestamp_nanos_opt()
                .unwrap_or_else(|| minted_at.timestamp_micros())
                .to_le_bytes(),
        );
        Self(hasher.finalize().into())
    }

    #[must_use]
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// First 4 bytes as hex, for log lines.
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenId({})", self.short())
    }
}

impl FromStr for TokenId {
    type Err = HandoffError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 64 {
            return Err(HandoffError::InvalidTokenId {
                reason: format!("expected 64 hex characters, got {}", s.len()),
            });
        }
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes).map_err(|e| HandoffError::InvalidTokenId {
            reason: e.to_string(),
        })?;
        Ok(Self(bytes))
    }
}

impl TryFrom<String> for TokenId {
    type Error = HandoffError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TokenId> for String {
    fn from(id: TokenId) -> Self {
        id.to_string()
    }
}

// ---------------------------------------------------------------------------
// ActorId
// ---------------------------------------------------------------------------

/// A verified identity string handed to the core by the identity gate
/// (a game server, an operator, a wager participant).
///
/// The core trusts it verbatim and never authenticates it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(pub String);

impl ActorId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ActorId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

// ---------------------------------------------------------------------------
// AuditEventId
// ---------------------------------------------------------------------------

/// Unique audit event identifier. Uses UUIDv7 for time-ordered sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct AuditEventId(pub Uuid);

impl AuditEventId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for AuditEventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AuditEventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "evt:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
