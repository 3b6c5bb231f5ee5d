//! Serde request/response shapes for whatever transport embeds the service.

use handoff_core::MintOptions;
use handoff_types::{ActorId, HandoffError, Payload, SettlementRule, TokenId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintRequest {
    /// Verified identity from the gate.
    pub issuer: ActorId,
    pub payload: Payload,
    /// Falls back to `mint.default_ttl_secs`.
    #[serde(default)]
    pub ttl_secs: Option<i64>,
    #[serde(flatten)]
    pub options: MintOptions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimRequest {
    pub token_id: TokenId,
    pub claimant: ActorId,
    /// Required for escrow tokens, forbidden otherwise.
    #[serde(default)]
    pub rule: Option<SettlementRule>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeRequest {
    pub token_id: TokenId,
    pub participant: ActorId,
    pub amount: Decimal,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelRequest {
    pub token_id: TokenId,
    pub operator: ActorId,
}

/// Error body: stable kind tag, human message, and whether retrying the
/// same call can help.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
    pub retryable: bool,
}

impl From<&HandoffError> for ErrorBody {
    fn from(err: &HandoffError) -> Self {
        Self {
            kind: err.kind().to_owned(),
            message: err.to_string(),
            retryable: err.is_transient(),
        }
    }
}
