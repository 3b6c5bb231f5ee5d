use handoff_types::{HandoffError, Token, TokenId};
use thiserror::Error;

/// Errors raised by a [`TokenStore`](crate::TokenStore) backend.
///
/// A rejected conditional update is not an error; it is reported as
/// [`Swap::Rejected`](crate::Swap::Rejected).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("token id already exists: {0}")]
    AlreadyExists(TokenId),

    /// The `(issuer, idempotency_key)` pair is bound to another record.
    #[error("idempotency key already bound to token {}", existing.id)]
    IdempotencyKeyTaken { existing: Box<Token> },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

impl From<StoreError> for HandoffError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::AlreadyExists(id) => Self::DuplicateId(id),
            StoreError::IdempotencyKeyTaken { existing } => Self::IdempotencyConflict {
                key: existing.idempotency_key.unwrap_or_default(),
            },
            StoreError::Unavailable(reason) => Self::StoreUnavailable { reason },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_to_handoff_errors() {
        let id = TokenId::from_bytes([1u8; 32]);
        assert!(matches!(
            HandoffError::from(StoreError::AlreadyExists(id)),
            HandoffError::DuplicateId(_)
        ));

        let err: HandoffError = StoreError::Unavailable("down".into()).into();
        assert!(err.is_transient());

        let mut existing = Token::dummy(b"p");
        existing.idempotency_key = Some("k-1".into());
        let err: HandoffError = StoreError::IdempotencyKeyTaken {
            existing: Box::new(existing),
        }
        .into();
        assert!(matches!(err, HandoffError::IdempotencyConflict { ref key } if key == "k-1"));
    }
}
