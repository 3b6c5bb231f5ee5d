//! # handoff-types
//!
//! Shared types, errors, and configuration for the **Handoff** token
//! transfer core.
//!
//! This crate is the leaf dependency of the workspace; every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`TokenId`], [`ActorId`], [`AuditEventId`]
//! - **Token model**: [`Token`], [`TokenStatus`], [`TokenView`], [`Payload`], [`IssuerContext`]
//! - **Transitions**: [`Mutation`], [`Rejection`]
//! - **Escrow model**: [`Escrow`], [`EscrowPhase`], [`StakeRequirement`], [`Stake`], [`SettlementRule`], [`Payout`], [`Refund`]
//! - **Audit model**: [`AuditEvent`], [`AuditKind`]
//! - **Configuration**: [`HandoffConfig`] and its sections
//! - **Errors**: [`HandoffError`] with `HO_ERR_` prefix codes
//! - **Constants**: system-wide limits and defaults

pub mod audit;
pub mod config;
pub mod constants;
pub mod error;
pub mod escrow;
pub mod ids;
pub mod token;

// Re-export all primary types at crate root for ergonomic imports:
//   use handoff_types::{Token, TokenId, HandoffError, ...};

pub use audit::*;
pub use config::*;
pub use error::*;
pub use escrow::*;
pub use ids::*;
pub use token::*;

// Constants are accessed via `handoff_types::constants::FOO`
// (not re-exported to avoid name collisions).
