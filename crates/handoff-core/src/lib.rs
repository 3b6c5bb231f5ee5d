//! # handoff-core
//!
//! The exactly-once token transfer core: everything between the identity
//! gate and the durable store.
//!
//! ## Components
//!
//! 1. **Minter**: validates mint requests, generates ids, inserts `pending` tokens
//! 2. **ClaimProcessor**: one conditional update per claim; delivers payload or payout
//! 3. **EscrowSettlement**: stake collection and payout/refund computation
//! 4. **ExpiryReaper**: batched expiry of overdue tokens
//! 5. **AuditTrail**: best-effort fan-out to audit sinks
//! 6. **FailedClaimMonitor**: flags tokens collecting repeated failed claims
//! 7. **StatusCache**: advisory cache of terminal views for status lookups
//!
//! [`HandoffCore`] wires them together over one store.
//!
//! ## Flow
//!
//! ```text
//! issuer → Minter.mint() → store.insert()                      (pending)
//! participant → EscrowSettlement.contribute() → store CAS      (collecting → funded)
//! claimant → ClaimProcessor.claim() → store CAS                (claimed)
//! timer → ExpiryReaper.sweep() → store.expire_batch()          (expired + refunds)
//! ```
//!
//! All components are synchronous; `handoff-service` wraps them for async
//! callers with bounded timeouts.

pub mod audit;
pub mod claim;
pub mod clock;
pub mod engine;
pub mod minter;
pub mod monitor;
pub mod reaper;
pub mod settlement;
pub mod status_cache;

pub use audit::{AuditError, AuditSink, AuditTrail, MemoryAuditSink, TracingAuditSink};
pub use claim::{ClaimProcessor, ClaimReceipt, Redemption};
#[cfg(any(test, feature = "test-helpers"))]
pub use clock::ManualClock;
pub use clock::{Clock, SystemClock};
pub use engine::{HandoffCore, HandoffCoreBuilder};
#[cfg(any(test, feature = "test-helpers"))]
pub use minter::ScriptedIdSource;
pub use minter::{IdSource, MintOptions, MintReceipt, Minter, OsIdSource};
pub use monitor::{FailedClaimMonitor, SuspiciousClaims};
pub use reaper::{ExpiryReaper, SweepReport};
pub use settlement::{Closure, EscrowSettlement, closure_events, compute_payout};
pub use status_cache::StatusCache;
