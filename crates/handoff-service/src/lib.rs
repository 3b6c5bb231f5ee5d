//! # handoff-service
//!
//! Async embedding of the Handoff core for a tokio application: bounded
//! store calls, the periodic expiry reaper, configuration loading, and
//! logging setup. No network listener is provided; the transport layer
//! maps its requests onto [`requests`] and calls [`TokenService`].
//!
//! ```text
//! config::load() → telemetry::init_logging() → TokenService::from_config()
//!     → service.spawn_reaper(&shutdown) → shutdown.wait_for_signal()
//! ```

pub mod audit_channel;
pub mod config;
pub mod reaper_task;
pub mod requests;
pub mod service;
pub mod shutdown;
pub mod telemetry;

pub use audit_channel::ChannelAuditSink;
pub use requests::{CancelRequest, ClaimRequest, ErrorBody, MintRequest, StakeRequest};
pub use service::TokenService;
pub use shutdown::ShutdownController;
pub use telemetry::init_logging;
