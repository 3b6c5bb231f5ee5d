//! System-wide constants for the Handoff token transfer core.

/// Maximum payload size accepted at mint (bytes).
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 65_536;

/// Upper bound on any token's time-to-live (seconds). Bounds outstanding
/// liabilities.
pub const DEFAULT_MAX_TTL_SECS: i64 = 24 * 60 * 60;

/// Ceiling for a configured `mint.max_ttl_secs` (ten years). Keeps every
/// deadline representable.
pub const MAX_TTL_SECS_CEILING: i64 = 10 * 365 * 24 * 60 * 60;

/// TTL applied when a caller does not choose one (seconds).
pub const DEFAULT_TTL_SECS: i64 = 60 * 60;

/// Maximum declared participants on one escrow token.
pub const DEFAULT_MAX_ESCROW_PARTICIPANTS: usize = 32;

/// Reaper sweep interval (seconds).
pub const DEFAULT_REAPER_INTERVAL_SECS: u64 = 30;

/// Rows expired per `ExpireBatch` call.
pub const DEFAULT_REAPER_BATCH_LIMIT: usize = 500;

/// Upper bound on batches within one sweep, so a huge backlog cannot pin
/// the reaper.
pub const DEFAULT_REAPER_MAX_BATCHES: usize = 64;

/// Per-call store timeout (milliseconds). Mint and claim fail fast.
pub const DEFAULT_STORE_TIMEOUT_MS: u64 = 800;

/// Failed claims on one token within the window before it is flagged.
pub const DEFAULT_FAILED_CLAIM_THRESHOLD: usize = 5;

/// Sliding window for the failed-claim monitor (seconds).
pub const DEFAULT_FAILED_CLAIM_WINDOW_SECS: i64 = 60;

/// Tokens the failed-claim monitor tracks at once; the quietest is evicted beyond this.
pub const DEFAULT_FAILED_CLAIM_MAX_TRACKED: usize = 50_000;

/// Terminal token views kept by the advisory status cache.
pub const DEFAULT_STATUS_CACHE_CAPACITY: usize = 10_000;

/// Bounded capacity of the channel audit sink.
pub const DEFAULT_AUDIT_CHANNEL_CAPACITY: usize = 4_096;

/// Actor recorded on transitions made by the expiry reaper.
pub const REAPER_ACTOR: &str = "handoff:reaper";

/// Prefix for environment variable configuration overrides.
pub const ENV_PREFIX: &str = "HANDOFF_";
