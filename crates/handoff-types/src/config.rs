//! Configuration types for the Handoff core and service.
//!
//! Every section has serde defaults, so a partial TOML file (or none at
//! all) yields a working configuration.

use std::time::Duration as StdDuration;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::{HandoffError, Result, constants};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandoffConfig {
    pub mint: MintConfig,
    pub claim: ClaimConfig,
    pub reaper: ReaperConfig,
    pub store: StoreConfig,
    pub cache: CacheConfig,
    pub audit: AuditConfig,
    pub log: LogConfig,
}

impl HandoffConfig {
    /// Check cross-field constraints.
    ///
    /// # Errors
    /// Returns [`HandoffError::Configuration`] naming the first bad field.
    pub fn validate(&self) -> Result<()> {
        let bad = |msg: String| Err(HandoffError::Configuration(msg));
        if self.mint.max_payload_bytes == 0 {
            return bad("mint.max_payload_bytes must be > 0".into());
        }
        if self.mint.max_ttl_secs <= 0 || self.mint.max_ttl_secs > constants::MAX_TTL_SECS_CEILING {
            return bad(format!(
                "mint.max_ttl_secs must be in 1..={}",
                constants::MAX_TTL_SECS_CEILING
            ));
        }
        if self.mint.default_ttl_secs <= 0 || self.mint.default_ttl_secs > self.mint.max_ttl_secs {
            return bad(format!(
                "mint.default_ttl_secs must be in 1..={}",
                self.mint.max_ttl_secs
            ));
        }
        if self.mint.max_escrow_participants == 0 {
            return bad("mint.max_escrow_participants must be > 0".into());
        }
        if self.claim.failed_claim_threshold == 0 || self.claim.failed_claim_window_secs <= 0 {
            return bad("claim.failed_claim_threshold and window must be > 0".into());
        }
        if self.claim.failed_claim_window_secs > constants::MAX_TTL_SECS_CEILING {
            return bad("claim.failed_claim_window_secs is out of range".into());
        }
        if self.claim.max_tracked_tokens == 0 {
            return bad("claim.max_tracked_tokens must be > 0".into());
        }
        if self.reaper.interval_secs == 0 {
            return bad("reaper.interval_secs must be > 0".into());
        }
        if self.reaper.batch_limit == 0 || self.reaper.max_batches_per_sweep == 0 {
            return bad("reaper.batch_limit and max_batches_per_sweep must be > 0".into());
        }
        if self.store.timeout_ms == 0 {
            return bad("store.timeout_ms must be > 0".into());
        }
        if self.cache.status_capacity == 0 {
            return bad("cache.status_capacity must be > 0".into());
        }
        if self.audit.channel_capacity == 0 {
            return bad("audit.channel_capacity must be > 0".into());
        }
        Ok(())
    }
}

/// Mint-time limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MintConfig {
    pub max_payload_bytes: usize,
    pub max_ttl_secs: i64,
    pub default_ttl_secs: i64,
    pub max_escrow_participants: usize,
}

impl MintConfig {
    /// Saturates at `Duration::MAX` for unvalidated out-of-range values.
    #[must_use]
    pub fn max_ttl(&self) -> Duration {
        Duration::try_seconds(self.max_ttl_secs).unwrap_or(Duration::MAX)
    }

    /// Saturates like [`MintConfig::max_ttl`].
    #[must_use]
    pub fn default_ttl(&self) -> Duration {
        Duration::try_seconds(self.default_ttl_secs).unwrap_or(Duration::MAX)
    }
}

impl Default for MintConfig {
    fn default() -> Self {
        Self {
            max_payload_bytes: constants::DEFAULT_MAX_PAYLOAD_BYTES,
            max_ttl_secs: constants::DEFAULT_MAX_TTL_SECS,
            default_ttl_secs: constants::DEFAULT_TTL_SECS,
            max_escrow_participants: constants::DEFAULT_MAX_ESCROW_PARTICIPANTS,
        }
    }
}

/// Failed-claim monitoring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClaimConfig {
    pub failed_claim_threshold: usize,
    pub failed_claim_window_secs: i64,
    /// Upper bound on tokens with a live failure window.
    pub max_tracked_tokens: usize,
}

impl Default for ClaimConfig {
    fn default() -> Self {
        Self {
            failed_claim_threshold: constants::DEFAULT_FAILED_CLAIM_THRESHOLD,
            failed_claim_window_secs: constants::DEFAULT_FAILED_CLAIM_WINDOW_SECS,
            max_tracked_tokens: constants::DEFAULT_FAILED_CLAIM_MAX_TRACKED,
        }
    }
}

/// Expiry reaper schedule and batch sizing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaperConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    pub batch_limit: usize,
    pub max_batches_per_sweep: usize,
}

impl ReaperConfig {
    #[must_use]
    pub fn interval(&self) -> StdDuration {
        StdDuration::from_secs(self.interval_secs)
    }
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: constants::DEFAULT_REAPER_INTERVAL_SECS,
            batch_limit: constants::DEFAULT_REAPER_BATCH_LIMIT,
            max_batches_per_sweep: constants::DEFAULT_REAPER_MAX_BATCHES,
        }
    }
}

/// Store call bounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub timeout_ms: u64,
}

impl StoreConfig {
    #[must_use]
    pub fn timeout(&self) -> StdDuration {
        StdDuration::from_millis(self.timeout_ms)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            timeout_ms: constants::DEFAULT_STORE_TIMEOUT_MS,
        }
    }
}

/// Advisory status cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub status_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            status_capacity: constants::DEFAULT_STATUS_CACHE_CAPACITY,
        }
    }
}

/// Which audit sinks to attach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditSinkKind {
    /// Structured `tracing` events under the `handoff::audit` target.
    Tracing,
    /// Bounded in-process channel drained by the embedding application.
    Channel,
    /// No sink.
    Off,
}

impl std::str::FromStr for AuditSinkKind {
    type Err = HandoffError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tracing" => Ok(Self::Tracing),
            "channel" => Ok(Self::Channel),
            "off" | "none" => Ok(Self::Off),
            other => Err(HandoffError::Configuration(format!(
                "unknown audit sink {other:?} (expected tracing, channel, off)"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub sink: AuditSinkKind,
    pub channel_capacity: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            sink: AuditSinkKind::Tracing,
            channel_capacity: constants::DEFAULT_AUDIT_CHANNEL_CAPACITY,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines for local development.
    Human,
    /// Newline-delimited JSON for log aggregation.
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = HandoffError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "human" => Ok(Self::Human),
            "json" => Ok(Self::Json),
            other => Err(HandoffError::Configuration(format!(
                "unknown log format {other:?} (expected human, json)"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directive (`"info"`, `"debug,handoff_core=trace"`); `RUST_LOG`
    /// wins when set.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: LogFormat::Human,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = HandoffConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.mint.max_payload_bytes, 65_536);
        assert_eq!(cfg.mint.default_ttl(), Duration::minutes(60));
        assert_eq!(cfg.reaper.interval(), StdDuration::from_secs(30));
        assert_eq!(cfg.store.timeout(), StdDuration::from_millis(800));
    }

    #[test]
    fn default_ttl_must_fit_max() {
        let mut cfg = HandoffConfig::default();
        cfg.mint.default_ttl_secs = cfg.mint.max_ttl_secs + 1;
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err, HandoffError::Configuration(ref m) if m.contains("default_ttl")));
    }

    #[test]
    fn oversized_ttls_rejected() {
        let mut cfg = HandoffConfig::default();
        cfg.mint.max_ttl_secs = i64::MAX;
        cfg.mint.default_ttl_secs = i64::MAX;
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err, HandoffError::Configuration(ref m) if m.contains("max_ttl_secs")));

        let mut cfg = HandoffConfig::default();
        cfg.mint.max_ttl_secs = constants::MAX_TTL_SECS_CEILING;
        assert!(cfg.validate().is_ok());

        let mut cfg = HandoffConfig::default();
        cfg.claim.failed_claim_window_secs = i64::MAX;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn unbounded_claim_monitor_rejected() {
        let mut cfg = HandoffConfig::default();
        cfg.claim.max_tracked_tokens = 0;
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err, HandoffError::Configuration(ref m) if m.contains("max_tracked_tokens")));
    }

    #[test]
    fn ttl_helpers_saturate_instead_of_panicking() {
        let mint = MintConfig {
            max_ttl_secs: i64::MAX,
            default_ttl_secs: i64::MAX,
            ..MintConfig::default()
        };
        assert_eq!(mint.max_ttl(), Duration::MAX);
        assert_eq!(mint.default_ttl(), Duration::MAX);
    }

    #[test]
    fn zero_limits_rejected() {
        let mut cfg = HandoffConfig::default();
        cfg.reaper.batch_limit = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = HandoffConfig::default();
        cfg.store.timeout_ms = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn enum_names_parse() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("channel".parse::<AuditSinkKind>().unwrap(), AuditSinkKind::Channel);
        assert!("syslog".parse::<AuditSinkKind>().is_err());
    }

    #[test]
    fn partial_json_uses_defaults() {
        let cfg: HandoffConfig =
            serde_json::from_str(r#"{"reaper":{"interval_secs":5},"log":{"format":"json"}}"#)
                .unwrap();
        assert_eq!(cfg.reaper.interval_secs, 5);
        assert_eq!(cfg.reaper.batch_limit, constants::DEFAULT_REAPER_BATCH_LIMIT);
        assert_eq!(cfg.log.format, LogFormat::Json);
        assert_eq!(cfg.mint, MintConfig::default());
    }
}
