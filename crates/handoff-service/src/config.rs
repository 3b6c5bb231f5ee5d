//! Configuration loading: TOML file, then `HANDOFF_*` environment overrides,
//! then validation.

use std::path::Path;
use std::str::FromStr;

use handoff_types::{HandoffConfig, HandoffError, Result, constants::ENV_PREFIX};

/// Parse configuration from a TOML string. Missing sections use defaults.
pub fn from_toml_str(s: &str) -> Result<HandoffConfig> {
    toml::from_str(s).map_err(|e| HandoffError::Configuration(e.to_string()))
}

/// Load configuration from a TOML file.
pub fn from_toml_file(path: impl AsRef<Path>) -> Result<HandoffConfig> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .map_err(|e| HandoffError::Configuration(format!("{}: {e}", path.display())))?;
    from_toml_str(&content)
}

/// Serialize the configuration to TOML.
pub fn to_toml_string(config: &HandoffConfig) -> Result<String> {
    toml::to_string_pretty(config).map_err(|e| HandoffError::Configuration(e.to_string()))
}

fn parse<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| HandoffError::Configuration(format!("{key}={value:?}: {e}")))
}

/// Apply `HANDOFF_<SECTION>_<FIELD>` overrides from `vars`.
///
/// Unknown `HANDOFF_` keys are logged and ignored; other keys are skipped.
pub fn apply_env_overrides<I, K, V>(config: &mut HandoffConfig, vars: I) -> Result<()>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    for (key, value) in vars {
        let key = key.as_ref();
        let value = value.as_ref();
        let Some(name) = key.strip_prefix(ENV_PREFIX) else {
            continue;
        };
        match name {
            "MINT_MAX_PAYLOAD_BYTES" => config.mint.max_payload_bytes = parse(key, value)?,
            "MINT_MAX_TTL_SECS" => config.mint.max_ttl_secs = parse(key, value)?,
            "MINT_DEFAULT_TTL_SECS" => config.mint.default_ttl_secs = parse(key, value)?,
            "MINT_MAX_ESCROW_PARTICIPANTS" => {
                config.mint.max_escrow_participants = parse(key, value)?;
            }
            "CLAIM_FAILED_CLAIM_THRESHOLD" => {
                config.claim.failed_claim_threshold = parse(key, value)?;
            }
            "CLAIM_FAILED_CLAIM_WINDOW_SECS" => {
                config.claim.failed_claim_window_secs = parse(key, value)?;
            }
            "CLAIM_MAX_TRACKED_TOKENS" => config.claim.max_tracked_tokens = parse(key, value)?,
            "REAPER_ENABLED" => config.reaper.enabled = parse(key, value)?,
            "REAPER_INTERVAL_SECS" => config.reaper.interval_secs = parse(key, value)?,
            "REAPER_BATCH_LIMIT" => config.reaper.batch_limit = parse(key, value)?,
            "REAPER_MAX_BATCHES_PER_SWEEP" => {
                config.reaper.max_batches_per_sweep = parse(key, value)?;
            }
            "STORE_TIMEOUT_MS" => config.store.timeout_ms = parse(key, value)?,
            "CACHE_STATUS_CAPACITY" => config.cache.status_capacity = parse(key, value)?,
            "AUDIT_SINK" => config.audit.sink = parse(key, value)?,
            "AUDIT_CHANNEL_CAPACITY" => config.audit.channel_capacity = parse(key, value)?,
            "LOG_LEVEL" => config.log.level = value.trim().to_owned(),
            "LOG_FORMAT" => config.log.format = parse(key, value)?,
            _ => tracing::warn!(key, "ignoring unknown configuration override"),
        }
    }
    Ok(())
}

/// Defaults (or `path`), overridden by the process environment, validated.
pub fn load(path: Option<&Path>) -> Result<HandoffConfig> {
    let mut config = match path {
        Some(path) => from_toml_file(path)?,
        None => HandoffConfig::default(),
    };
    apply_env_overrides(&mut config, std::env::vars())?;
    config.validate()?;
    Ok(config)
}
