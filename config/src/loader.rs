//! # Layered Loader
//!
//! Builds the effective configuration from defaults, an optional file and
//! `KZ_*` environment variables, then validates it.
//!
//! # Environment Variables
//! - `KZ_RING_CAPACITY`: Fused readings retained for pre-roll
//! - `KZ_PRE_ROLL_MS`: Pre-roll duration in milliseconds
//! - `KZ_RETAIN_WHILE_IDLE`: Keep listeners registered between sessions (true/false)
//! - `KZ_BOT_MIN_DELAY_MS` / `KZ_BOT_MAX_DELAY_MS`: Bot jitter bounds
//! - `KZ_BOT_HOLD_MS`: Bot down/up hold
//! - `KZ_KEY_PATH`: Key material document
//! - `KZ_LOG_LEVEL`: Logging level (trace/debug/info/warn/error)
//! - `KZ_METRICS_ENABLED`: Enable metrics (true/false)

use crate::config::CaptureConfig;
use crate::file_loader::{ConfigFileError, load_from_file};
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use validator::Validate;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    File(#[from] ConfigFileError),

    #[error("Invalid value for {key}: {value:?}")]
    InvalidEnv { key: String, value: String },

    #[error("Invalid configuration: {0}")]
    Validation(#[from] validator::ValidationErrors)
}

/// Load the effective configuration.
///
/// ## Usage
/// ```rust,no_run
/// use config::load;
/// use std::path::Path;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = load(Some(Path::new("kinetizk.toml")))?;
///     println!("Hold: {}ms", config.bot.hold_ms);
///     Ok(())
/// }
/// ```
pub fn load(path: Option<&Path>) -> Result<CaptureConfig, ConfigError> {
    let base = match path {
        Some(path) => load_from_file(path)?,
        None => CaptureConfig::default()
    };

    let config = apply_env_overrides(base)?;
    config.validate()?;

    tracing::debug!(
        ring_capacity = config.window.ring_capacity,
        pre_roll_ms = config.window.pre_roll_ms,
        "Configuration loaded"
    );
    Ok(config)
}

/// Apply `KZ_*` overrides on top of `config`.
///
/// Unset variables leave the field untouched; set but unparsable variables
/// are an error rather than a silent fallback.
pub fn apply_env_overrides(mut config: CaptureConfig) -> Result<CaptureConfig, ConfigError> {
    override_from_env("KZ_RING_CAPACITY", &mut config.window.ring_capacity)?;
    override_from_env("KZ_PRE_ROLL_MS", &mut config.window.pre_roll_ms)?;
    override_from_env("KZ_RETAIN_WHILE_IDLE", &mut config.window.retain_while_idle)?;
    override_from_env("KZ_BOT_MIN_DELAY_MS", &mut config.bot.min_delay_ms)?;
    override_from_env("KZ_BOT_MAX_DELAY_MS", &mut config.bot.max_delay_ms)?;
    override_from_env("KZ_BOT_HOLD_MS", &mut config.bot.hold_ms)?;
    override_from_env("KZ_METRICS_ENABLED", &mut config.observability.metrics_enabled)?;

    if let Ok(path) = env::var("KZ_KEY_PATH") {
        config.prover.key_path = PathBuf::from(path);
    }
    if let Ok(level) = env::var("KZ_LOG_LEVEL") {
        config.observability.logging_level = level.to_lowercase();
    }

    Ok(config)
}

fn override_from_env<T: FromStr>(key: &str, target: &mut T) -> Result<(), ConfigError> {
    match env::var(key) {
        Ok(value) => {
            *target = value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnv {
                key: key.to_string(),
                value: value.clone()
            })?;
            Ok(())
        }
        Err(_) => Ok(())
    }
}
