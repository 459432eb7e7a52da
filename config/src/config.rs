//! # Configuration Structures
//!
//! All configuration structures:
//! - Use `serde` for serialization/deserialization with per-field defaults
//! - Use `validator` for range and cross-field checks

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use validator::Validate;

/// Top-level configuration for a capture deployment.
///
/// ## Usage
/// ```rust,no_run
/// use config::CaptureConfig;
///
/// let config = CaptureConfig::default();
/// println!("Pre-roll: {}ms", config.window.pre_roll_ms);
/// ```
///
/// ## Fields
/// - `window`: Ring buffer and pre-roll settings
/// - `bot`: Synthetic trigger scheduler settings
/// - `sensors`: Simulated sensor stream settings
/// - `prover`: Key material location
/// - `observability`: Logging and metrics
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default, PartialEq)]
pub struct CaptureConfig {
    #[serde(default)]
    #[validate(nested)]
    pub window: WindowConfig,

    #[serde(default)]
    #[validate(nested)]
    pub bot: BotConfig,

    #[serde(default)]
    #[validate(nested)]
    pub sensors: SensorConfig,

    #[serde(default)]
    pub prover: ProverConfig,

    #[serde(default)]
    #[validate(nested)]
    pub observability: ObservabilityConfig
}

/// Window assembly configuration.
///
/// ## Fields
/// - `ring_capacity`: Fused readings retained for pre-roll (default: 300)
/// - `pre_roll_ms`: History replayed before the trigger timestamp (default: 50)
/// - `retain_while_idle`: Keep sensor listeners registered between sessions
///   so the history keeps filling (default: true)
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct WindowConfig {
    #[serde(default = "default_ring_capacity")]
    #[validate(range(min = 1, max = 100000))]
    pub ring_capacity: usize,

    #[serde(default = "default_pre_roll_ms")]
    #[validate(range(max = 10000))]
    pub pre_roll_ms: u64,

    #[serde(default = "default_retain_while_idle")]
    pub retain_while_idle: bool
}

fn default_ring_capacity() -> usize {
    300
}

fn default_pre_roll_ms() -> u64 {
    50
}

fn default_retain_while_idle() -> bool {
    true
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            ring_capacity: default_ring_capacity(),
            pre_roll_ms: default_pre_roll_ms(),
            retain_while_idle: default_retain_while_idle()
        }
    }
}

impl WindowConfig {
    pub fn pre_roll_ns(&self) -> i64 {
        (self.pre_roll_ms as i64).saturating_mul(1_000_000)
    }
}

/// Bot-mode scheduler configuration.
///
/// ## Fields
/// - `min_delay_ms` / `max_delay_ms`: Jitter bounds between taps (600 / 1300)
/// - `hold_ms`: Delay between synthetic down and up (default: 70)
/// - `vertical_fraction`: Share of the surface height taps may land in
///   (default: 2/3, measured from the top)
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
#[validate(schema(function = "validate_bot_delays"))]
pub struct BotConfig {
    #[serde(default = "default_bot_min_delay_ms")]
    #[validate(range(min = 1))]
    pub min_delay_ms: u64,

    #[serde(default = "default_bot_max_delay_ms")]
    #[validate(range(min = 1))]
    pub max_delay_ms: u64,

    #[serde(default = "default_bot_hold_ms")]
    #[validate(range(max = 10000))]
    pub hold_ms: u64,

    #[serde(default = "default_vertical_fraction")]
    #[validate(range(min = 0.01, max = 1.0))]
    pub vertical_fraction: f64
}

fn default_bot_min_delay_ms() -> u64 {
    600
}

fn default_bot_max_delay_ms() -> u64 {
    1300
}

fn default_bot_hold_ms() -> u64 {
    70
}

fn default_vertical_fraction() -> f64 {
    2.0 / 3.0
}

fn validate_bot_delays(config: &BotConfig) -> Result<(), validator::ValidationError> {
    if config.min_delay_ms > config.max_delay_ms {
        return Err(validator::ValidationError::new(
            "min_delay_ms must not exceed max_delay_ms"
        ));
    }
    Ok(())
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: default_bot_min_delay_ms(),
            max_delay_ms: default_bot_max_delay_ms(),
            hold_ms: default_bot_hold_ms(),
            vertical_fraction: default_vertical_fraction()
        }
    }
}

/// Simulated sensor configuration, used when no hardware source is wired in.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct SensorConfig {
    /// Nominal accelerometer period in microseconds.
    #[serde(default = "default_accel_period_us")]
    #[validate(range(min = 100, max = 1000000))]
    pub accel_period_us: u64,

    /// Nominal gyroscope period in microseconds.
    #[serde(default = "default_gyro_period_us")]
    #[validate(range(min = 100, max = 1000000))]
    pub gyro_period_us: u64,

    /// Relative period jitter, 0 for a periodic stream.
    #[serde(default = "default_period_jitter")]
    #[validate(range(min = 0.0, max = 0.9))]
    pub period_jitter: f64,

    /// Peak amplitude of the simulated per-axis noise.
    #[serde(default = "default_noise_amplitude")]
    #[validate(range(min = 0.0))]
    pub noise_amplitude: f64
}

fn default_accel_period_us() -> u64 {
    2_500
}

fn default_gyro_period_us() -> u64 {
    2_500
}

fn default_period_jitter() -> f64 {
    0.2
}

fn default_noise_amplitude() -> f64 {
    0.05
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            accel_period_us: default_accel_period_us(),
            gyro_period_us: default_gyro_period_us(),
            period_jitter: default_period_jitter(),
            noise_amplitude: default_noise_amplitude()
        }
    }
}

/// Processing service configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProverConfig {
    /// JSON document holding `proving_key_base64` and `verifying_key_base64`.
    #[serde(default = "default_key_path")]
    pub key_path: PathBuf
}

fn default_key_path() -> PathBuf {
    PathBuf::from("kinetizk_keys.json")
}

impl Default for ProverConfig {
    fn default() -> Self {
        Self {
            key_path: default_key_path()
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct ObservabilityConfig {
    #[serde(default = "default_logging_level")]
    #[validate(custom(function = "validate_logging_level"))]
    pub logging_level: String,

    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool
}

fn default_logging_level() -> String {
    "info".to_string()
}

fn default_metrics_enabled() -> bool {
    true
}

fn validate_logging_level(value: &str) -> Result<(), validator::ValidationError> {
    match value {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(validator::ValidationError::new("Invalid logging level"))
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            logging_level: default_logging_level(),
            metrics_enabled: default_metrics_enabled()
        }
    }
}
