//! # Configuration System
//!
//! Configuration for the capture engine, its bot scheduler, the simulated
//! sensors and the processing service.
//!
//! This crate provides:
//! - Configuration structures with documented defaults
//! - Configuration file loading (TOML/YAML)
//! - Environment variable overrides (`KZ_*`)
//! - Validation through the `validator` crate
//!
//! Precedence, lowest first: defaults, file, environment.

pub mod config;
pub mod file_loader;
pub mod loader;
pub mod validation;

pub use config::{
    BotConfig, CaptureConfig, ObservabilityConfig, ProverConfig, SensorConfig, WindowConfig,
};
pub use file_loader::{ConfigFileError, load_from_file, load_from_toml, load_from_yaml};
pub use loader::{ConfigError, apply_env_overrides, load};
pub use validation::validate;
