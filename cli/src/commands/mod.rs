pub mod bot;
pub mod demo;
pub mod keys;

use anyhow::{Context, Result};
use capture::{CaptureSession, Excitation, SensorClock, SimulatedImu};
use clap::{Parser, Subcommand};
use config::CaptureConfig;
use kz_core::ProcessingService;
use prover::DigestProver;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(
    name = "kinetizk",
    author,
    version,
    about = "KinetiZK - touch-triggered motion capture with proof generation",
    long_about = "Captures a window of fused accelerometer/gyroscope readings around each tap, \
                  including a short pre-roll before the touch, and runs it through feature \
                  extraction, scoring, proof generation and verification.\n\nSensors are \
                  simulated; the processing backend is the local digest prover."
)]
pub struct Cli {
    #[arg(long, global = true, env = "KZ_CONFIG", help = "Configuration file (.toml, .yaml, .yml)")]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, help = "Output as JSON")]
    pub json: bool,

    #[arg(long, global = true, help = "Print collected metrics on exit")]
    pub metrics: bool,

    #[command(subcommand)]
    pub command: Commands
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(subcommand, about = "Generate and check proving/verifying key material")]
    Keys(keys::KeysCommand),

    #[command(about = "Run genuine taps against simulated sensors")]
    Demo(demo::DemoArgs),

    #[command(about = "Run the synthetic tap scheduler")]
    Bot(bot::BotArgs)
}

/// A capture session over simulated sensors and an initialized digest prover.
pub struct Rig {
    pub session: Arc<CaptureSession>,
    pub excitation: Arc<Excitation>
}

pub fn build_rig(config: &CaptureConfig, key_path: Option<&PathBuf>) -> Result<Rig> {
    let key_path = key_path.unwrap_or(&config.prover.key_path);
    let keys = prover::load_keys(key_path)
        .with_context(|| format!("Failed to load key material from {}", key_path.display()))?;

    let service = Arc::new(DigestProver::new());
    service
        .initialize(&keys)
        .context("Failed to initialize processing service")?;

    let clock = SensorClock::new();
    let excitation = Arc::new(Excitation::new());
    let sources = SimulatedImu::pair(&config.sensors, clock, Arc::clone(&excitation));
    let session = CaptureSession::new(config, service, sources, clock)?;

    Ok(Rig {
        session,
        excitation
    })
}
