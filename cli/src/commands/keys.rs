use anyhow::{Result, bail};
use clap::{Args, Subcommand};
use colored::Colorize;
use config::CaptureConfig;
use std::path::PathBuf;

const DEFAULT_KEY_LEN: usize = 32;

#[derive(Subcommand)]
pub enum KeysCommand {
    #[command(about = "Write a fresh random key document")]
    Generate(GenerateArgs),

    #[command(about = "Load and validate a key document")]
    Check(CheckArgs)
}

#[derive(Args)]
pub struct GenerateArgs {
    #[arg(long, help = "Output path (defaults to prover.key_path)")]
    pub out: Option<PathBuf>,

    #[arg(long, default_value_t = DEFAULT_KEY_LEN, help = "Bytes per key")]
    pub len: usize,

    #[arg(long, help = "Overwrite an existing file")]
    pub force: bool
}

#[derive(Args)]
pub struct CheckArgs {
    #[arg(long, help = "Key document path (defaults to prover.key_path)")]
    pub path: Option<PathBuf>
}

pub fn run(cmd: KeysCommand, config: &CaptureConfig, json: bool) -> Result<()> {
    match cmd {
        KeysCommand::Generate(args) => generate(args, config, json),
        KeysCommand::Check(args) => check(args, config, json)
    }
}

fn generate(args: GenerateArgs, config: &CaptureConfig, json: bool) -> Result<()> {
    let out = args.out.unwrap_or_else(|| config.prover.key_path.clone());
    if args.len == 0 {
        bail!("--len must be at least 1");
    }
    if out.exists() && !args.force {
        bail!("{} already exists (use --force to overwrite)", out.display());
    }

    let keys = prover::generate_keys(args.len);
    prover::write_keys(&out, &keys)?;
    tracing::info!(path = %out.display(), "Key material written");

    if json {
        let output = serde_json::json!({
            "path": out.display().to_string(),
            "key_bytes": args.len
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!(
            "{} Wrote {}-byte keys to {}",
            "✓".green().bold(),
            args.len,
            out.display()
        );
    }
    Ok(())
}

fn check(args: CheckArgs, config: &CaptureConfig, json: bool) -> Result<()> {
    let path = args.path.unwrap_or_else(|| config.prover.key_path.clone());
    let keys = prover::load_keys(&path)?;

    if json {
        let output = serde_json::json!({
            "path": path.display().to_string(),
            "valid": true,
            "proving_key_bytes": keys.proving_key.len(),
            "verifying_key_bytes": keys.verifying_key.len()
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("{} {}", "✓".green().bold(), path.display());
        println!("  proving key:   {} bytes", keys.proving_key.len());
        println!("  verifying key: {} bytes", keys.verifying_key.len());
    }
    Ok(())
}
