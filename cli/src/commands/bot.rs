use super::build_rig;
use crate::output;
use anyhow::Result;
use clap::Args;
use config::CaptureConfig;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

#[derive(Args)]
pub struct BotArgs {
    #[arg(long, default_value_t = 10, help = "Seconds to run before stopping")]
    pub seconds: u64,

    #[arg(long, help = "Key document path (defaults to prover.key_path)")]
    pub keys: Option<PathBuf>
}

pub async fn run(args: BotArgs, config: &CaptureConfig, json: bool) -> Result<()> {
    let rig = build_rig(config, args.keys.as_ref())?;
    let mut events = rig.session.subscribe();

    if !json {
        output::header(&format!("Bot mode for {}s", args.seconds));
    }
    rig.session.set_synthetic_mode(true)?;

    let deadline = tokio::time::sleep(Duration::from_secs(args.seconds));
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => {
                output::info("Interrupted");
                break;
            }
            event = events.recv() => match event {
                Ok(event) => output::print_event(&event, json)?,
                Err(RecvError::Lagged(skipped)) => {
                    output::warn(&format!("{skipped} events dropped"));
                }
                Err(RecvError::Closed) => break
            }
        }
    }

    rig.session.shutdown().await?;
    while let Ok(event) = events.try_recv() {
        output::print_event(&event, json)?;
    }
    Ok(())
}
