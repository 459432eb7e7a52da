use super::build_rig;
use crate::output;
use anyhow::Result;
use capture::{PointerAction, PointerEvent, PointerTrigger, SurfaceBounds};
use clap::Args;
use config::CaptureConfig;
use std::path::PathBuf;
use std::time::Duration;

/// Motion burst applied to the simulated sensors while a genuine tap is held.
const TAP_AMPLITUDE: f64 = 2.5;

#[derive(Args)]
pub struct DemoArgs {
    #[arg(long, default_value_t = 5, help = "Number of taps")]
    pub taps: u32,

    #[arg(long, default_value_t = 120, help = "Milliseconds each tap is held")]
    pub hold_ms: u64,

    #[arg(long, default_value_t = 400, help = "Milliseconds between taps")]
    pub gap_ms: u64,

    #[arg(long, help = "Tap without moving the device")]
    pub still: bool,

    #[arg(long, help = "Key document path (defaults to prover.key_path)")]
    pub keys: Option<PathBuf>
}

pub async fn run(args: DemoArgs, config: &CaptureConfig, json: bool) -> Result<()> {
    let rig = build_rig(config, args.keys.as_ref())?;
    let mut events = rig.session.subscribe();
    let pointer = PointerTrigger::new(rig.session.clone(), rig.session.clock());
    let surface = SurfaceBounds::default();
    let hold = Duration::from_millis(args.hold_ms);
    let gap = Duration::from_millis(args.gap_ms);

    if !json {
        output::header(&format!("Demo: {} genuine taps", args.taps));
    }

    // Let the history fill so the first tap gets its pre-roll.
    tokio::time::sleep(gap).await;

    for _ in 0..args.taps {
        let (x, y) = surface.sample(1.0);
        if !args.still {
            let now = rig.session.clock().now_ns();
            let hold_ns = i64::try_from(hold.as_nanos()).unwrap_or(i64::MAX);
            rig.excitation
                .excite(now.saturating_add(hold_ns), TAP_AMPLITUDE);
        }

        pointer
            .handle(PointerEvent::now(PointerAction::Down, x, y))
            .await?;
        tokio::time::sleep(hold).await;
        pointer
            .handle(PointerEvent::now(PointerAction::Up, x, y))
            .await?;

        while let Ok(event) = events.try_recv() {
            output::print_event(&event, json)?;
        }
        tokio::time::sleep(gap).await;
    }

    rig.session.shutdown().await?;
    while let Ok(event) = events.try_recv() {
        output::print_event(&event, json)?;
    }
    Ok(())
}
