use anyhow::{Result, anyhow};
use capture::SessionEvent;
use colored::Colorize;
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};

pub fn header(title: &str) {
    println!("{}", title.bold().underline());
}

pub fn info(msg: &str) {
    eprintln!("{} {}", "info:".blue().bold(), msg);
}

pub fn warn(msg: &str) {
    eprintln!("{} {}", "warning:".yellow().bold(), msg);
}

fn short_id(id: &impl std::fmt::Display) -> String {
    id.to_string().chars().take(8).collect()
}

/// Prints one session event: a JSON line with `--json`, otherwise a short
/// human-readable line.
pub fn print_event(event: &SessionEvent, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(event)?);
        return Ok(());
    }

    match event {
        SessionEvent::Started { ticket } => {
            println!(
                "{} session {} ({})",
                "▶".dimmed(),
                short_id(&ticket.id),
                ticket.origin.as_str()
            );
        }
        SessionEvent::Ignored { origin, active } => {
            println!(
                "{}",
                format!(
                    "· {} tap ignored, session {} in progress",
                    origin.as_str(),
                    short_id(&active.id)
                )
                .dimmed()
            );
        }
        SessionEvent::BotTap { tap } => {
            println!(
                "{}",
                format!("· bot tap at ({:.0}, {:.0})", tap.x, tap.y).dimmed()
            );
        }
        SessionEvent::Failed {
            ticket,
            stage,
            message
        } => {
            warn(&format!("session {} {stage}: {message}", short_id(&ticket.id)));
        }
        SessionEvent::Finished {
            ticket,
            outcome,
            elapsed_ms
        } => {
            let mark = if outcome.verified {
                "✓".green().bold()
            } else {
                "✗".red().bold()
            };
            let class = if outcome.is_legitimate() {
                "legitimate".green()
            } else {
                "synthetic".yellow()
            };
            println!(
                "{mark} session {} {class} (class {}) score {:.3} proof {} bytes in {elapsed_ms} ms",
                short_id(&ticket.id),
                outcome.classification,
                outcome.score,
                outcome.proof.len()
            );
        }
    }
    Ok(())
}

/// Installs an in-process recorder whose contents are printed on exit.
pub fn install_metrics() -> Result<Snapshotter> {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .map_err(|_| anyhow!("A metrics recorder is already installed"))?;
    Ok(snapshotter)
}

pub fn print_metrics(snapshotter: &Snapshotter, json: bool) -> Result<()> {
    let mut rows: Vec<(String, serde_json::Value)> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(key, _, _, value)| {
            let key = key.key();
            let labels: Vec<String> = key
                .labels()
                .map(|l| format!("{}={}", l.key(), l.value()))
                .collect();
            let name = if labels.is_empty() {
                key.name().to_string()
            } else {
                format!("{}{{{}}}", key.name(), labels.join(","))
            };
            let value = match value {
                DebugValue::Counter(n) => serde_json::json!(n),
                DebugValue::Gauge(g) => serde_json::json!(g.0),
                DebugValue::Histogram(samples) => {
                    let count = samples.len();
                    let mean = if count == 0 {
                        0.0
                    } else {
                        samples.iter().map(|s| s.0).sum::<f64>() / count as f64
                    };
                    serde_json::json!({ "count": count, "mean": mean })
                }
            };
            (name, value)
        })
        .collect();
    rows.sort_by(|a, b| a.0.cmp(&b.0));

    if json {
        let map: serde_json::Map<String, serde_json::Value> = rows.into_iter().collect();
        println!("{}", serde_json::to_string(&serde_json::json!({ "metrics": map }))?);
        return Ok(());
    }

    println!();
    header("Metrics");
    for (name, value) in rows {
        println!("  {name} {value}");
    }
    Ok(())
}
