//! Summarizes a recorded experiment.

use anyhow::{Context, Result};
use clap::Parser;
use imu_acquire::load_session;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "inspect", version, about = "Summarize a recorded IMU session")]
struct Cli {
    /// Experiment name, or a path to an experiment directory
    experiment: String,

    /// Directory holding the experiments
    #[arg(long, default_value = "experiments")]
    experiments_dir: PathBuf,

    /// Nominal rate used to count gaps when the session has no manifest
    #[arg(short, long, default_value_t = 1000.0)]
    rate: f64,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let dir = {
        let direct = PathBuf::from(&cli.experiment);
        if direct.is_dir() {
            direct
        } else {
            cli.experiments_dir.join(&cli.experiment)
        }
    };
    let session = load_session(&dir).with_context(|| format!("Failed to load {}", dir.display()))?;
    let record = &session.record;

    let rate = session
        .manifest
        .as_ref()
        .map(|m| m.config.target_rate())
        .unwrap_or(cli.rate);
    let period = 1.0 / rate;

    println!("Experiment: {}", session.path.display());
    if let Some(manifest) = &session.manifest {
        println!("Recorded:   {}", manifest.created_at);
        println!("Ended by:   {:?}", manifest.termination);
        println!(
            "Skipped:    {} cycles ({} timeouts, {} disconnects, {} malformed)",
            manifest.stats.skipped_cycles,
            manifest.stats.skips.timeout,
            manifest.stats.skips.transport_disconnected,
            manifest.stats.skips.malformed_reading,
        );
    }
    println!("Samples:    {}", record.len());
    match record.effective_rate() {
        Some(effective) => println!("Rate:       {:.2} Hz (target {:.2} Hz)", effective, rate),
        None => println!("Rate:       n/a (target {:.2} Hz)", rate),
    }
    println!(
        "Gaps:       {} intervals over {:.3} ms, longest {:.3} ms",
        record.gap_count(period),
        period * 1.5 * 1e3,
        record.max_interval().unwrap_or(0.0) * 1e3,
    );

    println!();
    println!("{:<20} {:>12} {:>12} {:>12}", "channel", "mean x", "mean y", "mean z");
    for column in record.channels() {
        match column.mean() {
            Some(m) => println!("{:<20} {:>12.4} {:>12.4} {:>12.4}", column.name(), m.x, m.y, m.z),
            None => println!("{:<20} {:>12} {:>12} {:>12}", column.name(), "-", "-", "-"),
        }
    }
    Ok(())
}
