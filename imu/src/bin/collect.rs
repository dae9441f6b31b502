//! Records one experiment from the bench IMUs into `experiments/<name>/`.

use anyhow::{Context, Result};
use clap::Parser;
use imu_acquire::session::default_experiment_name;
use imu_acquire::{
    AcquisitionConfig, AcquisitionScheduler, ManualClock, RigConfig, SessionRecord, SessionWriter,
    SimulatedImu, StopSignal, Termination,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "collect", version, about = "Record a fixed-rate multi-IMU session")]
struct Cli {
    /// Experiment name [default: experiment_<date>_<time>]
    name: Option<String>,

    /// Session length in seconds [default: 10]
    #[arg(short, long)]
    duration: Option<f64>,

    /// Target sample rate in Hz [default: 1000]
    #[arg(short, long)]
    rate: Option<f64>,

    /// Buffer headroom over the nominal sample count [default: 1.1]
    #[arg(long)]
    safety_factor: Option<f64>,

    /// Hard cap on stored samples, overriding the derived capacity
    #[arg(long)]
    max_samples: Option<usize>,

    /// Rig description (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Seconds to wait after the sensors are up [default: 5]
    #[arg(long)]
    countdown: Option<u64>,

    /// Drive the controller's motor channel at this level (0.0 to 1.0) while recording
    #[arg(long)]
    motor_power: Option<f32>,

    /// Record from simulated sensors on a virtual clock
    #[arg(long)]
    simulate: bool,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only warnings and errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    let rig_config = match &cli.config {
        Some(path) => RigConfig::load(path)?,
        None => RigConfig::default(),
    };
    let config = acquisition_config(&cli, &rig_config)?;

    let writer = SessionWriter::new(&rig_config.acquisition.experiments_dir);
    let name = cli.name.clone().unwrap_or_else(default_experiment_name);
    let target = writer.reserve(&name)?;
    info!(
        experiment = %name,
        rate_hz = config.target_rate(),
        duration_s = config.duration_secs(),
        capacity = config.max_samples(),
        "Preparing session"
    );

    let stop = StopSignal::new();
    let handler_stop = stop.clone();
    ctrlc::set_handler(move || handler_stop.request_stop()).context("Failed to install Ctrl+C handler")?;

    let record = if cli.simulate {
        run_simulated(config, stop)?
    } else {
        run_rig(&cli, &rig_config, config, stop)?
    };

    if record.stopped_before_first_sample() {
        warn!(experiment = %name, "Stopped before the first sample, nothing saved");
        return Ok(());
    }

    report(&record, &config);
    let path = writer
        .write(&target, &record, &config)
        .with_context(|| format!("Failed to save experiment '{}'", name))?;
    println!("Saved {} samples to {}", record.len(), path.display());
    Ok(())
}

fn init_logging(cli: &Cli) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if cli.quiet {
        EnvFilter::new("warn")
    } else {
        let default_level = match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;
    Ok(())
}

/// Command-line values win over the rig file.
fn acquisition_config(cli: &Cli, rig: &RigConfig) -> Result<AcquisitionConfig> {
    let mut config = AcquisitionConfig::new(
        cli.rate.unwrap_or(rig.acquisition.target_rate),
        cli.duration.unwrap_or(rig.acquisition.duration),
    )?
    .with_safety_factor(cli.safety_factor.unwrap_or(rig.acquisition.safety_factor))?;
    if let Some(max_samples) = cli.max_samples {
        config = config.with_max_samples(max_samples)?;
    }
    Ok(config)
}

fn run_simulated(config: AcquisitionConfig, stop: StopSignal) -> Result<SessionRecord> {
    let clock = ManualClock::new();
    let mut sources = vec![
        SimulatedImu::full("external", clock.clone()).with_latency(Duration::from_micros(150)),
        SimulatedImu::full("internal", clock.clone()).with_latency(Duration::from_micros(350)),
    ];
    info!("Recording from simulated sensors");
    let scheduler = AcquisitionScheduler::with_clock(config, clock).with_stop_signal(stop);
    Ok(scheduler.run(&mut sources)?)
}

#[cfg(target_os = "linux")]
fn run_rig(
    cli: &Cli,
    rig_config: &RigConfig,
    config: AcquisitionConfig,
    stop: StopSignal,
) -> Result<SessionRecord> {
    use imu_acquire::Rig;

    let mut rig = Rig::open(rig_config)?;

    let countdown = cli.countdown.unwrap_or(rig_config.acquisition.countdown);
    for remaining in (1..=countdown).rev() {
        if stop.is_requested() {
            break;
        }
        info!("Starting in {}...", remaining);
        std::thread::sleep(Duration::from_secs(1));
    }

    // A stop during the countdown still runs the scheduler, which returns an
    // empty record straight away, but the motor stays off.
    let motor_on = match cli.motor_power {
        Some(_) if stop.is_requested() => {
            info!("Stopped during countdown, motor left off");
            false
        }
        Some(level) => {
            rig.set_motor_power(level)?;
            true
        }
        None => false,
    };

    let scheduler = AcquisitionScheduler::new(config).with_stop_signal(stop);
    let result = {
        let mut sources = rig.sources();
        scheduler.run(&mut sources)
    };

    if motor_on {
        if let Err(e) = rig.set_motor_power(0.0) {
            warn!(error = %e, "Failed to switch motor power off");
        }
    }

    Ok(result?)
}

#[cfg(not(target_os = "linux"))]
fn run_rig(
    _cli: &Cli,
    _rig_config: &RigConfig,
    _config: AcquisitionConfig,
    _stop: StopSignal,
) -> Result<SessionRecord> {
    anyhow::bail!("the sensor rig is only supported on Linux; use --simulate")
}

fn report(record: &SessionRecord, config: &AcquisitionConfig) {
    let stats = record.stats();
    info!(
        samples = record.len(),
        nominal = config.nominal_samples(),
        skipped = stats.skipped_cycles,
        late = stats.late_cycles,
        effective_rate_hz = record.effective_rate().unwrap_or(0.0),
        termination = ?record.termination(),
        "Session finished"
    );
    if record.len() < config.nominal_samples() && record.termination() == Termination::NormalCompletion {
        warn!(
            missing = config.nominal_samples() - record.len(),
            "Collected fewer samples than scheduled"
        );
    }
}
