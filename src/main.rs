use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use log::{info, warn};
use tokio::sync::mpsc;

use workout_tracker_rs::dashboard;
use workout_tracker_rs::fix_source::NdjsonSource;
use workout_tracker_rs::runner::{
    block_on_with_grace, run_session, spawn_source_pump, RunnerOptions,
};
use workout_tracker_rs::{TrackerConfig, WorkoutTracker};

#[derive(Parser, Debug)]
#[command(name = "workout_tracker")]
#[command(about = "Live workout tracking from a stream of GPS fixes", long_about = None)]
struct Args {
    /// NDJSON file of fixes, one per line (default: stdin)
    #[arg(long)]
    input: Option<PathBuf>,

    /// JSON config file; flags below override individual fields
    #[arg(long)]
    config: Option<PathBuf>,

    /// User weight in kg
    #[arg(long)]
    weight: Option<f32>,

    /// Refresh tick in milliseconds
    #[arg(long)]
    tick_ms: Option<u64>,

    /// Output directory for live status files
    #[arg(long, default_value = "workout_sessions")]
    output_dir: PathBuf,

    /// Serve the live dashboard on this port
    #[arg(long)]
    dashboard_port: Option<u16>,
}

fn build_config(args: &Args) -> Result<TrackerConfig> {
    let mut config = match args.config.as_ref() {
        Some(path) => TrackerConfig::load(path)?,
        None => TrackerConfig::default(),
    };
    if let Some(weight) = args.weight {
        config.user_weight_kg = weight;
    }
    if let Some(tick_ms) = args.tick_ms {
        config.tick_interval_ms = tick_ms;
    }
    config.validate()?;
    Ok(config)
}

/// Grace period for the fix reader when the session ends first
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let config = build_config(&args)?;
    block_on_with_grace(run(args, config), SHUTDOWN_GRACE)?
}

async fn run(args: Args, config: TrackerConfig) -> Result<()> {
    info!("[{}] Workout Tracker starting", Utc::now().format("%H:%M:%S"));
    info!("  Weight: {:.1} kg", config.user_weight_kg);
    info!("  Tick: {} ms", config.tick_interval_ms);
    info!("  Output Dir: {}", args.output_dir.display());

    std::fs::create_dir_all(&args.output_dir)?;

    let tracker = WorkoutTracker::with_system_clock(&config);

    if let Some(port) = args.dashboard_port {
        let dashboard_tracker = tracker.clone();
        tokio::spawn(async move {
            if let Err(e) = dashboard::start_dashboard(dashboard_tracker, port).await {
                warn!("{}", e);
            }
        });
    }

    let reader: Box<dyn BufRead + Send> = match args.input.as_ref() {
        Some(path) => Box::new(BufReader::new(File::open(path)?)),
        None => Box::new(BufReader::new(std::io::stdin())),
    };
    let (tx, rx) = mpsc::channel(100);
    let _pump = spawn_source_pump(NdjsonSource::new(reader), tx);

    let options = RunnerOptions::from_config(&config, Some(args.output_dir.clone()));
    let report = tokio::select! {
        report = run_session(tracker.clone(), rx, options) => Some(report),
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, stopping session");
            None
        }
    };

    let summary = match report {
        Some(report) => {
            info!(
                "Fixes: {} total, {} accepted, {} refresh ticks",
                report.fixes.total(),
                report.fixes.accepted(),
                report.ticks
            );
            report.summary
        }
        None => {
            tracker.stop();
            tracker.summary()
        }
    };

    info!("=== Final Stats ===");
    info!("{}", tracker.snapshot().summary_line());
    if let Some(summary) = summary {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }
    Ok(())
}
