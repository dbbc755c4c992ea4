use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use log::{info, warn};
use serde_json::json;
use workout_tracker_rs::fix_source::{ReplayItem, ReplayLog};
use workout_tracker_rs::metrics::{
    format_calories, format_distance, format_duration, format_pace, minutes_per_km,
};
use workout_tracker_rs::{
    Clock, LifecycleEvent, ManualClock, SessionPhase, TrackerConfig, WorkoutTracker,
};

#[derive(Parser, Debug)]
#[command(name = "replay")]
#[command(about = "Replay recorded workout fixes through the track engine", long_about = None)]
struct Args {
    /// Path to a replay log (.json or .json.gz)
    #[arg(long, conflicts_with = "golden_dir")]
    log: Option<PathBuf>,

    /// Directory of logs to batch replay (processes *.json and *.json.gz)
    #[arg(long)]
    golden_dir: Option<PathBuf>,

    /// JSON config file; flags below override individual fields
    #[arg(long)]
    config: Option<PathBuf>,

    /// User weight in kg
    #[arg(long)]
    weight: Option<f32>,

    /// Movement threshold in meters
    #[arg(long)]
    movement_threshold: Option<f64>,

    /// Upper pedestrian speed bound (m/s)
    #[arg(long)]
    max_speed: Option<f64>,

    /// Worst acceptable horizontal accuracy (m)
    #[arg(long)]
    max_accuracy: Option<f32>,
}

fn build_config(args: &Args) -> anyhow::Result<TrackerConfig> {
    let mut config = match args.config.as_ref() {
        Some(path) => TrackerConfig::load(path)?,
        None => TrackerConfig::default(),
    };
    if let Some(weight) = args.weight {
        config.user_weight_kg = weight;
    }
    if let Some(threshold) = args.movement_threshold {
        config.filter.movement_threshold_m = threshold;
    }
    if let Some(max_speed) = args.max_speed {
        config.filter.max_speed_mps = max_speed;
    }
    if let Some(max_accuracy) = args.max_accuracy {
        config.filter.max_accuracy_m = max_accuracy;
    }
    config.validate()?;
    Ok(config)
}

/// Move the manual clock forward to `target`, running the refresh tick at
/// every interval boundary crossed on the way (what the live runner would do).
/// Never moves time backwards.
fn advance_with_ticks(
    tracker: &WorkoutTracker,
    clock: &ManualClock,
    target: i64,
    tick_ms: i64,
) -> u64 {
    let mut ticks = 0;
    let mut now = clock.now_millis();
    while now + tick_ms <= target {
        now += tick_ms;
        clock.set(now);
        if tracker.phase() == SessionPhase::Tracking {
            tracker.refresh();
        }
        ticks += 1;
    }
    if target > now {
        clock.set(target);
    }
    ticks
}

fn run_once(path: &Path, config: &TrackerConfig) -> anyhow::Result<serde_json::Value> {
    let log = ReplayLog::load(path)?;
    let timeline = log.timeline();
    let Some(first) = timeline.first() else {
        anyhow::bail!("{} contains no fixes or events", path.display());
    };

    let clock = ManualClock::new(first.timestamp_ms());
    let tracker = WorkoutTracker::new(config, Arc::new(clock.clone()));
    let tick_ms = config.tick_interval_ms as i64;
    let mut ticks = 0u64;

    // Logs without lifecycle marks are one continuous session
    if !timeline.iter().any(|i| matches!(i, ReplayItem::Event(_))) {
        tracker.start();
    }

    for item in &timeline {
        ticks += advance_with_ticks(&tracker, &clock, item.timestamp_ms(), tick_ms);
        match item {
            ReplayItem::Fix(fix) => {
                tracker.ingest(*fix);
            }
            ReplayItem::Event(mark) => {
                if !tracker.apply(mark.event) {
                    warn!("[replay] {:?} at {} had no effect", mark.event, mark.timestamp_ms);
                }
            }
        }
    }

    if tracker.phase() != SessionPhase::Stopped {
        tracker.apply(LifecycleEvent::Stop);
    }
    let summary = tracker
        .summary()
        .ok_or_else(|| anyhow::anyhow!("{} did not produce a stopped session", path.display()))?;

    info!(
        "[replay] {}: {} | {} | {} | {}",
        path.display(),
        format_duration(summary.duration_ms),
        format_distance(summary.distance_km),
        format_pace(minutes_per_km(summary.average_pace)),
        format_calories(summary.calories_kcal)
    );

    Ok(json!({
        "log": path.display().to_string(),
        "ticks": ticks,
        "route_length_check_km": workout_tracker_rs::geodesy::route_length_km(&summary.route),
        "summary": summary,
    }))
}

fn is_replay_log(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    name.ends_with(".json") || name.ends_with(".json.gz")
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let config = build_config(&args)?;
    let mut results = Vec::new();

    if let Some(dir) = args.golden_dir.as_ref() {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && is_replay_log(p))
            .collect();
        paths.sort();
        for path in paths {
            match run_once(&path, &config) {
                Ok(res) => results.push(res),
                Err(e) => warn!("Failed {}: {}", path.display(), e),
            }
        }
    } else if let Some(log) = args.log.as_ref() {
        results.push(run_once(log, &config)?);
    } else {
        anyhow::bail!("Provide --log or --golden-dir");
    }

    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}
