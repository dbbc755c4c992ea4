//! Async driver for one live session.
//!
//! Fixes arrive on a tokio channel; a refresh interval (1 s by default)
//! recomputes duration-dependent metrics, checks the location source and
//! writes the live status file. The engine itself never blocks or sleeps.

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use log::{info, warn};
use tokio::runtime::Builder;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::config::TrackerConfig;
use crate::fix_health::FixHealth;
use crate::fix_source::FixSource;
use crate::live_status::LiveStatus;
use crate::session::SessionPhase;
use crate::tracker::{WorkoutSummary, WorkoutTracker};
use crate::types::{LocationFix, OutcomeCounts};

#[derive(Clone, Debug)]
pub struct RunnerOptions {
    pub tick: Duration,
    pub fix_silence_secs: u64,
    /// Directory for `live_status.json`; `None` disables the status file
    pub status_dir: Option<PathBuf>,
}

impl RunnerOptions {
    pub fn from_config(config: &TrackerConfig, status_dir: Option<PathBuf>) -> Self {
        Self {
            tick: Duration::from_millis(config.tick_interval_ms),
            fix_silence_secs: config.fix_silence_secs,
            status_dir,
        }
    }
}

#[derive(Clone, Debug)]
pub struct RunReport {
    pub summary: Option<WorkoutSummary>,
    pub fixes: OutcomeCounts,
    pub ticks: u64,
    pub silent_episodes: u32,
}

fn write_status(
    tracker: &WorkoutTracker,
    health: &mut FixHealth,
    options: &RunnerOptions,
    file_name: &str,
) {
    let Some(dir) = options.status_dir.as_ref() else {
        return;
    };
    let now = tracker.now_millis();
    let status = LiveStatus::new(
        now,
        tracker.session_id(),
        &tracker.snapshot(),
        tracker.counts(),
        &health.check(now),
    );
    if let Err(e) = status.save(&dir.join(file_name)) {
        warn!("[runner] failed to write {}: {}", file_name, e);
    }
}

/// Run a session until the fix channel closes, then stop it.
///
/// Starts the session if it is not already tracking. Lifecycle calls made
/// on clones of `tracker` while this runs (pause/resume) take effect
/// immediately.
pub async fn run_session(
    tracker: WorkoutTracker,
    mut fixes: mpsc::Receiver<LocationFix>,
    options: RunnerOptions,
) -> RunReport {
    if tracker.phase() != SessionPhase::Tracking {
        tracker.start();
    }

    let mut health = FixHealth::new(options.fix_silence_secs, tracker.now_millis());
    let mut ticker = interval(options.tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut ticks = 0u64;

    loop {
        tokio::select! {
            maybe_fix = fixes.recv() => match maybe_fix {
                Some(fix) => {
                    health.record_fix(tracker.now_millis());
                    tracker.ingest(fix);
                }
                None => {
                    info!("[runner] fix source closed");
                    break;
                }
            },
            _ = ticker.tick() => {
                ticks += 1;
                tracker.refresh();
                let now = tracker.now_millis();
                health.check(now);
                write_status(&tracker, &mut health, &options, "live_status.json");
            }
        }
    }

    tracker.stop();
    write_status(&tracker, &mut health, &options, "live_status_final.json");
    let silent_episodes = health.check(tracker.now_millis()).silent_episodes;

    RunReport {
        summary: tracker.summary(),
        fixes: tracker.counts(),
        ticks,
        silent_episodes,
    }
}

/// Move a blocking `FixSource` onto the blocking pool, forwarding fixes to
/// `tx`. Resolves to the number of fixes forwarded.
pub fn spawn_source_pump<S>(mut source: S, tx: mpsc::Sender<LocationFix>) -> JoinHandle<u64>
where
    S: FixSource + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut forwarded = 0u64;
        while let Some(fix) = source.next_fix() {
            if tx.blocking_send(fix).is_err() {
                warn!("[runner] session ended, dropping remaining fixes");
                break;
            }
            forwarded += 1;
        }
        forwarded
    })
}

/// Drive `future` on a fresh multi-thread runtime, then shut the runtime
/// down, waiting at most `grace` for blocking tasks. A source pump parked in
/// a blocking read (stdin, a FIFO) is abandoned instead of holding the
/// process open.
pub fn block_on_with_grace<F: Future>(future: F, grace: Duration) -> std::io::Result<F::Output> {
    let runtime = Builder::new_multi_thread().enable_all().build()?;
    let output = runtime.block_on(future);
    runtime.shutdown_timeout(grace);
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::fix_source::{ChannelSource, ReplaySource};
    use std::sync::Arc;
    use std::time::Instant;

    fn options(status_dir: Option<PathBuf>) -> RunnerOptions {
        RunnerOptions {
            tick: Duration::from_millis(10),
            fix_silence_secs: 30,
            status_dir,
        }
    }

    fn walk() -> Vec<LocationFix> {
        (0..5)
            .map(|i| LocationFix::new(46.0 + i as f64 * 0.001, 7.0, 5.0, i * 60_000))
            .collect()
    }

    #[tokio::test]
    async fn test_run_until_source_closes() {
        let clock = ManualClock::new(0);
        let tracker = WorkoutTracker::new(&TrackerConfig::default(), Arc::new(clock.clone()));
        let (tx, rx) = mpsc::channel(16);
        for fix in walk() {
            tx.send(fix).await.unwrap();
        }
        drop(tx);

        let dir = tempfile::tempdir().unwrap();
        let status_dir = Some(dir.path().to_path_buf());
        let report = run_session(tracker.clone(), rx, options(status_dir)).await;

        assert_eq!(tracker.phase(), SessionPhase::Stopped);
        let summary = report.summary.unwrap();
        assert_eq!(summary.route.len(), 5);
        assert_eq!(report.fixes.accepted_moving, 4);
        assert!(dir.path().join("live_status_final.json").exists());
    }

    #[tokio::test]
    async fn test_source_pump_forwards_everything() {
        let tracker = WorkoutTracker::new(&TrackerConfig::default(), Arc::new(ManualClock::new(0)));
        let (tx, rx) = mpsc::channel(2);
        let pump = spawn_source_pump(ReplaySource::new(walk()), tx);

        let report = run_session(tracker, rx, options(None)).await;
        assert_eq!(pump.await.unwrap(), 5);
        assert_eq!(report.fixes.total(), 5);
    }

    #[tokio::test]
    async fn test_ticks_refresh_status_file() {
        let clock = ManualClock::new(0);
        let tracker = WorkoutTracker::new(&TrackerConfig::default(), Arc::new(clock.clone()));
        let (tx, rx) = mpsc::channel(4);
        let dir = tempfile::tempdir().unwrap();
        let handle = tokio::spawn(run_session(
            tracker.clone(),
            rx,
            options(Some(dir.path().to_path_buf())),
        ));

        tx.send(LocationFix::new(46.0, 7.0, 5.0, 0)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(dir.path().join("live_status.json").exists());

        // Pausing from another handle is honoured by the running loop
        tracker.pause();
        clock.advance(60_000);
        tx.send(LocationFix::new(46.001, 7.0, 5.0, 60_000)).await.unwrap();
        drop(tx);

        let report = handle.await.unwrap();
        assert!(report.ticks >= 1);
        assert_eq!(report.fixes.ignored_not_tracking, 1);
        assert_eq!(report.summary.unwrap().duration_ms, 0);
    }

    #[test]
    fn test_shutdown_abandons_blocked_pump() {
        // Sender stays alive, so the pump blocks in recv for good
        let (source_tx, source_rx) = crossbeam::channel::unbounded::<LocationFix>();
        let started = Instant::now();

        let output = block_on_with_grace(
            async move {
                let (tx, mut rx) = mpsc::channel(1);
                let _pump = spawn_source_pump(ChannelSource::new(source_rx), tx);
                tokio::time::sleep(Duration::from_millis(20)).await;
                assert!(rx.try_recv().is_err());
                "done"
            },
            Duration::from_millis(100),
        )
        .unwrap();

        assert_eq!(output, "done");
        assert!(started.elapsed() < Duration::from_secs(5));
        drop(source_tx);
    }
}
