use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::metrics::{average_pace_min_per_km, estimate_calories};
use crate::track_filter::TrackFilter;
use crate::types::{FilterOutcome, LocationFix, OutcomeCounts, RoutePoint};

/// Session lifecycle. Active time is tracked in wall-clock milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// No workout in progress
    Idle,
    /// Accepting fixes; `accumulated_active_millis` holds earlier active windows
    Tracking {
        started_at_millis: i64,
        accumulated_active_millis: i64,
    },
    /// Clock frozen, fixes ignored
    Paused { accumulated_active_millis: i64 },
    /// Finished; metrics frozen until the next start or clear
    Stopped { final_active_millis: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEvent {
    Start,
    Pause,
    Resume,
    Stop,
    Clear,
}

/// Payload-free view of `SessionState` for observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    Tracking,
    Paused,
    Stopped,
}

impl SessionPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Tracking => "tracking",
            SessionPhase::Paused => "paused",
            SessionPhase::Stopped => "stopped",
        }
    }
}

/// Elapsed time since `since`, clamped so a backwards clock jump counts as zero.
fn elapsed(since: i64, now: i64) -> i64 {
    now.saturating_sub(since).max(0)
}

impl SessionState {
    pub fn phase(&self) -> SessionPhase {
        match self {
            SessionState::Idle => SessionPhase::Idle,
            SessionState::Tracking { .. } => SessionPhase::Tracking,
            SessionState::Paused { .. } => SessionPhase::Paused,
            SessionState::Stopped { .. } => SessionPhase::Stopped,
        }
    }

    pub fn is_tracking(&self) -> bool {
        matches!(self, SessionState::Tracking { .. })
    }

    /// Total active time as of `now`. Safe to call at any cadence.
    pub fn active_millis(&self, now: i64) -> i64 {
        match *self {
            SessionState::Idle => 0,
            SessionState::Tracking {
                started_at_millis,
                accumulated_active_millis,
            } => accumulated_active_millis.saturating_add(elapsed(started_at_millis, now)),
            SessionState::Paused {
                accumulated_active_millis,
            } => accumulated_active_millis,
            SessionState::Stopped {
                final_active_millis,
            } => final_active_millis,
        }
    }

    /// Pure transition function. Events that make no sense in the current
    /// state return it unchanged.
    ///
    /// `Start` while paused resumes; `Start` after stopping begins afresh.
    pub fn apply(self, event: LifecycleEvent, now: i64) -> SessionState {
        use LifecycleEvent::*;
        use SessionState::*;

        match (self, event) {
            (_, Clear) => Idle,
            (Idle | Stopped { .. }, Start) => Tracking {
                started_at_millis: now,
                accumulated_active_millis: 0,
            },
            (
                Paused {
                    accumulated_active_millis,
                },
                Start | Resume,
            ) => Tracking {
                started_at_millis: now,
                accumulated_active_millis,
            },
            (Tracking { .. }, Pause) => Paused {
                accumulated_active_millis: self.active_millis(now),
            },
            (Tracking { .. } | Paused { .. }, Stop) => Stopped {
                final_active_millis: self.active_millis(now),
            },
            (state, _) => state,
        }
    }
}

/// Lifecycle state machine plus the derived metrics of one workout.
///
/// All time-dependent calls take `now` explicitly so the controller stays a
/// pure function of its inputs; `WorkoutTracker` supplies the clock.
pub struct SessionController {
    state: SessionState,
    filter: TrackFilter,
    calories_kcal: f32,
    counts: OutcomeCounts,
    last_fix: Option<LocationFix>,
}

impl SessionController {
    pub fn new(filter: TrackFilter) -> Self {
        Self {
            state: SessionState::Idle,
            filter,
            calories_kcal: 0.0,
            counts: OutcomeCounts::default(),
            last_fix: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.phase()
    }

    pub fn filter(&self) -> &TrackFilter {
        &self.filter
    }

    pub fn counts(&self) -> &OutcomeCounts {
        &self.counts
    }

    fn transition(&mut self, event: LifecycleEvent, now: i64) -> bool {
        let previous = self.state;
        let next = previous.apply(event, now);
        if next == previous {
            debug!(
                "[session] {:?} ignored while {}",
                event,
                previous.phase().as_str()
            );
            return false;
        }

        let fresh_session = matches!(
            (previous.phase(), next.phase()),
            (SessionPhase::Idle | SessionPhase::Stopped, SessionPhase::Tracking)
        );
        if fresh_session || next == SessionState::Idle {
            self.reset_metrics();
        }

        self.state = next;
        info!(
            "[session] {} -> {} (active {} ms)",
            previous.phase().as_str(),
            next.phase().as_str(),
            next.active_millis(now)
        );
        true
    }

    fn reset_metrics(&mut self) {
        self.filter.clear();
        self.calories_kcal = 0.0;
        self.counts = OutcomeCounts::default();
        self.last_fix = None;
    }

    pub fn start(&mut self, now: i64) -> bool {
        self.transition(LifecycleEvent::Start, now)
    }

    pub fn pause(&mut self, now: i64) -> bool {
        self.transition(LifecycleEvent::Pause, now)
    }

    pub fn resume(&mut self, now: i64) -> bool {
        self.transition(LifecycleEvent::Resume, now)
    }

    pub fn stop(&mut self, now: i64) -> bool {
        self.transition(LifecycleEvent::Stop, now)
    }

    /// Back to `Idle`, wiping route, distance, calories and duration.
    pub fn clear(&mut self, now: i64) -> bool {
        let changed = self.transition(LifecycleEvent::Clear, now);
        // Clearing an idle session still wipes any leftovers
        if !changed {
            self.reset_metrics();
        }
        changed
    }

    pub fn apply(&mut self, event: LifecycleEvent, now: i64) -> bool {
        match event {
            LifecycleEvent::Clear => self.clear(now),
            other => self.transition(other, now),
        }
    }

    /// Feed one fix. Outside `Tracking` the fix is classified and ignored.
    ///
    /// While tracking, every fix with usable coordinates becomes `last_fix`,
    /// whatever the filter decides about it.
    pub fn ingest(&mut self, fix: LocationFix) -> FilterOutcome {
        let outcome = if self.state.is_tracking() {
            self.filter.ingest(fix)
        } else {
            FilterOutcome::IgnoredNotTracking
        };
        if !matches!(
            outcome,
            FilterOutcome::IgnoredNotTracking | FilterOutcome::RejectedInvalid
        ) {
            self.last_fix = Some(fix);
        }
        self.counts.record(outcome);
        outcome
    }

    /// Raw position of the most recent usable fix, filtered or not.
    pub fn last_fix(&self) -> Option<LocationFix> {
        self.last_fix
    }

    pub fn current_duration_millis(&self, now: i64) -> i64 {
        self.state.active_millis(now)
    }

    pub fn distance_km(&self) -> f64 {
        self.filter.distance_km()
    }

    pub fn route(&self) -> Vec<RoutePoint> {
        self.filter.route()
    }

    pub fn is_moving(&self) -> bool {
        self.filter.is_moving()
    }

    /// Last stored calorie value.
    pub fn calories_kcal(&self) -> f32 {
        self.calories_kcal
    }

    /// Calories a refresh would store right now, without storing them.
    ///
    /// The stored value is returned unchanged while the filter reports no
    /// movement or while the duration is too short to derive a speed.
    pub fn calories_burned(&self, weight_kg: f32, distance_km: f64, duration_ms: i64) -> f32 {
        if !self.filter.is_moving() {
            return self.calories_kcal;
        }
        estimate_calories(weight_kg, distance_km, duration_ms).unwrap_or(self.calories_kcal)
    }

    /// Recompute and store calories from the current distance and duration.
    pub fn refresh_calories(&mut self, weight_kg: f32, now: i64) -> f32 {
        let kcal = self.calories_burned(
            weight_kg,
            self.distance_km(),
            self.current_duration_millis(now),
        );
        self.calories_kcal = kcal;
        kcal
    }

    pub fn average_pace_min_per_km(&self, now: i64) -> f64 {
        average_pace_min_per_km(self.distance_km(), self.current_duration_millis(now))
    }
}

impl Default for SessionController {
    fn default() -> Self {
        Self::new(TrackFilter::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const LAT: f64 = 35.6586;
    const LON: f64 = 139.7454;

    fn walk(controller: &mut SessionController, t0: i64) {
        controller.ingest(LocationFix::new(LAT, LON, 5.0, t0));
        controller.ingest(LocationFix::new(LAT + 0.001, LON, 5.0, t0 + 60_000));
    }

    #[test]
    fn test_transition_table() {
        let idle = SessionState::Idle;
        let tracking = idle.apply(LifecycleEvent::Start, 1_000);
        assert_eq!(
            tracking,
            SessionState::Tracking {
                started_at_millis: 1_000,
                accumulated_active_millis: 0
            }
        );
        assert_eq!(tracking.apply(LifecycleEvent::Start, 5_000), tracking);
        assert_eq!(tracking.apply(LifecycleEvent::Resume, 5_000), tracking);

        let paused = tracking.apply(LifecycleEvent::Pause, 4_000);
        assert_eq!(
            paused,
            SessionState::Paused {
                accumulated_active_millis: 3_000
            }
        );
        assert_eq!(paused.apply(LifecycleEvent::Pause, 9_000), paused);

        let resumed = paused.apply(LifecycleEvent::Start, 10_000);
        assert_eq!(resumed.active_millis(12_000), 5_000);

        let stopped = resumed.apply(LifecycleEvent::Stop, 12_000);
        assert_eq!(
            stopped,
            SessionState::Stopped {
                final_active_millis: 5_000
            }
        );
        assert_eq!(stopped.apply(LifecycleEvent::Pause, 20_000), stopped);
        assert_eq!(stopped.apply(LifecycleEvent::Resume, 20_000), stopped);
        assert_eq!(idle.apply(LifecycleEvent::Stop, 20_000), idle);
        assert_eq!(stopped.apply(LifecycleEvent::Clear, 20_000), idle);
    }

    #[test]
    fn test_duration_excludes_paused_time() {
        let mut session = SessionController::default();
        assert_eq!(session.current_duration_millis(0), 0);

        assert!(session.start(0));
        assert_eq!(session.current_duration_millis(2_500), 2_500);
        assert!(session.pause(10_000));
        assert_eq!(session.current_duration_millis(50_000), 10_000);
        assert!(session.resume(60_000));
        assert!(session.stop(75_000));

        assert_eq!(session.current_duration_millis(75_000), 25_000);
        assert!(!session.stop(90_000));
        assert_eq!(session.current_duration_millis(90_000), 25_000);
    }

    #[test]
    fn test_stop_while_paused_freezes_accumulated() {
        let mut session = SessionController::default();
        session.start(0);
        session.pause(4_000);
        session.stop(100_000);
        assert_eq!(
            session.state(),
            SessionState::Stopped {
                final_active_millis: 4_000
            }
        );
    }

    #[test]
    fn test_clock_jumping_backwards_clamps_to_zero() {
        let mut session = SessionController::default();
        session.start(100_000);
        assert_eq!(session.current_duration_millis(40_000), 0);
        session.pause(40_000);
        assert_eq!(session.current_duration_millis(200_000), 0);
    }

    #[test]
    fn test_fixes_ignored_unless_tracking() {
        let mut session = SessionController::default();
        let fix = LocationFix::new(LAT, LON, 5.0, 0);
        assert_eq!(session.ingest(fix), FilterOutcome::IgnoredNotTracking);

        session.start(0);
        assert_eq!(session.ingest(fix), FilterOutcome::AcceptedFirst);

        session.pause(1_000);
        let later = LocationFix::new(LAT + 0.001, LON, 5.0, 60_000);
        assert_eq!(session.ingest(later), FilterOutcome::IgnoredNotTracking);
        assert_eq!(session.distance_km(), 0.0);

        session.stop(2_000);
        assert_eq!(session.ingest(later), FilterOutcome::IgnoredNotTracking);
        assert_eq!(session.counts().ignored_not_tracking, 2);
    }

    #[test]
    fn test_last_fix_follows_raw_stream() {
        let mut session = SessionController::default();
        session.start(0);
        session.ingest(LocationFix::new(LAT, LON, 5.0, 0));

        let noisy = LocationFix::new(LAT + 0.0005, LON, 45.0, 10_000);
        assert_eq!(session.ingest(noisy), FilterOutcome::RejectedAccuracy);
        assert_eq!(session.last_fix(), Some(noisy));
        assert_eq!(session.route().len(), 1);

        // Unusable coordinates do not move the marker
        session.ingest(LocationFix::new(f64::NAN, LON, 5.0, 20_000));
        assert_eq!(session.last_fix(), Some(noisy));

        session.pause(30_000);
        session.ingest(LocationFix::new(LAT + 0.002, LON, 5.0, 40_000));
        assert_eq!(session.last_fix(), Some(noisy));

        session.clear(50_000);
        assert_eq!(session.last_fix(), None);
    }

    #[test]
    fn test_start_resets_previous_workout() {
        let mut session = SessionController::default();
        session.start(0);
        walk(&mut session, 0);
        session.refresh_calories(70.0, 60_000);
        assert!(session.distance_km() > 0.1);
        assert!(session.calories_kcal() > 0.0);
        session.stop(60_000);

        // Stopped -> Tracking is a new workout
        assert!(session.start(120_000));
        assert_eq!(session.distance_km(), 0.0);
        assert!(session.route().is_empty());
        assert_eq!(session.calories_kcal(), 0.0);
        assert_eq!(session.current_duration_millis(120_000), 0);
    }

    #[test]
    fn test_resume_keeps_route() {
        let mut session = SessionController::default();
        session.start(0);
        walk(&mut session, 0);
        session.pause(60_000);
        session.resume(90_000);
        assert_eq!(session.route().len(), 2);
    }

    #[test]
    fn test_clear_from_any_state() {
        let mut session = SessionController::default();
        session.start(0);
        walk(&mut session, 0);
        session.refresh_calories(70.0, 60_000);
        assert!(session.clear(70_000));
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.distance_km(), 0.0);
        assert!(session.route().is_empty());
        assert_eq!(session.calories_kcal(), 0.0);
        assert_eq!(session.average_pace_min_per_km(80_000), 0.0);
        assert_eq!(session.current_duration_millis(80_000), 0);

        // Clearing again is harmless
        assert!(!session.clear(90_000));
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn test_calories_only_accrue_while_moving() {
        let mut session = SessionController::default();
        session.start(0);
        walk(&mut session, 0);
        assert!(session.is_moving());

        let kcal = session.calories_burned(70.0, 5.0, 1_800_000);
        assert_relative_eq!(kcal, 297.5, epsilon = 1e-3);
        session.refresh_calories(70.0, 60_000);
        let stored = session.calories_kcal();

        // Jitter flips the filter to stationary; calories freeze
        session.ingest(LocationFix::new(LAT + 0.001, LON, 5.0, 65_000));
        assert!(!session.is_moving());
        assert_eq!(session.calories_burned(70.0, 5.0, 1_800_000), stored);
        assert_eq!(session.refresh_calories(70.0, 600_000), stored);
    }

    #[test]
    fn test_calories_short_duration_keeps_previous() {
        let mut session = SessionController::default();
        session.start(0);
        walk(&mut session, 0);
        assert_eq!(session.calories_burned(70.0, 0.1, 500), 0.0);
    }

    #[test]
    fn test_pace_rate_from_session() {
        let mut session = SessionController::default();
        session.start(0);
        walk(&mut session, 0);
        // 0.111 km in 60 s = ~6.67 km/h
        assert_relative_eq!(
            session.average_pace_min_per_km(60_000),
            6.67,
            max_relative = 0.01
        );
    }
}
