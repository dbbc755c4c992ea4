//! Thread-safe handle over one workout session.
//!
//! One mutex guards the filter and the session together, so every query
//! sees a consistent distance/route/duration triple. Observers subscribe to
//! a `watch` channel that receives a fresh `MetricsSnapshot` after every
//! state change and every refresh tick.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::clock::{Clock, SystemClock};
use crate::config::{validate_weight, TrackerConfig};
use crate::error::TrackerResult;
use crate::metrics::MetricsSnapshot;
use crate::session::{LifecycleEvent, SessionController, SessionPhase, SessionState};
use crate::track_filter::TrackFilter;
use crate::types::{FilterOutcome, LocationFix, OutcomeCounts, RoutePoint};

/// Final numbers of a stopped workout, ready to hand to storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutSummary {
    pub session_id: String,
    pub started_at: String,
    pub finished_at: String,
    pub distance_km: f64,
    pub duration_ms: i64,
    pub calories_kcal: f32,
    /// Average rate in km/h
    pub average_pace: f64,
    pub route: Vec<RoutePoint>,
    pub fixes: OutcomeCounts,
}

struct Inner {
    controller: SessionController,
    weight_kg: f32,
    session_id: Option<String>,
    started_at_ms: Option<i64>,
    stopped_at_ms: Option<i64>,
}

impl Inner {
    fn snapshot(&self, now: i64) -> MetricsSnapshot {
        let c = &self.controller;
        MetricsSnapshot {
            phase: c.phase(),
            distance_km: c.distance_km(),
            duration_ms: c.current_duration_millis(now),
            pace: c.average_pace_min_per_km(now),
            calories_kcal: c.calories_kcal(),
            route_points: c.filter().route_len(),
            is_moving: c.is_moving(),
            user_weight_kg: self.weight_kg,
            last_fix: c.last_fix(),
        }
    }
}

fn rfc3339(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|t| t.to_rfc3339())
        .unwrap_or_default()
}

#[derive(Clone)]
pub struct WorkoutTracker {
    inner: Arc<Mutex<Inner>>,
    clock: Arc<dyn Clock>,
    publisher: Arc<watch::Sender<MetricsSnapshot>>,
}

impl WorkoutTracker {
    /// Build a tracker from an already validated config.
    pub fn new(config: &TrackerConfig, clock: Arc<dyn Clock>) -> Self {
        let inner = Inner {
            controller: SessionController::new(TrackFilter::new(config.filter)),
            weight_kg: config.user_weight_kg,
            session_id: None,
            started_at_ms: None,
            stopped_at_ms: None,
        };
        let initial = inner.snapshot(clock.now_millis());
        let (publisher, _) = watch::channel(initial);
        Self {
            inner: Arc::new(Mutex::new(inner)),
            clock,
            publisher: Arc::new(publisher),
        }
    }

    pub fn with_system_clock(config: &TrackerConfig) -> Self {
        Self::new(config, Arc::new(SystemClock))
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Poisoning is ignored: Inner holds plain values only
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Callers hold the state guard, so snapshots are published in the
    /// order the state changed.
    fn publish(&self, snapshot: MetricsSnapshot) {
        self.publisher.send_replace(snapshot);
    }

    /// Observe snapshots. The receiver starts with the latest published value.
    pub fn subscribe(&self) -> watch::Receiver<MetricsSnapshot> {
        self.publisher.subscribe()
    }

    pub fn now_millis(&self) -> i64 {
        self.clock.now_millis()
    }

    /// Classify and fold in one fix.
    pub fn ingest(&self, fix: LocationFix) -> FilterOutcome {
        let now = self.clock.now_millis();
        let mut inner = self.lock();
        let outcome = inner.controller.ingest(fix);
        if outcome == FilterOutcome::IgnoredNotTracking {
            return outcome;
        }
        let weight = inner.weight_kg;
        inner.controller.refresh_calories(weight, now);
        self.publish(inner.snapshot(now));
        outcome
    }

    fn lifecycle(&self, event: LifecycleEvent) -> bool {
        let now = self.clock.now_millis();
        let mut inner = self.lock();
        let before = inner.controller.phase();
        let changed = inner.controller.apply(event, now);
        let after = inner.controller.phase();

        match (before, after) {
            (SessionPhase::Idle | SessionPhase::Stopped, SessionPhase::Tracking) => {
                let id = format!("session_{}", now);
                info!("[tracker] started {}", id);
                inner.session_id = Some(id);
                inner.started_at_ms = Some(now);
                inner.stopped_at_ms = None;
            }
            (_, SessionPhase::Stopped) if changed => {
                inner.stopped_at_ms = Some(now);
            }
            (_, SessionPhase::Idle) => {
                inner.session_id = None;
                inner.started_at_ms = None;
                inner.stopped_at_ms = None;
            }
            _ => {}
        }
        self.publish(inner.snapshot(now));
        changed
    }

    pub fn start(&self) -> bool {
        self.lifecycle(LifecycleEvent::Start)
    }

    pub fn pause(&self) -> bool {
        self.lifecycle(LifecycleEvent::Pause)
    }

    pub fn resume(&self) -> bool {
        self.lifecycle(LifecycleEvent::Resume)
    }

    pub fn stop(&self) -> bool {
        self.lifecycle(LifecycleEvent::Stop)
    }

    pub fn clear(&self) -> bool {
        self.lifecycle(LifecycleEvent::Clear)
    }

    pub fn apply(&self, event: LifecycleEvent) -> bool {
        self.lifecycle(event)
    }

    /// Periodic refresh: recompute stored calories and publish a snapshot.
    pub fn refresh(&self) -> MetricsSnapshot {
        let now = self.clock.now_millis();
        let mut inner = self.lock();
        let weight = inner.weight_kg;
        inner.controller.refresh_calories(weight, now);
        let snapshot = inner.snapshot(now);
        self.publish(snapshot.clone());
        snapshot
    }

    pub fn set_user_weight_kg(&self, weight_kg: f32) -> TrackerResult<()> {
        validate_weight(weight_kg)?;
        let now = self.clock.now_millis();
        let mut inner = self.lock();
        inner.weight_kg = weight_kg;
        inner.controller.refresh_calories(weight_kg, now);
        self.publish(inner.snapshot(now));
        Ok(())
    }

    pub fn user_weight_kg(&self) -> f32 {
        self.lock().weight_kg
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let now = self.clock.now_millis();
        self.lock().snapshot(now)
    }

    pub fn state(&self) -> SessionState {
        self.lock().controller.state()
    }

    pub fn phase(&self) -> SessionPhase {
        self.lock().controller.phase()
    }

    pub fn session_id(&self) -> Option<String> {
        self.lock().session_id.clone()
    }

    pub fn distance_km(&self) -> f64 {
        self.lock().controller.distance_km()
    }

    pub fn route(&self) -> Vec<RoutePoint> {
        self.lock().controller.route()
    }

    pub fn is_moving(&self) -> bool {
        self.lock().controller.is_moving()
    }

    /// Latest raw fix while tracking, including ones the filter rejected.
    pub fn last_fix(&self) -> Option<LocationFix> {
        self.lock().controller.last_fix()
    }

    pub fn counts(&self) -> OutcomeCounts {
        self.lock().controller.counts().clone()
    }

    pub fn current_duration_millis(&self) -> i64 {
        let now = self.clock.now_millis();
        self.lock().controller.current_duration_millis(now)
    }

    /// Calories for `weight_kg` at the current distance and duration. No side effects.
    pub fn calories_burned(&self, weight_kg: f32) -> f32 {
        let now = self.clock.now_millis();
        let inner = self.lock();
        let c = &inner.controller;
        c.calories_burned(weight_kg, c.distance_km(), c.current_duration_millis(now))
    }

    pub fn average_pace_min_per_km(&self) -> f64 {
        let now = self.clock.now_millis();
        self.lock().controller.average_pace_min_per_km(now)
    }

    /// Summary of the workout once it has been stopped.
    pub fn summary(&self) -> Option<WorkoutSummary> {
        let inner = self.lock();
        let stopped_at = inner.stopped_at_ms?;
        if inner.controller.phase() != SessionPhase::Stopped {
            return None;
        }
        let c = &inner.controller;
        Some(WorkoutSummary {
            session_id: inner.session_id.clone().unwrap_or_default(),
            started_at: inner.started_at_ms.map(rfc3339).unwrap_or_default(),
            finished_at: rfc3339(stopped_at),
            distance_km: c.distance_km(),
            duration_ms: c.current_duration_millis(stopped_at),
            calories_kcal: c.calories_kcal(),
            average_pace: c.average_pace_min_per_km(stopped_at),
            route: c.route(),
            fixes: c.counts().clone(),
        })
    }
}
