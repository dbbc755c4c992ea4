//! Track filter and distance accumulator.
//!
//! Turns a raw fix stream into a denoised route polyline and a running
//! distance. A fix only contributes once it passes the accuracy gate and the
//! movement test (displacement above threshold, speed inside the pedestrian
//! band) relative to the last accepted reference fix.

use log::debug;
use serde::Serialize;

use crate::config::FilterConfig;
use crate::geodesy::{fix_distance_m, is_valid_coordinate};
use crate::types::{FilterOutcome, LocationFix, RoutePoint};

/// Mutable state owned by the filter. Only `TrackFilter::ingest` and
/// `TrackFilter::clear` change it.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct TrackState {
    pub last_accepted_fix: Option<LocationFix>,
    pub last_fix_timestamp: Option<i64>,
    pub is_moving: bool,
    pub cumulative_distance_km: f64,
    pub route_points: Vec<RoutePoint>,
}

/// Displacement of a candidate fix relative to the reference fix.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Gap {
    pub meters: f64,
    pub millis: i64,
    pub speed_mps: f64,
}

impl Gap {
    fn measure(reference: &LocationFix, reference_ts: i64, fix: &LocationFix) -> Self {
        let meters = fix_distance_m(reference, fix);
        let millis = fix.timestamp_ms.saturating_sub(reference_ts);
        // Duplicate or backwards timestamps carry no speed information
        let speed_mps = if millis > 0 {
            meters * 1000.0 / millis as f64
        } else {
            0.0
        };
        Self {
            meters,
            millis,
            speed_mps,
        }
    }
}

pub struct TrackFilter {
    config: FilterConfig,
    state: TrackState,
}

impl TrackFilter {
    pub fn new(config: FilterConfig) -> Self {
        Self {
            config,
            state: TrackState::default(),
        }
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    pub fn state(&self) -> &TrackState {
        &self.state
    }

    /// Classify one fix and fold it into the track.
    pub fn ingest(&mut self, fix: LocationFix) -> FilterOutcome {
        if !is_valid_coordinate(fix.latitude, fix.longitude)
            || !fix.accuracy_m.is_finite()
            || fix.accuracy_m < 0.0
        {
            debug!(
                "[filter] invalid fix lat={} lon={} acc={}",
                fix.latitude, fix.longitude, fix.accuracy_m
            );
            return FilterOutcome::RejectedInvalid;
        }

        if fix.accuracy_m > self.config.max_accuracy_m {
            debug!(
                "[filter] accuracy too poor: {:.1} m > {:.1} m",
                fix.accuracy_m, self.config.max_accuracy_m
            );
            self.state.is_moving = false;
            return FilterOutcome::RejectedAccuracy;
        }

        let (reference, reference_ts) =
            match (self.state.last_accepted_fix, self.state.last_fix_timestamp) {
                (Some(reference), Some(ts)) => (reference, ts),
                _ => return self.accept_first(fix),
            };

        let gap = Gap::measure(&reference, reference_ts, &fix);
        self.state.is_moving = self.is_movement(&gap);

        if !self.state.is_moving {
            // Reference position stays put; only the timing baseline advances.
            self.state.last_fix_timestamp = Some(reference_ts.max(fix.timestamp_ms));
            debug!(
                "[filter] stationary: {:.1} m in {} ms ({:.2} m/s)",
                gap.meters, gap.millis, gap.speed_mps
            );
            return FilterOutcome::RejectedStationary;
        }

        self.state.last_accepted_fix = Some(fix);
        self.state.last_fix_timestamp = Some(fix.timestamp_ms);

        let gap_km = gap.meters / 1000.0;
        if gap_km > self.config.min_append_distance_km {
            self.state.route_points.push(fix.point());
            self.state.cumulative_distance_km += gap_km;
            debug!(
                "[filter] moving: +{:.1} m at {:.2} m/s, total {:.3} km",
                gap.meters, gap.speed_mps, self.state.cumulative_distance_km
            );
        } else {
            debug!(
                "[filter] moving but below append distance: {:.1} m",
                gap.meters
            );
        }
        FilterOutcome::AcceptedMoving
    }

    fn accept_first(&mut self, fix: LocationFix) -> FilterOutcome {
        self.state.last_accepted_fix = Some(fix);
        self.state.last_fix_timestamp = Some(fix.timestamp_ms);
        self.state.is_moving = false;
        self.state.route_points.push(fix.point());
        debug!(
            "[filter] first fix at {:.6},{:.6}",
            fix.latitude, fix.longitude
        );
        FilterOutcome::AcceptedFirst
    }

    fn is_movement(&self, gap: &Gap) -> bool {
        gap.meters > self.config.movement_threshold_m
            && gap.speed_mps >= self.config.min_speed_mps
            && gap.speed_mps < self.config.max_speed_mps
    }

    pub fn distance_km(&self) -> f64 {
        self.state.cumulative_distance_km
    }

    pub fn route(&self) -> Vec<RoutePoint> {
        self.state.route_points.clone()
    }

    pub fn route_len(&self) -> usize {
        self.state.route_points.len()
    }

    pub fn is_moving(&self) -> bool {
        self.state.is_moving
    }

    /// Back to the empty initial state. Configuration is kept.
    pub fn clear(&mut self) {
        self.state = TrackState::default();
    }
}

impl Default for TrackFilter {
    fn default() -> Self {
        Self::new(FilterConfig::default())
    }
}
