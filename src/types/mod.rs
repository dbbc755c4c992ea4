use serde::{Deserialize, Serialize};

/// Raw GPS reading as delivered by the location provider.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocationFix {
    pub latitude: f64,
    pub longitude: f64,
    /// Horizontal accuracy radius (68% confidence) in meters
    pub accuracy_m: f32,
    /// Wall-clock time of the fix, Unix epoch milliseconds
    pub timestamp_ms: i64,
}

impl LocationFix {
    pub fn new(latitude: f64, longitude: f64, accuracy_m: f32, timestamp_ms: i64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy_m,
            timestamp_ms,
        }
    }

    pub fn point(&self) -> RoutePoint {
        RoutePoint {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }
}

/// Accepted, denoised position kept for the route polyline.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoutePoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// Classification of a single `ingest` call. Every fix gets exactly one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOutcome {
    /// First usable fix of the session, stored as the reference point
    AcceptedFirst,
    /// Plausible pedestrian movement relative to the reference fix
    AcceptedMoving,
    /// Horizontal accuracy worse than the configured limit
    RejectedAccuracy,
    /// GPS jitter, or motion too fast for a pedestrian
    RejectedStationary,
    /// Coordinates or accuracy outside their valid domain
    RejectedInvalid,
    /// Session is not tracking; fix left unprocessed
    IgnoredNotTracking,
}

impl FilterOutcome {
    pub fn is_accepted(self) -> bool {
        matches!(self, FilterOutcome::AcceptedFirst | FilterOutcome::AcceptedMoving)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FilterOutcome::AcceptedFirst => "accepted_first",
            FilterOutcome::AcceptedMoving => "accepted_moving",
            FilterOutcome::RejectedAccuracy => "rejected_accuracy",
            FilterOutcome::RejectedStationary => "rejected_stationary",
            FilterOutcome::RejectedInvalid => "rejected_invalid",
            FilterOutcome::IgnoredNotTracking => "ignored_not_tracking",
        }
    }
}

/// Per-outcome tally of ingested fixes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeCounts {
    pub accepted_first: u64,
    pub accepted_moving: u64,
    pub rejected_accuracy: u64,
    pub rejected_stationary: u64,
    pub rejected_invalid: u64,
    pub ignored_not_tracking: u64,
}

impl OutcomeCounts {
    pub fn record(&mut self, outcome: FilterOutcome) {
        let slot = match outcome {
            FilterOutcome::AcceptedFirst => &mut self.accepted_first,
            FilterOutcome::AcceptedMoving => &mut self.accepted_moving,
            FilterOutcome::RejectedAccuracy => &mut self.rejected_accuracy,
            FilterOutcome::RejectedStationary => &mut self.rejected_stationary,
            FilterOutcome::RejectedInvalid => &mut self.rejected_invalid,
            FilterOutcome::IgnoredNotTracking => &mut self.ignored_not_tracking,
        };
        *slot += 1;
    }

    pub fn accepted(&self) -> u64 {
        self.accepted_first + self.accepted_moving
    }

    pub fn total(&self) -> u64 {
        self.accepted()
            + self.rejected_accuracy
            + self.rejected_stationary
            + self.rejected_invalid
            + self.ignored_not_tracking
    }
}
