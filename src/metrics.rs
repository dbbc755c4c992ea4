//! Derived workout metrics: MET-based calorie estimate, average pace rate
//! and display formatting.

use serde::{Deserialize, Serialize};

use crate::session::SessionPhase;
use crate::types::LocationFix;

const MILLIS_PER_HOUR: f64 = 3_600_000.0;
/// Below this much active time the derived rates are meaningless
const MIN_DURATION_MS: i64 = 1000;

/// MET by speed band (km/h): walking, brisk walking/jogging, running.
/// Coarse approximation, not a calorimetry model.
pub fn met_for_speed(speed_kmh: f64) -> f32 {
    if speed_kmh <= 4.0 {
        2.0
    } else if speed_kmh <= 8.0 {
        7.0
    } else if speed_kmh <= 11.0 {
        8.5
    } else if speed_kmh <= 14.0 {
        10.5
    } else {
        10.0
    }
}

fn hours(duration_ms: i64) -> f64 {
    duration_ms as f64 / MILLIS_PER_HOUR
}

/// `MET * weight * hours`, or `None` when the duration is too short to
/// derive a speed (caller keeps its previous value).
pub fn estimate_calories(weight_kg: f32, distance_km: f64, duration_ms: i64) -> Option<f32> {
    if duration_ms < MIN_DURATION_MS {
        return None;
    }
    let hours = hours(duration_ms);
    if hours <= 0.0 {
        return None;
    }
    let speed_kmh = distance_km / hours;
    let met = met_for_speed(speed_kmh);
    Some((met as f64 * weight_kg as f64 * hours) as f32)
}

/// Average speed over the active duration in km/h.
///
/// Display layers invert this into minutes per km (see [`minutes_per_km`]).
pub fn average_pace_min_per_km(distance_km: f64, duration_ms: i64) -> f64 {
    if duration_ms < MIN_DURATION_MS || distance_km <= 0.0 {
        return 0.0;
    }
    distance_km / hours(duration_ms)
}

/// Convert a km/h rate into minutes per km. Zero rate maps to zero.
pub fn minutes_per_km(rate_kmh: f64) -> f64 {
    if rate_kmh > 0.0 && rate_kmh.is_finite() {
        60.0 / rate_kmh
    } else {
        0.0
    }
}

/// Point-in-time view of a session, recomputed on every read.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub phase: SessionPhase,
    pub distance_km: f64,
    pub duration_ms: i64,
    /// Average rate in km/h (see `average_pace_min_per_km`)
    pub pace: f64,
    pub calories_kcal: f32,
    pub route_points: usize,
    pub is_moving: bool,
    pub user_weight_kg: f32,
    /// Latest raw fix while tracking, before any filtering (live position marker)
    #[serde(default)]
    pub last_fix: Option<LocationFix>,
}

impl Default for MetricsSnapshot {
    fn default() -> Self {
        Self {
            phase: SessionPhase::Idle,
            distance_km: 0.0,
            duration_ms: 0,
            pace: 0.0,
            calories_kcal: 0.0,
            route_points: 0,
            is_moving: false,
            user_weight_kg: 0.0,
            last_fix: None,
        }
    }
}

impl MetricsSnapshot {
    pub fn summary_line(&self) -> String {
        format!(
            "{} | {} | {} | {} | {}",
            self.phase.as_str(),
            format_duration(self.duration_ms),
            format_distance(self.distance_km),
            format_pace(minutes_per_km(self.pace)),
            format_calories(self.calories_kcal)
        )
    }
}

/// `HH:MM:SS`; hours are not wrapped at 24.
pub fn format_duration(duration_ms: i64) -> String {
    let total_secs = duration_ms.max(0) / 1000;
    let seconds = total_secs % 60;
    let minutes = (total_secs / 60) % 60;
    let hours = total_secs / 3600;
    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}

pub fn format_distance(distance_km: f64) -> String {
    format!("{:.2} km", distance_km)
}

pub fn format_calories(calories_kcal: f32) -> String {
    format!("{:.2} kcal", calories_kcal)
}

pub fn format_pace(min_per_km: f64) -> String {
    format!("{:.2} min/km", min_per_km)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_met_bands() {
        assert_eq!(met_for_speed(0.0), 2.0);
        assert_eq!(met_for_speed(4.0), 2.0);
        assert_eq!(met_for_speed(4.01), 7.0);
        assert_eq!(met_for_speed(8.0), 7.0);
        assert_eq!(met_for_speed(10.0), 8.5);
        assert_eq!(met_for_speed(14.0), 10.5);
        assert_eq!(met_for_speed(20.0), 10.0);
    }

    #[test]
    fn test_calories_for_half_hour_run() {
        // 5 km in 30 min = 10 km/h -> MET 8.5
        let kcal = estimate_calories(70.0, 5.0, 1_800_000).unwrap();
        assert_relative_eq!(kcal, 297.5, epsilon = 1e-3);
    }

    #[test]
    fn test_calories_guard_short_duration() {
        assert_eq!(estimate_calories(70.0, 0.0, 999), None);
        assert_eq!(estimate_calories(70.0, 1.0, -5_000), None);
        assert!(estimate_calories(70.0, 0.0, 1000).is_some());
    }

    #[test]
    fn test_pace_rate() {
        assert_eq!(average_pace_min_per_km(0.0, 60_000), 0.0);
        assert_eq!(average_pace_min_per_km(1.0, 500), 0.0);
        assert_relative_eq!(average_pace_min_per_km(5.0, 1_800_000), 10.0);
        assert_relative_eq!(minutes_per_km(10.0), 6.0);
        assert_eq!(minutes_per_km(0.0), 0.0);
    }

    #[test]
    fn test_formatters() {
        assert_eq!(format_duration(3_723_000), "01:02:03");
        assert_eq!(format_duration(59_999), "00:00:59");
        assert_eq!(format_duration(-10), "00:00:00");
        assert_eq!(format_duration(90_000_000), "25:00:00");
        assert_eq!(format_distance(5.0), "5.00 km");
        assert_eq!(format_calories(297.456), "297.46 kcal");
        assert_eq!(format_pace(6.0), "6.00 min/km");
    }

    #[test]
    fn test_summary_line() {
        let snapshot = MetricsSnapshot {
            phase: SessionPhase::Tracking,
            distance_km: 5.0,
            duration_ms: 1_800_000,
            pace: 10.0,
            calories_kcal: 297.5,
            route_points: 12,
            is_moving: true,
            user_weight_kg: 70.0,
            last_fix: None,
        };
        assert_eq!(
            snapshot.summary_line(),
            "tracking | 00:30:00 | 5.00 km | 6.00 min/km | 297.50 kcal"
        );
    }
}
