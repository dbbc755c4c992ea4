use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::fix_health::HealthReport;
use crate::metrics::{format_duration, minutes_per_km, MetricsSnapshot};
use crate::session::SessionPhase;
use crate::types::{LocationFix, OutcomeCounts};

/// Status file polled by external observers (written every tick).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct LiveStatus {
    pub timestamp_ms: i64,
    pub session_id: Option<String>,
    pub phase: SessionPhase,
    pub distance_km: f64,
    pub duration_ms: i64,
    pub duration_display: String,
    pub pace_kmh: f64,
    pub pace_min_per_km: f64,
    pub calories_kcal: f32,
    pub route_points: usize,
    pub is_moving: bool,
    pub user_weight_kg: f32,
    pub last_fix: Option<LocationFix>,
    // Fix classification
    pub fixes: OutcomeCounts,
    // Location source health
    pub gps_healthy: bool,
    pub gps_silence_secs: f64,
}

impl LiveStatus {
    pub fn new(
        timestamp_ms: i64,
        session_id: Option<String>,
        snapshot: &MetricsSnapshot,
        fixes: OutcomeCounts,
        health: &HealthReport,
    ) -> Self {
        Self {
            timestamp_ms,
            session_id,
            phase: snapshot.phase,
            distance_km: snapshot.distance_km,
            duration_ms: snapshot.duration_ms,
            duration_display: format_duration(snapshot.duration_ms),
            pace_kmh: snapshot.pace,
            pace_min_per_km: minutes_per_km(snapshot.pace),
            calories_kcal: snapshot.calories_kcal,
            route_points: snapshot.route_points,
            is_moving: snapshot.is_moving,
            user_weight_kg: snapshot.user_weight_kg,
            last_fix: snapshot.last_fix,
            fixes,
            gps_healthy: health.healthy,
            gps_silence_secs: health.silence_ms as f64 / 1000.0,
        }
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}
