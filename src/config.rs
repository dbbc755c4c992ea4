use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{TrackerError, TrackerResult};

/// Thresholds used by the track filter to separate movement from GPS noise.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Minimum displacement from the reference fix to count as movement (m)
    pub movement_threshold_m: f64,
    /// Slowest speed still considered walking rather than drift (m/s)
    pub min_speed_mps: f64,
    /// Speed at or above which motion is treated as non-pedestrian (m/s)
    pub max_speed_mps: f64,
    /// Fixes with a worse horizontal accuracy are discarded (m)
    pub max_accuracy_m: f32,
    /// Segment length required before a point is appended to the route (km)
    pub min_append_distance_km: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            movement_threshold_m: 3.0,
            min_speed_mps: 0.5,
            max_speed_mps: 8.0,
            max_accuracy_m: 20.0,
            min_append_distance_km: 0.03,
        }
    }
}

impl FilterConfig {
    pub fn validate(&self) -> TrackerResult<()> {
        let positive = [
            ("movement_threshold_m", self.movement_threshold_m),
            ("min_speed_mps", self.min_speed_mps),
            ("max_speed_mps", self.max_speed_mps),
            ("max_accuracy_m", self.max_accuracy_m as f64),
            ("min_append_distance_km", self.min_append_distance_km),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(TrackerError::InvalidConfig(format!(
                    "{name} must be a positive number, got {value}"
                )));
            }
        }
        if self.min_speed_mps >= self.max_speed_mps {
            return Err(TrackerError::InvalidConfig(format!(
                "min_speed_mps ({}) must be below max_speed_mps ({})",
                self.min_speed_mps, self.max_speed_mps
            )));
        }
        Ok(())
    }
}

/// Full tracker configuration, loadable from JSON. Missing keys take defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub filter: FilterConfig,
    pub user_weight_kg: f32,
    /// Cadence of the duration/calorie refresh tick
    pub tick_interval_ms: u64,
    /// Time without fixes before the location source is reported silent
    pub fix_silence_secs: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            filter: FilterConfig::default(),
            user_weight_kg: 70.0,
            tick_interval_ms: 1000,
            fix_silence_secs: 30,
        }
    }
}

impl TrackerConfig {
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Load and validate a JSON config file.
    pub fn load(path: &Path) -> TrackerResult<Self> {
        let text = fs::read_to_string(path).map_err(|e| TrackerError::io(path, e))?;
        let config = Self::from_json_str(&text).map_err(|e| TrackerError::parse(path, e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> TrackerResult<()> {
        self.filter.validate()?;
        validate_weight(self.user_weight_kg)?;
        if self.tick_interval_ms == 0 {
            return Err(TrackerError::InvalidConfig(
                "tick_interval_ms must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

pub fn validate_weight(weight_kg: f32) -> TrackerResult<()> {
    if !weight_kg.is_finite() || weight_kg <= 0.0 {
        return Err(TrackerError::InvalidParameters(format!(
            "user weight must be a positive number of kg, got {weight_kg}"
        )));
    }
    Ok(())
}
