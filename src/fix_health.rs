use log::{info, warn};
use serde::Serialize;

/// Watches the location source for silence.
///
/// Time comes from the caller (the tracker's clock) so the check is
/// deterministic under replay. The engine keeps its state while the source
/// is silent; this only reports.
#[derive(Clone, Debug)]
pub struct FixHealth {
    silence_threshold_ms: i64,
    started_at_ms: i64,
    last_fix_ms: Option<i64>,
    fixes_seen: u64,
    silent_episodes: u32,
    reported_silent: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub silence_ms: i64,
    pub fixes_seen: u64,
    pub silent_episodes: u32,
}

impl FixHealth {
    pub fn new(silence_threshold_secs: u64, now_ms: i64) -> Self {
        FixHealth {
            silence_threshold_ms: (silence_threshold_secs as i64).saturating_mul(1000),
            started_at_ms: now_ms,
            last_fix_ms: None,
            fixes_seen: 0,
            silent_episodes: 0,
            reported_silent: false,
        }
    }

    pub fn record_fix(&mut self, now_ms: i64) {
        if self.reported_silent {
            info!(
                "[HEALTH] GPS back after {:.1}s",
                self.silence_ms(now_ms) as f64 / 1000.0
            );
            self.reported_silent = false;
        }
        self.last_fix_ms = Some(now_ms);
        self.fixes_seen += 1;
    }

    /// Time since the last fix, or since monitoring began if none arrived yet.
    pub fn silence_ms(&self, now_ms: i64) -> i64 {
        let since = self.last_fix_ms.unwrap_or(self.started_at_ms);
        now_ms.saturating_sub(since).max(0)
    }

    pub fn is_silent(&self, now_ms: i64) -> bool {
        self.silence_ms(now_ms) > self.silence_threshold_ms
    }

    /// Check and log; warns once per silent episode.
    pub fn check(&mut self, now_ms: i64) -> HealthReport {
        let silent = self.is_silent(now_ms);
        if silent && !self.reported_silent {
            self.reported_silent = true;
            self.silent_episodes += 1;
            warn!(
                "[HEALTH] GPS SILENT for {:.1}s ({} fixes so far)",
                self.silence_ms(now_ms) as f64 / 1000.0,
                self.fixes_seen
            );
        }
        HealthReport {
            healthy: !silent,
            silence_ms: self.silence_ms(now_ms),
            fixes_seen: self.fixes_seen,
            silent_episodes: self.silent_episodes,
        }
    }

    pub fn format_status(&self, now_ms: i64) -> String {
        if self.is_silent(now_ms) {
            format!(
                "GPS ⚠ (silent {:.1}s)",
                self.silence_ms(now_ms) as f64 / 1000.0
            )
        } else {
            "GPS ✓".to_string()
        }
    }
}
