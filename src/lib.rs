//! Workout location-track engine.
//!
//! Raw GPS fixes go through [`track_filter::TrackFilter`], which rejects
//! noise and accumulates distance; [`session::SessionController`] owns the
//! start/pause/resume/stop/clear lifecycle and derives duration, pace and
//! calories. [`tracker::WorkoutTracker`] wraps both behind one mutex for
//! use from several threads and publishes snapshots to observers.

pub mod clock;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod fix_health;
pub mod fix_source;
pub mod geodesy;
pub mod live_status;
pub mod metrics;
pub mod runner;
pub mod session;
pub mod track_filter;
pub mod tracker;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{FilterConfig, TrackerConfig};
pub use error::{TrackerError, TrackerResult};
pub use metrics::MetricsSnapshot;
pub use session::{LifecycleEvent, SessionController, SessionPhase, SessionState};
pub use track_filter::{TrackFilter, TrackState};
pub use tracker::{WorkoutSummary, WorkoutTracker};
pub use types::{FilterOutcome, LocationFix, OutcomeCounts, RoutePoint};
