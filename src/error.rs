use std::path::PathBuf;

use thiserror::Error;

/// Failures at the I/O-facing edges of the tracker.
///
/// Fix classification itself never fails; malformed fixes are reported
/// through `FilterOutcome`.
#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Dashboard error: {0}")]
    Dashboard(String),
}

pub type TrackerResult<T> = Result<T, TrackerError>;

impl TrackerError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TrackerError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn parse(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        TrackerError::Parse {
            path: path.into(),
            source,
        }
    }
}
