//! Optional external stats sinks.
//!
//! Sinks are fire and forget: the loop logs a failed emit and moves on,
//! it never aborts a tick over an export problem.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use super::PeriodStats;

/// Errors from an external stats sink.
#[derive(Debug, thiserror::Error)]
pub enum StatsExportError {
    /// The record could not be serialized.
    #[error("failed to serialize stats record")]
    Serialize(#[from] serde_json::Error),

    /// The sink's backing storage rejected the write.
    #[error("failed to write stats record to {path}")]
    Write {
        /// Destination that rejected the write.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// External consumer of per-period stats records.
pub trait StatsSink: Send + Sync {
    /// Emit one stats record.
    ///
    /// # Errors
    ///
    /// Returns [`StatsExportError`] when the record cannot be serialized or
    /// written; callers log and continue.
    fn emit(&self, stats: &PeriodStats) -> Result<(), StatsExportError>;
}

/// Appends one JSON object per stats record to a local file.
#[derive(Debug)]
pub struct JsonLinesSink {
    path: PathBuf,
}

impl JsonLinesSink {
    /// Create a sink appending to the given file.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl StatsSink for JsonLinesSink {
    fn emit(&self, stats: &PeriodStats) -> Result<(), StatsExportError> {
        let line = serde_json::to_string(stats)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| StatsExportError::Write {
                path: self.path.display().to_string(),
                source,
            })?;
        writeln!(file, "{line}").map_err(|source| StatsExportError::Write {
            path: self.path.display().to_string(),
            source,
        })?;
        Ok(())
    }
}
