//! Durable checkpoint persistence.
//!
//! The runtime writes two kinds of checkpoints: the cumulative snapshot
//! under a fixed key, overwritten every tick, and one stats record per
//! calendar day under a day-stamped key, written once when the day closes.
//! On startup the cumulative key is loaded to resume a killed process; on
//! shutdown the daily keys are replayed to rebuild the full history.
//!
//! # Module Structure
//!
//! - [`file`]: local-filesystem store, one JSON file per key
//! - [`in_memory`]: map-backed store for tests

mod file;
mod in_memory;

pub use file::FileCheckpointStore;
pub use in_memory::InMemoryCheckpointStore;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;

/// Key holding the latest cumulative snapshot.
pub const CUMULATIVE_KEY: &str = "cumulative_performance";

/// Key prefix for per-day stats records.
pub const DAILY_PERF_PREFIX: &str = "daily_perf";

/// Day-stamped key for one calendar day's stats records.
#[must_use]
pub fn daily_key(day: NaiveDate) -> String {
    format!("{DAILY_PERF_PREFIX}/{}", day.format("%Y-%m-%d"))
}

/// Errors from checkpoint persistence.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    /// No checkpoint exists under the key. Normal on a cold first run.
    #[error("no checkpoint under key '{0}'")]
    NotFound(String),

    /// The payload could not be serialized or deserialized.
    #[error("bad checkpoint payload under key '{key}'")]
    Payload {
        /// Key whose payload was rejected.
        key: String,
        /// Underlying serde failure.
        #[source]
        source: serde_json::Error,
    },

    /// The storage backend failed.
    #[error("checkpoint storage failure for key '{key}'")]
    Storage {
        /// Key being read or written.
        key: String,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
}

impl CheckpointError {
    /// Whether this is the benign missing-key case.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Durable key/value store for checkpoint payloads.
///
/// One algorithm instance owns its store; the backend only has to support
/// one writer at a time.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Write (or overwrite) the payload under `key`.
    async fn save(&self, key: &str, payload: &Value) -> Result<(), CheckpointError>;

    /// Load the payload under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError::NotFound`] when the key has never been
    /// written; callers treat that as the normal first-run case.
    async fn load(&self, key: &str) -> Result<Value, CheckpointError>;

    /// List all keys under the given prefix, sorted ascending.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, CheckpointError>;
}
