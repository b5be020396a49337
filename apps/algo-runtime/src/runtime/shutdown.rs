//! Signal-driven shutdown with history recovery.
//!
//! The controller is shared between the execution loop and the OS signal
//! handler. A signal cancels the loop's tick wait; finalization (history
//! rebuild plus the analysis hook) is guarded by a latch so repeated
//! signals never run it twice.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::checkpoint::{CheckpointStore, DAILY_PERF_PREFIX};
use crate::stats::PeriodStats;

/// Coordinates graceful termination of a running algorithm.
#[derive(Debug, Clone)]
pub struct ShutdownController {
    token: CancellationToken,
    finalized: Arc<AtomicBool>,
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownController {
    /// Create an untriggered controller.
    #[must_use]
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            finalized: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Token the execution loop selects on while waiting for ticks.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Request shutdown. Safe to call any number of times.
    pub fn trigger(&self) {
        if !self.token.is_cancelled() {
            info!("Shutdown requested");
        }
        self.token.cancel();
    }

    /// Whether shutdown has been requested.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Claim the finalization latch.
    ///
    /// Returns true exactly once per controller; every later call returns
    /// false, which is what makes repeated termination signals idempotent.
    pub fn begin_finalize(&self) -> bool {
        !self.finalized.swap(true, Ordering::SeqCst)
    }

    /// Spawn a task that triggers this controller on SIGINT or SIGTERM.
    ///
    /// Signals arriving after the first keep re-triggering the already
    /// cancelled token, which is a no-op.
    pub fn install_signal_handler(&self) {
        let controller = self.clone();
        tokio::spawn(async move {
            loop {
                if wait_for_signal().await.is_err() {
                    warn!("Failed to listen for termination signal");
                    return;
                }
                controller.trigger();
            }
        });
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = sigterm.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

/// Rebuild the full per-day stats history from daily checkpoints.
///
/// Best effort: a missing or unreadable day is logged and skipped rather
/// than failing the finalization step, so a partial history still reaches
/// the analysis hook.
pub async fn load_daily_history(store: &dyn CheckpointStore) -> Vec<PeriodStats> {
    let keys = match store.list(DAILY_PERF_PREFIX).await {
        Ok(keys) => keys,
        Err(error) => {
            warn!(error = %error, "Failed to list daily checkpoints; history unavailable");
            return Vec::new();
        }
    };

    let mut history = Vec::new();
    for key in keys {
        match store.load(&key).await {
            Ok(payload) => match serde_json::from_value::<Vec<PeriodStats>>(payload) {
                Ok(mut day) => history.append(&mut day),
                Err(error) => {
                    warn!(key = %key, error = %error, "Skipping unreadable daily checkpoint");
                }
            },
            Err(error) => {
                warn!(key = %key, error = %error, "Skipping unloadable daily checkpoint");
            }
        }
    }
    history
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;
    use serde_json::json;

    use crate::checkpoint::{InMemoryCheckpointStore, daily_key};
    use crate::portfolio::{PerformanceTracker, Portfolio};
    use crate::stats::build_period_stats;

    use super::*;

    #[test]
    fn finalize_latch_claims_once() {
        let controller = ShutdownController::new();
        assert!(controller.begin_finalize());
        assert!(!controller.begin_finalize());

        // Clones share the latch.
        let clone = controller.clone();
        assert!(!clone.begin_finalize());
    }

    #[test]
    fn trigger_is_idempotent() {
        let controller = ShutdownController::new();
        assert!(!controller.is_triggered());
        controller.trigger();
        controller.trigger();
        assert!(controller.is_triggered());
    }

    #[tokio::test]
    async fn trigger_cancels_the_token() {
        let controller = ShutdownController::new();
        let token = controller.token();
        controller.trigger();
        token.cancelled().await;
    }

    #[tokio::test]
    async fn history_rebuild_concatenates_days_in_order() {
        let store = InMemoryCheckpointStore::new();
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let tracker = PerformanceTracker::new(dec!(100), start);
        let portfolio = Portfolio::new(dec!(100));

        for day in 1..=2 {
            let open = Utc.with_ymd_and_hms(2026, 3, day, 0, 0, 0).unwrap();
            let stats =
                build_period_stats(&tracker, &portfolio, open, open + chrono::Duration::minutes(1));
            store
                .save(
                    &daily_key(open.date_naive()),
                    &serde_json::to_value(vec![stats]).unwrap(),
                )
                .await
                .unwrap();
        }

        let history = load_daily_history(&store).await;
        assert_eq!(history.len(), 2);
        assert!(history[0].period_open < history[1].period_open);
    }

    #[tokio::test]
    async fn history_rebuild_skips_corrupt_days() {
        let store = InMemoryCheckpointStore::new();
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let tracker = PerformanceTracker::new(dec!(100), start);
        let portfolio = Portfolio::new(dec!(100));
        let stats =
            build_period_stats(&tracker, &portfolio, start, start + chrono::Duration::minutes(1));

        store
            .save("daily_perf/2026-03-01", &json!({"not": "a stats list"}))
            .await
            .unwrap();
        store
            .save("daily_perf/2026-03-02", &serde_json::to_value(vec![stats]).unwrap())
            .await
            .unwrap();

        let history = load_daily_history(&store).await;
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn empty_store_yields_empty_history() {
        let store = InMemoryCheckpointStore::new();
        assert!(load_daily_history(&store).await.is_empty());
    }
}
