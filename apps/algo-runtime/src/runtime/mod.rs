//! The execution loop: tick, reconcile, strategy, stats, checkpoint.
//!
//! [`AlgoRuntime`] owns the portfolio ledger and cumulative tracker
//! exclusively; the whole tick sequence is strictly serial, so a strategy
//! decision always follows the exchange state observed in the same tick.
//! Shutdown runs orthogonally through a [`ShutdownController`] shared with
//! the OS signal handler.
//!
//! # Module Structure
//!
//! - [`shutdown`]: cancellation token, finalize latch, history recovery

mod shutdown;

pub use shutdown::{ShutdownController, load_daily_history};

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::checkpoint::{CUMULATIVE_KEY, CheckpointError, CheckpointStore, daily_key};
use crate::clock::ClockSource;
use crate::exchange::ExchangeGateway;
use crate::orders::{OrderError, OrderRecord, TransactionRecord};
use crate::portfolio::{CumulativeSnapshot, PerformanceTracker, Portfolio};
use crate::reconcile::{PortfolioReconciler, ReconcileError};
use crate::resilience::{RetryExecutor, RetryPolicy};
use crate::stats::export::StatsSink;
use crate::stats::{PeriodStats, build_period_stats};

/// Operating mode, fixed for the lifetime of a runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Deterministic replay against a precomputed schedule. No live balance
    /// calls, no checkpoints.
    Backtest,
    /// Live wall-clock execution with checkpointing.
    Live,
}

impl Mode {
    /// Whether reconciliation queries live exchange balances.
    ///
    /// Only a live run with real orders does; backtests and simulated-order
    /// runs keep the locally tracked cash authoritative.
    #[must_use]
    pub const fn check_balances(self, simulate_orders: bool) -> bool {
        matches!(self, Self::Live) && !simulate_orders
    }
}

/// Errors that end a run.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// The builder was given an incomplete configuration.
    #[error("runtime configuration invalid: {0}")]
    Config(&'static str),

    /// Checkpoint state could not be written or restored. Fatal because the
    /// crash-recovery contract depends on it.
    #[error("checkpoint persistence failed")]
    Checkpoint(#[from] CheckpointError),
}

/// What a finished run produced.
#[derive(Debug)]
pub struct RunOutcome {
    /// Every stats record built during this process's run, in tick order.
    pub history: Vec<PeriodStats>,
    /// The ledger as of the final tick.
    pub portfolio: Portfolio,
    /// Ticks whose reconciliation or strategy step failed and was skipped.
    pub failed_ticks: u64,
}

/// Per-tick view handed to the strategy callback.
///
/// The ledger is read-only from here: positions and cash are only ever
/// written by reconciliation. Order operations go through the same bounded
/// retry as reconciliation.
pub struct StrategyContext<'a> {
    now: DateTime<Utc>,
    portfolio: &'a Portfolio,
    tracker: &'a mut PerformanceTracker,
    reconciler: &'a PortfolioReconciler,
    executor: &'a RetryExecutor,
}

impl StrategyContext<'_> {
    /// The current tick's timestamp.
    #[must_use]
    pub const fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// The reconciled ledger for this tick.
    #[must_use]
    pub const fn portfolio(&self) -> &Portfolio {
        self.portfolio
    }

    /// Record a custom variable; it appears in every later stats record.
    pub fn record(&mut self, name: impl Into<String>, value: Value) {
        self.tracker.record_var(name, value);
    }

    /// Record an order update for period windowing.
    pub fn record_order(&mut self, order: OrderRecord) {
        self.tracker.record_order(order);
    }

    /// Record a fill for period windowing.
    pub fn record_transaction(&mut self, txn: TransactionRecord) {
        self.tracker.record_transaction(txn);
    }

    fn gateway(&self, exchange: &str) -> Result<&Arc<dyn ExchangeGateway>, OrderError> {
        self.reconciler
            .exchange(exchange)
            .ok_or_else(|| OrderError::UnknownExchange(exchange.to_string()))
    }

    /// Open orders at one exchange, optionally filtered to an asset.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::UnknownExchange`] for an unconfigured exchange
    /// and [`OrderError::Gateway`] when the retry-wrapped call fails.
    pub async fn get_open_orders(
        &self,
        exchange: &str,
        asset: Option<&str>,
    ) -> Result<Vec<OrderRecord>, OrderError> {
        let gateway = self.gateway(exchange)?;
        let orders = self
            .executor
            .execute("get_open_orders", || gateway.get_open_orders(asset))
            .await?;
        Ok(orders)
    }

    /// Look up one order at one exchange.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::UnknownExchange`] for an unconfigured exchange
    /// and [`OrderError::Gateway`] when the retry-wrapped call fails.
    pub async fn get_order(
        &self,
        exchange: &str,
        order_id: &str,
    ) -> Result<OrderRecord, OrderError> {
        let gateway = self.gateway(exchange)?;
        let order = self
            .executor
            .execute("get_order", || gateway.get_order(order_id))
            .await?;
        Ok(order)
    }

    /// Cancel an open order at one exchange.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::UnknownExchange`] for an unconfigured exchange
    /// and [`OrderError::Gateway`] when the retry-wrapped call fails.
    pub async fn cancel_order(&self, exchange: &str, order_id: &str) -> Result<(), OrderError> {
        let gateway = self.gateway(exchange)?;
        self.executor
            .execute("cancel_order", || gateway.cancel_order(order_id))
            .await?;
        Ok(())
    }
}

/// User-supplied trading logic, invoked once per tick.
#[async_trait]
pub trait Strategy: Send {
    /// Handle one tick. An error aborts the tick (no stats, no checkpoint)
    /// but not the run.
    async fn on_tick(&mut self, ctx: &mut StrategyContext<'_>) -> anyhow::Result<()>;

    /// Final analysis over the full per-day history, run once at shutdown.
    fn analyze(&mut self, history: &[PeriodStats]) {
        let _ = history;
    }
}

/// Builds an [`AlgoRuntime`] and performs checkpoint resume.
pub struct RuntimeBuilder {
    mode: Mode,
    simulate_orders: bool,
    capital_base: Decimal,
    retry_policy: RetryPolicy,
    tick_interval: ChronoDuration,
    exchanges: Vec<Arc<dyn ExchangeGateway>>,
    clock: Option<ClockSource>,
    store: Option<Arc<dyn CheckpointStore>>,
    stats_sink: Option<Arc<dyn StatsSink>>,
    shutdown: ShutdownController,
}

impl RuntimeBuilder {
    /// Start a builder for the given mode.
    #[must_use]
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            simulate_orders: true,
            capital_base: Decimal::ZERO,
            retry_policy: RetryPolicy::default(),
            tick_interval: ChronoDuration::minutes(1),
            exchanges: Vec::new(),
            clock: None,
            store: None,
            stats_sink: None,
            shutdown: ShutdownController::new(),
        }
    }

    /// Whether orders are simulated (true) or sent live (false).
    #[must_use]
    pub const fn simulate_orders(mut self, simulate: bool) -> Self {
        self.simulate_orders = simulate;
        self
    }

    /// Starting capital for a cold run.
    #[must_use]
    pub const fn capital_base(mut self, capital: Decimal) -> Self {
        self.capital_base = capital;
        self
    }

    /// Retry policy for all remote exchange calls.
    #[must_use]
    pub const fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Width of each stats window. Defaults to one minute.
    #[must_use]
    pub const fn tick_interval(mut self, interval: ChronoDuration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Add an exchange. The first added exchange fixes the reporting
    /// currency for the whole run.
    #[must_use]
    pub fn exchange(mut self, gateway: Arc<dyn ExchangeGateway>) -> Self {
        self.exchanges.push(gateway);
        self
    }

    /// The tick source.
    #[must_use]
    pub fn clock(mut self, clock: ClockSource) -> Self {
        self.clock = Some(clock);
        self
    }

    /// The checkpoint store.
    #[must_use]
    pub fn checkpoint_store(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Optional external stats sink (fire and forget).
    #[must_use]
    pub fn stats_sink(mut self, sink: Arc<dyn StatsSink>) -> Self {
        self.stats_sink = Some(sink);
        self
    }

    /// Share a shutdown controller (for signal handlers and tests).
    #[must_use]
    pub fn shutdown(mut self, controller: ShutdownController) -> Self {
        self.shutdown = controller;
        self
    }

    /// Build the runtime, resuming from the cumulative checkpoint if one
    /// exists.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Config`] when a clock, store, or exchange is
    /// missing, and [`RuntimeError::Checkpoint`] when an existing cumulative
    /// checkpoint cannot be read (a missing one is the normal cold start).
    pub async fn build<S: Strategy>(self, strategy: S) -> Result<AlgoRuntime<S>, RuntimeError> {
        let clock = self.clock.ok_or(RuntimeError::Config("no tick clock"))?;
        let store = self
            .store
            .ok_or(RuntimeError::Config("no checkpoint store"))?;
        if self.exchanges.is_empty() {
            return Err(RuntimeError::Config("no exchanges configured"));
        }

        let executor = RetryExecutor::new(self.retry_policy);
        let reconciler = PortfolioReconciler::new(executor.clone(), self.exchanges);

        let mut portfolio = Portfolio::new(self.capital_base);
        let mut tracker = PerformanceTracker::new(self.capital_base, Utc::now());

        match store.load(CUMULATIVE_KEY).await {
            Ok(payload) => {
                let snapshot: CumulativeSnapshot =
                    serde_json::from_value(payload).map_err(|source| {
                        CheckpointError::Payload {
                            key: CUMULATIVE_KEY.to_string(),
                            source,
                        }
                    })?;
                info!(
                    ending_cash = %snapshot.ending_cash,
                    ending_value = %snapshot.ending_value,
                    positions = snapshot.positions.len(),
                    "Resuming from cumulative checkpoint"
                );
                snapshot.apply(&mut tracker, &mut portfolio);
            }
            Err(error) if error.is_not_found() => {
                debug!("No cumulative checkpoint; starting cold");
            }
            Err(error) => return Err(error.into()),
        }

        Ok(AlgoRuntime {
            mode: self.mode,
            simulate_orders: self.simulate_orders,
            tick_interval: self.tick_interval,
            clock,
            reconciler,
            executor,
            strategy,
            portfolio,
            tracker,
            store,
            stats_sink: self.stats_sink,
            shutdown: self.shutdown,
        })
    }
}

/// The clock-driven execution loop.
pub struct AlgoRuntime<S: Strategy> {
    mode: Mode,
    simulate_orders: bool,
    tick_interval: ChronoDuration,
    clock: ClockSource,
    reconciler: PortfolioReconciler,
    executor: RetryExecutor,
    strategy: S,
    portfolio: Portfolio,
    tracker: PerformanceTracker,
    store: Arc<dyn CheckpointStore>,
    stats_sink: Option<Arc<dyn StatsSink>>,
    shutdown: ShutdownController,
}

impl<S: Strategy> AlgoRuntime<S> {
    /// The shutdown controller driving this runtime.
    #[must_use]
    pub fn shutdown_controller(&self) -> ShutdownController {
        self.shutdown.clone()
    }

    /// Run until the clock exhausts or shutdown is triggered.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Checkpoint`] when checkpoint state cannot be
    /// persisted; per-tick reconciliation and strategy failures are logged,
    /// counted, and skipped instead.
    pub async fn run(mut self) -> Result<RunOutcome, RuntimeError> {
        let token = self.shutdown.token();
        let check_balances = self.mode.check_balances(self.simulate_orders);

        info!(
            mode = ?self.mode,
            simulate_orders = self.simulate_orders,
            exchanges = self.reconciler.exchanges().len(),
            check_balances,
            "Starting execution loop"
        );

        let mut history: Vec<PeriodStats> = Vec::new();
        let mut day_stats: Vec<PeriodStats> = Vec::new();
        let mut current_day: Option<NaiveDate> = None;
        let mut failed_ticks: u64 = 0;

        loop {
            // Once shutdown is requested no further ticks are consumed,
            // even if the clock already has one ready.
            if token.is_cancelled() {
                break;
            }
            let tick = tokio::select! {
                () = token.cancelled() => None,
                tick = self.clock.next() => tick,
            };
            let Some(tick) = tick else { break };

            // Day boundary: persist the closed day, clear the in-memory
            // window (durable history lives in the checkpoint store).
            let day = tick.date_naive();
            if let Some(previous) = current_day {
                if day != previous {
                    self.flush_day(previous, &mut day_stats).await?;
                }
            }
            current_day = Some(day);

            match self
                .reconciler
                .reconcile(&mut self.portfolio, check_balances)
                .await
            {
                Ok(totals) => {
                    debug!(
                        tick = %tick,
                        cash = %totals.cash,
                        positions_value = %totals.positions_value,
                        "Reconciled portfolio"
                    );
                }
                Err(ReconcileError::Sync { exchange, source }) => {
                    error!(
                        tick = %tick,
                        exchange = %exchange,
                        error = %source,
                        "Reconciliation failed; tick skipped"
                    );
                    failed_ticks += 1;
                    continue;
                }
            }

            let mut ctx = StrategyContext {
                now: tick,
                portfolio: &self.portfolio,
                tracker: &mut self.tracker,
                reconciler: &self.reconciler,
                executor: &self.executor,
            };
            if let Err(error) = self.strategy.on_tick(&mut ctx).await {
                error!(tick = %tick, error = %error, "Strategy callback failed; tick aborted");
                failed_ticks += 1;
                continue;
            }

            let stats = build_period_stats(
                &self.tracker,
                &self.portfolio,
                tick,
                tick + self.tick_interval,
            );
            self.clock.observe(&stats);
            if let Some(sink) = &self.stats_sink {
                if let Err(error) = sink.emit(&stats) {
                    warn!(tick = %tick, error = %error, "Stats export failed");
                }
            }
            day_stats.push(stats.clone());
            history.push(stats);

            if self.mode == Mode::Live {
                let snapshot = CumulativeSnapshot::capture(&self.tracker, &self.portfolio);
                let payload =
                    serde_json::to_value(&snapshot).map_err(|source| CheckpointError::Payload {
                        key: CUMULATIVE_KEY.to_string(),
                        source,
                    })?;
                self.store.save(CUMULATIVE_KEY, &payload).await?;
            }
        }

        // Flush the in-progress day so shutdown analysis sees it.
        if let Some(day) = current_day {
            self.flush_day(day, &mut day_stats).await?;
        }

        self.finalize(&history).await;

        info!(
            ticks = history.len(),
            failed_ticks,
            final_value = %self.portfolio.portfolio_value(),
            "Execution loop stopped"
        );

        Ok(RunOutcome {
            history,
            portfolio: self.portfolio,
            failed_ticks,
        })
    }

    async fn flush_day(
        &self,
        day: NaiveDate,
        day_stats: &mut Vec<PeriodStats>,
    ) -> Result<(), RuntimeError> {
        if self.mode != Mode::Live || day_stats.is_empty() {
            day_stats.clear();
            return Ok(());
        }

        let key = daily_key(day);

        // A process restarted on the same calendar day extends the day's
        // history; overwriting would lose the pre-restart records.
        let mut records: Vec<PeriodStats> = match self.store.load(&key).await {
            Ok(payload) => serde_json::from_value(payload).unwrap_or_else(|error| {
                warn!(key = %key, error = %error, "Unreadable daily checkpoint; rewriting");
                Vec::new()
            }),
            Err(error) if error.is_not_found() => Vec::new(),
            Err(error) => return Err(error.into()),
        };
        records.append(day_stats);

        let payload = serde_json::to_value(&records).map_err(|source| CheckpointError::Payload {
            key: key.clone(),
            source,
        })?;
        self.store.save(&key, &payload).await?;
        debug!(key = %key, records = records.len(), "Persisted daily stats");
        Ok(())
    }

    /// Run the final analysis hook, at most once per controller.
    ///
    /// Live runs rebuild the per-day history from the checkpoint store so
    /// that days executed by an earlier (killed) process are included;
    /// backtests analyze the in-memory history directly.
    async fn finalize(&mut self, history: &[PeriodStats]) {
        if !self.shutdown.begin_finalize() {
            return;
        }

        match self.mode {
            Mode::Backtest => self.strategy.analyze(history),
            Mode::Live => {
                let full = load_daily_history(self.store.as_ref()).await;
                self.strategy.analyze(&full);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_balances_only_for_live_real_orders() {
        assert!(Mode::Live.check_balances(false));
        assert!(!Mode::Live.check_balances(true));
        assert!(!Mode::Backtest.check_balances(false));
        assert!(!Mode::Backtest.check_balances(true));
    }

    #[tokio::test]
    async fn build_rejects_incomplete_configuration() {
        struct Noop;

        #[async_trait]
        impl Strategy for Noop {
            async fn on_tick(&mut self, _ctx: &mut StrategyContext<'_>) -> anyhow::Result<()> {
                Ok(())
            }
        }

        let result = RuntimeBuilder::new(Mode::Backtest).build(Noop).await;
        assert!(matches!(result, Err(RuntimeError::Config(_))));
    }
}
