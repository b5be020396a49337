// Allow unwrap/expect in tests - tests should panic on unexpected errors
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::default_trait_access,
        clippy::items_after_statements
    )
)]

//! Algo Runtime - Rust Core Library
//!
//! Clock-driven execution runtime for live and backtest trading strategies.
//!
//! # Architecture
//!
//! One tick at a time, the runtime:
//!
//! 1. Waits for the next tick from a [`clock::ClockSource`] (deterministic
//!    session calendar in backtest mode, wall clock in live mode)
//! 2. Reconciles the local [`portfolio::Portfolio`] ledger against every
//!    configured [`exchange::ExchangeGateway`] under bounded retry
//! 3. Invokes the user-supplied [`runtime::Strategy`] callback
//! 4. Builds an immutable [`stats::PeriodStats`] snapshot for the window
//! 5. Persists cumulative + daily checkpoints through a
//!    [`checkpoint::CheckpointStore`] so a killed process can resume without
//!    losing or double-counting performance history
//!
//! A [`runtime::ShutdownController`] intercepts termination signals, rebuilds
//! the full per-day history from checkpoints, runs the final analysis hook,
//! and lets the process exit cleanly.
//!
//! # Module layout
//!
//! - `resilience`: bounded fixed-interval retry with injected sleep/sink
//! - `exchange`: gateway trait, error taxonomy, paper + scripted gateways
//! - `portfolio`: positions, ledger, cumulative performance tracker
//! - `reconcile`: multi-exchange portfolio reconciliation
//! - `clock`: deterministic and wall-clock tick sources
//! - `stats`: period snapshot builder and export sinks
//! - `checkpoint`: durable key/value snapshot store (file + in-memory)
//! - `orders`: order style validation and shared order/transaction records
//! - `runtime`: the execution loop, strategy seam, shutdown controller
//! - `config`: environment-driven runtime configuration

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

/// Durable checkpoint persistence for crash recovery.
pub mod checkpoint;

/// Tick sources: deterministic backtest clock and live wall clock.
pub mod clock;

/// Environment-driven runtime configuration.
pub mod config;

/// Exchange gateway contract and bundled gateway implementations.
pub mod exchange;

/// Order style validation and shared order/transaction records.
pub mod orders;

/// Portfolio ledger and cumulative performance tracking.
pub mod portfolio;

/// Multi-exchange portfolio reconciliation.
pub mod reconcile;

/// Bounded retry for fallible remote operations.
pub mod resilience;

/// The execution loop, strategy seam, and shutdown controller.
pub mod runtime;

/// Period performance snapshots and export sinks.
pub mod stats;

// Re-exports of the types most callers need.
pub use checkpoint::{CheckpointStore, FileCheckpointStore, InMemoryCheckpointStore};
pub use clock::{ClockSource, SimClock, WallClock};
pub use config::RuntimeConfig;
pub use exchange::{ExchangeGateway, ExchangeSyncResult, GatewayError, PaperGateway};
pub use orders::{OrderRecord, OrderStyle, TransactionRecord, resolve_order_style};
pub use portfolio::{Portfolio, Position};
pub use reconcile::{PortfolioReconciler, ReconcileTotals};
pub use resilience::{RetryError, RetryExecutor, RetryPolicy};
pub use runtime::{
    AlgoRuntime, Mode, RuntimeBuilder, ShutdownController, Strategy, StrategyContext,
};
pub use stats::{PeriodStats, build_period_stats};
