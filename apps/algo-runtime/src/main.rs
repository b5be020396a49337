//! Algo runtime binary: wires configuration, gateways, clock, and the
//! checkpoint store, installs the signal handler, and runs a buy-and-hold
//! observer strategy until the clock exhausts or the process is interrupted.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

use algo_runtime::clock::{SimClock, WallClock};
use algo_runtime::runtime::{Strategy, StrategyContext};
use algo_runtime::stats::export::JsonLinesSink;
use algo_runtime::{
    ClockSource, FileCheckpointStore, Mode, PaperGateway, PeriodStats, RuntimeBuilder,
    RuntimeConfig,
};

/// Observer strategy: records the portfolio value each tick and prints a
/// summary over the recovered history at shutdown.
struct HoldStrategy;

#[async_trait]
impl Strategy for HoldStrategy {
    async fn on_tick(&mut self, ctx: &mut StrategyContext<'_>) -> anyhow::Result<()> {
        let value = ctx.portfolio().portfolio_value();
        ctx.record("portfolio_value", json!(value.to_string()));
        Ok(())
    }

    fn analyze(&mut self, history: &[PeriodStats]) {
        let Some(last) = history.last() else {
            info!("No history to analyze");
            return;
        };
        info!(
            periods = history.len(),
            ending_cash = %last.ending_cash,
            ending_value = %last.ending_value,
            pnl = %last.pnl,
            returns = %last.returns,
            "Final analysis"
        );
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = RuntimeConfig::from_env().context("failed to load configuration")?;
    info!(
        algo = %config.algo_name,
        mode = ?config.mode,
        simulate_orders = config.simulate_orders,
        "Configuration loaded"
    );

    let clock = match config.mode {
        Mode::Live => ClockSource::Wall(WallClock::new(config.tick_interval)),
        Mode::Backtest => {
            let start = config
                .backtest_start
                .context("ALGO_BACKTEST_START is required in backtest mode")?;
            let end = config
                .backtest_end
                .context("ALGO_BACKTEST_END is required in backtest mode")?;
            let step = chrono::Duration::from_std(config.tick_interval)
                .context("tick interval out of range")?;
            ClockSource::Sim(SimClock::from_sessions(start, end, step))
        }
    };

    let mut builder = RuntimeBuilder::new(config.mode)
        .simulate_orders(config.simulate_orders)
        .capital_base(config.capital_base)
        .retry_policy(config.retry_policy)
        .clock(clock)
        .checkpoint_store(Arc::new(FileCheckpointStore::new(&config.checkpoint_root)));

    for name in &config.exchanges {
        builder = builder.exchange(Arc::new(PaperGateway::new(name, &config.base_currency)));
    }
    if let Some(path) = &config.stats_export_path {
        builder = builder.stats_sink(Arc::new(JsonLinesSink::new(path)));
    }

    let runtime = builder
        .build(HoldStrategy)
        .await
        .context("failed to build runtime")?;

    runtime.shutdown_controller().install_signal_handler();

    let outcome = runtime.run().await.context("execution loop failed")?;
    info!(
        ticks = outcome.history.len(),
        failed_ticks = outcome.failed_ticks,
        final_value = %outcome.portfolio.portfolio_value(),
        "Run complete"
    );
    Ok(())
}
