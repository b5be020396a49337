//! Per-period performance snapshots.
//!
//! One [`PeriodStats`] record is built per tick, covering the half-open
//! window `[period_open, period_close)`. Records are immutable once built
//! and are both checkpointed and kept in an in-memory sequence for the
//! current calendar day.
//!
//! # Module Structure
//!
//! - [`export`]: optional external stats sinks (fire and forget)

pub mod export;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::orders::{OrderRecord, TransactionRecord};
use crate::portfolio::{PerformanceTracker, Portfolio, Position};

/// Immutable performance snapshot for one closed time window.
///
/// Lists are always present, even when empty, so downstream consumers can
/// rely on field presence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodStats {
    /// Start of the window (inclusive).
    pub period_open: DateTime<Utc>,
    /// End of the window (exclusive).
    pub period_close: DateTime<Utc>,
    /// Cash at the start of the tracked run.
    pub starting_cash: Decimal,
    /// Cash at window close.
    pub ending_cash: Decimal,
    /// Positions value at the start of the tracked run.
    pub starting_value: Decimal,
    /// Positions value at window close.
    pub ending_value: Decimal,
    /// Profit and loss since the tracked run started.
    pub pnl: Decimal,
    /// `pnl` as a fraction of the starting portfolio value.
    pub returns: Decimal,
    /// Market value held long at window close.
    pub long_exposure: Decimal,
    /// Market value held short at window close (non-positive).
    pub short_exposure: Decimal,
    /// Number of long positions at window close.
    pub longs_count: usize,
    /// Number of short positions at window close.
    pub shorts_count: usize,
    /// Position snapshot at window close.
    pub positions: Vec<Position>,
    /// Orders last modified inside the window.
    pub orders: Vec<OrderRecord>,
    /// Fills that occurred inside the window.
    pub transactions: Vec<TransactionRecord>,
    /// Strategy-recorded custom variables, latest value per name.
    pub custom_vars: BTreeMap<String, Value>,
}

impl PeriodStats {
    /// Portfolio value at window close.
    #[must_use]
    pub fn ending_portfolio_value(&self) -> Decimal {
        self.ending_cash + self.ending_value
    }
}

/// Build the stats record for `[start, end)`.
///
/// Pure function of its inputs: cumulative fields come from the tracker,
/// point-in-time fields from the ledger, and activity lists are filtered to
/// the window. A window with no activity yields empty lists.
#[must_use]
pub fn build_period_stats(
    tracker: &PerformanceTracker,
    portfolio: &Portfolio,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> PeriodStats {
    let ending_cash = portfolio.cash;
    let ending_value = portfolio.positions_value();
    let starting_total = tracker.starting_cash + tracker.starting_value;
    let pnl = (ending_cash + ending_value) - starting_total;
    let returns = if starting_total == Decimal::ZERO {
        Decimal::ZERO
    } else {
        pnl / starting_total
    };

    let mut long_exposure = Decimal::ZERO;
    let mut short_exposure = Decimal::ZERO;
    let mut longs_count = 0;
    let mut shorts_count = 0;
    for position in portfolio.positions.values() {
        if position.is_long() {
            long_exposure += position.market_value();
            longs_count += 1;
        } else if position.is_short() {
            short_exposure += position.market_value();
            shorts_count += 1;
        }
    }

    PeriodStats {
        period_open: start,
        period_close: end,
        starting_cash: tracker.starting_cash,
        ending_cash,
        starting_value: tracker.starting_value,
        ending_value,
        pnl,
        returns,
        long_exposure,
        short_exposure,
        longs_count,
        shorts_count,
        positions: portfolio.positions.values().cloned().collect(),
        orders: tracker.orders_in(start, end),
        transactions: tracker.transactions_in(start, end),
        custom_vars: tracker.recorded_vars().clone(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    use crate::orders::{OrderStatus, OrderStyle};

    use super::*;

    fn ts(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 14, minute, 0).unwrap()
    }

    fn make_position(asset: &str, amount: Decimal, price: Decimal) -> Position {
        Position {
            asset_id: asset.to_string(),
            exchange_id: "binance".to_string(),
            amount,
            last_sale_price: price,
            last_sale_date: ts(0),
        }
    }

    #[test]
    fn empty_window_yields_present_empty_lists() {
        let tracker = PerformanceTracker::new(dec!(1000), ts(0));
        let portfolio = Portfolio::new(dec!(1000));

        let stats = build_period_stats(&tracker, &portfolio, ts(1), ts(2));

        assert!(stats.transactions.is_empty());
        assert!(stats.orders.is_empty());
        assert!(stats.positions.is_empty());
        assert_eq!(stats.pnl, dec!(0));
        assert_eq!(stats.returns, dec!(0));
    }

    #[test]
    fn pnl_and_returns_measure_against_run_start() {
        let tracker = PerformanceTracker::new(dec!(1000), ts(0));
        let mut portfolio = Portfolio::new(dec!(800));
        portfolio.positions.insert(
            "btc_usdt".to_string(),
            make_position("btc_usdt", dec!(2), dec!(200)),
        );

        let stats = build_period_stats(&tracker, &portfolio, ts(0), ts(1));

        // 800 cash + 400 positions against a 1000 start.
        assert_eq!(stats.pnl, dec!(200));
        assert_eq!(stats.returns, dec!(0.2));
        assert_eq!(stats.ending_portfolio_value(), dec!(1200));
    }

    #[test]
    fn exposure_splits_longs_and_shorts() {
        let tracker = PerformanceTracker::new(dec!(0), ts(0));
        let mut portfolio = Portfolio::new(dec!(0));
        portfolio.positions.insert(
            "btc_usdt".to_string(),
            make_position("btc_usdt", dec!(1), dec!(100)),
        );
        portfolio.positions.insert(
            "eth_usdt".to_string(),
            make_position("eth_usdt", dec!(-2), dec!(30)),
        );

        let stats = build_period_stats(&tracker, &portfolio, ts(0), ts(1));

        assert_eq!(stats.long_exposure, dec!(100));
        assert_eq!(stats.short_exposure, dec!(-60));
        assert_eq!(stats.longs_count, 1);
        assert_eq!(stats.shorts_count, 1);
    }

    #[test]
    fn activity_is_filtered_to_the_window() {
        let mut tracker = PerformanceTracker::new(dec!(0), ts(0));
        for minute in [0, 1, 2] {
            tracker.record_transaction(TransactionRecord {
                txn_id: format!("t{minute}"),
                order_id: "o1".to_string(),
                asset_id: "btc_usdt".to_string(),
                amount: dec!(1),
                price: dec!(100),
                timestamp: ts(minute),
            });
            tracker.record_order(OrderRecord {
                order_id: format!("o{minute}"),
                exchange_id: "binance".to_string(),
                asset_id: "btc_usdt".to_string(),
                amount: dec!(1),
                filled: dec!(1),
                style: OrderStyle::Market,
                status: OrderStatus::Filled,
                last_modified: ts(minute),
            });
        }
        let portfolio = Portfolio::new(dec!(0));

        let stats = build_period_stats(&tracker, &portfolio, ts(1), ts(2));

        assert_eq!(stats.transactions.len(), 1);
        assert_eq!(stats.transactions[0].txn_id, "t1");
        assert_eq!(stats.orders.len(), 1);
        assert_eq!(stats.orders[0].order_id, "o1");
    }

    #[test]
    fn custom_vars_are_carried_into_the_snapshot() {
        let mut tracker = PerformanceTracker::new(dec!(0), ts(0));
        tracker.record_var("rsi", Value::from(31.5));
        let portfolio = Portfolio::new(dec!(0));

        let stats = build_period_stats(&tracker, &portfolio, ts(0), ts(1));

        assert_eq!(stats.custom_vars.get("rsi"), Some(&Value::from(31.5)));
    }
}
