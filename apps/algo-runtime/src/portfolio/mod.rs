//! Portfolio ledger and cumulative performance tracking.
//!
//! Exactly one [`Portfolio`] exists per running algorithm. Position entries
//! are mutated only by the reconciler, and only with data produced by the
//! exchange that owns the position.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::orders::{OrderRecord, TransactionRecord};

/// A tracked position in one asset at one exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Asset identifier, unique across exchanges.
    pub asset_id: String,
    /// Exchange that holds this position.
    pub exchange_id: String,
    /// Signed amount; fractional amounts are allowed.
    pub amount: Decimal,
    /// Last observed sale price.
    pub last_sale_price: Decimal,
    /// Time of the last observed sale.
    pub last_sale_date: DateTime<Utc>,
}

impl Position {
    /// Market value of the position at the last sale price.
    #[must_use]
    pub fn market_value(&self) -> Decimal {
        self.amount * self.last_sale_price
    }

    /// Whether this is a long position.
    #[must_use]
    pub fn is_long(&self) -> bool {
        self.amount > Decimal::ZERO
    }

    /// Whether this is a short position.
    #[must_use]
    pub fn is_short(&self) -> bool {
        self.amount < Decimal::ZERO
    }
}

/// The locally tracked cash + positions for one running algorithm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    /// Available cash in the reporting currency.
    pub cash: Decimal,
    /// Positions keyed by asset id (unique keys).
    pub positions: BTreeMap<String, Position>,
}

impl Portfolio {
    /// Create a portfolio holding only starting cash.
    #[must_use]
    pub fn new(starting_cash: Decimal) -> Self {
        Self {
            cash: starting_cash,
            positions: BTreeMap::new(),
        }
    }

    /// Total market value of all positions.
    #[must_use]
    pub fn positions_value(&self) -> Decimal {
        self.positions.values().map(Position::market_value).sum()
    }

    /// `cash + positions_value`, recomputed on every call.
    #[must_use]
    pub fn portfolio_value(&self) -> Decimal {
        self.cash + self.positions_value()
    }

    /// Positions held at the named exchange, cloned for a sync call.
    #[must_use]
    pub fn positions_for_exchange(&self, exchange_id: &str) -> Vec<Position> {
        self.positions
            .values()
            .filter(|p| p.exchange_id == exchange_id)
            .cloned()
            .collect()
    }
}

/// Cumulative performance state carried across ticks.
///
/// The tracker records activity (orders, transactions, custom variables)
/// and the run's starting point; ending values are always derived from the
/// live [`Portfolio`] so they can never go stale beyond one tick.
#[derive(Debug, Clone)]
pub struct PerformanceTracker {
    /// Capital the algorithm started with.
    pub capital_base: Decimal,
    /// Start of the tracked period.
    pub period_start: DateTime<Utc>,
    /// Cash at period start.
    pub starting_cash: Decimal,
    /// Positions value at period start.
    pub starting_value: Decimal,
    /// All fills observed so far, in arrival order.
    transactions: Vec<TransactionRecord>,
    /// All order updates observed so far, in arrival order.
    orders: Vec<OrderRecord>,
    /// Strategy-recorded custom variables, latest value per name.
    recorded_vars: BTreeMap<String, Value>,
}

impl PerformanceTracker {
    /// Create a tracker for a run starting cold.
    #[must_use]
    pub fn new(capital_base: Decimal, period_start: DateTime<Utc>) -> Self {
        Self {
            capital_base,
            period_start,
            starting_cash: capital_base,
            starting_value: Decimal::ZERO,
            transactions: Vec::new(),
            orders: Vec::new(),
            recorded_vars: BTreeMap::new(),
        }
    }

    /// Record a fill.
    pub fn record_transaction(&mut self, txn: TransactionRecord) {
        self.transactions.push(txn);
    }

    /// Record an order update.
    pub fn record_order(&mut self, order: OrderRecord) {
        self.orders.push(order);
    }

    /// Record (or overwrite) a strategy custom variable.
    pub fn record_var(&mut self, name: impl Into<String>, value: Value) {
        self.recorded_vars.insert(name.into(), value);
    }

    /// Latest recorded custom variables.
    #[must_use]
    pub const fn recorded_vars(&self) -> &BTreeMap<String, Value> {
        &self.recorded_vars
    }

    /// Mutable access for the strategy context.
    pub const fn recorded_vars_mut(&mut self) -> &mut BTreeMap<String, Value> {
        &mut self.recorded_vars
    }

    /// Transactions whose timestamp lies in `[start, end)`.
    #[must_use]
    pub fn transactions_in(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<TransactionRecord> {
        self.transactions
            .iter()
            .filter(|t| t.timestamp >= start && t.timestamp < end)
            .cloned()
            .collect()
    }

    /// Orders whose last modification lies in `[start, end)`.
    #[must_use]
    pub fn orders_in(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<OrderRecord> {
        self.orders
            .iter()
            .filter(|o| o.last_modified >= start && o.last_modified < end)
            .cloned()
            .collect()
    }
}

/// Serialized cumulative state: the crash-recovery payload.
///
/// Written under the cumulative checkpoint key every tick; loaded once at
/// startup to resume a killed process without double-counting history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CumulativeSnapshot {
    /// Capital the algorithm started with.
    pub capital_base: Decimal,
    /// Start of the tracked period.
    pub period_start: DateTime<Utc>,
    /// Cash at snapshot time.
    pub ending_cash: Decimal,
    /// Positions value at snapshot time.
    pub ending_value: Decimal,
    /// Full position set at snapshot time.
    pub positions: Vec<Position>,
    /// Latest recorded custom variables.
    pub recorded_vars: BTreeMap<String, Value>,
}

impl CumulativeSnapshot {
    /// Capture the current cumulative state.
    #[must_use]
    pub fn capture(tracker: &PerformanceTracker, portfolio: &Portfolio) -> Self {
        Self {
            capital_base: tracker.capital_base,
            period_start: tracker.period_start,
            ending_cash: portfolio.cash,
            ending_value: portfolio.positions_value(),
            positions: portfolio.positions.values().cloned().collect(),
            recorded_vars: tracker.recorded_vars().clone(),
        }
    }

    /// Restore tracker and ledger state from this snapshot.
    ///
    /// The resumed period opens where the snapshot closed: starting cash and
    /// value become the snapshot's ending cash and value.
    pub fn apply(self, tracker: &mut PerformanceTracker, portfolio: &mut Portfolio) {
        tracker.capital_base = self.capital_base;
        tracker.period_start = self.period_start;
        tracker.starting_cash = self.ending_cash;
        tracker.starting_value = self.ending_value;
        tracker.recorded_vars = self.recorded_vars;

        portfolio.cash = self.ending_cash;
        portfolio.positions = self
            .positions
            .into_iter()
            .map(|p| (p.asset_id.clone(), p))
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    use super::*;

    fn ts(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 10, minute, 0).unwrap()
    }

    fn make_position(asset: &str, exchange: &str, amount: Decimal, price: Decimal) -> Position {
        Position {
            asset_id: asset.to_string(),
            exchange_id: exchange.to_string(),
            amount,
            last_sale_price: price,
            last_sale_date: ts(0),
        }
    }

    #[test]
    fn portfolio_value_is_cash_plus_positions() {
        let mut portfolio = Portfolio::new(dec!(1000));
        portfolio.positions.insert(
            "btc_usdt".to_string(),
            make_position("btc_usdt", "binance", dec!(0.5), dec!(200)),
        );
        portfolio.positions.insert(
            "eth_usdt".to_string(),
            make_position("eth_usdt", "binance", dec!(-1), dec!(50)),
        );

        assert_eq!(portfolio.positions_value(), dec!(50));
        assert_eq!(portfolio.portfolio_value(), dec!(1050));
    }

    #[test]
    fn positions_for_exchange_filters_by_exchange_id() {
        let mut portfolio = Portfolio::new(dec!(0));
        portfolio.positions.insert(
            "btc_usdt".to_string(),
            make_position("btc_usdt", "binance", dec!(1), dec!(100)),
        );
        portfolio.positions.insert(
            "eth_usd".to_string(),
            make_position("eth_usd", "bitfinex", dec!(2), dec!(10)),
        );

        let binance = portfolio.positions_for_exchange("binance");
        assert_eq!(binance.len(), 1);
        assert_eq!(binance[0].asset_id, "btc_usdt");
    }

    #[test]
    fn tracker_windows_filter_half_open_intervals() {
        let mut tracker = PerformanceTracker::new(dec!(1000), ts(0));
        for minute in [0, 1, 2] {
            tracker.record_transaction(TransactionRecord {
                txn_id: format!("t{minute}"),
                order_id: "o1".to_string(),
                asset_id: "btc_usdt".to_string(),
                amount: dec!(1),
                price: dec!(100),
                timestamp: ts(minute),
            });
        }

        let window = tracker.transactions_in(ts(1), ts(2));
        assert_eq!(window.len(), 1);
        assert_eq!(window[0].txn_id, "t1");
    }

    #[test]
    fn snapshot_roundtrip_restores_ledger_and_tracker() {
        let mut portfolio = Portfolio::new(dec!(500));
        portfolio.positions.insert(
            "btc_usdt".to_string(),
            make_position("btc_usdt", "binance", dec!(2), dec!(300)),
        );
        let mut tracker = PerformanceTracker::new(dec!(1000), ts(0));
        tracker.record_var("signal", Value::from(7));

        let snapshot = CumulativeSnapshot::capture(&tracker, &portfolio);
        let json = serde_json::to_value(&snapshot).unwrap();
        let restored: CumulativeSnapshot = serde_json::from_value(json).unwrap();

        let mut fresh_portfolio = Portfolio::new(dec!(0));
        let mut fresh_tracker = PerformanceTracker::new(dec!(0), ts(5));
        restored.apply(&mut fresh_tracker, &mut fresh_portfolio);

        assert_eq!(fresh_portfolio.cash, dec!(500));
        assert_eq!(fresh_portfolio.positions.len(), 1);
        assert_eq!(fresh_portfolio.positions_value(), dec!(600));
        assert_eq!(fresh_tracker.capital_base, dec!(1000));
        assert_eq!(fresh_tracker.starting_cash, dec!(500));
        assert_eq!(fresh_tracker.starting_value, dec!(600));
        assert_eq!(fresh_tracker.recorded_vars().get("signal"), Some(&Value::from(7)));
    }
}
