//! Paper-trading gateway for simulated-order mode.
//!
//! Marks tracked positions to locally published prices and echoes the
//! caller's cash, so a paper run stays deterministic: no live balance
//! calls, no network, same contract as a real exchange.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;

use crate::orders::{OrderRecord, OrderStatus};
use crate::portfolio::Position;

use super::{ExchangeGateway, ExchangeSyncResult, GatewayError};

/// Simulated exchange: prices come from [`PaperGateway::set_mark`], orders
/// live in an in-memory book.
#[derive(Debug)]
pub struct PaperGateway {
    name: String,
    base_currency: String,
    marks: RwLock<HashMap<String, Decimal>>,
    open_orders: RwLock<HashMap<String, OrderRecord>>,
}

impl PaperGateway {
    /// Create a paper gateway reporting in the given base currency.
    #[must_use]
    pub fn new(name: impl Into<String>, base_currency: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_currency: base_currency.into(),
            marks: RwLock::new(HashMap::new()),
            open_orders: RwLock::new(HashMap::new()),
        }
    }

    /// Publish the current price for an asset.
    ///
    /// Subsequent syncs mark positions in that asset to this price.
    pub fn set_mark(&self, asset_id: impl Into<String>, price: Decimal) {
        if let Ok(mut marks) = self.marks.write() {
            marks.insert(asset_id.into(), price);
        }
    }

    /// Seed an open order into the book (test setup, fill simulation).
    pub fn insert_open_order(&self, order: OrderRecord) {
        if let Ok(mut orders) = self.open_orders.write() {
            orders.insert(order.order_id.clone(), order);
        }
    }
}

#[async_trait]
impl ExchangeGateway for PaperGateway {
    fn name(&self) -> &str {
        &self.name
    }

    fn base_currency(&self) -> &str {
        &self.base_currency
    }

    async fn sync_positions(
        &self,
        mut positions: Vec<Position>,
        _check_balances: bool,
        cash: Decimal,
    ) -> Result<ExchangeSyncResult, GatewayError> {
        let now = Utc::now();
        let marks = self
            .marks
            .read()
            .map_err(|_| GatewayError::Fatal("paper gateway mark store poisoned".to_string()))?;

        for position in &mut positions {
            if let Some(price) = marks.get(&position.asset_id) {
                position.last_sale_price = *price;
                position.last_sale_date = now;
            }
        }

        let positions_value = positions.iter().map(Position::market_value).sum();

        // No remote balance to query; the caller's cash is authoritative.
        Ok(ExchangeSyncResult {
            cash,
            positions_value,
            positions,
        })
    }

    async fn get_open_orders(
        &self,
        asset: Option<&str>,
    ) -> Result<Vec<OrderRecord>, GatewayError> {
        let orders = self
            .open_orders
            .read()
            .map_err(|_| GatewayError::Fatal("paper gateway order book poisoned".to_string()))?;

        Ok(orders
            .values()
            .filter(|o| o.status == OrderStatus::Open)
            .filter(|o| asset.is_none_or(|a| o.asset_id == a))
            .cloned()
            .collect())
    }

    async fn get_order(&self, order_id: &str) -> Result<OrderRecord, GatewayError> {
        let orders = self
            .open_orders
            .read()
            .map_err(|_| GatewayError::Fatal("paper gateway order book poisoned".to_string()))?;

        orders
            .get(order_id)
            .cloned()
            .ok_or_else(|| GatewayError::OrderNotFound(order_id.to_string()))
    }

    async fn cancel_order(&self, order_id: &str) -> Result<(), GatewayError> {
        let mut orders = self
            .open_orders
            .write()
            .map_err(|_| GatewayError::Fatal("paper gateway order book poisoned".to_string()))?;

        match orders.get_mut(order_id) {
            Some(order) => {
                order.status = OrderStatus::Cancelled;
                order.last_modified = Utc::now();
                Ok(())
            }
            None => Err(GatewayError::OrderNotFound(order_id.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use crate::orders::OrderStyle;

    use super::*;

    fn make_position(asset: &str, amount: Decimal, price: Decimal) -> Position {
        Position {
            asset_id: asset.to_string(),
            exchange_id: "paper".to_string(),
            amount,
            last_sale_price: price,
            last_sale_date: Utc::now(),
        }
    }

    fn make_order(order_id: &str, asset: &str) -> OrderRecord {
        OrderRecord {
            order_id: order_id.to_string(),
            exchange_id: "paper".to_string(),
            asset_id: asset.to_string(),
            amount: dec!(1),
            filled: dec!(0),
            style: OrderStyle::Market,
            status: OrderStatus::Open,
            last_modified: Utc::now(),
        }
    }

    #[tokio::test]
    async fn sync_marks_positions_to_published_prices() {
        let gateway = PaperGateway::new("paper", "usdt");
        gateway.set_mark("btc_usdt", dec!(120));

        let result = gateway
            .sync_positions(vec![make_position("btc_usdt", dec!(2), dec!(100))], false, dec!(500))
            .await
            .unwrap();

        assert_eq!(result.positions[0].last_sale_price, dec!(120));
        assert_eq!(result.positions_value, dec!(240));
        assert_eq!(result.cash, dec!(500));
    }

    #[tokio::test]
    async fn sync_without_mark_keeps_last_price() {
        let gateway = PaperGateway::new("paper", "usdt");

        let result = gateway
            .sync_positions(vec![make_position("eth_usdt", dec!(3), dec!(10))], false, dec!(0))
            .await
            .unwrap();

        assert_eq!(result.positions[0].last_sale_price, dec!(10));
        assert_eq!(result.positions_value, dec!(30));
    }

    #[tokio::test]
    async fn open_orders_filter_by_asset() {
        let gateway = PaperGateway::new("paper", "usdt");
        gateway.insert_open_order(make_order("o1", "btc_usdt"));
        gateway.insert_open_order(make_order("o2", "eth_usdt"));

        let all = gateway.get_open_orders(None).await.unwrap();
        assert_eq!(all.len(), 2);

        let btc = gateway.get_open_orders(Some("btc_usdt")).await.unwrap();
        assert_eq!(btc.len(), 1);
        assert_eq!(btc[0].order_id, "o1");
    }

    #[tokio::test]
    async fn cancel_marks_order_cancelled() {
        let gateway = PaperGateway::new("paper", "usdt");
        gateway.insert_open_order(make_order("o1", "btc_usdt"));

        gateway.cancel_order("o1").await.unwrap();

        let order = gateway.get_order("o1").await.unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert!(gateway.get_open_orders(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancel_unknown_order_fails() {
        let gateway = PaperGateway::new("paper", "usdt");
        let err = gateway.cancel_order("missing").await.unwrap_err();
        assert!(matches!(err, GatewayError::OrderNotFound(_)));
    }
}
