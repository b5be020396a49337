//! Scripted gateway for tests.
//!
//! Returns pre-programmed sync outcomes in order, then repeats the last
//! one, and counts every call so tests can assert exact attempt counts.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::orders::OrderRecord;
use crate::portfolio::Position;

use super::{ExchangeGateway, ExchangeSyncResult, GatewayError};

/// One scripted response to `sync_positions`.
#[derive(Debug, Clone)]
pub enum SyncOutcome {
    /// Return the given result.
    Ok(ExchangeSyncResult),
    /// Fail with a transient (retryable) error.
    Transient(&'static str),
    /// Fail with a fatal (non-retryable) error.
    Fatal(&'static str),
    /// Echo the input positions and cash unchanged.
    Echo,
}

/// Programmable gateway test double.
#[derive(Debug)]
pub struct ScriptedGateway {
    name: String,
    base_currency: String,
    outcomes: Mutex<VecDeque<SyncOutcome>>,
    sync_calls: AtomicU32,
    open_orders: Mutex<Vec<OrderRecord>>,
}

impl ScriptedGateway {
    /// Create a scripted gateway that echoes syncs until programmed.
    #[must_use]
    pub fn new(name: impl Into<String>, base_currency: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_currency: base_currency.into(),
            outcomes: Mutex::new(VecDeque::new()),
            sync_calls: AtomicU32::new(0),
            open_orders: Mutex::new(Vec::new()),
        }
    }

    /// Queue the next sync outcome.
    pub fn push_outcome(&self, outcome: SyncOutcome) {
        if let Ok(mut outcomes) = self.outcomes.lock() {
            outcomes.push_back(outcome);
        }
    }

    /// Seed the open-order list.
    pub fn set_open_orders(&self, orders: Vec<OrderRecord>) {
        if let Ok(mut open) = self.open_orders.lock() {
            *open = orders;
        }
    }

    /// Number of `sync_positions` calls observed.
    #[must_use]
    pub fn sync_calls(&self) -> u32 {
        self.sync_calls.load(Ordering::SeqCst)
    }

    fn next_outcome(&self) -> SyncOutcome {
        let mut outcomes = match self.outcomes.lock() {
            Ok(guard) => guard,
            Err(_) => return SyncOutcome::Echo,
        };
        if outcomes.len() > 1 {
            outcomes.pop_front().unwrap_or(SyncOutcome::Echo)
        } else {
            // Keep replaying the last programmed outcome.
            outcomes.front().cloned().unwrap_or(SyncOutcome::Echo)
        }
    }
}

#[async_trait]
impl ExchangeGateway for ScriptedGateway {
    fn name(&self) -> &str {
        &self.name
    }

    fn base_currency(&self) -> &str {
        &self.base_currency
    }

    async fn sync_positions(
        &self,
        positions: Vec<Position>,
        _check_balances: bool,
        cash: Decimal,
    ) -> Result<ExchangeSyncResult, GatewayError> {
        self.sync_calls.fetch_add(1, Ordering::SeqCst);

        match self.next_outcome() {
            SyncOutcome::Ok(result) => Ok(result),
            SyncOutcome::Transient(message) => Err(GatewayError::Transient(message.to_string())),
            SyncOutcome::Fatal(message) => Err(GatewayError::Fatal(message.to_string())),
            SyncOutcome::Echo => {
                let positions_value = positions.iter().map(Position::market_value).sum();
                Ok(ExchangeSyncResult {
                    cash,
                    positions_value,
                    positions,
                })
            }
        }
    }

    async fn get_open_orders(
        &self,
        asset: Option<&str>,
    ) -> Result<Vec<OrderRecord>, GatewayError> {
        let open = self
            .open_orders
            .lock()
            .map_err(|_| GatewayError::Fatal("scripted order list poisoned".to_string()))?;
        Ok(open
            .iter()
            .filter(|o| asset.is_none_or(|a| o.asset_id == a))
            .cloned()
            .collect())
    }

    async fn get_order(&self, order_id: &str) -> Result<OrderRecord, GatewayError> {
        let open = self
            .open_orders
            .lock()
            .map_err(|_| GatewayError::Fatal("scripted order list poisoned".to_string()))?;
        open.iter()
            .find(|o| o.order_id == order_id)
            .cloned()
            .ok_or_else(|| GatewayError::OrderNotFound(order_id.to_string()))
    }

    async fn cancel_order(&self, order_id: &str) -> Result<(), GatewayError> {
        let mut open = self
            .open_orders
            .lock()
            .map_err(|_| GatewayError::Fatal("scripted order list poisoned".to_string()))?;
        let before = open.len();
        open.retain(|o| o.order_id != order_id);
        if open.len() == before {
            return Err(GatewayError::OrderNotFound(order_id.to_string()));
        }
        Ok(())
    }
}
