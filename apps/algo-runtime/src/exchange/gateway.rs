//! The exchange gateway trait and its error taxonomy.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::orders::OrderRecord;
use crate::portfolio::Position;
use crate::resilience::Retryable;

/// Errors from exchange gateway operations.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The request failed for a recoverable reason (timeout, rate limit,
    /// connection reset). Retried up to the policy limit.
    #[error("transient exchange request failure: {0}")]
    Transient(String),

    /// Non-recoverable failure (bad credentials, unsupported operation).
    /// Surfaced immediately, never retried.
    #[error("fatal exchange error: {0}")]
    Fatal(String),

    /// The exchange does not know the order.
    #[error("order not found: {0}")]
    OrderNotFound(String),
}

impl Retryable for GatewayError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Result of one exchange's position sync.
///
/// Immutable and scoped to the exchange that produced it; the reconciler
/// merges these into the shared ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeSyncResult {
    /// Cash available at this exchange, in its base currency.
    pub cash: Decimal,
    /// Total market value of this exchange's positions.
    pub positions_value: Decimal,
    /// Refreshed positions, amounts and prices authoritative.
    pub positions: Vec<Position>,
}

/// Uniform contract implemented once per exchange.
///
/// Every call may fail with [`GatewayError::Transient`] (retryable) or
/// [`GatewayError::Fatal`] (not retryable); callers wrap invocations in the
/// runtime's `RetryExecutor`.
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    /// Exchange identifier; positions carry it as `exchange_id`.
    fn name(&self) -> &str;

    /// Base currency this exchange reports cash in.
    fn base_currency(&self) -> &str;

    /// Reconcile the given locally tracked positions against the exchange's
    /// authoritative account state.
    ///
    /// When `check_balances` is false (simulated-order mode) the gateway may
    /// skip live balance calls and echo the input `cash` unchanged.
    async fn sync_positions(
        &self,
        positions: Vec<Position>,
        check_balances: bool,
        cash: Decimal,
    ) -> Result<ExchangeSyncResult, GatewayError>;

    /// Open orders, optionally filtered to one asset.
    async fn get_open_orders(&self, asset: Option<&str>)
    -> Result<Vec<OrderRecord>, GatewayError>;

    /// Look up one order by id.
    async fn get_order(&self, order_id: &str) -> Result<OrderRecord, GatewayError>;

    /// Cancel an open order.
    async fn cancel_order(&self, order_id: &str) -> Result<(), GatewayError>;
}
