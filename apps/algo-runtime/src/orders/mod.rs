//! Order styles, validation, and shared order/transaction records.
//!
//! The execution layer speaks a closed set of order styles: market and
//! limit. Stop orders (and anything else) are rejected eagerly by
//! [`resolve_order_style`] before any network call is made.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Order styles the execution layer can express.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "style", content = "price")]
pub enum OrderStyle {
    /// Execute at the current market price.
    Market,
    /// Execute at the given price or better.
    Limit(Decimal),
}

/// Errors from order parameter validation and pass-through order operations.
#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    /// The requested order type cannot be expressed by the execution layer.
    #[error("order type not supported: {0}")]
    UnsupportedOrderType(String),

    /// Both an explicit style and a limit price were provided.
    #[error("an order style and a limit price were both provided; pick one to avoid conflicts")]
    ConflictingStyle,

    /// The named exchange is not configured.
    #[error("unknown exchange: {0}")]
    UnknownExchange(String),

    /// A retry-wrapped gateway call failed.
    #[error("gateway call failed: {0}")]
    Gateway(#[from] crate::resilience::RetryError<crate::exchange::GatewayError>),
}

/// Resolve order parameters into a concrete [`OrderStyle`].
///
/// Validation happens before any network call:
/// - a stop price is rejected (`stop` orders are not supported)
/// - an explicit style combined with a limit price is rejected as ambiguous
/// - a bare limit price becomes [`OrderStyle::Limit`]
/// - nothing at all becomes [`OrderStyle::Market`]
///
/// # Errors
///
/// Returns [`OrderError::UnsupportedOrderType`] for stop orders and
/// [`OrderError::ConflictingStyle`] for ambiguous style + price combinations.
pub fn resolve_order_style(
    limit_price: Option<Decimal>,
    stop_price: Option<Decimal>,
    style: Option<OrderStyle>,
) -> Result<OrderStyle, OrderError> {
    if stop_price.is_some() {
        return Err(OrderError::UnsupportedOrderType("stop".to_string()));
    }

    if let Some(style) = style {
        if limit_price.is_some() {
            return Err(OrderError::ConflictingStyle);
        }
        return Ok(style);
    }

    Ok(limit_price.map_or(OrderStyle::Market, OrderStyle::Limit))
}

/// Lifecycle status of an order at an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Accepted and resting at the exchange.
    Open,
    /// Fully filled.
    Filled,
    /// Cancelled before completion.
    Cancelled,
}

/// An order as reported by an exchange gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    /// Exchange-assigned order id.
    pub order_id: String,
    /// Exchange that holds the order.
    pub exchange_id: String,
    /// Asset being traded.
    pub asset_id: String,
    /// Signed requested amount (negative = sell).
    pub amount: Decimal,
    /// Signed filled amount so far.
    pub filled: Decimal,
    /// Market or limit.
    pub style: OrderStyle,
    /// Current lifecycle status.
    pub status: OrderStatus,
    /// Last modification time, used for period windowing.
    pub last_modified: DateTime<Utc>,
}

/// A fill as reported by an exchange gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Exchange-assigned transaction id.
    pub txn_id: String,
    /// Order that produced this fill.
    pub order_id: String,
    /// Asset traded.
    pub asset_id: String,
    /// Signed filled amount.
    pub amount: Decimal,
    /// Execution price.
    pub price: Decimal,
    /// Execution time, used for period windowing.
    pub timestamp: DateTime<Utc>,
}
