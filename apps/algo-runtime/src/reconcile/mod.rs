//! Portfolio reconciliation against authoritative exchange state.
//!
//! Once per tick the reconciler asks every configured exchange for its
//! account state, retrying transient failures, and merges the results
//! into the shared ledger. The merge is staged: nothing touches the
//! ledger until every exchange has answered, so a failing exchange can
//! never leave the portfolio half-updated.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::exchange::{ExchangeGateway, ExchangeSyncResult, GatewayError};
use crate::portfolio::Portfolio;
use crate::resilience::{RetryError, RetryExecutor};

/// Errors surfaced by a reconciliation pass.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// One exchange's sync failed past retry, or fatally. The ledger was
    /// not modified for any exchange this tick.
    #[error("sync failed for exchange '{exchange}'")]
    Sync {
        /// Exchange whose sync failed.
        exchange: String,
        /// Underlying retry outcome.
        #[source]
        source: RetryError<GatewayError>,
    },
}

/// Aggregated totals across all exchanges after one reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileTotals {
    /// Sum of per-exchange cash, in the reporting currency.
    pub cash: Decimal,
    /// Sum of per-exchange position values.
    pub positions_value: Decimal,
}

impl ReconcileTotals {
    /// `cash + positions_value`.
    #[must_use]
    pub fn portfolio_value(&self) -> Decimal {
        self.cash + self.positions_value
    }
}

/// Merges per-exchange account state into the single portfolio ledger.
pub struct PortfolioReconciler {
    executor: RetryExecutor,
    exchanges: Vec<Arc<dyn ExchangeGateway>>,
}

impl PortfolioReconciler {
    /// Create a reconciler over the configured exchanges.
    ///
    /// Exchange order matters: the first exchange's base currency is the
    /// reporting currency for the whole run.
    #[must_use]
    pub fn new(executor: RetryExecutor, exchanges: Vec<Arc<dyn ExchangeGateway>>) -> Self {
        Self {
            executor,
            exchanges,
        }
    }

    /// The configured exchanges, in reporting order.
    #[must_use]
    pub fn exchanges(&self) -> &[Arc<dyn ExchangeGateway>] {
        &self.exchanges
    }

    /// Find a configured exchange by name.
    #[must_use]
    pub fn exchange(&self, name: &str) -> Option<&Arc<dyn ExchangeGateway>> {
        self.exchanges.iter().find(|e| e.name() == name)
    }

    /// Run one reconciliation pass.
    ///
    /// Every configured exchange is synced, even those currently holding no
    /// positions, so externally opened positions are picked up. When
    /// `check_balances` is false (simulated-order mode) the exchanges' cash
    /// figures are discarded and the locally tracked cash is kept.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Sync`] when any exchange fails past retry
    /// or fatally. In that case the ledger is left exactly as it was.
    pub async fn reconcile(
        &self,
        portfolio: &mut Portfolio,
        check_balances: bool,
    ) -> Result<ReconcileTotals, ReconcileError> {
        let mut staged: Vec<(&str, ExchangeSyncResult)> = Vec::with_capacity(self.exchanges.len());

        let base_currency = self.exchanges.first().map(|e| e.base_currency());

        for gateway in &self.exchanges {
            if let Some(base) = base_currency {
                if gateway.base_currency() != base {
                    warn!(
                        exchange = %gateway.name(),
                        reporting_currency = %base,
                        exchange_currency = %gateway.base_currency(),
                        "exchange reports in a different base currency; no conversion is applied"
                    );
                }
            }

            let positions = portfolio.positions_for_exchange(gateway.name());
            let cash = portfolio.cash;

            let result = self
                .executor
                .execute(&format!("sync_positions[{}]", gateway.name()), || {
                    gateway.sync_positions(positions.clone(), check_balances, cash)
                })
                .await
                .map_err(|source| ReconcileError::Sync {
                    exchange: gateway.name().to_string(),
                    source,
                })?;

            staged.push((gateway.name(), result));
        }

        // Every exchange answered; apply the staged results.
        let mut totals = ReconcileTotals {
            cash: Decimal::ZERO,
            positions_value: Decimal::ZERO,
        };

        for (exchange, result) in staged {
            totals.cash += result.cash;
            totals.positions_value += result.positions_value;

            for position in result.positions {
                debug!(
                    exchange = %exchange,
                    asset = %position.asset_id,
                    amount = %position.amount,
                    "merging synced position"
                );
                if position.amount == Decimal::ZERO {
                    portfolio.positions.remove(&position.asset_id);
                } else {
                    portfolio
                        .positions
                        .insert(position.asset_id.clone(), position);
                }
            }
        }

        if check_balances {
            portfolio.cash = totals.cash;
        } else {
            // Simulated-order mode: exchange cash figures are discarded and
            // the locally tracked cash stays authoritative.
            totals.cash = portfolio.cash;
        }

        Ok(totals)
    }
}
