//! Environment-driven runtime configuration.
//!
//! All settings come from `ALGO_*` environment variables (a `.env` file is
//! honored by the binary). Every variable has a default suitable for a
//! simulated-order paper run.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::resilience::RetryPolicy;
use crate::runtime::Mode;

/// Errors from configuration parsing.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A variable held a value that could not be parsed.
    #[error("invalid value '{value}' for {var}")]
    Invalid {
        /// Variable name.
        var: &'static str,
        /// The rejected value.
        value: String,
    },
}

/// Runtime configuration, resolved once at startup.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Algorithm name; namespaces the checkpoint directory.
    pub algo_name: String,
    /// Backtest or live.
    pub mode: Mode,
    /// Whether orders are simulated.
    pub simulate_orders: bool,
    /// Starting capital for a cold run.
    pub capital_base: Decimal,
    /// Exchanges to configure, in reporting order.
    pub exchanges: Vec<String>,
    /// Base currency the paper gateways report in.
    pub base_currency: String,
    /// Root directory for checkpoint files.
    pub checkpoint_root: PathBuf,
    /// Wall-clock tick period.
    pub tick_interval: Duration,
    /// Retry policy for remote exchange calls.
    pub retry_policy: RetryPolicy,
    /// Optional JSON-lines stats export path.
    pub stats_export_path: Option<PathBuf>,
    /// Backtest session start (RFC 3339), required for backtest mode.
    pub backtest_start: Option<DateTime<Utc>>,
    /// Backtest session end (RFC 3339), required for backtest mode.
    pub backtest_end: Option<DateTime<Utc>>,
}

impl RuntimeConfig {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a set variable fails to parse;
    /// unset variables fall back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let algo_name = var_or("ALGO_NAME", "algo");
        let mode = match var_or("ALGO_MODE", "live").as_str() {
            "live" => Mode::Live,
            "backtest" => Mode::Backtest,
            other => {
                return Err(ConfigError::Invalid {
                    var: "ALGO_MODE",
                    value: other.to_string(),
                });
            }
        };
        let simulate_orders = parse_var("ALGO_SIMULATE_ORDERS", true)?;
        let capital_base = parse_var("ALGO_CAPITAL_BASE", Decimal::new(10_000, 0))?;
        let exchanges = var_or("ALGO_EXCHANGES", "paper")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        let base_currency = var_or("ALGO_BASE_CURRENCY", "usd");
        let checkpoint_root =
            PathBuf::from(var_or("ALGO_CHECKPOINT_DIR", ".algo-state")).join(&algo_name);
        let tick_interval = tick_interval_from_secs(parse_var("ALGO_TICK_INTERVAL_SECS", 60_u64)?)?;
        let retry_policy = RetryPolicy::new(
            parse_var("ALGO_RETRY_MAX_ATTEMPTS", 5_u32)?,
            Duration::from_secs(parse_var("ALGO_RETRY_SLEEP_SECS", 5_u64)?),
        );
        let stats_export_path = std::env::var("ALGO_STATS_EXPORT_PATH")
            .ok()
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);
        let backtest_start = parse_datetime("ALGO_BACKTEST_START")?;
        let backtest_end = parse_datetime("ALGO_BACKTEST_END")?;

        Ok(Self {
            algo_name,
            mode,
            simulate_orders,
            capital_base,
            exchanges,
            base_currency,
            checkpoint_root,
            tick_interval,
            retry_policy,
            stats_export_path,
            backtest_start,
            backtest_end,
        })
    }
}

fn tick_interval_from_secs(secs: u64) -> Result<Duration, ConfigError> {
    if secs == 0 {
        return Err(ConfigError::Invalid {
            var: "ALGO_TICK_INTERVAL_SECS",
            value: "0".to_string(),
        });
    }
    Ok(Duration::from_secs(secs))
}

fn parse_datetime(var: &'static str) -> Result<Option<DateTime<Utc>>, ConfigError> {
    match std::env::var(var) {
        Ok(raw) => DateTime::parse_from_rfc3339(&raw)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|_| ConfigError::Invalid { var, value: raw }),
        Err(_) => Ok(None),
    }
}

fn var_or(var: &'static str, default: &str) -> String {
    std::env::var(var).unwrap_or_else(|_| default.to_string())
}

fn parse_var<T: std::str::FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(var) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
            var,
            value: raw.clone(),
        }),
        Err(_) => Ok(default),
    }
}
