//! Equity curve points.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One equity observation per processed candle.
///
/// `balance` is the realized account value (initial capital plus net
/// realized PnL, all fees deducted); `equity` adds unrealized PnL of open
/// positions. `peak_equity` is the running maximum of `equity` and
/// `drawdown = (peak_equity - equity) / peak_equity`, always >= 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub ts: DateTime<Utc>,
    pub equity: f64,
    pub balance: f64,
    pub drawdown: f64,
    pub peak_equity: f64,
}

impl EquityPoint {
    /// Build the next point from the previous peak.
    pub fn next(ts: DateTime<Utc>, equity: f64, balance: f64, prev_peak: f64) -> Self {
        let peak_equity = prev_peak.max(equity);
        let drawdown = if peak_equity > 0.0 {
            (peak_equity - equity) / peak_equity
        } else {
            0.0
        };
        Self {
            ts,
            equity,
            balance,
            drawdown,
            peak_equity,
        }
    }
}
