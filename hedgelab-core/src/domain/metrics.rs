//! Aggregate session metrics — the persisted summary row.
//!
//! Computation lives in the runner's metrics module; the type lives here so
//! the storage ports can persist it without depending on the runner.

use serde::{Deserialize, Serialize};

/// Derived once from the full trade list + equity curve at session end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetrics {
    /// Count of executed close fills (open fills are not trades here).
    pub total_trades: u64,
    pub win_rate: f64,
    pub total_pnl: f64,
    pub total_return: f64,
    pub max_drawdown: f64,
    pub sharpe: f64,
    pub profit_factor: f64,
    pub expectancy: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
}

impl SessionMetrics {
    pub fn empty() -> Self {
        Self {
            total_trades: 0,
            win_rate: 0.0,
            total_pnl: 0.0,
            total_return: 0.0,
            max_drawdown: 0.0,
            sharpe: 0.0,
            profit_factor: 0.0,
            expectancy: 0.0,
            avg_win: 0.0,
            avg_loss: 0.0,
        }
    }
}
