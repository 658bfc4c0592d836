//! Strategy engine — per-candle signal evaluators.
//!
//! Strategies receive the candle history up to the current index, the
//! precomputed indicator values, and a read-only view of the position
//! ledger. They may hold internal state (the hedging machine does); the
//! engine owns exactly one strategy instance per session, so state never
//! bleeds across sessions.
//!
//! Look-ahead guard: `analyze` at index t must only read `candles[..=t]`.
//! Insufficient warm-up yields `Hold`, never an error.

pub mod band_hedge;
pub mod ema_cross;
pub mod factory;
pub mod macd_cross;
pub mod rsi_reversion;

pub use band_hedge::BandHedge;
pub use ema_cross::EmaCross;
pub use factory::{create_strategy, FactoryError};
pub use macd_cross::MacdCross;
pub use rsi_reversion::RsiReversion;

use thiserror::Error;

use crate::domain::{Candle, TradeSignal};
use crate::indicators::{Indicator, IndicatorValues};
use crate::risk::PositionLedger;

/// Errors from one candle's signal generation. The engine logs these as
/// events and treats the candle as `Hold`; they never abort a session.
#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("indicator series '{0}' missing from precomputed values")]
    MissingIndicator(String),
    #[error("candle index {index} out of range ({len} candles)")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Trait for strategy evaluators.
pub trait Strategy: Send + std::fmt::Debug {
    /// Strategy identifier (e.g. "ema_cross", "band_limited_hedging").
    fn name(&self) -> &str;

    /// Candles needed before the strategy can produce non-hold output.
    fn warmup(&self) -> usize;

    /// Indicator instances the engine must precompute for this strategy.
    fn required_indicators(&self) -> Vec<Box<dyn Indicator>> {
        Vec::new()
    }

    /// Evaluate the strategy at `index`.
    ///
    /// Must only use data from `candles[0..=index]`.
    fn analyze(
        &mut self,
        candles: &[Candle],
        index: usize,
        indicators: &IndicatorValues,
        ledger: &PositionLedger,
    ) -> Result<TradeSignal, StrategyError>;

    /// Internal state transitions since the last call, for the audit trail.
    /// Drained by the engine after each `analyze`.
    fn drain_mode_changes(&mut self) -> Vec<String> {
        Vec::new()
    }
}
