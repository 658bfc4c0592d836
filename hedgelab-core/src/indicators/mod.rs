//! Indicator library — pure precomputed series.
//!
//! Indicators take a full candle series and produce a numeric series of the
//! same length; the first `lookback()` values are `f64::NAN`. They are
//! precomputed once before the replay loop and queried per candle through
//! `IndicatorValues`.
//!
//! Look-ahead guard: no indicator value at candle t may depend on data from
//! candle t+1 or later. Every indicator must pass the truncated-vs-full
//! series test.
//!
//! Multi-series indicators (MACD, Bollinger) are exposed as separate named
//! instances per series, keeping the single-series trait unchanged.

pub mod adx;
pub mod atr;
pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod rsi;

pub use adx::Adx;
pub use atr::Atr;
pub use bollinger::{Bollinger, BollingerBand};
pub use ema::Ema;
pub use macd::{Macd, MacdSeries};
pub use rsi::Rsi;

use std::collections::HashMap;

use crate::domain::Candle;

/// Trait for indicators.
pub trait Indicator: Send + Sync {
    /// Instance name, unique per parameterization (e.g. "ema_21", "rsi_14").
    fn name(&self) -> &str;

    /// Number of candles needed before the indicator produces valid output.
    fn lookback(&self) -> usize;

    /// Compute the indicator for the entire candle series.
    ///
    /// Returns a `Vec<f64>` of the same length as `candles`; the first
    /// `lookback()` values are `f64::NAN`.
    fn compute(&self, candles: &[Candle]) -> Vec<f64>;
}

/// Container for precomputed indicator values, queried by candle index.
#[derive(Debug, Clone, Default)]
pub struct IndicatorValues {
    series: HashMap<String, Vec<f64>>,
}

impl IndicatorValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, values: Vec<f64>) {
        self.series.insert(name.into(), values);
    }

    /// Value of a named series at a candle index. `None` when the series is
    /// missing or the index is out of bounds; NaN during warmup.
    pub fn get(&self, name: &str, index: usize) -> Option<f64> {
        self.series.get(name).and_then(|v| v.get(index).copied())
    }

    pub fn get_series(&self, name: &str) -> Option<&[f64]> {
        self.series.get(name).map(|v| v.as_slice())
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

/// Precompute a set of indicators over one candle series, deduplicated by
/// instance name.
pub fn precompute(candles: &[Candle], indicators: &[Box<dyn Indicator>]) -> IndicatorValues {
    let mut values = IndicatorValues::new();
    for ind in indicators {
        if values.get_series(ind.name()).is_none() {
            values.insert(ind.name().to_string(), ind.compute(candles));
        }
    }
    values
}

/// Largest lookback among a set of indicators.
pub fn max_lookback(indicators: &[Box<dyn Indicator>]) -> usize {
    indicators.iter().map(|i| i.lookback()).max().unwrap_or(0)
}

/// Create synthetic candles from close prices for testing.
///
/// Generates plausible OHLV: open = prev close (or close for the first
/// candle), high/low bracket open and close, volume constant.
#[cfg(test)]
pub fn make_candles(closes: &[f64]) -> Vec<Candle> {
    use chrono::{Duration, TimeZone, Utc};
    let base_ts = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            let high = open.max(close) + 1.0;
            let low = (open.min(close) - 1.0).max(0.01);
            Candle {
                ts: base_ts + Duration::hours(i as i64),
                open,
                high,
                low,
                close,
                volume: 1000.0,
            }
        })
        .collect()
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
