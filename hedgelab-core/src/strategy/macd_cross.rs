//! MACD histogram cross — long when the histogram turns positive, short
//! when it turns negative.

use crate::domain::{Candle, SignalKind, TradeSignal};
use crate::indicators::{Indicator, IndicatorValues, Macd};
use crate::risk::PositionLedger;
use crate::strategy::{Strategy, StrategyError};

#[derive(Debug, Clone)]
pub struct MacdCross {
    fast: usize,
    slow: usize,
    signal_period: usize,
    histogram_name: String,
}

impl MacdCross {
    pub fn new(fast: usize, slow: usize, signal_period: usize) -> Self {
        assert!(fast >= 1 && slow > fast && signal_period >= 1);
        Self {
            fast,
            slow,
            signal_period,
            histogram_name: format!("macd_histogram_{fast}_{slow}_{signal_period}"),
        }
    }
}

impl Strategy for MacdCross {
    fn name(&self) -> &str {
        "macd_cross"
    }

    fn warmup(&self) -> usize {
        self.slow + self.signal_period - 1
    }

    fn required_indicators(&self) -> Vec<Box<dyn Indicator>> {
        vec![Box::new(Macd::histogram(self.fast, self.slow, self.signal_period))]
    }

    fn analyze(
        &mut self,
        candles: &[Candle],
        index: usize,
        indicators: &IndicatorValues,
        _ledger: &PositionLedger,
    ) -> Result<TradeSignal, StrategyError> {
        if index >= candles.len() {
            return Err(StrategyError::IndexOutOfRange { index, len: candles.len() });
        }
        if index == 0 {
            return Ok(TradeSignal::hold("warmup"));
        }

        let hist = indicators
            .get(&self.histogram_name, index)
            .ok_or_else(|| StrategyError::MissingIndicator(self.histogram_name.clone()))?;
        let hist_prev = indicators
            .get(&self.histogram_name, index - 1)
            .ok_or_else(|| StrategyError::MissingIndicator(self.histogram_name.clone()))?;

        if hist.is_nan() || hist_prev.is_nan() {
            return Ok(TradeSignal::hold("warmup"));
        }

        let price = candles[index].close;

        // Sub-epsilon histogram values count as zero, same as the EMA cross:
        // float rounding on a flat tape must not flicker a flip.
        let eps = price.abs() * 1e-9;
        let snap = |h: f64| if h.abs() < eps { 0.0 } else { h };
        let hist = snap(hist);
        let hist_prev = snap(hist_prev);
        let confidence = if price > 0.0 {
            (hist.abs() / price / 0.001).clamp(0.0, 1.0)
        } else {
            0.0
        };

        if hist_prev <= 0.0 && hist > 0.0 {
            return Ok(TradeSignal::new(
                SignalKind::Long,
                1.0,
                confidence,
                "macd histogram turned positive",
            ));
        }
        if hist_prev >= 0.0 && hist < 0.0 {
            return Ok(TradeSignal::new(
                SignalKind::Short,
                1.0,
                confidence,
                "macd histogram turned negative",
            ));
        }

        Ok(TradeSignal::hold("no histogram flip"))
    }
}
