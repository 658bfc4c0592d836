//! RSI mean reversion — long when oversold, short when overbought, flat at
//! the midline.

use crate::domain::{Candle, PositionSide, SignalKind, TradeSignal};
use crate::indicators::{Indicator, IndicatorValues, Rsi};
use crate::risk::PositionLedger;
use crate::strategy::{Strategy, StrategyError};

#[derive(Debug, Clone)]
pub struct RsiReversion {
    period: usize,
    oversold: f64,
    overbought: f64,
    rsi_name: String,
}

impl RsiReversion {
    pub fn new(period: usize, oversold: f64, overbought: f64) -> Self {
        assert!(period >= 1);
        assert!(oversold < overbought, "oversold must be below overbought");
        Self {
            period,
            oversold,
            overbought,
            rsi_name: format!("rsi_{period}"),
        }
    }
}

impl Strategy for RsiReversion {
    fn name(&self) -> &str {
        "rsi_reversion"
    }

    fn warmup(&self) -> usize {
        self.period + 1
    }

    fn required_indicators(&self) -> Vec<Box<dyn Indicator>> {
        vec![Box::new(Rsi::new(self.period))]
    }

    fn analyze(
        &mut self,
        candles: &[Candle],
        index: usize,
        indicators: &IndicatorValues,
        ledger: &PositionLedger,
    ) -> Result<TradeSignal, StrategyError> {
        if index >= candles.len() {
            return Err(StrategyError::IndexOutOfRange { index, len: candles.len() });
        }

        let rsi = indicators
            .get(&self.rsi_name, index)
            .ok_or_else(|| StrategyError::MissingIndicator(self.rsi_name.clone()))?;
        if rsi.is_nan() {
            return Ok(TradeSignal::hold("warmup"));
        }

        let has_long = ledger.position(PositionSide::Long).is_some();
        let has_short = ledger.position(PositionSide::Short).is_some();

        // Midline exits take precedence over fresh entries.
        if has_long && rsi >= 50.0 {
            return Ok(TradeSignal::new(
                SignalKind::CloseLong,
                1.0,
                0.8,
                format!("rsi {rsi:.1} reverted to midline"),
            ));
        }
        if has_short && rsi <= 50.0 {
            return Ok(TradeSignal::new(
                SignalKind::CloseShort,
                1.0,
                0.8,
                format!("rsi {rsi:.1} reverted to midline"),
            ));
        }

        if rsi <= self.oversold && !has_long {
            let strength = ((self.oversold - rsi) / self.oversold).clamp(0.0, 1.0);
            return Ok(TradeSignal::new(
                SignalKind::Long,
                strength.max(0.2),
                0.6,
                format!("rsi {rsi:.1} oversold"),
            ));
        }
        if rsi >= self.overbought && !has_short {
            let strength = ((rsi - self.overbought) / (100.0 - self.overbought)).clamp(0.0, 1.0);
            return Ok(TradeSignal::new(
                SignalKind::Short,
                strength.max(0.2),
                0.6,
                format!("rsi {rsi:.1} overbought"),
            ));
        }

        Ok(TradeSignal::hold("rsi neutral"))
    }
}
