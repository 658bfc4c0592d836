//! EMA crossover — long on the fast EMA crossing above the slow, reverse
//! short on the cross down.

use crate::domain::{Candle, SignalKind, TradeSignal};
use crate::indicators::{Ema, Indicator, IndicatorValues};
use crate::risk::PositionLedger;
use crate::strategy::{Strategy, StrategyError};

#[derive(Debug, Clone)]
pub struct EmaCross {
    fast: usize,
    slow: usize,
    fast_name: String,
    slow_name: String,
}

impl EmaCross {
    pub fn new(fast: usize, slow: usize) -> Self {
        assert!(fast >= 1 && slow > fast, "EMA cross requires 1 <= fast < slow");
        Self {
            fast,
            slow,
            fast_name: format!("ema_{fast}"),
            slow_name: format!("ema_{slow}"),
        }
    }

    /// Confidence scales with the separation between the EMAs at the cross,
    /// saturating at 20 bps of price.
    fn cross_confidence(diff: f64, price: f64) -> f64 {
        if price <= 0.0 {
            return 0.0;
        }
        (diff.abs() / price / 0.002).clamp(0.0, 1.0)
    }
}

impl Strategy for EmaCross {
    fn name(&self) -> &str {
        "ema_cross"
    }

    fn warmup(&self) -> usize {
        self.slow
    }

    fn required_indicators(&self) -> Vec<Box<dyn Indicator>> {
        vec![Box::new(Ema::new(self.fast)), Box::new(Ema::new(self.slow))]
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

        let fast = indicators
            .get(&self.fast_name, index)
            .ok_or_else(|| StrategyError::MissingIndicator(self.fast_name.clone()))?;
        let slow = indicators
            .get(&self.slow_name, index)
            .ok_or_else(|| StrategyError::MissingIndicator(self.slow_name.clone()))?;
        let fast_prev = indicators
            .get(&self.fast_name, index - 1)
            .ok_or_else(|| StrategyError::MissingIndicator(self.fast_name.clone()))?;
        let slow_prev = indicators
            .get(&self.slow_name, index - 1)
            .ok_or_else(|| StrategyError::MissingIndicator(self.slow_name.clone()))?;

        if fast.is_nan() || slow.is_nan() || fast_prev.is_nan() || slow_prev.is_nan() {
            return Ok(TradeSignal::hold("warmup"));
        }

        let price = candles[index].close;

        // Sub-epsilon separations count as zero: a flat tape must never
        // flicker a cross out of float rounding in the EMA recursion.
        let eps = price.abs() * 1e-9;
        let snap = |d: f64| if d.abs() < eps { 0.0 } else { d };
        let diff = snap(fast - slow);
        let diff_prev = snap(fast_prev - slow_prev);

        if diff_prev <= 0.0 && diff > 0.0 {
            return Ok(TradeSignal::new(
                SignalKind::Long,
                1.0,
                Self::cross_confidence(diff, price),
                format!("ema_{}/{} crossed up", self.fast, self.slow),
            ));
        }
        if diff_prev >= 0.0 && diff < 0.0 {
            return Ok(TradeSignal::new(
                SignalKind::Short,
                1.0,
                Self::cross_confidence(diff, price),
                format!("ema_{}/{} crossed down", self.fast, self.slow),
            ));
        }

        Ok(TradeSignal::hold("no cross"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{make_candles, precompute};

    fn run(closes: &[f64], fast: usize, slow: usize) -> Vec<SignalKind> {
        let candles = make_candles(closes);
        let mut strategy = EmaCross::new(fast, slow);
        let values = precompute(&candles, &strategy.required_indicators());
        let ledger = PositionLedger::new("TEST", 10_000.0);
        (0..candles.len())
            .map(|i| strategy.analyze(&candles, i, &values, &ledger).unwrap().kind)
            .collect()
    }

    #[test]
    fn cross_up_emits_long() {
        // Falling then sharply rising closes force a cross up.
        let closes = [100.0, 99.0, 98.0, 97.0, 96.0, 95.0, 99.0, 104.0, 110.0, 117.0];
        let kinds = run(&closes, 2, 4);
        assert!(kinds.contains(&SignalKind::Long), "expected a long signal, got {kinds:?}");
    }

    #[test]
    fn cross_down_emits_short() {
        let closes = [100.0, 101.0, 102.0, 103.0, 104.0, 105.0, 101.0, 96.0, 90.0, 83.0];
        let kinds = run(&closes, 2, 4);
        assert!(kinds.contains(&SignalKind::Short), "expected a short signal, got {kinds:?}");
    }

    #[test]
    fn monotone_trend_signals_once() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let kinds = run(&closes, 3, 9);
        let longs = kinds.iter().filter(|&&k| k == SignalKind::Long).count();
        // The fast EMA never dips back below the slow one in a clean trend.
        assert!(longs <= 1, "expected at most one long in a monotone trend, got {longs}");
        assert!(!kinds.contains(&SignalKind::Short));
    }

    #[test]
    fn warmup_holds() {
        let closes: Vec<f64> = (0..10).map(|i| 100.0 + i as f64).collect();
        let candles = make_candles(&closes);
        let mut strategy = EmaCross::new(3, 9);
        let values = precompute(&candles, &strategy.required_indicators());
        let ledger = PositionLedger::new("TEST", 10_000.0);
        for i in 0..strategy.warmup().min(candles.len()) {
            let signal = strategy.analyze(&candles, i, &values, &ledger).unwrap();
            assert_eq!(signal.kind, SignalKind::Hold, "index {i} should hold during warmup");
        }
    }

    #[test]
    fn missing_indicator_is_error() {
        let candles = make_candles(&[100.0, 101.0, 102.0]);
        let mut strategy = EmaCross::new(2, 3);
        let ledger = PositionLedger::new("TEST", 10_000.0);
        let err = strategy
            .analyze(&candles, 2, &IndicatorValues::new(), &ledger)
            .unwrap_err();
        assert!(matches!(err, StrategyError::MissingIndicator(_)));
    }
}
