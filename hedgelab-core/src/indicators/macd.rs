//! MACD — Moving Average Convergence/Divergence.
//!
//! Line: EMA(close, fast) - EMA(close, slow)
//! Signal: EMA(line, signal_period), seeded from the first valid line value.
//! Histogram: line - signal.
//!
//! Exposed as separate named instances per series (line/signal/histogram),
//! keeping the single-series `Indicator` trait unchanged.
//! Lookback: slow - 1 for the line; slow + signal_period - 2 for signal and
//! histogram.

use crate::domain::Candle;
use crate::indicators::ema::{ema_of_series, ema_of_tail};
use crate::indicators::Indicator;

/// Which MACD series to compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacdSeries {
    Line,
    Signal,
    Histogram,
}

#[derive(Debug, Clone)]
pub struct Macd {
    fast: usize,
    slow: usize,
    signal_period: usize,
    series: MacdSeries,
    name: String,
}

impl Macd {
    pub fn line(fast: usize, slow: usize, signal_period: usize) -> Self {
        Self::build(fast, slow, signal_period, MacdSeries::Line)
    }

    pub fn signal(fast: usize, slow: usize, signal_period: usize) -> Self {
        Self::build(fast, slow, signal_period, MacdSeries::Signal)
    }

    pub fn histogram(fast: usize, slow: usize, signal_period: usize) -> Self {
        Self::build(fast, slow, signal_period, MacdSeries::Histogram)
    }

    fn build(fast: usize, slow: usize, signal_period: usize, series: MacdSeries) -> Self {
        assert!(fast >= 1 && slow >= 1 && signal_period >= 1, "MACD periods must be >= 1");
        assert!(fast < slow, "MACD fast period must be < slow period");
        let suffix = match series {
            MacdSeries::Line => "line",
            MacdSeries::Signal => "signal",
            MacdSeries::Histogram => "histogram",
        };
        Self {
            fast,
            slow,
            signal_period,
            series,
            name: format!("macd_{suffix}_{fast}_{slow}_{signal_period}"),
        }
    }

    fn line_series(&self, closes: &[f64]) -> Vec<f64> {
        let fast = ema_of_series(closes, self.fast);
        let slow = ema_of_series(closes, self.slow);
        fast.iter()
            .zip(slow.iter())
            .map(|(&f, &s)| {
                if f.is_nan() || s.is_nan() {
                    f64::NAN
                } else {
                    f - s
                }
            })
            .collect()
    }
}

impl Indicator for Macd {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        match self.series {
            MacdSeries::Line => self.slow - 1,
            MacdSeries::Signal | MacdSeries::Histogram => self.slow + self.signal_period - 2,
        }
    }

    fn compute(&self, candles: &[Candle]) -> Vec<f64> {
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let line = self.line_series(&closes);

        match self.series {
            MacdSeries::Line => line,
            MacdSeries::Signal => ema_of_tail(&line, self.signal_period),
            MacdSeries::Histogram => {
                let signal = ema_of_tail(&line, self.signal_period);
                line.iter()
                    .zip(signal.iter())
                    .map(|(&l, &s)| {
                        if l.is_nan() || s.is_nan() {
                            f64::NAN
                        } else {
                            l - s
                        }
                    })
                    .collect()
            }
        }
    }
}
