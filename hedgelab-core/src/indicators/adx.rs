//! ADX — Average Directional Index (Wilder).
//!
//! Steps:
//! 1. Compute +DM and -DM from consecutive candles
//! 2. Smooth +DM, -DM, and TR using Wilder smoothing (alpha = 1/period)
//! 3. +DI = 100 * smoothed(+DM) / smoothed(TR)
//! 4. -DI = 100 * smoothed(-DM) / smoothed(TR)
//! 5. DX = 100 * |+DI - -DI| / (+DI + -DI)
//! 6. ADX = Wilder-smoothed DX
//!
//! Lookback: 2 * period (period for DI smoothing, then period for ADX).

use crate::domain::Candle;
use crate::indicators::atr::{true_range, wilder_smooth};
use crate::indicators::Indicator;

#[derive(Debug, Clone)]
pub struct Adx {
    period: usize,
    name: String,
}

impl Adx {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "ADX period must be >= 1");
        Self {
            period,
            name: format!("adx_{period}"),
        }
    }
}

impl Indicator for Adx {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        2 * self.period
    }

    fn compute(&self, candles: &[Candle]) -> Vec<f64> {
        let n = candles.len();
        let result = vec![f64::NAN; n];

        if n < 2 {
            return result;
        }

        // Step 1: +DM and -DM
        let mut plus_dm = vec![f64::NAN; n];
        let mut minus_dm = vec![f64::NAN; n];

        for i in 1..n {
            let high_diff = candles[i].high - candles[i - 1].high;
            let low_diff = candles[i - 1].low - candles[i].low;

            if candles[i].high.is_nan()
                || candles[i].low.is_nan()
                || candles[i - 1].high.is_nan()
                || candles[i - 1].low.is_nan()
            {
                plus_dm[i] = f64::NAN;
                minus_dm[i] = f64::NAN;
                continue;
            }

            if high_diff > low_diff && high_diff > 0.0 {
                plus_dm[i] = high_diff;
            } else {
                plus_dm[i] = 0.0;
            }

            if low_diff > high_diff && low_diff > 0.0 {
                minus_dm[i] = low_diff;
            } else {
                minus_dm[i] = 0.0;
            }
        }

        // Step 2: Wilder smooth +DM, -DM, and TR
        let tr = true_range(candles);
        let smooth_tr = wilder_smooth(&tr, self.period);
        let smooth_plus_dm = wilder_smooth(&plus_dm, self.period);
        let smooth_minus_dm = wilder_smooth(&minus_dm, self.period);

        // Steps 3-5: +DI, -DI, DX
        let mut dx = vec![f64::NAN; n];
        for i in 0..n {
            if smooth_tr[i].is_nan()
                || smooth_plus_dm[i].is_nan()
                || smooth_minus_dm[i].is_nan()
                || smooth_tr[i] == 0.0
            {
                continue;
            }

            let plus_di = 100.0 * smooth_plus_dm[i] / smooth_tr[i];
            let minus_di = 100.0 * smooth_minus_dm[i] / smooth_tr[i];
            let di_sum = plus_di + minus_di;

            if di_sum == 0.0 {
                dx[i] = 0.0;
            } else {
                dx[i] = 100.0 * (plus_di - minus_di).abs() / di_sum;
            }
        }

        // Step 6: Wilder smooth DX → ADX
        wilder_smooth(&dx, self.period)
    }
}
