//! Strategy factory — builds a strategy instance from a session config.
//!
//! Strategies register here by name; parameter validation happens before a
//! single candle is processed. Defaults that scale with the session (MES
//! from the fee rate, dust thresholds and the risk ceiling from initial
//! capital) are resolved here so the strategies themselves stay
//! session-agnostic.

use thiserror::Error;

use crate::domain::SessionConfig;
use crate::strategy::band_hedge::{BandHedge, BandHedgeParams};
use crate::strategy::{EmaCross, MacdCross, RsiReversion, Strategy};

/// Errors during strategy construction.
#[derive(Debug, Error)]
pub enum FactoryError {
    #[error("unknown strategy: {0}")]
    UnknownStrategy(String),
    #[error("invalid parameter for '{strategy}': {detail}")]
    InvalidParam { strategy: String, detail: String },
}

fn invalid(strategy: &str, detail: impl Into<String>) -> FactoryError {
    FactoryError::InvalidParam {
        strategy: strategy.to_string(),
        detail: detail.into(),
    }
}

/// Create a strategy from the session's strategy spec.
pub fn create_strategy(config: &SessionConfig) -> Result<Box<dyn Strategy>, FactoryError> {
    let spec = &config.strategy;
    match spec.name.as_str() {
        "ema_cross" => {
            let fast = spec.param_usize("fast_period", 9);
            let slow = spec.param_usize("slow_period", 21);
            if fast < 1 || fast >= slow {
                return Err(invalid(
                    "ema_cross",
                    format!("require 1 <= fast_period < slow_period, got {fast}/{slow}"),
                ));
            }
            Ok(Box::new(EmaCross::new(fast, slow)))
        }
        "macd_cross" => {
            let fast = spec.param_usize("fast_period", 12);
            let slow = spec.param_usize("slow_period", 26);
            let signal = spec.param_usize("signal_period", 9);
            if fast < 1 || fast >= slow {
                return Err(invalid(
                    "macd_cross",
                    format!("require 1 <= fast_period < slow_period, got {fast}/{slow}"),
                ));
            }
            if signal < 1 {
                return Err(invalid("macd_cross", "signal_period must be >= 1"));
            }
            Ok(Box::new(MacdCross::new(fast, slow, signal)))
        }
        "rsi_reversion" => {
            let period = spec.param_usize("period", 14);
            let oversold = spec.param("oversold", 30.0);
            let overbought = spec.param("overbought", 70.0);
            if period < 1 {
                return Err(invalid("rsi_reversion", "period must be >= 1"));
            }
            if !(0.0..100.0).contains(&oversold)
                || !(0.0..=100.0).contains(&overbought)
                || oversold >= overbought
            {
                return Err(invalid(
                    "rsi_reversion",
                    format!("require 0 <= oversold < overbought <= 100, got {oversold}/{overbought}"),
                ));
            }
            Ok(Box::new(RsiReversion::new(period, oversold, overbought)))
        }
        "band_limited_hedging" => {
            let mes = spec.param("mes", 6.0 * config.fee_rate);
            let alpha = spec.param("alpha", 0.5);
            let e_max = spec.param("e_max", 0.2 * config.initial_capital);
            let eta = spec.param("eta", 0.25);
            let exit_k = spec.param("exit_k", 0.01);
            let exit_m = spec.param_usize("exit_m", 10);
            let epsilon = spec.param("epsilon", 1e-6 * config.initial_capital);
            let vol_lambda = spec.param("vol_lambda", 0.2);
            let min_trade_qty = spec.param("min_trade_qty", 1e-8 * config.initial_capital);
            let min_trade_notional = spec.param("min_trade_notional", 1e-4 * config.initial_capital);
            let entry_fraction = spec.param("entry_fraction", config.position_size_pct);

            if mes <= 0.0 {
                return Err(invalid("band_limited_hedging", format!("mes must be > 0, got {mes}")));
            }
            if !(alpha > 0.0 && alpha < 1.0) {
                return Err(invalid(
                    "band_limited_hedging",
                    format!("alpha must be in (0, 1), got {alpha}"),
                ));
            }
            if e_max <= 0.0 {
                return Err(invalid(
                    "band_limited_hedging",
                    format!("e_max must be > 0, got {e_max}"),
                ));
            }
            if !(eta > 0.0 && eta < 1.0) {
                return Err(invalid(
                    "band_limited_hedging",
                    format!("eta must be in (0, 1), got {eta}"),
                ));
            }
            if exit_k <= 0.0 || exit_m == 0 {
                return Err(invalid(
                    "band_limited_hedging",
                    format!("require exit_k > 0 and exit_m >= 1, got {exit_k}/{exit_m}"),
                ));
            }
            if epsilon <= 0.0 {
                return Err(invalid(
                    "band_limited_hedging",
                    format!("epsilon must be > 0, got {epsilon}"),
                ));
            }
            if !(vol_lambda > 0.0 && vol_lambda <= 1.0) {
                return Err(invalid(
                    "band_limited_hedging",
                    format!("vol_lambda must be in (0, 1], got {vol_lambda}"),
                ));
            }

            Ok(Box::new(BandHedge::new(BandHedgeParams {
                mes,
                alpha,
                e_max,
                eta,
                exit_k,
                exit_m,
                epsilon,
                vol_lambda,
                min_trade_qty,
                min_trade_notional,
                entry_fraction,
                leverage: config.leverage,
            })))
        }
        other => Err(FactoryError::UnknownStrategy(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::StrategySpec;
    use crate::risk::StopConfig;
    use chrono::{TimeZone, Utc};

    fn config_for(spec: StrategySpec) -> SessionConfig {
        SessionConfig {
            symbol: "BTCUSDT".into(),
            timeframe: "1h".into(),
            start_ts: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            end_ts: Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
            initial_capital: 10_000.0,
            fee_rate: 0.001,
            slippage_bps: 5.0,
            leverage: 1.0,
            position_size_pct: 1.0,
            strategy: spec,
            stops: StopConfig::default(),
        }
    }

    #[test]
    fn ema_cross_defaults() {
        let strategy = create_strategy(&config_for(StrategySpec::new("ema_cross"))).unwrap();
        assert_eq!(strategy.name(), "ema_cross");
        assert_eq!(strategy.warmup(), 21);
    }

    #[test]
    fn ema_cross_custom_periods() {
        let spec = StrategySpec::new("ema_cross")
            .with_param("fast_period", 5.0)
            .with_param("slow_period", 13.0);
        let strategy = create_strategy(&config_for(spec)).unwrap();
        assert_eq!(strategy.warmup(), 13);
    }

    #[test]
    fn ema_cross_rejects_inverted_periods() {
        let spec = StrategySpec::new("ema_cross")
            .with_param("fast_period", 21.0)
            .with_param("slow_period", 9.0);
        let err = create_strategy(&config_for(spec)).unwrap_err();
        assert!(matches!(err, FactoryError::InvalidParam { .. }));
    }

    #[test]
    fn macd_cross_defaults() {
        let strategy = create_strategy(&config_for(StrategySpec::new("macd_cross"))).unwrap();
        assert_eq!(strategy.name(), "macd_cross");
    }

    #[test]
    fn rsi_reversion_rejects_crossed_bands() {
        let spec = StrategySpec::new("rsi_reversion")
            .with_param("oversold", 70.0)
            .with_param("overbought", 30.0);
        let err = create_strategy(&config_for(spec)).unwrap_err();
        assert!(matches!(err, FactoryError::InvalidParam { .. }));
    }

    #[test]
    fn band_hedge_defaults_scale_with_session() {
        let strategy =
            create_strategy(&config_for(StrategySpec::new("band_limited_hedging"))).unwrap();
        assert_eq!(strategy.name(), "band_limited_hedging");
        // MES default is 6x the fee rate; a zero warmup machine.
        assert_eq!(strategy.warmup(), 0);
    }

    #[test]
    fn band_hedge_rejects_non_positive_mes() {
        let spec = StrategySpec::new("band_limited_hedging").with_param("mes", 0.0);
        let err = create_strategy(&config_for(spec)).unwrap_err();
        assert!(matches!(err, FactoryError::InvalidParam { .. }));
    }

    #[test]
    fn band_hedge_rejects_alpha_out_of_range() {
        for alpha in [0.0, 1.0, 1.5, -0.2] {
            let spec = StrategySpec::new("band_limited_hedging").with_param("alpha", alpha);
            let err = create_strategy(&config_for(spec)).unwrap_err();
            assert!(matches!(err, FactoryError::InvalidParam { .. }), "alpha={alpha}");
        }
    }

    #[test]
    fn band_hedge_rejects_non_positive_e_max() {
        let spec = StrategySpec::new("band_limited_hedging").with_param("e_max", -1.0);
        let err = create_strategy(&config_for(spec)).unwrap_err();
        assert!(matches!(err, FactoryError::InvalidParam { .. }));
    }

    #[test]
    fn unknown_strategy_errors() {
        let err = create_strategy(&config_for(StrategySpec::new("bogus"))).unwrap_err();
        match err {
            FactoryError::UnknownStrategy(name) => assert_eq!(name, "bogus"),
            other => panic!("expected UnknownStrategy, got {other:?}"),
        }
    }
}
