//! TOML-backed backtest configuration.
//!
//! A config file maps one-to-one onto a `SessionConfig`:
//!
//! ```toml
//! [backtest]
//! symbol = "BTCUSDT"
//! timeframe = "1h"
//! start = "2024-01-01T00:00:00Z"
//! end = "2024-03-01T00:00:00Z"
//! initial_capital = 10000.0
//! fee_rate = 0.001
//! slippage_bps = 5.0
//!
//! [strategy]
//! name = "band_limited_hedging"
//!
//! [strategy.params]
//! mes = 0.006
//! alpha = 0.5
//!
//! [stops]
//! stop_loss_pct = 0.05
//! ```

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use hedgelab_core::domain::{ConfigError, SessionConfig, StrategySpec};
use hedgelab_core::risk::StopConfig;

#[derive(Debug, Error)]
pub enum ConfigFileError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error(transparent)]
    Invalid(#[from] ConfigError),
}

fn default_leverage() -> f64 {
    1.0
}

fn default_position_size_pct() -> f64 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestSection {
    pub symbol: String,
    pub timeframe: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub initial_capital: f64,
    pub fee_rate: f64,
    #[serde(default)]
    pub slippage_bps: f64,
    #[serde(default = "default_leverage")]
    pub leverage: f64,
    #[serde(default = "default_position_size_pct")]
    pub position_size_pct: f64,
}

/// Top-level config file shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestConfig {
    pub backtest: BacktestSection,
    pub strategy: StrategySpec,
    #[serde(default)]
    pub stops: StopConfig,
}

impl BacktestConfig {
    /// Parse from TOML text.
    pub fn from_toml(text: &str) -> Result<Self, ConfigFileError> {
        Ok(toml::from_str(text)?)
    }

    /// Load and validate a config file into a `SessionConfig`.
    pub fn load(path: &Path) -> Result<SessionConfig, ConfigFileError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigFileError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&text)?.into_session_config()
    }

    /// Validate and convert into the engine's session config.
    pub fn into_session_config(self) -> Result<SessionConfig, ConfigFileError> {
        let config = SessionConfig {
            symbol: self.backtest.symbol,
            timeframe: self.backtest.timeframe,
            start_ts: self.backtest.start,
            end_ts: self.backtest.end,
            initial_capital: self.backtest.initial_capital,
            fee_rate: self.backtest.fee_rate,
            slippage_bps: self.backtest.slippage_bps,
            leverage: self.backtest.leverage,
            position_size_pct: self.backtest.position_size_pct,
            strategy: self.strategy,
            stops: self.stops,
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[backtest]
symbol = "BTCUSDT"
timeframe = "1h"
start = "2024-01-01T00:00:00Z"
end = "2024-03-01T00:00:00Z"
initial_capital = 10000.0
fee_rate = 0.001
slippage_bps = 5.0

[strategy]
name = "band_limited_hedging"

[strategy.params]
mes = 0.006
alpha = 0.5
e_max = 2000.0

[stops]
stop_loss_pct = 0.08

[stops.trailing_take_profit]
arm_profit_pct = 0.01
window = 5
fallback_pct = 0.004
"#;

    #[test]
    fn parses_full_config() {
        let config = BacktestConfig::from_toml(SAMPLE)
            .unwrap()
            .into_session_config()
            .unwrap();
        assert_eq!(config.symbol, "BTCUSDT");
        assert_eq!(config.strategy.name, "band_limited_hedging");
        assert_eq!(config.strategy.param("mes", 0.0), 0.006);
        assert_eq!(config.leverage, 1.0); // default
        assert_eq!(config.stops.stop_loss_pct, Some(0.08));
        assert_eq!(config.stops.trailing_take_profit.as_ref().unwrap().window, 5);
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let minimal = r#"
[backtest]
symbol = "ETHUSDT"
timeframe = "4h"
start = "2024-01-01T00:00:00Z"
end = "2024-02-01T00:00:00Z"
initial_capital = 5000.0
fee_rate = 0.0005

[strategy]
name = "ema_cross"
"#;
        let config = BacktestConfig::from_toml(minimal)
            .unwrap()
            .into_session_config()
            .unwrap();
        assert_eq!(config.slippage_bps, 0.0);
        assert_eq!(config.position_size_pct, 1.0);
        assert!(config.stops.is_empty());
        assert!(config.strategy.params.is_empty());
    }

    #[test]
    fn invalid_range_rejected() {
        let bad = SAMPLE.replace(
            "end = \"2024-03-01T00:00:00Z\"",
            "end = \"2023-01-01T00:00:00Z\"",
        );
        let err = BacktestConfig::from_toml(&bad)
            .unwrap()
            .into_session_config()
            .unwrap_err();
        assert!(matches!(err, ConfigFileError::Invalid(_)));
    }

    #[test]
    fn malformed_toml_rejected() {
        assert!(matches!(
            BacktestConfig::from_toml("not [valid"),
            Err(ConfigFileError::Parse(_))
        ));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backtest.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        let config = BacktestConfig::load(&path).unwrap();
        assert_eq!(config.symbol, "BTCUSDT");

        let missing = BacktestConfig::load(&dir.path().join("nope.toml"));
        assert!(matches!(missing, Err(ConfigFileError::Io { .. })));
    }
}
