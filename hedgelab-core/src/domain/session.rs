//! Session configuration, lifecycle status, and validation.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::risk::stops::StopConfig;

/// Lifecycle of a backtest session. Terminal states are immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Created,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Created => "created",
            SessionStatus::Running => "running",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
            SessionStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<SessionStatus> {
        match s {
            "created" => Some(SessionStatus::Created),
            "running" => Some(SessionStatus::Running),
            "completed" => Some(SessionStatus::Completed),
            "failed" => Some(SessionStatus::Failed),
            "cancelled" => Some(SessionStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Failed | SessionStatus::Cancelled
        )
    }
}

/// Strategy identifier plus numeric parameters, as persisted with a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategySpec {
    pub name: String,
    #[serde(default)]
    pub params: BTreeMap<String, f64>,
}

impl StrategySpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, key: &str, value: f64) -> Self {
        self.params.insert(key.to_string(), value);
        self
    }

    /// Named parameter with fallback.
    pub fn param(&self, name: &str, default: f64) -> f64 {
        self.params.get(name).copied().unwrap_or(default)
    }

    pub fn param_usize(&self, name: &str, default: usize) -> usize {
        self.params
            .get(name)
            .copied()
            .map(|v| v as usize)
            .unwrap_or(default)
    }
}

/// Errors rejected at session-creation time, before any candle is processed.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("initial capital must be positive, got {0}")]
    NonPositiveCapital(f64),
    #[error("fee rate must be in [0, 1), got {0}")]
    InvalidFeeRate(f64),
    #[error("slippage must be non-negative, got {0} bps")]
    NegativeSlippage(f64),
    #[error("leverage must be positive, got {0}")]
    NonPositiveLeverage(f64),
    #[error("position size must be in (0, 1], got {0}")]
    InvalidPositionSize(f64),
    #[error("end timestamp {end} is not after start {start}")]
    InvalidDateRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    #[error("symbol must not be empty")]
    EmptySymbol,
    #[error("invalid parameter for strategy '{strategy}': {detail}")]
    InvalidStrategyParam { strategy: String, detail: String },
}

/// Full configuration for one backtest session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub symbol: String,
    pub timeframe: String,
    pub start_ts: DateTime<Utc>,
    pub end_ts: DateTime<Utc>,
    pub initial_capital: f64,
    /// Proportional fee per fill (e.g. 0.001 = 10 bps taker).
    pub fee_rate: f64,
    pub slippage_bps: f64,
    pub leverage: f64,
    /// Fraction of equity deployed per risk-manager-sized entry.
    pub position_size_pct: f64,
    pub strategy: StrategySpec,
    #[serde(default)]
    pub stops: StopConfig,
}

impl SessionConfig {
    /// Validate everything that can be rejected before replay starts.
    /// Strategy-specific parameter validation happens in the factory.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.symbol.trim().is_empty() {
            return Err(ConfigError::EmptySymbol);
        }
        if self.initial_capital <= 0.0 || !self.initial_capital.is_finite() {
            return Err(ConfigError::NonPositiveCapital(self.initial_capital));
        }
        if !(0.0..1.0).contains(&self.fee_rate) {
            return Err(ConfigError::InvalidFeeRate(self.fee_rate));
        }
        if self.slippage_bps < 0.0 {
            return Err(ConfigError::NegativeSlippage(self.slippage_bps));
        }
        if self.leverage <= 0.0 {
            return Err(ConfigError::NonPositiveLeverage(self.leverage));
        }
        if !(self.position_size_pct > 0.0 && self.position_size_pct <= 1.0) {
            return Err(ConfigError::InvalidPositionSize(self.position_size_pct));
        }
        if self.end_ts <= self.start_ts {
            return Err(ConfigError::InvalidDateRange {
                start: self.start_ts,
                end: self.end_ts,
            });
        }
        Ok(())
    }
}
