//! Trade signals — the per-candle output of a strategy.

use serde::{Deserialize, Serialize};

use super::position::PositionSide;
use super::trade::TradeAction;

/// Directional intent of a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Long,
    Short,
    CloseLong,
    CloseShort,
    Hold,
}

/// An explicit order leg requested by a strategy.
///
/// Multi-leg strategies (the hedging machine) express a rebalance as several
/// legs executed within one candle; single-leg strategies leave `orders`
/// empty and let the risk manager size the signal's `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub side: PositionSide,
    pub action: TradeAction,
    pub quantity: f64,
}

impl OrderRequest {
    pub fn open(side: PositionSide, quantity: f64) -> Self {
        Self {
            side,
            action: TradeAction::Open,
            quantity,
        }
    }

    pub fn close(side: PositionSide, quantity: f64) -> Self {
        Self {
            side,
            action: TradeAction::Close,
            quantity,
        }
    }
}

/// Ephemeral per-candle strategy output. Not persisted as an entity;
/// non-hold signals are logged as events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeSignal {
    pub kind: SignalKind,
    /// Signal strength in [0, 1]; higher = stronger conviction.
    pub strength: f64,
    /// Confidence in [0, 1].
    pub confidence: f64,
    pub reason: String,
    /// Explicit legs; empty for risk-manager-sized signals.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub orders: Vec<OrderRequest>,
}

impl TradeSignal {
    pub fn hold(reason: impl Into<String>) -> Self {
        Self {
            kind: SignalKind::Hold,
            strength: 0.0,
            confidence: 0.0,
            reason: reason.into(),
            orders: Vec::new(),
        }
    }

    pub fn new(kind: SignalKind, strength: f64, confidence: f64, reason: impl Into<String>) -> Self {
        Self {
            kind,
            strength: strength.clamp(0.0, 1.0),
            confidence: confidence.clamp(0.0, 1.0),
            reason: reason.into(),
            orders: Vec::new(),
        }
    }

    /// Attach explicit order legs to this signal.
    pub fn with_orders(mut self, orders: Vec<OrderRequest>) -> Self {
        self.orders = orders;
        self
    }

    /// True when the signal requests no position change at all.
    pub fn is_hold(&self) -> bool {
        self.kind == SignalKind::Hold && self.orders.is_empty()
    }
}
