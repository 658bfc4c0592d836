//! Event — the per-candle audit trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::position::PositionSide;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Signal,
    Fill,
    Stop,
    ModeChange,
    StrategyError,
    DataQuality,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Signal => "signal",
            EventKind::Fill => "fill",
            EventKind::Stop => "stop",
            EventKind::ModeChange => "mode_change",
            EventKind::StrategyError => "strategy_error",
            EventKind::DataQuality => "data_quality",
        }
    }
}

/// One audit event. Signals, fills, stop triggers, strategy state
/// transitions, and per-candle strategy errors all land here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub ts: DateTime<Utc>,
    pub kind: EventKind,
    pub side: Option<PositionSide>,
    pub price: f64,
    pub strategy: String,
    pub reason: String,
    pub confidence: Option<f64>,
    /// Indicator snapshot at event time, when the producer has one.
    #[serde(default)]
    pub indicators: serde_json::Value,
    /// Free-form payload (e.g. raw signal JSON).
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Event {
    pub fn new(ts: DateTime<Utc>, kind: EventKind, price: f64, strategy: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            ts,
            kind,
            side: None,
            price,
            strategy: strategy.into(),
            reason: reason.into(),
            confidence: None,
            indicators: serde_json::Value::Null,
            payload: serde_json::Value::Null,
        }
    }

    pub fn with_side(mut self, side: PositionSide) -> Self {
        self.side = Some(side);
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn event_builder_chain() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let ev = Event::new(ts, EventKind::Stop, 42_000.0, "ema_cross", "trailing stop")
            .with_side(PositionSide::Long)
            .with_confidence(1.0);
        assert_eq!(ev.kind, EventKind::Stop);
        assert_eq!(ev.side, Some(PositionSide::Long));
        assert_eq!(ev.confidence, Some(1.0));
        assert!(ev.indicators.is_null());
    }

    #[test]
    fn event_serialization_roundtrip() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let ev = Event::new(ts, EventKind::Signal, 42_000.0, "band_limited_hedging", "rebalance")
            .with_payload(serde_json::json!({"d": 0.008, "p_ref": 41_700.0}));
        let json = serde_json::to_string(&ev).unwrap();
        let deser: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(deser.kind, EventKind::Signal);
        assert_eq!(deser.payload["d"], 0.008);
    }
}
