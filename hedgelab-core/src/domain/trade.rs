//! Trade — an immutable, append-only fill record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::position::PositionSide;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeAction {
    Open,
    Close,
}

impl TradeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeAction::Open => "open",
            TradeAction::Close => "close",
        }
    }
}

/// One executed fill. Created once, never mutated.
///
/// `pnl` / `pnl_pct` are populated only on `Close` fills and are computed
/// against the weighted-average entry price of the position being reduced,
/// net of the close fee. `open_trade_id` links a close back to the opening
/// fill of the position it reduces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: u64,
    pub ts: DateTime<Utc>,
    pub symbol: String,
    pub side: PositionSide,
    pub action: TradeAction,
    pub qty: f64,
    pub price: f64,
    pub fee: f64,
    pub pnl: Option<f64>,
    pub pnl_pct: Option<f64>,
    pub strategy: String,
    pub reason: String,
    pub open_trade_id: Option<u64>,
}

impl Trade {
    pub fn is_close(&self) -> bool {
        self.action == TradeAction::Close
    }

    pub fn is_winner(&self) -> bool {
        self.pnl.is_some_and(|p| p > 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_close() -> Trade {
        Trade {
            id: 7,
            ts: Utc.with_ymd_and_hms(2024, 1, 5, 12, 0, 0).unwrap(),
            symbol: "BTCUSDT".into(),
            side: PositionSide::Long,
            action: TradeAction::Close,
            qty: 0.5,
            price: 44_000.0,
            fee: 22.0,
            pnl: Some(978.0),
            pnl_pct: Some(0.0466),
            strategy: "ema_cross".into(),
            reason: "cross down".into(),
            open_trade_id: Some(3),
        }
    }

    #[test]
    fn close_trade_is_winner() {
        assert!(sample_close().is_winner());
        assert!(sample_close().is_close());
    }

    #[test]
    fn open_trade_has_no_pnl() {
        let mut trade = sample_close();
        trade.action = TradeAction::Open;
        trade.pnl = None;
        trade.pnl_pct = None;
        assert!(!trade.is_winner());
        assert!(!trade.is_close());
    }

    #[test]
    fn trade_serialization_roundtrip() {
        let trade = sample_close();
        let json = serde_json::to_string(&trade).unwrap();
        let deser: Trade = serde_json::from_str(&json).unwrap();
        assert_eq!(trade.id, deser.id);
        assert_eq!(trade.pnl, deser.pnl);
        assert_eq!(trade.open_trade_id, deser.open_trade_id);
    }
}
