//! Per-side position state with weighted-average cost basis.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    /// +1 for long, -1 for short.
    pub fn direction(&self) -> f64 {
        match self {
            PositionSide::Long => 1.0,
            PositionSide::Short => -1.0,
        }
    }

    pub fn opposite(&self) -> PositionSide {
        match self {
            PositionSide::Long => PositionSide::Short,
            PositionSide::Short => PositionSide::Long,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PositionSide::Long => "long",
            PositionSide::Short => "short",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionStatus {
    Open,
    Closed,
}

/// One side of exposure. A hedging strategy holds a long and a short
/// position simultaneously; each is tracked independently.
///
/// Invariants: `quantity >= 0`; `entry_price > 0` while open.
/// The entry price is recomputed as a size-weighted average on every
/// position-increasing fill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub side: PositionSide,
    pub quantity: f64,
    pub entry_price: f64,
    pub entry_ts: DateTime<Utc>,
    pub realized_pnl: f64,
    pub unrealized_pnl: f64,
    /// Best unrealized PnL observed while open.
    pub max_runup: f64,
    /// Worst unrealized PnL observed while open (<= 0).
    pub max_drawdown: f64,
    pub status: PositionStatus,
}

impl Position {
    pub fn open(symbol: impl Into<String>, side: PositionSide, quantity: f64, entry_price: f64, ts: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            quantity,
            entry_price,
            entry_ts: ts,
            realized_pnl: 0.0,
            unrealized_pnl: 0.0,
            max_runup: 0.0,
            max_drawdown: 0.0,
            status: PositionStatus::Open,
        }
    }

    pub fn notional(&self, price: f64) -> f64 {
        self.quantity * price
    }

    /// Unrealized PnL at `price`: (price - entry) * qty * direction.
    pub fn unrealized(&self, price: f64) -> f64 {
        (price - self.entry_price) * self.quantity * self.side.direction()
    }

    /// Mark-to-market: refresh unrealized PnL and excursion extremes.
    pub fn mark(&mut self, price: f64) {
        self.unrealized_pnl = self.unrealized(price);
        if self.unrealized_pnl > self.max_runup {
            self.max_runup = self.unrealized_pnl;
        }
        if self.unrealized_pnl < self.max_drawdown {
            self.max_drawdown = self.unrealized_pnl;
        }
    }

    /// Adverse price excursion on the open notional at `price`:
    /// how much of the entry value is currently under water.
    pub fn adverse_exposure(&self, price: f64) -> f64 {
        (-self.unrealized(price)).max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()
    }

    #[test]
    fn long_unrealized_sign() {
        let pos = Position::open("BTCUSDT", PositionSide::Long, 2.0, 100.0, ts());
        assert_eq!(pos.unrealized(110.0), 20.0);
        assert_eq!(pos.unrealized(95.0), -10.0);
    }

    #[test]
    fn short_unrealized_sign() {
        let pos = Position::open("BTCUSDT", PositionSide::Short, 2.0, 100.0, ts());
        assert_eq!(pos.unrealized(110.0), -20.0);
        assert_eq!(pos.unrealized(95.0), 10.0);
    }

    #[test]
    fn mark_tracks_excursions() {
        let mut pos = Position::open("BTCUSDT", PositionSide::Long, 1.0, 100.0, ts());
        pos.mark(108.0);
        pos.mark(94.0);
        pos.mark(101.0);
        assert_eq!(pos.max_runup, 8.0);
        assert_eq!(pos.max_drawdown, -6.0);
        assert_eq!(pos.unrealized_pnl, 1.0);
    }

    #[test]
    fn adverse_exposure_floor_zero() {
        let pos = Position::open("BTCUSDT", PositionSide::Long, 1.0, 100.0, ts());
        assert_eq!(pos.adverse_exposure(110.0), 0.0);
        assert_eq!(pos.adverse_exposure(90.0), 10.0);
    }
}
