//! Position ledger — the single source of truth for current exposure.
//!
//! Tracks at most one position per side (long and short simultaneously, for
//! hedging strategies), the realized account balance, and fees paid.
//! Entry prices are recomputed as a size-weighted average on every
//! position-increasing fill; closes reduce quantity proportionally and
//! realize PnL against the weighted-average entry.
//!
//! Accounting is futures-style: opening a position does not move the cash
//! balance (only the fee does); closing credits net realized PnL. Equity is
//! balance plus unrealized PnL of both sides.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::{Position, PositionSide, PositionStatus, TradeAction};

/// Quantities below this are treated as zero when deciding whether a
/// position is fully closed.
const QTY_EPSILON: f64 = 1e-12;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("fill quantity must be positive, got {0}")]
    NonPositiveQuantity(f64),
    #[error("fill price must be positive, got {0}")]
    NonPositivePrice(f64),
    #[error("close on {side:?} with no open position")]
    NoPosition { side: PositionSide },
    #[error("close quantity {requested} exceeds open quantity {open} on {side:?}")]
    InsufficientQuantity {
        side: PositionSide,
        requested: f64,
        open: f64,
    },
}

/// Result of applying one fill.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FillResult {
    /// Net realized PnL (gross minus the close fee); `None` for opens.
    pub pnl: Option<f64>,
    /// Realized PnL as a fraction of the entry value of the closed quantity;
    /// 0 when the entry value is zero. `None` for opens.
    pub pnl_pct: Option<f64>,
    /// Id of the opening fill of the position being reduced, for closes.
    pub open_trade_id: Option<u64>,
    /// True when this close brought the side's quantity to (near) zero.
    pub position_closed: bool,
}

#[derive(Debug, Clone)]
pub struct PositionLedger {
    symbol: String,
    long: Option<Position>,
    short: Option<Position>,
    /// Opening fill id per side, kept while the position is open.
    long_open_id: Option<u64>,
    short_open_id: Option<u64>,
    balance: f64,
    realized_pnl: f64,
    fees_paid: f64,
}

impl PositionLedger {
    pub fn new(symbol: impl Into<String>, initial_capital: f64) -> Self {
        Self {
            symbol: symbol.into(),
            long: None,
            short: None,
            long_open_id: None,
            short_open_id: None,
            balance: initial_capital,
            realized_pnl: 0.0,
            fees_paid: 0.0,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn position(&self, side: PositionSide) -> Option<&Position> {
        match side {
            PositionSide::Long => self.long.as_ref(),
            PositionSide::Short => self.short.as_ref(),
        }
    }

    pub fn quantity(&self, side: PositionSide) -> f64 {
        self.position(side).map(|p| p.quantity).unwrap_or(0.0)
    }

    pub fn entry_price(&self, side: PositionSide) -> f64 {
        self.position(side).map(|p| p.entry_price).unwrap_or(0.0)
    }

    pub fn has_exposure(&self) -> bool {
        self.long.is_some() || self.short.is_some()
    }

    /// Realized account value: initial capital + net realized PnL − all fees.
    pub fn balance(&self) -> f64 {
        self.balance
    }

    /// Cumulative net realized PnL across all closes.
    pub fn realized_pnl(&self) -> f64 {
        self.realized_pnl
    }

    pub fn fees_paid(&self) -> f64 {
        self.fees_paid
    }

    /// Mark both sides to `price`, refreshing unrealized PnL and excursions.
    pub fn mark(&mut self, price: f64) {
        if let Some(pos) = self.long.as_mut() {
            pos.mark(price);
        }
        if let Some(pos) = self.short.as_mut() {
            pos.mark(price);
        }
    }

    pub fn unrealized_total(&self, price: f64) -> f64 {
        self.long.as_ref().map(|p| p.unrealized(price)).unwrap_or(0.0)
            + self.short.as_ref().map(|p| p.unrealized(price)).unwrap_or(0.0)
    }

    /// Equity identity: balance + unrealized PnL of both sides.
    pub fn equity(&self, price: f64) -> f64 {
        self.balance + self.unrealized_total(price)
    }

    /// Capital currently at risk: adverse excursion summed over open sides.
    pub fn adverse_exposure(&self, price: f64) -> f64 {
        self.long.as_ref().map(|p| p.adverse_exposure(price)).unwrap_or(0.0)
            + self.short.as_ref().map(|p| p.adverse_exposure(price)).unwrap_or(0.0)
    }

    /// Apply one executed fill and return the realized outcome.
    ///
    /// `trade_id` is the id assigned to this fill's trade record; for opens
    /// it becomes the side's `open_trade_id` when the side was flat.
    pub fn apply_fill(
        &mut self,
        side: PositionSide,
        action: TradeAction,
        qty: f64,
        price: f64,
        fee: f64,
        ts: DateTime<Utc>,
        trade_id: u64,
    ) -> Result<FillResult, LedgerError> {
        if qty <= 0.0 || !qty.is_finite() {
            return Err(LedgerError::NonPositiveQuantity(qty));
        }
        if price <= 0.0 || !price.is_finite() {
            return Err(LedgerError::NonPositivePrice(price));
        }

        self.balance -= fee;
        self.fees_paid += fee;

        match action {
            TradeAction::Open => {
                let slot = match side {
                    PositionSide::Long => &mut self.long,
                    PositionSide::Short => &mut self.short,
                };
                match slot {
                    Some(pos) => {
                        // Weighted-average entry on add.
                        let total = pos.quantity + qty;
                        pos.entry_price = (pos.entry_price * pos.quantity + price * qty) / total;
                        pos.quantity = total;
                    }
                    None => {
                        *slot = Some(Position::open(self.symbol.clone(), side, qty, price, ts));
                        match side {
                            PositionSide::Long => self.long_open_id = Some(trade_id),
                            PositionSide::Short => self.short_open_id = Some(trade_id),
                        }
                    }
                }
                Ok(FillResult {
                    pnl: None,
                    pnl_pct: None,
                    open_trade_id: None,
                    position_closed: false,
                })
            }
            TradeAction::Close => {
                let slot = match side {
                    PositionSide::Long => &mut self.long,
                    PositionSide::Short => &mut self.short,
                };
                let pos = slot.as_mut().ok_or(LedgerError::NoPosition { side })?;
                if qty > pos.quantity + QTY_EPSILON {
                    return Err(LedgerError::InsufficientQuantity {
                        side,
                        requested: qty,
                        open: pos.quantity,
                    });
                }
                let qty = qty.min(pos.quantity);

                let gross = (price - pos.entry_price) * qty * side.direction();
                let net = gross - fee;
                let entry_value = pos.entry_price * qty;
                let pnl_pct = if entry_value > 0.0 { net / entry_value } else { 0.0 };

                pos.quantity -= qty;
                pos.realized_pnl += net;
                self.balance += net + fee; // fee already deducted above
                self.realized_pnl += net;

                let open_trade_id = match side {
                    PositionSide::Long => self.long_open_id,
                    PositionSide::Short => self.short_open_id,
                };

                let position_closed = pos.quantity <= QTY_EPSILON;
                if position_closed {
                    pos.quantity = 0.0;
                    pos.status = PositionStatus::Closed;
                    *slot = None;
                    match side {
                        PositionSide::Long => self.long_open_id = None,
                        PositionSide::Short => self.short_open_id = None,
                    }
                }

                Ok(FillResult {
                    pnl: Some(net),
                    pnl_pct: Some(pnl_pct),
                    open_trade_id,
                    position_closed,
                })
            }
        }
    }
}
