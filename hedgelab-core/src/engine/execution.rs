//! Fill pricing — slippage and fee arithmetic.

use crate::domain::{PositionSide, TradeAction};

/// Slip the candle close against the taker.
///
/// Buy pressure (opening a long, closing a short) lifts the price; sell
/// pressure (opening a short, closing a long) drops it. Either way the
/// effective cost versus the naive close is worse, never better.
pub fn fill_price(close: f64, side: PositionSide, action: TradeAction, slippage: f64) -> f64 {
    let is_buy = matches!(
        (side, action),
        (PositionSide::Long, TradeAction::Open) | (PositionSide::Short, TradeAction::Close)
    );
    if is_buy {
        close * (1.0 + slippage)
    } else {
        close * (1.0 - slippage)
    }
}

/// Proportional fee on the filled notional.
pub fn fill_fee(price: f64, qty: f64, fee_rate: f64) -> f64 {
    price * qty * fee_rate
}

#[cfg(test)]
mod tests {
    use super::*;

    const SLIP: f64 = 0.0005; // 5 bps

    #[test]
    fn long_open_slips_up() {
        let fill = fill_price(100.0, PositionSide::Long, TradeAction::Open, SLIP);
        assert!(fill > 100.0);
        assert!((fill - 100.05).abs() < 1e-12);
    }

    #[test]
    fn short_open_slips_down() {
        let fill = fill_price(100.0, PositionSide::Short, TradeAction::Open, SLIP);
        assert!(fill < 100.0);
        assert!((fill - 99.95).abs() < 1e-12);
    }

    #[test]
    fn long_close_slips_down() {
        // Selling out of a long receives less than the close.
        let fill = fill_price(100.0, PositionSide::Long, TradeAction::Close, SLIP);
        assert!(fill < 100.0);
    }

    #[test]
    fn short_close_slips_up() {
        // Buying back a short pays more than the close.
        let fill = fill_price(100.0, PositionSide::Short, TradeAction::Close, SLIP);
        assert!(fill > 100.0);
    }

    #[test]
    fn slippage_always_increases_round_trip_cost() {
        // A zero-move round trip loses money under slippage on both sides.
        for side in [PositionSide::Long, PositionSide::Short] {
            let open = fill_price(100.0, side, TradeAction::Open, SLIP);
            let close = fill_price(100.0, side, TradeAction::Close, SLIP);
            let pnl = (close - open) * side.direction();
            assert!(pnl < 0.0, "{side:?} round trip should cost, got {pnl}");
        }
    }

    #[test]
    fn zero_slippage_is_identity() {
        let fill = fill_price(100.0, PositionSide::Long, TradeAction::Open, 0.0);
        assert_eq!(fill, 100.0);
    }

    #[test]
    fn fee_is_proportional_to_notional() {
        assert!((fill_fee(100.0, 2.0, 0.001) - 0.2).abs() < 1e-12);
        assert_eq!(fill_fee(100.0, 2.0, 0.0), 0.0);
    }
}
