//! Band-limited hedging — a two-sided structure rebalanced only when price
//! leaves the band around a reference price.
//!
//! The machine holds long and short exposure simultaneously. Price moves
//! inside the band (`|P - p_ref| / p_ref < mes`) are ignored. A move beyond
//! the band harvests the profitable side, migrates an `alpha` fraction of
//! the realized gain into repairing the losing side's average cost, rebuilds
//! the harvested side around the new reference, and re-centers the band.
//!
//! Modes: Active (rebalancing), Pause (volatility ambiguous — monitoring
//! only), Exit (staged de-risking by `eta` per candle), Done (terminal).
//! Exit triggers when the EWMA volatility proxy stays below
//! `exit_k * mes^2` for `exit_m` consecutive candles after at least one
//! rebalance, or when capital at risk exceeds `e_max`. The reference price
//! only moves on an executed rebalance.

use crate::domain::{Candle, OrderRequest, PositionSide, SignalKind, TradeSignal};
use crate::indicators::IndicatorValues;
use crate::risk::PositionLedger;
use crate::strategy::{Strategy, StrategyError};

/// Operating mode of the hedging machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Active,
    Pause,
    Exit,
    Done,
}

impl Mode {
    fn as_str(&self) -> &'static str {
        match self {
            Mode::Active => "active",
            Mode::Pause => "pause",
            Mode::Exit => "exit",
            Mode::Done => "done",
        }
    }
}

/// Tuning parameters. Validated by the strategy factory.
#[derive(Debug, Clone)]
pub struct BandHedgeParams {
    /// Minimum effective scale: relative deviation that triggers a rebalance.
    pub mes: f64,
    /// Profit-migration fraction moved into the losing side on rebalance.
    pub alpha: f64,
    /// Capital-at-risk ceiling that forces Exit.
    pub e_max: f64,
    /// De-risking fraction per Exit step.
    pub eta: f64,
    /// Exit trigger scale: fires when sigma^2 < exit_k * mes^2 ...
    pub exit_k: f64,
    /// ... sustained for this many consecutive candles.
    pub exit_m: usize,
    /// Combined residual quantity below which Exit completes.
    pub epsilon: f64,
    /// EWMA constant for the volatility proxy.
    pub vol_lambda: f64,
    /// Legs below this quantity are discarded rather than left as dust.
    pub min_trade_qty: f64,
    /// Legs below this notional are discarded rather than left as dust.
    pub min_trade_notional: f64,
    /// Fraction of equity deployed across the initial structure.
    pub entry_fraction: f64,
    pub leverage: f64,
}

#[derive(Debug)]
pub struct BandHedge {
    params: BandHedgeParams,
    mode: Mode,
    p_ref: Option<f64>,
    sigma_sq: f64,
    low_vol_streak: usize,
    rebalanced: bool,
    mode_notes: Vec<String>,
}

impl BandHedge {
    pub fn new(params: BandHedgeParams) -> Self {
        // Seeded at mes^2 so a fresh session never starts inside the
        // low-volatility exit window.
        let sigma_sq = params.mes * params.mes;
        Self {
            params,
            mode: Mode::Active,
            p_ref: None,
            sigma_sq,
            low_vol_streak: 0,
            rebalanced: false,
            mode_notes: Vec::new(),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn reference_price(&self) -> Option<f64> {
        self.p_ref
    }

    fn pause_threshold(&self) -> usize {
        (self.params.exit_m / 2).max(1)
    }

    fn set_mode(&mut self, to: Mode, why: &str) {
        if self.mode != to {
            self.mode_notes.push(format!("{} -> {} ({why})", self.mode.as_str(), to.as_str()));
            self.mode = to;
        }
    }

    fn passes_dust(&self, qty: f64, price: f64) -> bool {
        qty >= self.params.min_trade_qty && qty * price >= self.params.min_trade_notional
    }

    /// Symmetric open legs deploying `entry_fraction` of equity at `price`.
    fn structure_legs(&self, ledger: &PositionLedger, price: f64) -> Vec<OrderRequest> {
        let notional = ledger.equity(price) * self.params.entry_fraction * self.params.leverage;
        let per_side = notional / 2.0 / price;
        let mut legs = Vec::new();
        if self.passes_dust(per_side, price) {
            legs.push(OrderRequest::open(PositionSide::Long, per_side));
            legs.push(OrderRequest::open(PositionSide::Short, per_side));
        }
        legs
    }

    /// Staged de-risking step: shave `eta` off both sides, zeroing residuals
    /// that fall below the dust thresholds.
    fn exit_legs(&mut self, ledger: &PositionLedger, price: f64) -> Vec<OrderRequest> {
        let q_long = ledger.quantity(PositionSide::Long);
        let q_short = ledger.quantity(PositionSide::Short);
        let total = q_long + q_short;

        if total <= 0.0 {
            self.set_mode(Mode::Done, "structure unwound");
            return Vec::new();
        }

        let mut legs = Vec::new();
        if total < self.params.epsilon {
            // Residual below tolerance: zero both sides instead of leaving dust.
            if q_long > 0.0 {
                legs.push(OrderRequest::close(PositionSide::Long, q_long));
            }
            if q_short > 0.0 {
                legs.push(OrderRequest::close(PositionSide::Short, q_short));
            }
            self.set_mode(Mode::Done, "exit complete");
            return legs;
        }

        for (side, qty) in [(PositionSide::Long, q_long), (PositionSide::Short, q_short)] {
            if qty <= 0.0 {
                continue;
            }
            let step = qty * self.params.eta;
            let remainder = qty - step;
            if remainder < self.params.min_trade_qty || remainder * price < self.params.min_trade_notional {
                legs.push(OrderRequest::close(side, qty));
            } else {
                legs.push(OrderRequest::close(side, step));
            }
        }
        legs
    }

    /// Rebalance at `price`: harvest the winner, repair the loser with
    /// `alpha` of the gain, rebuild the winner with the remainder.
    fn rebalance_legs(&self, ledger: &PositionLedger, price: f64, p_ref: f64) -> Option<Vec<OrderRequest>> {
        let winner = if price > p_ref {
            PositionSide::Long
        } else {
            PositionSide::Short
        };
        let loser = winner.opposite();

        let q_winner = ledger.quantity(winner);
        if q_winner <= 0.0 {
            return None;
        }
        let entry_winner = ledger.entry_price(winner);
        let gain = (price - entry_winner) * q_winner * winner.direction();
        if gain <= 0.0 {
            return None;
        }

        let mut legs = vec![OrderRequest::close(winner, q_winner)];

        let repair_qty = self.params.alpha * gain / price;
        if self.passes_dust(repair_qty, price) {
            legs.push(OrderRequest::open(loser, repair_qty));
        }

        let rebuild_qty = q_winner + (1.0 - self.params.alpha) * gain / price;
        if self.passes_dust(rebuild_qty, price) {
            legs.push(OrderRequest::open(winner, rebuild_qty));
        }

        Some(legs)
    }
}

impl Strategy for BandHedge {
    fn name(&self) -> &str {
        "band_limited_hedging"
    }

    fn warmup(&self) -> usize {
        0
    }

    fn analyze(
        &mut self,
        candles: &[Candle],
        index: usize,
        _indicators: &IndicatorValues,
        ledger: &PositionLedger,
    ) -> Result<TradeSignal, StrategyError> {
        if index >= candles.len() {
            return Err(StrategyError::IndexOutOfRange { index, len: candles.len() });
        }
        let price = candles[index].close;

        if self.mode == Mode::Done {
            return Ok(TradeSignal::hold("terminal"));
        }

        // Establish the initial symmetric structure on the first candle.
        let p_ref = match self.p_ref {
            Some(p) => p,
            None => {
                let legs = self.structure_legs(ledger, price);
                if legs.is_empty() {
                    return Ok(TradeSignal::hold("structure below dust thresholds"));
                }
                self.p_ref = Some(price);
                return Ok(TradeSignal::new(
                    SignalKind::Hold,
                    0.5,
                    0.5,
                    format!("establish hedge structure at {price:.2}"),
                )
                .with_orders(legs));
            }
        };

        // Volatility proxy and low-volatility streak.
        let d = (price - p_ref).abs() / p_ref;
        self.sigma_sq =
            self.params.vol_lambda * d * d + (1.0 - self.params.vol_lambda) * self.sigma_sq;
        let exit_floor = self.params.exit_k * self.params.mes * self.params.mes;
        if self.sigma_sq < exit_floor {
            self.low_vol_streak += 1;
        } else {
            self.low_vol_streak = 0;
            if self.mode == Mode::Pause {
                self.set_mode(Mode::Active, "volatility recovered");
            }
        }

        // Exit triggers dominate everything but Done.
        if self.mode != Mode::Exit {
            let at_risk = ledger.adverse_exposure(price);
            if at_risk > self.params.e_max {
                self.set_mode(Mode::Exit, "capital at risk above ceiling");
            } else if self.rebalanced && self.low_vol_streak >= self.params.exit_m {
                self.set_mode(Mode::Exit, "volatility collapsed");
            } else if self.mode == Mode::Active && self.low_vol_streak >= self.pause_threshold() {
                self.set_mode(Mode::Pause, "low volatility streak");
            }
        }

        match self.mode {
            Mode::Exit => {
                let legs = self.exit_legs(ledger, price);
                if legs.is_empty() {
                    return Ok(TradeSignal::hold("exit: nothing to unwind"));
                }
                Ok(TradeSignal::new(SignalKind::Hold, 0.5, 1.0, "exit de-risking step")
                    .with_orders(legs))
            }
            Mode::Pause => Ok(TradeSignal::hold("paused: ambiguous volatility")),
            Mode::Active => {
                // Re-establish if stops flattened the whole structure.
                if !ledger.has_exposure() {
                    let legs = self.structure_legs(ledger, price);
                    if legs.is_empty() {
                        return Ok(TradeSignal::hold("structure below dust thresholds"));
                    }
                    self.p_ref = Some(price);
                    return Ok(TradeSignal::new(
                        SignalKind::Hold,
                        0.5,
                        0.5,
                        format!("re-establish hedge structure at {price:.2}"),
                    )
                    .with_orders(legs));
                }

                if d < self.params.mes {
                    return Ok(TradeSignal::hold("inside band"));
                }

                match self.rebalance_legs(ledger, price, p_ref) {
                    Some(legs) => {
                        self.p_ref = Some(price);
                        self.rebalanced = true;
                        let strength = (d / self.params.mes).clamp(0.0, 1.0);
                        Ok(TradeSignal::new(
                            SignalKind::Hold,
                            strength,
                            0.9,
                            format!("rebalance: band left at d={d:.4}"),
                        )
                        .with_orders(legs))
                    }
                    None => Ok(TradeSignal::hold("no realizable gain on winner side")),
                }
            }
            Mode::Done => Ok(TradeSignal::hold("terminal")),
        }
    }

    fn drain_mode_changes(&mut self) -> Vec<String> {
        std::mem::take(&mut self.mode_notes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TradeAction;
    use crate::indicators::make_candles;
    use chrono::{TimeZone, Utc};

    fn params() -> BandHedgeParams {
        BandHedgeParams {
            mes: 0.01,
            alpha: 0.5,
            e_max: 1_000.0,
            eta: 0.3,
            exit_k: 0.01,
            exit_m: 10,
            epsilon: 0.05,
            vol_lambda: 0.2,
            min_trade_qty: 1e-6,
            min_trade_notional: 0.01,
            entry_fraction: 0.5,
            leverage: 1.0,
        }
    }

    fn apply_legs(ledger: &mut PositionLedger, legs: &[OrderRequest], price: f64) {
        let ts = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        for (i, leg) in legs.iter().enumerate() {
            ledger
                .apply_fill(leg.side, leg.action, leg.quantity, price, 0.0, ts, i as u64 + 1)
                .unwrap();
        }
    }

    #[test]
    fn first_candle_establishes_symmetric_structure() {
        let candles = make_candles(&[100.0]);
        let mut strategy = BandHedge::new(params());
        let ledger = PositionLedger::new("TEST", 10_000.0);
        let signal = strategy
            .analyze(&candles, 0, &IndicatorValues::new(), &ledger)
            .unwrap();

        assert_eq!(signal.orders.len(), 2);
        let long = &signal.orders[0];
        let short = &signal.orders[1];
        assert_eq!(long.side, PositionSide::Long);
        assert_eq!(short.side, PositionSide::Short);
        assert!((long.quantity - short.quantity).abs() < 1e-12);
        // 10_000 * 0.5 / 2 / 100 = 25 per side
        assert!((long.quantity - 25.0).abs() < 1e-9);
        assert_eq!(strategy.reference_price(), Some(100.0));
    }

    #[test]
    fn inside_band_holds_and_reference_unchanged() {
        let closes = [100.0, 100.4, 99.7, 100.9, 99.2, 100.5];
        let candles = make_candles(&closes);
        let mut strategy = BandHedge::new(params());
        let mut ledger = PositionLedger::new("TEST", 10_000.0);

        let establish = strategy
            .analyze(&candles, 0, &IndicatorValues::new(), &ledger)
            .unwrap();
        apply_legs(&mut ledger, &establish.orders, 100.0);

        // Every deviation stays below mes = 1% → no trades, p_ref frozen.
        for i in 1..candles.len() {
            let signal = strategy
                .analyze(&candles, i, &IndicatorValues::new(), &ledger)
                .unwrap();
            assert!(signal.orders.is_empty(), "unexpected legs at index {i}: {signal:?}");
            assert_eq!(strategy.reference_price(), Some(100.0));
        }
    }

    #[test]
    fn band_exit_triggers_rebalance_and_moves_reference() {
        let closes = [100.0, 102.0];
        let candles = make_candles(&closes);
        let mut strategy = BandHedge::new(params());
        let mut ledger = PositionLedger::new("TEST", 10_000.0);

        let establish = strategy
            .analyze(&candles, 0, &IndicatorValues::new(), &ledger)
            .unwrap();
        apply_legs(&mut ledger, &establish.orders, 100.0);

        let signal = strategy
            .analyze(&candles, 1, &IndicatorValues::new(), &ledger)
            .unwrap();
        assert!(!signal.orders.is_empty(), "d=2% > mes=1% must rebalance");
        assert_eq!(strategy.reference_price(), Some(102.0));

        // First leg harvests the full winning (long) side.
        let harvest = &signal.orders[0];
        assert_eq!(harvest.side, PositionSide::Long);
        assert_eq!(harvest.action, TradeAction::Close);
        assert!((harvest.quantity - 25.0).abs() < 1e-9);

        // Gain = 2 * 25 = 50: repair 0.5*50/102 short, rebuild 25 + 0.5*50/102 long.
        let repair = &signal.orders[1];
        assert_eq!(repair.side, PositionSide::Short);
        assert_eq!(repair.action, TradeAction::Open);
        assert!((repair.quantity - 25.0 * 2.0 * 0.5 / 102.0).abs() < 1e-9);

        let rebuild = &signal.orders[2];
        assert_eq!(rebuild.side, PositionSide::Long);
        assert_eq!(rebuild.action, TradeAction::Open);
        assert!((rebuild.quantity - (25.0 + 25.0 * 2.0 * 0.5 / 102.0)).abs() < 1e-9);
    }

    #[test]
    fn capital_at_risk_forces_exit() {
        let mut p = params();
        p.e_max = 10.0;
        let closes = [100.0, 100.5, 99.0];
        let candles = make_candles(&closes);
        let mut strategy = BandHedge::new(p);
        let mut ledger = PositionLedger::new("TEST", 10_000.0);

        let establish = strategy
            .analyze(&candles, 0, &IndicatorValues::new(), &ledger)
            .unwrap();
        apply_legs(&mut ledger, &establish.orders, 100.0);

        // Long side is 25 @ 100; at 99 the adverse excursion is 25 > e_max.
        let signal = strategy
            .analyze(&candles, 2, &IndicatorValues::new(), &ledger)
            .unwrap();
        assert_eq!(strategy.mode(), Mode::Exit);
        assert!(signal.orders.iter().all(|o| o.action == TradeAction::Close));
        let notes = strategy.drain_mode_changes();
        assert!(notes.iter().any(|n| n.contains("exit")), "missing exit note: {notes:?}");
    }

    #[test]
    fn exit_terminates_within_bound_and_never_increases() {
        let p = params();
        let eta = p.eta;
        let epsilon = p.epsilon;
        let mut strategy = BandHedge::new(p);
        let mut ledger = PositionLedger::new("TEST", 10_000.0);
        let ts = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        ledger
            .apply_fill(PositionSide::Long, TradeAction::Open, 20.0, 100.0, 0.0, ts, 1)
            .unwrap();
        ledger
            .apply_fill(PositionSide::Short, TradeAction::Open, 20.0, 100.0, 0.0, ts, 2)
            .unwrap();
        strategy.p_ref = Some(100.0);
        strategy.mode = Mode::Exit;

        let initial_qty = 40.0;
        let bound = ((epsilon / initial_qty).ln() / (1.0 - eta).ln()).ceil() as usize + 1;

        let candles = make_candles(&vec![100.0; bound + 2]);
        let mut steps = 0;
        for i in 0..candles.len() {
            if strategy.mode() == Mode::Done {
                break;
            }
            let signal = strategy
                .analyze(&candles, i, &IndicatorValues::new(), &ledger)
                .unwrap();
            assert!(
                signal.orders.iter().all(|o| o.action == TradeAction::Close),
                "no increasing trades allowed during exit"
            );
            apply_legs(&mut ledger, &signal.orders, 100.0);
            steps += 1;
        }

        assert_eq!(strategy.mode(), Mode::Done, "exit did not terminate in {steps} steps");
        assert!(steps <= bound, "took {steps} steps, bound {bound}");
        assert_eq!(ledger.quantity(PositionSide::Long), 0.0);
        assert_eq!(ledger.quantity(PositionSide::Short), 0.0);
    }

    #[test]
    fn done_mode_holds_forever() {
        let mut strategy = BandHedge::new(params());
        strategy.mode = Mode::Done;
        let candles = make_candles(&[100.0, 150.0, 50.0]);
        let ledger = PositionLedger::new("TEST", 10_000.0);
        for i in 0..candles.len() {
            let signal = strategy
                .analyze(&candles, i, &IndicatorValues::new(), &ledger)
                .unwrap();
            assert!(signal.is_hold());
        }
    }

    #[test]
    fn low_vol_streak_pauses_then_recovers() {
        let mut p = params();
        p.exit_m = 6; // pause threshold 3
        let mut strategy = BandHedge::new(p);
        let mut ledger = PositionLedger::new("TEST", 10_000.0);

        // Flat forever: d = 0 decays sigma toward zero. The EWMA needs a
        // couple dozen candles to fall below exit_k * mes^2.
        let closes = vec![100.0; 40];
        let candles = make_candles(&closes);
        let establish = strategy
            .analyze(&candles, 0, &IndicatorValues::new(), &ledger)
            .unwrap();
        apply_legs(&mut ledger, &establish.orders, 100.0);

        let mut paused_at = None;
        for i in 1..candles.len() {
            strategy
                .analyze(&candles, i, &IndicatorValues::new(), &ledger)
                .unwrap();
            if strategy.mode() == Mode::Pause && paused_at.is_none() {
                paused_at = Some(i);
            }
        }
        assert!(paused_at.is_some(), "flat tape should pause the machine");
        // No rebalance ever happened, so the low-vol streak must not exit.
        assert_ne!(strategy.mode(), Mode::Exit);
        assert_ne!(strategy.mode(), Mode::Done);

        // A burst of volatility reactivates.
        let mut burst_closes = vec![100.0; 40];
        burst_closes.push(120.0);
        let burst = make_candles(&burst_closes);
        strategy
            .analyze(&burst, 40, &IndicatorValues::new(), &ledger)
            .unwrap();
        assert_eq!(strategy.mode(), Mode::Active);
    }

    #[test]
    fn volatility_collapse_exits_only_after_rebalance() {
        let mut p = params();
        p.exit_m = 4;
        let mut strategy = BandHedge::new(p);
        let mut ledger = PositionLedger::new("TEST", 10_000.0);

        // Establish at 100, rebalance at 102, then go flat at 102: the
        // low-vol streak needs ~25 candles to form and the staged exit
        // another ~20 to unwind.
        let mut closes = vec![100.0, 102.0];
        closes.extend(vec![102.0; 80]);
        let candles = make_candles(&closes);

        for i in 0..candles.len() {
            if strategy.mode() == Mode::Done {
                break;
            }
            let signal = strategy
                .analyze(&candles, i, &IndicatorValues::new(), &ledger)
                .unwrap();
            apply_legs(&mut ledger, &signal.orders, candles[i].close);
        }

        assert!(strategy.rebalanced);
        assert_eq!(strategy.mode(), Mode::Done, "flat tape after rebalance must unwind");
        assert!(!ledger.has_exposure());
    }
}
