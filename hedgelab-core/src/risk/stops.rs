//! Hard stop rules — evaluated before strategy signals every candle.
//!
//! Four rules per side, first match wins: fixed stop-loss, trailing stop,
//! fixed take-profit, trailing take-profit. The trailing take-profit arms
//! only once net-of-fee profit exceeds a threshold, then tracks a sliding
//! window of recent closes and fires when price retraces past the windowed
//! average by the fallback fraction.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::domain::PositionSide;
use crate::risk::ledger::PositionLedger;

/// Trailing take-profit parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrailingTakeProfit {
    /// Net-of-fees profit fraction required to arm (e.g. 0.01 = 1%).
    pub arm_profit_pct: f64,
    /// Sliding window length over recent closes.
    pub window: usize,
    /// Retracement past the windowed average that fires (e.g. 0.005).
    pub fallback_pct: f64,
}

/// Stop rule configuration. All rules optional; `None` disables a rule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StopConfig {
    /// Adverse move from entry that closes the side (e.g. 0.05 = 5%).
    pub stop_loss_pct: Option<f64>,
    /// Favorable move from entry that closes the side.
    pub take_profit_pct: Option<f64>,
    /// Retracement from the best price seen since entry.
    pub trailing_stop_pct: Option<f64>,
    pub trailing_take_profit: Option<TrailingTakeProfit>,
}

impl StopConfig {
    pub fn is_empty(&self) -> bool {
        self.stop_loss_pct.is_none()
            && self.take_profit_pct.is_none()
            && self.trailing_stop_pct.is_none()
            && self.trailing_take_profit.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    StopLoss,
    TakeProfit,
    TrailingStop,
    TrailingTakeProfit,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::StopLoss => "stop_loss",
            StopReason::TakeProfit => "take_profit",
            StopReason::TrailingStop => "trailing_stop",
            StopReason::TrailingTakeProfit => "trailing_take_profit",
        }
    }
}

/// A fired stop: close the full quantity of `side` at market.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StopEvent {
    pub side: PositionSide,
    pub reason: StopReason,
    pub price: f64,
}

#[derive(Debug, Clone, Default)]
struct SideState {
    /// Most favorable price seen since entry (max for long, min for short).
    best_price: Option<f64>,
    armed: bool,
    window: VecDeque<f64>,
}

impl SideState {
    fn clear(&mut self) {
        self.best_price = None;
        self.armed = false;
        self.window.clear();
    }
}

/// Stateful stop evaluator for one session.
#[derive(Debug, Clone)]
pub struct StopEngine {
    config: StopConfig,
    /// Round-trip fee fraction used by the trailing take-profit arm check.
    fee_rate: f64,
    long_state: SideState,
    short_state: SideState,
}

impl StopEngine {
    pub fn new(config: StopConfig, fee_rate: f64) -> Self {
        Self {
            config,
            fee_rate,
            long_state: SideState::default(),
            short_state: SideState::default(),
        }
    }

    /// Evaluate stops against the current close. At most one event per side.
    /// Sides with no open position have their tracking state cleared.
    pub fn check(&mut self, price: f64, ledger: &PositionLedger) -> Vec<StopEvent> {
        let mut events = Vec::new();
        for side in [PositionSide::Long, PositionSide::Short] {
            let state = match side {
                PositionSide::Long => &mut self.long_state,
                PositionSide::Short => &mut self.short_state,
            };
            let pos = match ledger.position(side) {
                Some(p) => p,
                None => {
                    state.clear();
                    continue;
                }
            };

            let dir = side.direction();
            let entry = pos.entry_price;

            // Best favorable price ratchet, seeded from entry.
            let best = state.best_price.get_or_insert(entry);
            if (price - *best) * dir > 0.0 {
                *best = price;
            }
            let best = *best;

            let reason = 'rule: {
                if let Some(sl) = self.config.stop_loss_pct {
                    if (entry - price) * dir >= entry * sl {
                        break 'rule Some(StopReason::StopLoss);
                    }
                }
                if let Some(trail) = self.config.trailing_stop_pct {
                    if (best - price) * dir >= best * trail {
                        break 'rule Some(StopReason::TrailingStop);
                    }
                }
                if let Some(tp) = self.config.take_profit_pct {
                    if (price - entry) * dir >= entry * tp {
                        break 'rule Some(StopReason::TakeProfit);
                    }
                }
                if let Some(ttp) = &self.config.trailing_take_profit {
                    let net_profit_pct = (price - entry) * dir / entry - 2.0 * self.fee_rate;
                    if !state.armed && net_profit_pct >= ttp.arm_profit_pct {
                        state.armed = true;
                    }
                    if state.armed {
                        state.window.push_back(price);
                        while state.window.len() > ttp.window {
                            state.window.pop_front();
                        }
                        if state.window.len() == ttp.window {
                            let avg: f64 =
                                state.window.iter().sum::<f64>() / state.window.len() as f64;
                            if (avg - price) * dir >= avg * ttp.fallback_pct {
                                break 'rule Some(StopReason::TrailingTakeProfit);
                            }
                        }
                    }
                }
                None
            };

            if let Some(reason) = reason {
                events.push(StopEvent { side, reason, price });
            }
        }
        events
    }

    /// Forget tracking state for a side after its position is closed.
    pub fn reset_side(&mut self, side: PositionSide) {
        match side {
            PositionSide::Long => self.long_state.clear(),
            PositionSide::Short => self.short_state.clear(),
        }
    }
}
