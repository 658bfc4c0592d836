//! The replay loop — deterministic, single-threaded candle-by-candle
//! execution of one strategy against one candle series.
//!
//! Per candle, in order: cancellation check, data validation, hard stop
//! checks, strategy evaluation, fill execution, mark-to-market, one equity
//! point. Correctness depends on strict ordering and on the strategy seeing
//! every candle exactly once; there is deliberately no concurrency here.
//!
//! Failures mid-replay (bad data) and cooperative cancellation both stop
//! the loop and return everything produced up to that point.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::{
    Candle, Event, EventKind, EquityPoint, PositionSide, SessionConfig, SessionStatus, SignalKind,
    Trade, TradeAction, TradeSignal,
};
use crate::engine::execution::{fill_fee, fill_price};
use crate::indicators::{max_lookback, precompute};
use crate::risk::{PositionLedger, RiskStats, StopEngine};
use crate::strategy::Strategy;

/// Unrecoverable data problems encountered mid-replay.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("empty candle series")]
    Empty,
    #[error("non-monotonic timestamp at index {index}: {ts} is not after {prev}")]
    NonMonotonicTimestamp {
        index: usize,
        ts: DateTime<Utc>,
        prev: DateTime<Utc>,
    },
    #[error("malformed candle at index {index} ({ts}): negative or inconsistent OHLCV")]
    MalformedCandle { index: usize, ts: DateTime<Utc> },
}

/// Cooperative cancellation flag, checked between candle steps.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Progress callback: (candles processed, total candles).
pub type ProgressFn = Box<dyn Fn(usize, usize) + Send>;

/// Optional replay hooks.
#[derive(Default)]
pub struct ReplayOptions {
    pub cancel: Option<CancelToken>,
    pub progress: Option<ProgressFn>,
    /// Invoke the progress hook every N candles (default 256).
    pub progress_every: usize,
}

impl ReplayOptions {
    fn progress_interval(&self) -> usize {
        if self.progress_every == 0 {
            256
        } else {
            self.progress_every
        }
    }
}

/// Full result of one replay, including partials on failure/cancellation.
#[derive(Debug)]
pub struct ReplayResult {
    pub status: SessionStatus,
    pub error: Option<String>,
    pub trades: Vec<Trade>,
    pub events: Vec<Event>,
    pub equity_curve: Vec<EquityPoint>,
    pub final_equity: f64,
    pub candles_processed: usize,
    pub stats: RiskStats,
}

/// Mutable per-run state threaded through fill execution.
struct Executor<'a> {
    config: &'a SessionConfig,
    slippage: f64,
    trades: Vec<Trade>,
    events: Vec<Event>,
    stats: RiskStats,
    next_trade_id: u64,
}

impl<'a> Executor<'a> {
    fn new(config: &'a SessionConfig) -> Self {
        Self {
            config,
            slippage: config.slippage_bps / 10_000.0,
            trades: Vec::new(),
            events: Vec::new(),
            stats: RiskStats::new(),
            next_trade_id: 1,
        }
    }

    /// Execute one fill against the ledger and record the trade + event.
    /// Rejected fills (strategy asked for something the book cannot do) are
    /// logged and skipped; they never abort the session.
    fn execute(
        &mut self,
        ledger: &mut PositionLedger,
        ts: DateTime<Utc>,
        close: f64,
        side: PositionSide,
        action: TradeAction,
        qty: f64,
        reason: &str,
    ) {
        if qty <= 0.0 || !qty.is_finite() {
            return;
        }
        // Clamp closes to what is actually open.
        let qty = match action {
            TradeAction::Close => {
                let open_qty = ledger.quantity(side);
                if open_qty <= 0.0 {
                    return;
                }
                qty.min(open_qty)
            }
            TradeAction::Open => qty,
        };

        let price = fill_price(close, side, action, self.slippage);
        let fee = fill_fee(price, qty, self.config.fee_rate);
        let id = self.next_trade_id;

        match ledger.apply_fill(side, action, qty, price, fee, ts, id) {
            Ok(result) => {
                self.next_trade_id += 1;
                if let Some(pnl) = result.pnl {
                    self.stats.record_trade_result(pnl);
                }
                self.trades.push(Trade {
                    id,
                    ts,
                    symbol: self.config.symbol.clone(),
                    side,
                    action,
                    qty,
                    price,
                    fee,
                    pnl: result.pnl,
                    pnl_pct: result.pnl_pct,
                    strategy: self.config.strategy.name.clone(),
                    reason: reason.to_string(),
                    open_trade_id: result.open_trade_id,
                });
                self.events.push(
                    Event::new(ts, EventKind::Fill, price, &self.config.strategy.name, reason)
                        .with_side(side),
                );
            }
            Err(err) => {
                warn!(%err, ?side, ?action, qty, "fill rejected by ledger");
                self.events.push(Event::new(
                    ts,
                    EventKind::DataQuality,
                    price,
                    &self.config.strategy.name,
                    format!("fill rejected: {err}"),
                ));
            }
        }
    }

    /// Close the full open quantity on a side, if any.
    fn close_side(
        &mut self,
        ledger: &mut PositionLedger,
        ts: DateTime<Utc>,
        close: f64,
        side: PositionSide,
        reason: &str,
    ) {
        let qty = ledger.quantity(side);
        if qty > 0.0 {
            self.execute(ledger, ts, close, side, TradeAction::Close, qty, reason);
        }
    }

    /// Apply a risk-manager-sized directional signal.
    fn apply_signal(
        &mut self,
        ledger: &mut PositionLedger,
        ts: DateTime<Utc>,
        close: f64,
        signal: &TradeSignal,
    ) {
        // Explicit legs bypass sizing entirely.
        if !signal.orders.is_empty() {
            for leg in &signal.orders {
                self.execute(ledger, ts, close, leg.side, leg.action, leg.quantity, &signal.reason);
            }
            return;
        }

        match signal.kind {
            SignalKind::Hold => {}
            SignalKind::CloseLong => {
                self.close_side(ledger, ts, close, PositionSide::Long, &signal.reason);
            }
            SignalKind::CloseShort => {
                self.close_side(ledger, ts, close, PositionSide::Short, &signal.reason);
            }
            SignalKind::Long | SignalKind::Short => {
                let side = if signal.kind == SignalKind::Long {
                    PositionSide::Long
                } else {
                    PositionSide::Short
                };
                // Reverse out of the opposite side first.
                if ledger.quantity(side.opposite()) > 0.0 {
                    self.close_side(ledger, ts, close, side.opposite(), &signal.reason);
                }
                // Entering an already-open side is a no-op: simple directional
                // strategies re-assert rather than pyramid.
                if ledger.quantity(side) > 0.0 {
                    return;
                }
                let notional =
                    ledger.equity(close) * self.config.position_size_pct * self.config.leverage;
                let qty = if close > 0.0 { notional / close } else { 0.0 };
                self.execute(ledger, ts, close, side, TradeAction::Open, qty, &signal.reason);
            }
        }
    }
}

/// Run one backtest replay. The strategy instance is consumed: hedging
/// state machines are single-session by construction.
pub fn run_replay(
    config: &SessionConfig,
    candles: &[Candle],
    mut strategy: Box<dyn Strategy>,
    opts: ReplayOptions,
) -> ReplayResult {
    let mut ledger = PositionLedger::new(&config.symbol, config.initial_capital);
    let mut stops = StopEngine::new(config.stops.clone(), config.fee_rate);
    let mut executor = Executor::new(config);
    let mut equity_curve: Vec<EquityPoint> = Vec::with_capacity(candles.len());
    let mut peak = 0.0_f64;

    let indicators_list = strategy.required_indicators();
    let indicator_values = precompute(candles, &indicators_list);
    let warmup = strategy.warmup().max(max_lookback(&indicators_list));

    let mut status = SessionStatus::Completed;
    let mut error: Option<String> = None;
    let mut processed = 0usize;

    if candles.is_empty() {
        return ReplayResult {
            status: SessionStatus::Failed,
            error: Some(DataError::Empty.to_string()),
            trades: Vec::new(),
            events: Vec::new(),
            equity_curve,
            final_equity: config.initial_capital,
            candles_processed: 0,
            stats: RiskStats::new(),
        };
    }

    info!(
        symbol = %config.symbol,
        strategy = %config.strategy.name,
        candles = candles.len(),
        warmup,
        "replay start"
    );

    for (i, candle) in candles.iter().enumerate() {
        // Cooperative cancellation between candle steps.
        if opts.cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
            info!(processed, "replay cancelled");
            status = SessionStatus::Cancelled;
            error = Some("cancelled by caller".to_string());
            break;
        }

        // Data integrity: strictly increasing timestamps, sane OHLCV.
        if i > 0 && candle.ts <= candles[i - 1].ts {
            let err = DataError::NonMonotonicTimestamp {
                index: i,
                ts: candle.ts,
                prev: candles[i - 1].ts,
            };
            warn!(%err, "aborting replay");
            status = SessionStatus::Failed;
            error = Some(err.to_string());
            break;
        }
        if !candle.is_sane() {
            let err = DataError::MalformedCandle { index: i, ts: candle.ts };
            warn!(%err, "aborting replay");
            status = SessionStatus::Failed;
            error = Some(err.to_string());
            break;
        }

        let price = candle.close;

        // Hard stops before strategy signals: risk precedes opportunism.
        for stop in stops.check(price, &ledger) {
            executor.events.push(
                Event::new(
                    candle.ts,
                    EventKind::Stop,
                    price,
                    &config.strategy.name,
                    stop.reason.as_str(),
                )
                .with_side(stop.side),
            );
            executor.close_side(&mut ledger, candle.ts, price, stop.side, stop.reason.as_str());
            stops.reset_side(stop.side);
        }

        // Strategy evaluation after warmup. A per-candle strategy error is
        // downgraded to a hold and logged, never fatal.
        if i >= warmup {
            match strategy.analyze(candles, i, &indicator_values, &ledger) {
                Ok(signal) => {
                    for note in strategy.drain_mode_changes() {
                        debug!(%note, "strategy mode change");
                        executor.events.push(Event::new(
                            candle.ts,
                            EventKind::ModeChange,
                            price,
                            &config.strategy.name,
                            note,
                        ));
                    }
                    if !signal.is_hold() {
                        executor.events.push(
                            Event::new(
                                candle.ts,
                                EventKind::Signal,
                                price,
                                &config.strategy.name,
                                &signal.reason,
                            )
                            .with_confidence(signal.confidence)
                            .with_payload(serde_json::json!({
                                "kind": signal.kind,
                                "strength": signal.strength,
                                "legs": signal.orders.len(),
                            })),
                        );
                        executor.apply_signal(&mut ledger, candle.ts, price, &signal);
                    }
                }
                Err(err) => {
                    warn!(%err, index = i, "strategy error, holding this candle");
                    executor.events.push(Event::new(
                        candle.ts,
                        EventKind::StrategyError,
                        price,
                        &config.strategy.name,
                        err.to_string(),
                    ));
                }
            }
        }

        // Mark-to-market and one equity point per candle.
        ledger.mark(price);
        let equity = ledger.equity(price);
        executor.stats.observe_equity(equity);
        let point = EquityPoint::next(candle.ts, equity, ledger.balance(), peak);
        peak = point.peak_equity;
        equity_curve.push(point);

        processed = i + 1;
        if processed % opts.progress_interval() == 0 {
            if let Some(progress) = &opts.progress {
                progress(processed, candles.len());
            }
        }
    }

    if let Some(progress) = &opts.progress {
        progress(processed, candles.len());
    }

    let final_equity = equity_curve
        .last()
        .map(|p| p.equity)
        .unwrap_or(config.initial_capital);

    info!(
        status = status.as_str(),
        processed,
        trades = executor.trades.len(),
        final_equity,
        "replay finished"
    );

    ReplayResult {
        status,
        error,
        trades: executor.trades,
        events: executor.events,
        equity_curve,
        final_equity,
        candles_processed: processed,
        stats: executor.stats,
    }
}
