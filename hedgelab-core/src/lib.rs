//! HedgeLab Core — engine, domain types, strategies, risk, indicators.
//!
//! This crate contains the heart of the backtesting engine:
//! - Domain types (candles, signals, positions, trades, events, equity,
//!   session configuration)
//! - The synchronous candle-by-candle replay loop
//! - The indicator library (EMA, MACD, RSI, ADX, ATR, Bollinger)
//! - Strategy trait + registered strategies, including the band-limited
//!   hedging state machine
//! - Risk management: position ledger, hard stops, running counters
//!
//! The crate performs no I/O. Persistence and orchestration live in
//! `hedgelab-store` and `hedgelab-runner`.

pub mod domain;
pub mod engine;
pub mod indicators;
pub mod risk;
pub mod strategy;

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: engine-facing types are Send (+ Sync where they
    /// cross thread boundaries). Sessions run on worker threads; a type that
    /// silently loses Send would break the batch runner.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        // Domain types
        require_send::<domain::Candle>();
        require_sync::<domain::Candle>();
        require_send::<domain::Trade>();
        require_sync::<domain::Trade>();
        require_send::<domain::Event>();
        require_sync::<domain::Event>();
        require_send::<domain::EquityPoint>();
        require_sync::<domain::EquityPoint>();
        require_send::<domain::Position>();
        require_sync::<domain::Position>();
        require_send::<domain::SessionConfig>();
        require_sync::<domain::SessionConfig>();
        require_send::<domain::SessionMetrics>();
        require_sync::<domain::SessionMetrics>();
        require_send::<domain::TradeSignal>();
        require_sync::<domain::TradeSignal>();

        // Risk types
        require_send::<risk::PositionLedger>();
        require_sync::<risk::PositionLedger>();
        require_send::<risk::StopEngine>();
        require_send::<risk::RiskStats>();
        require_sync::<risk::RiskStats>();

        // Engine types
        require_send::<engine::ReplayResult>();
        require_send::<engine::CancelToken>();
        require_sync::<engine::CancelToken>();

        // Strategies are Send (moved onto worker threads), not Sync.
        require_send::<strategy::EmaCross>();
        require_send::<strategy::MacdCross>();
        require_send::<strategy::RsiReversion>();
        require_send::<strategy::BandHedge>();
        require_send::<Box<dyn strategy::Strategy>>();
    }
}
