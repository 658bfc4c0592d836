//! Domain types: candles, signals, positions, trades, events, equity,
//! session configuration, and the persisted metrics row.

pub mod candle;
pub mod equity;
pub mod event;
pub mod metrics;
pub mod position;
pub mod session;
pub mod signal;
pub mod trade;

pub use candle::Candle;
pub use equity::EquityPoint;
pub use event::{Event, EventKind};
pub use metrics::SessionMetrics;
pub use position::{Position, PositionSide, PositionStatus};
pub use session::{ConfigError, SessionConfig, SessionStatus, StrategySpec};
pub use signal::{OrderRequest, SignalKind, TradeSignal};
pub use trade::{Trade, TradeAction};
