//! Risk management: position ledger, hard stop rules, running counters.

pub mod ledger;
pub mod stats;
pub mod stops;

pub use ledger::{FillResult, LedgerError, PositionLedger};
pub use stats::RiskStats;
pub use stops::{StopConfig, StopEngine, StopEvent, StopReason, TrailingTakeProfit};
