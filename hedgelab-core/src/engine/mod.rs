//! The replay engine: deterministic candle-by-candle execution.

pub mod execution;
pub mod replay;

pub use execution::{fill_fee, fill_price};
pub use replay::{run_replay, CancelToken, DataError, ProgressFn, ReplayOptions, ReplayResult};
