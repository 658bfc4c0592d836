//! Storage ports and adapters for backtest sessions.
//!
//! The engine never sees a concrete backend: the runner injects a
//! `Store` implementation behind these traits. Trades, events, and equity
//! points are append-only and written in timestamp order; metrics are
//! upserted once per session; klines are the read-only input.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use hedgelab_core::domain::{
    Candle, Event, EquityPoint, SessionConfig, SessionMetrics, SessionStatus, Trade,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("session {0} not found")]
    SessionNotFound(i64),
    #[error("corrupt stored data: {0}")]
    Corrupt(String),
}

/// A stored session row: config + lifecycle state.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub id: i64,
    pub status: SessionStatus,
    pub config: SessionConfig,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert a new session with status `Created`; returns its id.
    async fn create_session(&self, config: &SessionConfig) -> Result<i64, StoreError>;

    async fn fetch_session(&self, id: i64) -> Result<SessionRecord, StoreError>;

    /// Transition a session's status, optionally recording an error message.
    async fn update_status(
        &self,
        id: i64,
        status: SessionStatus,
        error: Option<&str>,
    ) -> Result<(), StoreError>;
}

#[async_trait]
pub trait TradeStore: Send + Sync {
    /// Append-only batch insert; trades must already be timestamp-ordered.
    async fn insert_trades(&self, session_id: i64, trades: &[Trade]) -> Result<(), StoreError>;

    /// All trades for a session, ordered by trade id.
    async fn list_trades(&self, session_id: i64) -> Result<Vec<Trade>, StoreError>;
}

#[async_trait]
pub trait EventStore: Send + Sync {
    async fn insert_events(&self, session_id: i64, events: &[Event]) -> Result<(), StoreError>;

    async fn list_events(&self, session_id: i64) -> Result<Vec<Event>, StoreError>;
}

#[async_trait]
pub trait EquityStore: Send + Sync {
    async fn insert_equity(
        &self,
        session_id: i64,
        points: &[EquityPoint],
    ) -> Result<(), StoreError>;

    async fn list_equity(&self, session_id: i64) -> Result<Vec<EquityPoint>, StoreError>;
}

#[async_trait]
pub trait MetricsStore: Send + Sync {
    /// Insert or replace the metrics row for a session.
    async fn upsert_metrics(
        &self,
        session_id: i64,
        metrics: &SessionMetrics,
        start_ts: DateTime<Utc>,
        end_ts: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn fetch_metrics(&self, session_id: i64) -> Result<Option<SessionMetrics>, StoreError>;
}

#[async_trait]
pub trait KlineStore: Send + Sync {
    /// Import candles for a session. `(session_id, ts)` is unique.
    async fn insert_klines(&self, session_id: i64, candles: &[Candle]) -> Result<(), StoreError>;

    /// Candles for a session, ordered by timestamp ascending.
    async fn load_klines(&self, session_id: i64) -> Result<Vec<Candle>, StoreError>;
}

/// Aggregate port injected into the session service.
pub trait Store:
    SessionStore + TradeStore + EventStore + EquityStore + MetricsStore + KlineStore
{
}

impl<T> Store for T where
    T: SessionStore + TradeStore + EventStore + EquityStore + MetricsStore + KlineStore
{
}
