//! In-memory store — mutex-guarded vectors for tests and sweep runs.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use hedgelab_core::domain::{
    Candle, Event, EquityPoint, SessionConfig, SessionMetrics, SessionStatus, Trade,
};

use crate::{
    EquityStore, EventStore, KlineStore, MetricsStore, SessionRecord, SessionStore, StoreError,
    TradeStore,
};

#[derive(Default)]
struct Inner {
    next_id: i64,
    sessions: HashMap<i64, SessionRecord>,
    trades: HashMap<i64, Vec<Trade>>,
    events: HashMap<i64, Vec<Event>>,
    equity: HashMap<i64, Vec<EquityPoint>>,
    metrics: HashMap<i64, SessionMetrics>,
    klines: HashMap<i64, Vec<Candle>>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned lock means a panicking test; propagate the panic.
        self.inner.lock().unwrap()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create_session(&self, config: &SessionConfig) -> Result<i64, StoreError> {
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        let now = Utc::now();
        inner.sessions.insert(
            id,
            SessionRecord {
                id,
                status: SessionStatus::Created,
                config: config.clone(),
                error_message: None,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(id)
    }

    async fn fetch_session(&self, id: i64) -> Result<SessionRecord, StoreError> {
        self.lock()
            .sessions
            .get(&id)
            .cloned()
            .ok_or(StoreError::SessionNotFound(id))
    }

    async fn update_status(
        &self,
        id: i64,
        status: SessionStatus,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let record = inner
            .sessions
            .get_mut(&id)
            .ok_or(StoreError::SessionNotFound(id))?;
        record.status = status;
        record.error_message = error.map(|e| e.to_string());
        record.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl TradeStore for MemoryStore {
    async fn insert_trades(&self, session_id: i64, trades: &[Trade]) -> Result<(), StoreError> {
        self.lock()
            .trades
            .entry(session_id)
            .or_default()
            .extend_from_slice(trades);
        Ok(())
    }

    async fn list_trades(&self, session_id: i64) -> Result<Vec<Trade>, StoreError> {
        Ok(self.lock().trades.get(&session_id).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn insert_events(&self, session_id: i64, events: &[Event]) -> Result<(), StoreError> {
        self.lock()
            .events
            .entry(session_id)
            .or_default()
            .extend_from_slice(events);
        Ok(())
    }

    async fn list_events(&self, session_id: i64) -> Result<Vec<Event>, StoreError> {
        Ok(self.lock().events.get(&session_id).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl EquityStore for MemoryStore {
    async fn insert_equity(
        &self,
        session_id: i64,
        points: &[EquityPoint],
    ) -> Result<(), StoreError> {
        self.lock()
            .equity
            .entry(session_id)
            .or_default()
            .extend_from_slice(points);
        Ok(())
    }

    async fn list_equity(&self, session_id: i64) -> Result<Vec<EquityPoint>, StoreError> {
        Ok(self.lock().equity.get(&session_id).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl MetricsStore for MemoryStore {
    async fn upsert_metrics(
        &self,
        session_id: i64,
        metrics: &SessionMetrics,
        _start_ts: DateTime<Utc>,
        _end_ts: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.lock().metrics.insert(session_id, metrics.clone());
        Ok(())
    }

    async fn fetch_metrics(&self, session_id: i64) -> Result<Option<SessionMetrics>, StoreError> {
        Ok(self.lock().metrics.get(&session_id).cloned())
    }
}

#[async_trait]
impl KlineStore for MemoryStore {
    async fn insert_klines(&self, session_id: i64, candles: &[Candle]) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let existing = inner.klines.entry(session_id).or_default();
        existing.extend_from_slice(candles);
        existing.sort_by_key(|c| c.ts);
        Ok(())
    }

    async fn load_klines(&self, session_id: i64) -> Result<Vec<Candle>, StoreError> {
        Ok(self.lock().klines.get(&session_id).cloned().unwrap_or_default())
    }
}
