//! Session lifecycle orchestration against the storage ports.
//!
//! `create` validates everything rejectable before replay (session config
//! and strategy parameters) and inserts a `Created` row. `run` loads the
//! session's klines, flips it to `Running`, executes the synchronous replay
//! on a blocking worker, persists trades/events/equity in batches, computes
//! and upserts metrics, and lands the terminal status. Failed and cancelled
//! sessions keep everything produced up to the stop point — a session is
//! never left `Running`.

use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info};

use hedgelab_core::domain::{ConfigError, SessionConfig, SessionMetrics, SessionStatus};
use hedgelab_core::engine::{run_replay, CancelToken, ReplayOptions, ReplayResult};
use hedgelab_core::strategy::{create_strategy, FactoryError};
use hedgelab_store::{Store, StoreError};

use crate::metrics;

/// Rows per batched insert when persisting replay output.
const PERSIST_BATCH: usize = 500;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("strategy error: {0}")]
    Factory(#[from] FactoryError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("session {id} is '{status}', expected 'created'")]
    NotRunnable { id: i64, status: &'static str },
    #[error("replay worker panicked")]
    WorkerPanicked,
}

/// Summary returned to the caller once a session lands in a terminal state.
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub session_id: i64,
    pub status: SessionStatus,
    pub error: Option<String>,
    pub metrics: SessionMetrics,
    pub trade_count: usize,
    pub final_equity: f64,
}

pub struct SessionService<S> {
    store: Arc<S>,
}

impl<S: Store + 'static> SessionService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Validate and register a session. Nothing is replayed yet.
    pub async fn create(&self, config: SessionConfig) -> Result<i64, SessionError> {
        config.validate()?;
        // Strategy parameters are rejected here, before any candle.
        create_strategy(&config)?;
        let id = self.store.create_session(&config).await?;
        info!(session_id = id, strategy = %config.strategy.name, "session created");
        Ok(id)
    }

    /// Run a created session to a terminal status.
    pub async fn run(
        &self,
        session_id: i64,
        cancel: CancelToken,
    ) -> Result<SessionOutcome, SessionError> {
        let record = self.store.fetch_session(session_id).await?;
        if record.status != SessionStatus::Created {
            return Err(SessionError::NotRunnable {
                id: session_id,
                status: record.status.as_str(),
            });
        }

        let candles = self.store.load_klines(session_id).await?;
        let strategy = create_strategy(&record.config)?;
        self.store
            .update_status(session_id, SessionStatus::Running, None)
            .await?;

        // The replay loop is CPU-bound and synchronous; run it off the
        // async executor. The session owns its candle slice and state.
        let config = record.config.clone();
        let result = tokio::task::spawn_blocking(move || {
            run_replay(
                &config,
                &candles,
                strategy,
                ReplayOptions {
                    cancel: Some(cancel),
                    ..Default::default()
                },
            )
        })
        .await
        .map_err(|_| SessionError::WorkerPanicked)?;

        match self.persist(session_id, &record.config, &result).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                // A persistence failure after executed fills must surface as
                // a failed session, never as silently dropped trades.
                error!(session_id, %err, "persistence failed after replay");
                let _ = self
                    .store
                    .update_status(
                        session_id,
                        SessionStatus::Failed,
                        Some(&format!("persistence failed: {err}")),
                    )
                    .await;
                Err(err)
            }
        }
    }

    /// Convenience: create + run in one call.
    pub async fn create_and_run(
        &self,
        config: SessionConfig,
        cancel: CancelToken,
    ) -> Result<SessionOutcome, SessionError> {
        let id = self.create(config).await?;
        self.run(id, cancel).await
    }

    async fn persist(
        &self,
        session_id: i64,
        config: &SessionConfig,
        result: &ReplayResult,
    ) -> Result<SessionOutcome, SessionError> {
        for chunk in result.trades.chunks(PERSIST_BATCH) {
            self.store.insert_trades(session_id, chunk).await?;
        }
        for chunk in result.events.chunks(PERSIST_BATCH) {
            self.store.insert_events(session_id, chunk).await?;
        }
        for chunk in result.equity_curve.chunks(PERSIST_BATCH) {
            self.store.insert_equity(session_id, chunk).await?;
        }

        let metrics = metrics::compute(&result.trades, &result.equity_curve, config.initial_capital);
        self.store
            .upsert_metrics(session_id, &metrics, config.start_ts, config.end_ts)
            .await?;
        self.store
            .update_status(session_id, result.status, result.error.as_deref())
            .await?;

        info!(
            session_id,
            status = result.status.as_str(),
            trades = result.trades.len(),
            final_equity = result.final_equity,
            "session finished"
        );

        Ok(SessionOutcome {
            session_id,
            status: result.status,
            error: result.error.clone(),
            metrics,
            trade_count: result.trades.len(),
            final_equity: result.final_equity,
        })
    }
}
