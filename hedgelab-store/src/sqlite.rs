//! SQLite-backed store (sqlx).
//!
//! WAL journal mode and a busy timeout keep concurrent writers (parallel
//! batch sessions against one file) from tripping over lock contention.
//! Batch inserts run inside one transaction per call.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use tracing::info;

use hedgelab_core::domain::{
    Candle, Event, EventKind, EquityPoint, PositionSide, SessionConfig, SessionMetrics,
    SessionStatus, StrategySpec, Trade, TradeAction,
};
use hedgelab_core::risk::StopConfig;

use crate::{
    EquityStore, EventStore, KlineStore, MetricsStore, SessionRecord, SessionStore, Store,
    StoreError, TradeStore,
};

pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (or create) a database file and run migrations.
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        Self::connect(&format!("sqlite:{path}?mode=rwc"), 5).await
    }

    /// Fresh in-memory database, for tests and throwaway runs.
    ///
    /// Pinned to a single pooled connection: every `:memory:` connection is
    /// its own private database, so a wider pool would lose the schema.
    pub async fn in_memory() -> Result<Self, StoreError> {
        Self::connect("sqlite::memory:", 1).await
    }

    async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;

        // WAL mode for concurrent readers, busy timeout for lock contention.
        sqlx::query("PRAGMA journal_mode=WAL").execute(&pool).await?;
        sqlx::query("PRAGMA busy_timeout=5000").execute(&pool).await?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!(url, "sqlite store ready");
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        let migration_sql = include_str!("../migrations/001_init.sql");
        sqlx::raw_sql(migration_sql).execute(&self.pool).await?;
        Ok(())
    }

    fn row_to_session(row: &SqliteRow) -> Result<SessionRecord, StoreError> {
        let status_str: String = row.get("status");
        let status = SessionStatus::parse(&status_str)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown status '{status_str}'")))?;

        let params_json: String = row.get("strategy_params");
        let params = serde_json::from_str(&params_json)
            .map_err(|e| StoreError::Corrupt(format!("strategy_params: {e}")))?;

        let stops_json: Option<String> = row.get("stops_json");
        let stops: StopConfig = match stops_json {
            Some(json) => serde_json::from_str(&json)
                .map_err(|e| StoreError::Corrupt(format!("stops_json: {e}")))?,
            None => StopConfig::default(),
        };

        Ok(SessionRecord {
            id: row.get("id"),
            status,
            config: SessionConfig {
                symbol: row.get("symbol"),
                timeframe: row.get("timeframe"),
                start_ts: row.get("start_ts"),
                end_ts: row.get("end_ts"),
                initial_capital: row.get("initial_capital"),
                fee_rate: row.get("fee_rate"),
                slippage_bps: row.get("slippage_bps"),
                leverage: row.get("leverage"),
                position_size_pct: row.get("position_size_pct"),
                strategy: StrategySpec {
                    name: row.get("strategy_name"),
                    params,
                },
                stops,
            },
            error_message: row.get("error_message"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

fn parse_side(s: &str) -> Result<PositionSide, StoreError> {
    match s {
        "long" => Ok(PositionSide::Long),
        "short" => Ok(PositionSide::Short),
        other => Err(StoreError::Corrupt(format!("unknown side '{other}'"))),
    }
}

fn parse_action(s: &str) -> Result<TradeAction, StoreError> {
    match s {
        "open" => Ok(TradeAction::Open),
        "close" => Ok(TradeAction::Close),
        other => Err(StoreError::Corrupt(format!("unknown action '{other}'"))),
    }
}

fn parse_event_kind(s: &str) -> Result<EventKind, StoreError> {
    match s {
        "signal" => Ok(EventKind::Signal),
        "fill" => Ok(EventKind::Fill),
        "stop" => Ok(EventKind::Stop),
        "mode_change" => Ok(EventKind::ModeChange),
        "strategy_error" => Ok(EventKind::StrategyError),
        "data_quality" => Ok(EventKind::DataQuality),
        other => Err(StoreError::Corrupt(format!("unknown event type '{other}'"))),
    }
}

fn json_column(value: &serde_json::Value) -> Option<String> {
    if value.is_null() {
        None
    } else {
        Some(value.to_string())
    }
}

fn parse_json_column(text: Option<String>) -> serde_json::Value {
    text.and_then(|t| serde_json::from_str(&t).ok())
        .unwrap_or(serde_json::Value::Null)
}

#[async_trait]
impl SessionStore for SqliteStore {
    async fn create_session(&self, config: &SessionConfig) -> Result<i64, StoreError> {
        let now = Utc::now();
        let params_json = serde_json::to_string(&config.strategy.params)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let stops_json = serde_json::to_string(&config.stops)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;

        let result = sqlx::query(
            r#"
            INSERT INTO backtest_sessions
                (created_at, updated_at, status, symbol, timeframe, start_ts, end_ts,
                 initial_capital, fee_rate, slippage_bps, leverage, position_size_pct,
                 strategy_name, strategy_params, stops_json)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(now)
        .bind(now)
        .bind(SessionStatus::Created.as_str())
        .bind(&config.symbol)
        .bind(&config.timeframe)
        .bind(config.start_ts)
        .bind(config.end_ts)
        .bind(config.initial_capital)
        .bind(config.fee_rate)
        .bind(config.slippage_bps)
        .bind(config.leverage)
        .bind(config.position_size_pct)
        .bind(&config.strategy.name)
        .bind(params_json)
        .bind(stops_json)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn fetch_session(&self, id: i64) -> Result<SessionRecord, StoreError> {
        let row = sqlx::query("SELECT * FROM backtest_sessions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::SessionNotFound(id))?;
        Self::row_to_session(&row)
    }

    async fn update_status(
        &self,
        id: i64,
        status: SessionStatus,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE backtest_sessions
            SET status = ?, error_message = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(status.as_str())
        .bind(error)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::SessionNotFound(id));
        }
        Ok(())
    }
}

#[async_trait]
impl TradeStore for SqliteStore {
    async fn insert_trades(&self, session_id: i64, trades: &[Trade]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for trade in trades {
            sqlx::query(
                r#"
                INSERT INTO backtest_trades
                    (id, session_id, ts, symbol, side, action, qty, price, fee,
                     pnl, pnl_pct, strategy_name, reason, open_trade_id)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(trade.id as i64)
            .bind(session_id)
            .bind(trade.ts)
            .bind(&trade.symbol)
            .bind(trade.side.as_str())
            .bind(trade.action.as_str())
            .bind(trade.qty)
            .bind(trade.price)
            .bind(trade.fee)
            .bind(trade.pnl)
            .bind(trade.pnl_pct)
            .bind(&trade.strategy)
            .bind(&trade.reason)
            .bind(trade.open_trade_id.map(|id| id as i64))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn list_trades(&self, session_id: i64) -> Result<Vec<Trade>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM backtest_trades WHERE session_id = ? ORDER BY id ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        let mut trades = Vec::with_capacity(rows.len());
        for row in rows {
            let side_str: String = row.get("side");
            let action_str: String = row.get("action");
            trades.push(Trade {
                id: row.get::<i64, _>("id") as u64,
                ts: row.get("ts"),
                symbol: row.get("symbol"),
                side: parse_side(&side_str)?,
                action: parse_action(&action_str)?,
                qty: row.get("qty"),
                price: row.get("price"),
                fee: row.get("fee"),
                pnl: row.get("pnl"),
                pnl_pct: row.get("pnl_pct"),
                strategy: row.get("strategy_name"),
                reason: row.get::<Option<String>, _>("reason").unwrap_or_default(),
                open_trade_id: row.get::<Option<i64>, _>("open_trade_id").map(|id| id as u64),
            });
        }
        Ok(trades)
    }
}

#[async_trait]
impl EventStore for SqliteStore {
    async fn insert_events(&self, session_id: i64, events: &[Event]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for event in events {
            sqlx::query(
                r#"
                INSERT INTO backtest_events
                    (session_id, ts, event_type, side, price, strategy_name,
                     reason, confidence, indicators_json, raw_payload_json)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(session_id)
            .bind(event.ts)
            .bind(event.kind.as_str())
            .bind(event.side.map(|s| s.as_str()))
            .bind(event.price)
            .bind(&event.strategy)
            .bind(&event.reason)
            .bind(event.confidence)
            .bind(json_column(&event.indicators))
            .bind(json_column(&event.payload))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn list_events(&self, session_id: i64) -> Result<Vec<Event>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM backtest_events WHERE session_id = ? ORDER BY id ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            let kind_str: String = row.get("event_type");
            let side: Option<String> = row.get("side");
            events.push(Event {
                ts: row.get("ts"),
                kind: parse_event_kind(&kind_str)?,
                side: side.as_deref().map(parse_side).transpose()?,
                price: row.get("price"),
                strategy: row.get("strategy_name"),
                reason: row.get::<Option<String>, _>("reason").unwrap_or_default(),
                confidence: row.get("confidence"),
                indicators: parse_json_column(row.get("indicators_json")),
                payload: parse_json_column(row.get("raw_payload_json")),
            });
        }
        Ok(events)
    }
}

#[async_trait]
impl EquityStore for SqliteStore {
    async fn insert_equity(
        &self,
        session_id: i64,
        points: &[EquityPoint],
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for point in points {
            sqlx::query(
                r#"
                INSERT INTO backtest_equity_curve
                    (session_id, ts, equity, balance, drawdown, peak_equity)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(session_id)
            .bind(point.ts)
            .bind(point.equity)
            .bind(point.balance)
            .bind(point.drawdown)
            .bind(point.peak_equity)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn list_equity(&self, session_id: i64) -> Result<Vec<EquityPoint>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM backtest_equity_curve WHERE session_id = ? ORDER BY id ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| EquityPoint {
                ts: row.get("ts"),
                equity: row.get("equity"),
                balance: row.get("balance"),
                drawdown: row.get("drawdown"),
                peak_equity: row.get("peak_equity"),
            })
            .collect())
    }
}

#[async_trait]
impl MetricsStore for SqliteStore {
    async fn upsert_metrics(
        &self,
        session_id: i64,
        metrics: &SessionMetrics,
        start_ts: DateTime<Utc>,
        end_ts: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO backtest_metrics
                (session_id, total_trades, win_rate, total_pnl, total_return,
                 max_drawdown, sharpe, profit_factor, expectancy, avg_win, avg_loss,
                 start_ts, end_ts)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(session_id)
        .bind(metrics.total_trades as i64)
        .bind(metrics.win_rate)
        .bind(metrics.total_pnl)
        .bind(metrics.total_return)
        .bind(metrics.max_drawdown)
        .bind(metrics.sharpe)
        .bind(metrics.profit_factor)
        .bind(metrics.expectancy)
        .bind(metrics.avg_win)
        .bind(metrics.avg_loss)
        .bind(start_ts)
        .bind(end_ts)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fetch_metrics(&self, session_id: i64) -> Result<Option<SessionMetrics>, StoreError> {
        let row = sqlx::query("SELECT * FROM backtest_metrics WHERE session_id = ?")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| SessionMetrics {
            total_trades: row.get::<i64, _>("total_trades") as u64,
            win_rate: row.get("win_rate"),
            total_pnl: row.get("total_pnl"),
            total_return: row.get("total_return"),
            max_drawdown: row.get("max_drawdown"),
            sharpe: row.get("sharpe"),
            profit_factor: row.get("profit_factor"),
            expectancy: row.get("expectancy"),
            avg_win: row.get("avg_win"),
            avg_loss: row.get("avg_loss"),
        }))
    }
}

#[async_trait]
impl KlineStore for SqliteStore {
    async fn insert_klines(&self, session_id: i64, candles: &[Candle]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for candle in candles {
            sqlx::query(
                r#"
                INSERT INTO backtest_klines (session_id, ts, open, high, low, close, volume)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(session_id)
            .bind(candle.ts)
            .bind(candle.open)
            .bind(candle.high)
            .bind(candle.low)
            .bind(candle.close)
            .bind(candle.volume)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn load_klines(&self, session_id: i64) -> Result<Vec<Candle>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM backtest_klines WHERE session_id = ? ORDER BY ts ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| Candle {
                ts: row.get("ts"),
                open: row.get("open"),
                high: row.get("high"),
                low: row.get("low"),
                close: row.get("close"),
                volume: row.get("volume"),
            })
            .collect())
    }
}

// The blanket impl in lib.rs makes SqliteStore a full `Store`; this is a
// compile-time statement of that fact.
const _: fn() = || {
    fn assert_store<T: Store>() {}
    assert_store::<SqliteStore>();
};
