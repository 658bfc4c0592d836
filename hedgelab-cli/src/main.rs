//! HedgeLab CLI — run, sweep, and export commands.
//!
//! Commands:
//! - `run` — create a session from a TOML config, import klines from CSV,
//!   replay it, and print the metrics summary
//! - `sweep` — rayon grid search over strategy parameters, no persistence
//! - `export` — write a session's trade tape and equity curve as CSV

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use hedgelab_core::domain::Candle;
use hedgelab_core::engine::CancelToken;
use hedgelab_runner::{
    band_hedge_grid, ema_cross_grid, run_sweep, write_equity_csv, write_trades_csv,
    BacktestConfig, RankBy, SessionService,
};
use hedgelab_store::{EquityStore, KlineStore, SqliteStore, TradeStore};

#[derive(Parser)]
#[command(name = "hedgelab", about = "HedgeLab CLI — hedging backtest engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Metric {
    Sharpe,
    Return,
    ProfitFactor,
}

impl From<Metric> for RankBy {
    fn from(metric: Metric) -> Self {
        match metric {
            Metric::Sharpe => RankBy::Sharpe,
            Metric::Return => RankBy::TotalReturn,
            Metric::ProfitFactor => RankBy::ProfitFactor,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run one backtest session from a TOML config file.
    Run {
        /// Path to the TOML config.
        #[arg(long)]
        config: PathBuf,

        /// Kline CSV (ts,open,high,low,close,volume; ts = epoch ms or RFC3339).
        #[arg(long)]
        klines: PathBuf,

        /// SQLite database path.
        #[arg(long, default_value = "hedgelab.db")]
        db: PathBuf,
    },
    /// Parameter sweep over the config's strategy, in memory.
    Sweep {
        #[arg(long)]
        config: PathBuf,

        #[arg(long)]
        klines: PathBuf,

        /// Metric to rank results by.
        #[arg(long, value_enum, default_value_t = Metric::Sharpe)]
        metric: Metric,

        /// How many top results to print.
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
    /// Export a session's trades and equity curve as CSV artifacts.
    Export {
        #[arg(long, default_value = "hedgelab.db")]
        db: PathBuf,

        #[arg(long)]
        session: i64,

        /// Output directory.
        #[arg(long, default_value = "artifacts")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run { config, klines, db } => run_command(&config, &klines, &db).await,
        Commands::Sweep {
            config,
            klines,
            metric,
            top,
        } => sweep_command(&config, &klines, metric, top),
        Commands::Export { db, session, out } => export_command(&db, session, &out).await,
    }
}

async fn run_command(config_path: &Path, klines_path: &Path, db_path: &Path) -> Result<()> {
    let config = BacktestConfig::load(config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    let candles = read_klines_csv(klines_path)?;
    if candles.is_empty() {
        bail!("no klines in {}", klines_path.display());
    }

    let db = db_path
        .to_str()
        .with_context(|| format!("non-utf8 db path {}", db_path.display()))?;
    let store = Arc::new(SqliteStore::open(db).await?);
    let service = SessionService::new(Arc::clone(&store));

    let id = service.create(config).await?;
    store.insert_klines(id, &candles).await?;
    info!(session_id = id, klines = candles.len(), "session ready");

    let outcome = service.run(id, CancelToken::new()).await?;

    println!("session {}: {}", outcome.session_id, outcome.status.as_str());
    if let Some(error) = &outcome.error {
        println!("  error:         {error}");
    }
    let m = &outcome.metrics;
    println!("  trades:        {}", m.total_trades);
    println!("  win rate:      {:.2}%", m.win_rate * 100.0);
    println!("  total pnl:     {:.2}", m.total_pnl);
    println!("  total return:  {:.2}%", m.total_return * 100.0);
    println!("  max drawdown:  {:.2}%", m.max_drawdown * 100.0);
    println!("  sharpe:        {:.4}", m.sharpe);
    println!("  profit factor: {:.4}", m.profit_factor);
    println!("  expectancy:    {:.4}", m.expectancy);
    println!("  final equity:  {:.2}", outcome.final_equity);
    Ok(())
}

fn sweep_command(config_path: &Path, klines_path: &Path, metric: Metric, top: usize) -> Result<()> {
    let config = BacktestConfig::load(config_path)?;
    let candles = read_klines_csv(klines_path)?;
    if candles.is_empty() {
        bail!("no klines in {}", klines_path.display());
    }

    let specs = match config.strategy.name.as_str() {
        "ema_cross" => ema_cross_grid(&[5, 9, 12, 20, 30], &[21, 50, 100, 200]),
        "band_limited_hedging" => band_hedge_grid(
            &[0.003, 0.006, 0.009, 0.012, 0.018],
            &[0.25, 0.4, 0.5, 0.6, 0.75],
        ),
        other => bail!("no sweep grid defined for strategy '{other}'"),
    };
    info!(specs = specs.len(), candles = candles.len(), "sweep start");

    let results = run_sweep(&config, specs, &candles, metric.into());

    println!("{:<44} {:>10} {:>10} {:>10} {:>8}", "params", "return%", "sharpe", "pf", "trades");
    for result in results.iter().take(top) {
        let params: Vec<String> = result
            .spec
            .params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        println!(
            "{:<44} {:>10.2} {:>10.4} {:>10.4} {:>8}",
            params.join(" "),
            result.metrics.total_return * 100.0,
            result.metrics.sharpe,
            result.metrics.profit_factor,
            result.metrics.total_trades,
        );
    }
    Ok(())
}

async fn export_command(db_path: &Path, session_id: i64, out_dir: &Path) -> Result<()> {
    let db = db_path
        .to_str()
        .with_context(|| format!("non-utf8 db path {}", db_path.display()))?;
    let store = SqliteStore::open(db).await?;

    let trades = store.list_trades(session_id).await?;
    let equity = store.list_equity(session_id).await?;
    if trades.is_empty() && equity.is_empty() {
        bail!("session {session_id} has no persisted results");
    }

    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("creating {}", out_dir.display()))?;
    let trades_path = out_dir.join(format!("session_{session_id}_trades.csv"));
    let equity_path = out_dir.join(format!("session_{session_id}_equity.csv"));
    write_trades_csv(&trades_path, &trades)?;
    write_equity_csv(&equity_path, &equity)?;

    println!("wrote {}", trades_path.display());
    println!("wrote {}", equity_path.display());
    Ok(())
}

/// Parse a kline CSV: header `ts,open,high,low,close,volume`, timestamps as
/// epoch milliseconds or RFC3339.
fn read_klines_csv(path: &Path) -> Result<Vec<Candle>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("opening klines CSV {}", path.display()))?;

    let mut candles = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("reading klines CSV line {}", line + 2))?;
        if record.len() < 6 {
            bail!("klines CSV line {}: expected 6 columns, got {}", line + 2, record.len());
        }
        let ts = parse_ts(&record[0])
            .with_context(|| format!("klines CSV line {}: bad timestamp '{}'", line + 2, &record[0]))?;
        let field = |i: usize| -> Result<f64> {
            record[i]
                .trim()
                .parse::<f64>()
                .with_context(|| format!("klines CSV line {}: bad number '{}'", line + 2, &record[i]))
        };
        candles.push(Candle {
            ts,
            open: field(1)?,
            high: field(2)?,
            low: field(3)?,
            close: field(4)?,
            volume: field(5)?,
        });
    }
    Ok(candles)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ms) = raw.parse::<i64>() {
        return Utc
            .timestamp_millis_opt(ms)
            .single()
            .with_context(|| format!("epoch ms {ms} out of range"));
    }
    Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
}
