//! CSV artifact export: trade tape and equity curve.

use std::path::Path;

use anyhow::{Context, Result};

use hedgelab_core::domain::{EquityPoint, Trade};

/// Write the trade tape as CSV.
pub fn write_trades_csv(path: &Path, trades: &[Trade]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create trades CSV {}", path.display()))?;

    writer.write_record([
        "id",
        "ts",
        "symbol",
        "side",
        "action",
        "qty",
        "price",
        "fee",
        "pnl",
        "pnl_pct",
        "strategy",
        "reason",
        "open_trade_id",
    ])?;

    for trade in trades {
        writer.write_record([
            trade.id.to_string(),
            trade.ts.to_rfc3339(),
            trade.symbol.clone(),
            trade.side.as_str().to_string(),
            trade.action.as_str().to_string(),
            format!("{:.8}", trade.qty),
            format!("{:.8}", trade.price),
            format!("{:.8}", trade.fee),
            trade.pnl.map(|p| format!("{p:.8}")).unwrap_or_default(),
            trade.pnl_pct.map(|p| format!("{p:.8}")).unwrap_or_default(),
            trade.strategy.clone(),
            trade.reason.clone(),
            trade.open_trade_id.map(|id| id.to_string()).unwrap_or_default(),
        ])?;
    }

    writer.flush().context("failed to flush trades CSV")?;
    Ok(())
}

/// Write the equity curve as CSV.
pub fn write_equity_csv(path: &Path, points: &[EquityPoint]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create equity CSV {}", path.display()))?;

    writer.write_record(["ts", "equity", "balance", "drawdown", "peak_equity"])?;
    for point in points {
        writer.write_record([
            point.ts.to_rfc3339(),
            format!("{:.8}", point.equity),
            format!("{:.8}", point.balance),
            format!("{:.8}", point.drawdown),
            format!("{:.8}", point.peak_equity),
        ])?;
    }

    writer.flush().context("failed to flush equity CSV")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use hedgelab_core::domain::{PositionSide, TradeAction};

    #[test]
    fn trades_csv_has_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trades.csv");
        let ts = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();

        let trades = vec![Trade {
            id: 1,
            ts,
            symbol: "BTCUSDT".into(),
            side: PositionSide::Long,
            action: TradeAction::Open,
            qty: 0.5,
            price: 42_000.0,
            fee: 21.0,
            pnl: None,
            pnl_pct: None,
            strategy: "ema_cross".into(),
            reason: "cross up".into(),
            open_trade_id: None,
        }];
        write_trades_csv(&path, &trades).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert!(lines.next().unwrap().starts_with("id,ts,symbol"));
        let row = lines.next().unwrap();
        assert!(row.contains("BTCUSDT"));
        assert!(row.contains("long"));
        assert!(row.contains("open"));
    }

    #[test]
    fn equity_csv_roundtrips_row_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("equity.csv");
        let base = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();

        let points: Vec<EquityPoint> = (0..10)
            .map(|i| EquityPoint {
                ts: base + chrono::Duration::hours(i),
                equity: 10_000.0 + i as f64,
                balance: 10_000.0,
                drawdown: 0.0,
                peak_equity: 10_000.0 + i as f64,
            })
            .collect();
        write_equity_csv(&path, &points).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 11); // header + 10 rows
    }
}
