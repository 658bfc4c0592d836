//! Session metrics — pure functions over the immutable trade list and
//! equity curve.
//!
//! Every metric is a pure function: same inputs, same output, recomputable
//! at any time. Only executed `close` fills count as trades; open fills and
//! open positions never enter a denominator. A zero-PnL close is neither a
//! win nor a loss: it stays in `total_trades` but is excluded from the
//! win-rate fraction entirely.

use hedgelab_core::domain::{EquityPoint, SessionMetrics, Trade};

/// Compute all metrics for one session.
pub fn compute(trades: &[Trade], equity_curve: &[EquityPoint], initial_capital: f64) -> SessionMetrics {
    let closed: Vec<&Trade> = trades.iter().filter(|t| t.is_close()).collect();
    let pnls: Vec<f64> = closed.iter().filter_map(|t| t.pnl).collect();

    SessionMetrics {
        total_trades: closed.len() as u64,
        win_rate: win_rate(&pnls),
        total_pnl: pnls.iter().sum(),
        total_return: total_return(equity_curve, initial_capital),
        max_drawdown: max_drawdown(equity_curve),
        sharpe: sharpe(equity_curve),
        profit_factor: profit_factor(&pnls),
        expectancy: mean(&pnls),
        avg_win: mean_filtered(&pnls, |p| p > 0.0),
        avg_loss: mean_filtered(&pnls, |p| p < 0.0),
    }
}

/// Wins over decided trades: `wins / (wins + losses)`.
///
/// Zero-PnL closes are excluded from both numerator and denominator; open
/// fills never reach this function. The historical bug this guards against
/// counted every trade row in the denominator and silently halved the
/// reported win rate.
pub fn win_rate(close_pnls: &[f64]) -> f64 {
    let wins = close_pnls.iter().filter(|&&p| p > 0.0).count();
    let losses = close_pnls.iter().filter(|&&p| p < 0.0).count();
    let decided = wins + losses;
    if decided == 0 {
        return 0.0;
    }
    wins as f64 / decided as f64
}

/// (final equity - initial capital) / initial capital.
pub fn total_return(equity_curve: &[EquityPoint], initial_capital: f64) -> f64 {
    if initial_capital <= 0.0 {
        return 0.0;
    }
    match equity_curve.last() {
        Some(point) => (point.equity - initial_capital) / initial_capital,
        None => 0.0,
    }
}

/// Largest drawdown over the curve, as a non-negative fraction.
pub fn max_drawdown(equity_curve: &[EquityPoint]) -> f64 {
    equity_curve.iter().map(|p| p.drawdown).fold(0.0, f64::max)
}

/// Per-period Sharpe ratio from equity-curve returns (not annualized, so
/// the number is comparable across timeframes). 0 when the sample has zero
/// variance or fewer than two returns.
pub fn sharpe(equity_curve: &[EquityPoint]) -> f64 {
    let returns = period_returns(equity_curve);
    if returns.len() < 2 {
        return 0.0;
    }
    let m = mean(&returns);
    let s = std_dev(&returns);
    if s < 1e-15 {
        return 0.0;
    }
    m / s
}

/// Gross profits over gross losses. 0 when there are no closed trades, and
/// 0 when there are no losses (an undefined ratio is reported as 0, not
/// infinity).
pub fn profit_factor(close_pnls: &[f64]) -> f64 {
    if close_pnls.is_empty() {
        return 0.0;
    }
    let gross_profit: f64 = close_pnls.iter().filter(|&&p| p > 0.0).sum();
    let gross_loss: f64 = close_pnls.iter().filter(|&&p| p < 0.0).map(|p| p.abs()).sum();
    if gross_loss < 1e-12 {
        return 0.0;
    }
    gross_profit / gross_loss
}

// ─── Helpers ────────────────────────────────────────────────────────

/// Per-period simple returns from the equity curve.
pub fn period_returns(equity_curve: &[EquityPoint]) -> Vec<f64> {
    if equity_curve.len() < 2 {
        return Vec::new();
    }
    equity_curve
        .windows(2)
        .map(|w| {
            if w[0].equity > 0.0 {
                (w[1].equity - w[0].equity) / w[0].equity
            } else {
                0.0
            }
        })
        .collect()
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn mean_filtered(values: &[f64], keep: impl Fn(f64) -> bool) -> f64 {
    let kept: Vec<f64> = values.iter().copied().filter(|&v| keep(v)).collect();
    mean(&kept)
}

fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use hedgelab_core::domain::{PositionSide, TradeAction};

    fn ts(i: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap() + Duration::hours(i)
    }

    fn close_trade(id: u64, pnl: f64) -> Trade {
        Trade {
            id,
            ts: ts(id as i64),
            symbol: "BTCUSDT".into(),
            side: PositionSide::Long,
            action: TradeAction::Close,
            qty: 1.0,
            price: 100.0,
            fee: 0.1,
            pnl: Some(pnl),
            pnl_pct: Some(pnl / 100.0),
            strategy: "ema_cross".into(),
            reason: "test".into(),
            open_trade_id: Some(1),
        }
    }

    fn open_trade(id: u64) -> Trade {
        Trade {
            id,
            ts: ts(id as i64),
            symbol: "BTCUSDT".into(),
            side: PositionSide::Long,
            action: TradeAction::Open,
            qty: 1.0,
            price: 100.0,
            fee: 0.1,
            pnl: None,
            pnl_pct: None,
            strategy: "ema_cross".into(),
            reason: "test".into(),
            open_trade_id: None,
        }
    }

    fn equity_points(values: &[f64]) -> Vec<EquityPoint> {
        let mut peak = 0.0_f64;
        values
            .iter()
            .enumerate()
            .map(|(i, &equity)| {
                let point = EquityPoint::next(ts(i as i64), equity, equity, peak);
                peak = point.peak_equity;
                point
            })
            .collect()
    }

    // ── Win rate ──

    /// The correctness-critical denominator: 17 closed trades (4 wins,
    /// 13 losses) with open-position rows mixed in must give 4/17 — not
    /// 4 over the total row count.
    #[test]
    fn win_rate_ignores_open_rows() {
        let mut trades: Vec<Trade> = Vec::new();
        let mut id = 1;
        for i in 0..17 {
            // Interleave open rows between closes.
            trades.push(open_trade(id));
            id += 1;
            let pnl = if i < 4 { 25.0 } else { -10.0 };
            trades.push(close_trade(id, pnl));
            id += 1;
        }
        // A dangling open position at the end.
        trades.push(open_trade(id));

        let metrics = compute(&trades, &equity_points(&[10_000.0, 10_010.0]), 10_000.0);
        assert_eq!(metrics.total_trades, 17);
        assert!(
            (metrics.win_rate - 4.0 / 17.0).abs() < 1e-12,
            "win_rate {} != 4/17",
            metrics.win_rate
        );
    }

    #[test]
    fn win_rate_excludes_breakevens_from_fraction() {
        // 2 wins, 2 losses, 3 break-evens → 2/4, not 2/7.
        let pnls = [10.0, -5.0, 0.0, 0.0, 8.0, -2.0, 0.0];
        assert!((win_rate(&pnls) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn win_rate_empty_is_zero() {
        assert_eq!(win_rate(&[]), 0.0);
        assert_eq!(win_rate(&[0.0, 0.0]), 0.0);
    }

    // ── Profit factor ──

    #[test]
    fn profit_factor_mixed() {
        // Profit 800, loss 200 → 4.0
        assert!((profit_factor(&[500.0, -200.0, 300.0]) - 4.0).abs() < 1e-12);
    }

    #[test]
    fn profit_factor_no_losses_reports_zero() {
        assert_eq!(profit_factor(&[500.0, 300.0]), 0.0);
    }

    #[test]
    fn profit_factor_no_trades_reports_zero() {
        assert_eq!(profit_factor(&[]), 0.0);
    }

    #[test]
    fn profit_factor_all_losses_is_zero() {
        assert_eq!(profit_factor(&[-500.0, -300.0]), 0.0);
    }

    // ── Sharpe ──

    #[test]
    fn sharpe_zero_variance_is_zero() {
        // Perfectly constant growth: zero variance in returns.
        let eq: Vec<f64> = (0..50).map(|i| 10_000.0 * 1.001_f64.powi(i)).collect();
        assert_eq!(sharpe(&equity_points(&eq)), 0.0);
    }

    #[test]
    fn sharpe_constant_equity_is_zero() {
        assert_eq!(sharpe(&equity_points(&[10_000.0; 50])), 0.0);
    }

    #[test]
    fn sharpe_positive_for_mostly_up() {
        let mut eq = vec![10_000.0];
        for i in 1..100 {
            let r = if i % 3 == 0 { 0.9995 } else { 1.002 };
            eq.push(eq[i - 1] * r);
        }
        assert!(sharpe(&equity_points(&eq)) > 0.0);
    }

    #[test]
    fn sharpe_short_sample_is_zero() {
        assert_eq!(sharpe(&equity_points(&[10_000.0, 10_100.0])), 0.0);
        assert_eq!(sharpe(&equity_points(&[10_000.0])), 0.0);
    }

    // ── Drawdown / return ──

    #[test]
    fn max_drawdown_known_value() {
        // Peak 11_000, trough 9_900 → 10%
        let points = equity_points(&[10_000.0, 11_000.0, 9_900.0, 10_500.0]);
        assert!((max_drawdown(&points) - 0.1).abs() < 1e-12);
    }

    #[test]
    fn max_drawdown_monotone_rise_is_zero() {
        let eq: Vec<f64> = (0..20).map(|i| 10_000.0 + i as f64 * 50.0).collect();
        assert_eq!(max_drawdown(&equity_points(&eq)), 0.0);
    }

    #[test]
    fn total_return_from_curve() {
        let points = equity_points(&[10_000.0, 10_500.0, 11_000.0]);
        assert!((total_return(&points, 10_000.0) - 0.1).abs() < 1e-12);
        assert_eq!(total_return(&[], 10_000.0), 0.0);
    }

    // ── Expectancy / averages ──

    #[test]
    fn expectancy_and_averages() {
        let trades = vec![
            close_trade(1, 30.0),
            close_trade(2, -10.0),
            close_trade(3, 10.0),
            close_trade(4, -20.0),
        ];
        let metrics = compute(&trades, &equity_points(&[10_000.0, 10_010.0]), 10_000.0);
        assert!((metrics.expectancy - 2.5).abs() < 1e-12);
        assert!((metrics.avg_win - 20.0).abs() < 1e-12);
        assert!((metrics.avg_loss - (-15.0)).abs() < 1e-12);
        assert!((metrics.total_pnl - 10.0).abs() < 1e-12);
    }

    // ── Idempotence ──

    #[test]
    fn metrics_recomputation_is_byte_identical() {
        let trades: Vec<Trade> = (0..20)
            .map(|i| close_trade(i + 1, (i as f64 - 9.5) * 13.37))
            .collect();
        let eq: Vec<f64> = (0..50)
            .map(|i| 10_000.0 + ((i * 7919) % 997) as f64 - 500.0)
            .collect();
        let points = equity_points(&eq);

        let a = compute(&trades, &points, 10_000.0);
        let b = compute(&trades, &points, 10_000.0);
        assert_eq!(a, b);
        // Byte-identical serialized form, not just approximate equality.
        assert_eq!(
            serde_json::to_vec(&a).unwrap(),
            serde_json::to_vec(&b).unwrap()
        );
    }

    #[test]
    fn no_trades_no_curve_all_zero() {
        let metrics = compute(&[], &[], 10_000.0);
        assert_eq!(metrics, SessionMetrics::empty());
    }
}
