//! Parameter sweeps — rayon grid search over one in-memory candle slice.
//!
//! Sweeps bypass persistence entirely: each worker replays against a shared
//! immutable candle slice and returns its metrics. Invalid parameter
//! combinations are skipped, mirroring how grid generators drop degenerate
//! entries rather than failing the whole sweep.

use rayon::prelude::*;

use hedgelab_core::domain::{Candle, SessionConfig, SessionStatus, StrategySpec};
use hedgelab_core::engine::{run_replay, ReplayOptions};
use hedgelab_core::strategy::create_strategy;

use crate::metrics;

/// Which metric ranks the sweep output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankBy {
    Sharpe,
    TotalReturn,
    ProfitFactor,
}

#[derive(Debug, Clone)]
pub struct SweepResult {
    pub spec: StrategySpec,
    pub status: SessionStatus,
    pub metrics: hedgelab_core::domain::SessionMetrics,
}

impl SweepResult {
    fn score(&self, rank_by: RankBy) -> f64 {
        match rank_by {
            RankBy::Sharpe => self.metrics.sharpe,
            RankBy::TotalReturn => self.metrics.total_return,
            RankBy::ProfitFactor => self.metrics.profit_factor,
        }
    }
}

/// Grid of EMA crossover periods, skipping `fast >= slow` combinations.
pub fn ema_cross_grid(fast_periods: &[usize], slow_periods: &[usize]) -> Vec<StrategySpec> {
    let mut specs = Vec::new();
    for &fast in fast_periods {
        for &slow in slow_periods {
            if fast >= slow {
                continue;
            }
            specs.push(
                StrategySpec::new("ema_cross")
                    .with_param("fast_period", fast as f64)
                    .with_param("slow_period", slow as f64),
            );
        }
    }
    specs
}

/// Grid over the hedging machine's band width and migration fraction.
pub fn band_hedge_grid(mes_values: &[f64], alpha_values: &[f64]) -> Vec<StrategySpec> {
    let mut specs = Vec::new();
    for &mes in mes_values {
        for &alpha in alpha_values {
            if mes <= 0.0 || !(alpha > 0.0 && alpha < 1.0) {
                continue;
            }
            specs.push(
                StrategySpec::new("band_limited_hedging")
                    .with_param("mes", mes)
                    .with_param("alpha", alpha),
            );
        }
    }
    specs
}

/// Replay every spec against the same candles in parallel, ranked best
/// first by `rank_by`. Specs the factory rejects are dropped.
pub fn run_sweep(
    base: &SessionConfig,
    specs: Vec<StrategySpec>,
    candles: &[Candle],
    rank_by: RankBy,
) -> Vec<SweepResult> {
    let mut results: Vec<SweepResult> = specs
        .into_par_iter()
        .filter_map(|spec| {
            let mut config = base.clone();
            config.strategy = spec.clone();
            let strategy = create_strategy(&config).ok()?;
            let result = run_replay(&config, candles, strategy, ReplayOptions::default());
            let metrics =
                metrics::compute(&result.trades, &result.equity_curve, config.initial_capital);
            Some(SweepResult {
                spec,
                status: result.status,
                metrics,
            })
        })
        .collect();

    results.sort_by(|a, b| {
        b.score(rank_by)
            .partial_cmp(&a.score(rank_by))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    results
}
