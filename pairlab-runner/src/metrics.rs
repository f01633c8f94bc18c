//! Performance metrics: pure functions over the equity curve and round trips.
//!
//! No dependencies on the runner, data pipeline, or engine state.

use chrono::{DateTime, Utc};
use pairlab_core::engine::{Direction, ExitReason};
use serde::{Deserialize, Serialize};

/// One Flat → Positioned → Flat cycle of the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundTrip {
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub direction: Direction,
    pub exit_reason: ExitReason,
    /// Equity change over the trip, commissions included.
    pub pnl: f64,
}

/// Aggregate performance metrics for a single backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_return: f64,
    pub max_drawdown: f64,
    pub sharpe: f64,
    pub round_trips: usize,
    pub win_rate: f64,
    pub order_count: usize,
}

impl PerformanceMetrics {
    pub fn compute(
        equity_curve: &[f64],
        trips: &[RoundTrip],
        order_count: usize,
        periods_per_year: f64,
    ) -> Self {
        Self {
            total_return: total_return(equity_curve),
            max_drawdown: max_drawdown(equity_curve),
            sharpe: sharpe_ratio(equity_curve, periods_per_year),
            round_trips: trips.len(),
            win_rate: win_rate(trips),
            order_count,
        }
    }
}

// ─── Individual metric functions ────────────────────────────────────

/// Total return as a fraction: (final - initial) / initial.
pub fn total_return(equity_curve: &[f64]) -> f64 {
    match (equity_curve.first(), equity_curve.last()) {
        (Some(&initial), Some(&last)) if equity_curve.len() >= 2 && initial > 0.0 => {
            (last - initial) / initial
        }
        _ => 0.0,
    }
}

/// Maximum peak-to-trough decline as a negative fraction (0.0 if none).
pub fn max_drawdown(equity_curve: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut worst = 0.0_f64;
    for &equity in equity_curve {
        peak = peak.max(equity);
        if peak > 0.0 {
            worst = worst.min((equity - peak) / peak);
        }
    }
    worst
}

/// Annualized Sharpe ratio of per-bar returns (zero risk-free rate).
///
/// Returns 0.0 with fewer than two returns or zero variance.
pub fn sharpe_ratio(equity_curve: &[f64], periods_per_year: f64) -> f64 {
    let returns = period_returns(equity_curve);
    if returns.len() < 2 {
        return 0.0;
    }
    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    let var = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (returns.len() - 1) as f64;
    let std = var.sqrt();
    if std < 1e-15 {
        return 0.0;
    }
    mean / std * periods_per_year.sqrt()
}

/// Fraction of round trips with positive P&L.
pub fn win_rate(trips: &[RoundTrip]) -> f64 {
    if trips.is_empty() {
        return 0.0;
    }
    let wins = trips.iter().filter(|t| t.pnl > 0.0).count();
    wins as f64 / trips.len() as f64
}

fn period_returns(equity_curve: &[f64]) -> Vec<f64> {
    equity_curve
        .windows(2)
        .filter(|w| w[0] > 0.0)
        .map(|w| w[1] / w[0] - 1.0)
        .collect()
}
