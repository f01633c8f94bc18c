//! Single backtest: replays candle files through one engine with paper fills.

use chrono::{DateTime, Utc};
use pairlab_core::engine::{AccountView, Direction, EngineError, EngineStats, ExitReason, PairEngine};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{BacktestConfig, ConfigError, RunId};
use crate::data_loader::{load_pair, LoadError, PairData};
use crate::metrics::{PerformanceMetrics, RoundTrip};
use crate::paper::{OrderRecord, PaperGateway};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("data error: {0}")]
    Data(#[from] LoadError),
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("no candles to replay")]
    NoData,
}

/// Current schema version for persisted artifacts.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub time: DateTime<Utc>,
    pub equity: f64,
}

/// Complete result of a single backtest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    /// Schema version for forward-compatible deserialization.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub run_id: RunId,
    pub config: BacktestConfig,
    pub metrics: PerformanceMetrics,
    pub stats: EngineStats,
    pub equity_curve: Vec<EquityPoint>,
    pub orders: Vec<OrderRecord>,
    pub round_trips: Vec<RoundTrip>,
    /// Combined candles processed.
    pub bar_count: usize,
    pub dropped_sync_keys: usize,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

impl BacktestResult {
    pub fn equity_values(&self) -> Vec<f64> {
        self.equity_curve.iter().map(|p| p.equity).collect()
    }
}

/// Load the configured data and run.
pub fn run_backtest(config: &BacktestConfig) -> Result<BacktestResult, RunError> {
    config.validate()?;
    let data = load_pair(&config.data, config.instruments.cross.is_some())?;
    run_backtest_from_data(config, &data)
}

struct OpenTrip {
    entry_time: DateTime<Utc>,
    direction: Direction,
    entry_equity: f64,
}

/// Run against pre-loaded candles (used by sweeps and tests).
pub fn run_backtest_from_data(
    config: &BacktestConfig,
    data: &PairData,
) -> Result<BacktestResult, RunError> {
    if data.is_empty() || data.second.is_empty() {
        return Err(RunError::NoData);
    }
    let engine_config = config.engine_config()?;
    let run_id = config.run_id()?;
    let mut gateway = PaperGateway::new(&engine_config, &config.account);
    let mut engine = PairEngine::new(engine_config)?;

    let mut equity_curve: Vec<EquityPoint> = Vec::with_capacity(data.len());
    let mut round_trips = Vec::new();
    let mut open: Option<OpenTrip> = None;

    for (role, sample) in data.merged() {
        let equity_before = gateway.current_value();
        gateway.mark(role, sample.close);
        let Some(outcome) = engine.on_candle(role, sample, &mut gateway) else {
            settle(&mut engine, &mut gateway)?;
            continue;
        };
        settle(&mut engine, &mut gateway)?;
        let equity = gateway.current_value();

        if let Some(reason) = outcome.exit {
            if let Some(trip) = open.take() {
                round_trips.push(close_trip(trip, outcome.time, reason, equity));
            }
        }
        if outcome.entered {
            if let Some(intent) = outcome.intent {
                open = Some(OpenTrip {
                    entry_time: outcome.time,
                    direction: intent.direction,
                    entry_equity: equity_before,
                });
            }
        }
        equity_curve.push(EquityPoint { time: outcome.time, equity });
    }

    let stop_orders = engine.stop(&mut gateway);
    settle(&mut engine, &mut gateway)?;
    let final_equity = gateway.current_value();
    if let Some(last) = equity_curve.last_mut() {
        last.equity = final_equity;
        if let Some(trip) = open.take() {
            round_trips.push(close_trip(trip, last.time, ExitReason::Stop, final_equity));
        }
    }
    debug!(orders = stop_orders.len(), "end of data, engine stopped");

    let orders = gateway.into_records();
    let equity_values: Vec<f64> = equity_curve.iter().map(|p| p.equity).collect();
    let metrics = PerformanceMetrics::compute(
        &equity_values,
        &round_trips,
        orders.len(),
        config.account.periods_per_year,
    );
    info!(
        run_id = %run_id,
        bars = equity_curve.len(),
        round_trips = metrics.round_trips,
        total_return = metrics.total_return,
        "backtest complete"
    );

    Ok(BacktestResult {
        schema_version: SCHEMA_VERSION,
        run_id,
        config: config.clone(),
        metrics,
        stats: engine.stats().clone(),
        bar_count: equity_curve.len(),
        dropped_sync_keys: engine.dropped_sync_keys(),
        equity_curve,
        orders,
        round_trips,
    })
}

fn settle(engine: &mut PairEngine, gateway: &mut PaperGateway) -> Result<(), RunError> {
    for fill in gateway.take_fills() {
        engine.apply_fill(&fill)?;
    }
    Ok(())
}

fn close_trip(trip: OpenTrip, exit_time: DateTime<Utc>, reason: ExitReason, equity: f64) -> RoundTrip {
    RoundTrip {
        entry_time: trip.entry_time,
        exit_time,
        direction: trip.direction,
        exit_reason: reason,
        pnl: equity - trip.entry_equity,
    }
}
