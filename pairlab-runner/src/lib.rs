//! PairLab Runner: backtest orchestration around `pairlab-core`.
//!
//! This crate provides:
//! - TOML backtest configuration with deterministic run ids
//! - CSV candle loading and a seeded synthetic pair generator
//! - Paper execution gateway with mark-to-market equity
//! - Single-backtest runner, performance metrics and artifact export
//! - Parallel parameter sweeps

pub mod config;
pub mod data_loader;
pub mod export;
pub mod metrics;
pub mod paper;
pub mod runner;
pub mod sweep;
pub mod synthetic;

pub use config::{AccountConfig, BacktestConfig, ConfigError, DataConfig, Instruments, RunId};
pub use data_loader::{load_candles, load_pair, write_candles, LoadError, PairData};
pub use export::{load_artifacts, save_artifacts};
pub use metrics::{PerformanceMetrics, RoundTrip};
pub use paper::{OrderRecord, PaperGateway};
pub use runner::{run_backtest, run_backtest_from_data, BacktestResult, EquityPoint, RunError, SCHEMA_VERSION};
pub use sweep::{run_sweep, run_sweep_on_data, ParamGrid, SweepResults};
pub use synthetic::{generate_pair, SyntheticConfig};
