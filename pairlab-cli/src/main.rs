//! PairLab CLI: run, validate, sweep and synthesize commands.
//!
//! Commands:
//! - `run`: execute a backtest from a TOML config and save its artifacts
//! - `validate`: check a config and print its run id
//! - `sweep`: run a parameter grid in parallel and print the best runs
//! - `synth`: write a seeded synthetic pair as candle CSV files

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use pairlab_core::engine::ExecutionMode;
use pairlab_runner::{
    generate_pair, run_backtest, run_sweep, save_artifacts, write_candles, BacktestConfig,
    BacktestResult, ParamGrid, SyntheticConfig,
};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pairlab", about = "PairLab CLI: pair-trading backtests")]
struct Cli {
    /// Debug-level logging (overridden by RUST_LOG).
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a backtest from a TOML config file.
    Run {
        /// Path to a TOML config file.
        #[arg(long)]
        config: PathBuf,

        /// Output directory for run artifacts.
        #[arg(long, default_value = "runs")]
        output_dir: PathBuf,
    },
    /// Validate a config without running it.
    Validate {
        #[arg(long)]
        config: PathBuf,
    },
    /// Run a parameter sweep.
    Sweep {
        /// Base TOML config.
        #[arg(long)]
        config: PathBuf,

        /// TOML file with `signal_corrections`, `close_corrections` and
        /// `training_ranges` lists. Defaults to a 3x3x3 grid.
        #[arg(long)]
        grid: Option<PathBuf>,

        /// Number of ranked results to print.
        #[arg(long, default_value_t = 5)]
        top: usize,
    },
    /// Write a synthetic cointegrated pair to CSV.
    Synth {
        #[arg(long, default_value_t = 5_000)]
        bars: usize,

        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Directory for base.csv, second.csv (and cross.csv).
        #[arg(long, default_value = "data")]
        out_dir: PathBuf,

        /// Also write the cross-rate series.
        #[arg(long, default_value_t = false)]
        cross: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Run { config, output_dir } => run_cmd(&config, &output_dir),
        Commands::Validate { config } => validate_cmd(&config),
        Commands::Sweep { config, grid, top } => sweep_cmd(&config, grid.as_deref(), top),
        Commands::Synth {
            bars,
            seed,
            out_dir,
            cross,
        } => synth_cmd(bars, seed, &out_dir, cross),
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn run_cmd(config_path: &Path, output_dir: &Path) -> Result<()> {
    let config = BacktestConfig::from_file(config_path)?;
    let result = run_backtest(&config)?;
    print_summary(&result);

    let run_dir = save_artifacts(&result, output_dir)?;
    println!("Artifacts saved to: {}", run_dir.display());
    Ok(())
}

fn validate_cmd(config_path: &Path) -> Result<()> {
    let config = BacktestConfig::from_file(config_path)?;
    let engine = config.engine_config()?;
    let mode = match &engine.mode {
        ExecutionMode::TwoLeg => "two-leg".to_string(),
        ExecutionMode::Cross(spec) => format!("cross ({})", spec.symbol),
    };
    println!("Config OK");
    println!("Run id: {}", config.run_id()?);
    println!(
        "Pair:   {} / {}",
        config.instruments.base.symbol, config.instruments.second.symbol
    );
    println!("Mode:   {mode}");
    Ok(())
}

fn sweep_cmd(config_path: &Path, grid_path: Option<&Path>, top: usize) -> Result<()> {
    if top == 0 {
        bail!("--top must be at least 1");
    }
    let config = BacktestConfig::from_file(config_path)?;
    let grid = match grid_path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read grid file {}", path.display()))?;
            toml::from_str::<ParamGrid>(&text)
                .with_context(|| format!("failed to parse grid file {}", path.display()))?
        }
        None => ParamGrid::around_defaults(),
    };

    let results = run_sweep(&config, &grid)?;
    info!(runs = results.len(), "sweep finished");

    println!();
    println!("=== Top {} of {} ===", top.min(results.len()), results.len());
    println!(
        "{:>4}  {:>6}  {:>6}  {:>6}  {:>9}  {:>8}  {:>7}  run id",
        "rank", "signal", "close", "range", "return", "max dd", "sharpe"
    );
    for (rank, r) in results.top_n(top).into_iter().enumerate() {
        println!(
            "{:>4}  {:>6.3}  {:>6.3}  {:>6}  {:>8.2}%  {:>7.2}%  {:>7.3}  {}",
            rank + 1,
            r.config.engine.signal_correction,
            r.config.engine.close_correction,
            r.config.engine.training_range,
            r.metrics.total_return * 100.0,
            r.metrics.max_drawdown * 100.0,
            r.metrics.sharpe,
            &r.run_id[..12],
        );
    }
    Ok(())
}

fn synth_cmd(bars: usize, seed: u64, out_dir: &Path, cross: bool) -> Result<()> {
    let config = SyntheticConfig {
        bars,
        seed,
        ..SyntheticConfig::default()
    };
    config.validate().map_err(anyhow::Error::msg)?;
    let pair = generate_pair(&config, cross);

    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;
    write_candles(out_dir.join("base.csv"), &pair.base)?;
    write_candles(out_dir.join("second.csv"), &pair.second)?;
    if let Some(cross_candles) = &pair.cross {
        write_candles(out_dir.join("cross.csv"), cross_candles)?;
    }
    println!("Wrote {bars} bars per instrument to {}", out_dir.display());
    Ok(())
}

fn print_summary(result: &BacktestResult) {
    let m = &result.metrics;
    let s = &result.stats;
    println!();
    println!("=== Backtest Result ===");
    println!(
        "Pair:           {} / {}",
        result.config.instruments.base.symbol, result.config.instruments.second.symbol
    );
    println!("Run id:         {}", result.run_id);
    println!("Bars:           {}", result.bar_count);
    println!("Recalibrations: {}", s.recalibrations);
    println!("Entries:        {} ({} scale-ins)", s.entries, s.scale_ins);
    println!(
        "Exits:          {} reversal, {} decay, {} profit, {} stop",
        s.exits_reversal, s.exits_decay, s.exits_profit_target, s.exits_stop
    );
    println!("Orders:         {}", m.order_count);
    if s.rejected_orders > 0 {
        println!("Rejected:       {}", s.rejected_orders);
    }
    println!();
    println!("--- Performance ---");
    println!("Total Return:   {:.2}%", m.total_return * 100.0);
    println!("Sharpe:         {:.3}", m.sharpe);
    println!("Max Drawdown:   {:.2}%", m.max_drawdown * 100.0);
    println!("Round Trips:    {}", m.round_trips);
    println!("Win Rate:       {:.1}%", m.win_rate * 100.0);
    if result.dropped_sync_keys > 0 {
        println!();
        println!("WARNING: {} unmatched bar times dropped", result.dropped_sync_keys);
    }
}
