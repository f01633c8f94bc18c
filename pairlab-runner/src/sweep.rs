//! Parameter sweep over a grid of engine settings.
//!
//! Every grid point gets its own engine and paper gateway; the candles are
//! loaded once and shared read-only across the rayon workers.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

use crate::config::BacktestConfig;
use crate::data_loader::{load_pair, PairData};
use crate::runner::{run_backtest_from_data, BacktestResult, RunError};

/// Values to sweep. An empty list keeps the base config's value.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ParamGrid {
    pub signal_corrections: Vec<f64>,
    pub close_corrections: Vec<f64>,
    pub training_ranges: Vec<usize>,
}

impl ParamGrid {
    /// A small grid around the default parameters.
    pub fn around_defaults() -> Self {
        Self {
            signal_corrections: vec![0.8, 0.9, 1.0],
            close_corrections: vec![0.382, 0.5, 0.618034],
            training_ranges: vec![320, 640, 960],
        }
    }

    /// Total number of configurations.
    pub fn size(&self) -> usize {
        self.signal_corrections.len().max(1)
            * self.close_corrections.len().max(1)
            * self.training_ranges.len().max(1)
    }

    /// Expand into one config per grid point.
    pub fn generate_configs(&self, base: &BacktestConfig) -> Vec<BacktestConfig> {
        let or_base = |values: &[f64], fallback: f64| -> Vec<f64> {
            if values.is_empty() { vec![fallback] } else { values.to_vec() }
        };
        let signals = or_base(&self.signal_corrections, base.engine.signal_correction);
        let closes = or_base(&self.close_corrections, base.engine.close_correction);
        let ranges = if self.training_ranges.is_empty() {
            vec![base.engine.training_range]
        } else {
            self.training_ranges.clone()
        };

        let mut configs = Vec::with_capacity(self.size());
        for &signal_correction in &signals {
            for &close_correction in &closes {
                for &training_range in &ranges {
                    let mut config = base.clone();
                    config.engine.signal_correction = signal_correction;
                    config.engine.close_correction = close_correction;
                    config.engine.training_range = training_range;
                    configs.push(config);
                }
            }
        }
        configs
    }
}

/// Load data once, then run every grid point in parallel.
pub fn run_sweep(base: &BacktestConfig, grid: &ParamGrid) -> Result<SweepResults, RunError> {
    base.validate()?;
    let data = load_pair(&base.data, base.instruments.cross.is_some())?;
    run_sweep_on_data(base, grid, &data)
}

pub fn run_sweep_on_data(
    base: &BacktestConfig,
    grid: &ParamGrid,
    data: &PairData,
) -> Result<SweepResults, RunError> {
    let configs = grid.generate_configs(base);
    info!(configs = configs.len(), "starting parameter sweep");
    let results = configs
        .par_iter()
        .map(|config| run_backtest_from_data(config, data))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(SweepResults::new(results))
}

/// Results from a parameter sweep.
#[derive(Debug)]
pub struct SweepResults {
    results: Vec<BacktestResult>,
    by_run_id: HashMap<String, usize>,
}

impl SweepResults {
    fn new(results: Vec<BacktestResult>) -> Self {
        let by_run_id = results
            .iter()
            .enumerate()
            .map(|(i, r)| (r.run_id.clone(), i))
            .collect();
        Self { results, by_run_id }
    }

    pub fn all(&self) -> &[BacktestResult] {
        &self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn get(&self, run_id: &str) -> Option<&BacktestResult> {
        self.by_run_id.get(run_id).map(|&i| &self.results[i])
    }

    /// Results sorted by total return (descending).
    pub fn ranked(&self) -> Vec<&BacktestResult> {
        let mut sorted: Vec<_> = self.results.iter().collect();
        sorted.sort_by(|a, b| b.metrics.total_return.total_cmp(&a.metrics.total_return));
        sorted
    }

    pub fn top_n(&self, n: usize) -> Vec<&BacktestResult> {
        self.ranked().into_iter().take(n).collect()
    }

    pub fn best(&self) -> Option<&BacktestResult> {
        self.ranked().into_iter().next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> BacktestConfig {
        BacktestConfig::from_toml_str(
            r#"
[instruments.base]
symbol = "A"
price_step = 0.0001
volume_step = 0.01
min_volume = 0.01
max_volume = 10.0
step_price = 1.0

[instruments.second]
symbol = "B"
price_step = 0.0001
volume_step = 0.01
min_volume = 0.01
max_volume = 10.0
step_price = 1.0
"#,
        )
        .unwrap()
    }

    #[test]
    fn grid_size_is_product() {
        assert_eq!(ParamGrid::around_defaults().size(), 27);
        assert_eq!(ParamGrid::default().size(), 1);
    }

    #[test]
    fn generates_every_combination() {
        let grid = ParamGrid {
            signal_corrections: vec![0.8, 0.9],
            close_corrections: vec![0.5],
            training_ranges: vec![100, 200, 300],
        };
        let configs = grid.generate_configs(&base());
        assert_eq!(configs.len(), 6);
        assert_eq!(configs[0].engine.signal_correction, 0.8);
        assert_eq!(configs[5].engine.training_range, 300);
        assert!(configs.iter().all(|c| c.engine.close_correction == 0.5));
    }

    #[test]
    fn empty_grid_keeps_base_values() {
        let configs = ParamGrid::default().generate_configs(&base());
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0], base());
    }

    #[test]
    fn distinct_configs_get_distinct_run_ids() {
        let configs = ParamGrid::around_defaults().generate_configs(&base());
        let mut ids: Vec<String> = configs.iter().map(|c| c.run_id().unwrap()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 27);
    }
}
