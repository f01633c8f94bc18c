//! Backtest configuration loaded from TOML.
//!
//! ```toml
//! [engine]
//! training_range = 640
//! signal_correction = 0.9
//!
//! [instruments.base]
//! symbol = "EURUSD"
//! price_step = 0.00001
//! volume_step = 0.01
//! min_volume = 0.01
//! max_volume = 100.0
//! step_price = 1.0
//!
//! [instruments.second]
//! # ...
//!
//! [data]
//! source = "synthetic"
//! bars = 5000
//! seed = 42
//!
//! [account]
//! initial_capital = 100000.0
//! ```

use pairlab_core::domain::{InstrumentRole, InstrumentSpec};
use pairlab_core::engine::{self, EngineConfig, StrategyParams};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::synthetic::SyntheticConfig;

/// Content-addressable identifier of a backtest configuration.
pub type RunId = String;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid engine configuration: {0}")]
    Engine(#[from] engine::ConfigError),

    #[error("invalid account settings: {0}")]
    Account(String),

    #[error("invalid data settings: {0}")]
    Data(String),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Instruments {
    pub base: InstrumentSpec,
    pub second: InstrumentSpec,
    /// Presence selects cross execution mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cross: Option<InstrumentSpec>,
}

/// Where candles come from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum DataConfig {
    /// One CSV file per instrument.
    Csv {
        base: PathBuf,
        second: PathBuf,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cross: Option<PathBuf>,
    },
    /// Seeded synthetic pair.
    Synthetic(SyntheticConfig),
}

impl Default for DataConfig {
    fn default() -> Self {
        DataConfig::Synthetic(SyntheticConfig::default())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AccountConfig {
    pub initial_capital: f64,
    /// Commission charged per unit of traded volume.
    pub commission_per_unit: f64,
    /// Bars per year, used to annualize the Sharpe ratio.
    pub periods_per_year: f64,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            initial_capital: 100_000.0,
            commission_per_unit: 0.0,
            periods_per_year: 252.0,
        }
    }
}

/// Everything needed to reproduce one backtest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BacktestConfig {
    #[serde(default)]
    pub engine: StrategyParams,
    pub instruments: Instruments,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub account: AccountConfig,
}

impl BacktestConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&text)?;
        config.resolve_paths(path.parent().unwrap_or_else(|| Path::new(".")));
        Ok(config)
    }

    /// Parse and validate.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.engine_config()?;
        let a = &self.account;
        if !(a.initial_capital.is_finite() && a.initial_capital > 0.0) {
            return Err(ConfigError::Account("initial_capital must be > 0".into()));
        }
        if !(a.commission_per_unit.is_finite() && a.commission_per_unit >= 0.0) {
            return Err(ConfigError::Account("commission_per_unit must be >= 0".into()));
        }
        if !(a.periods_per_year.is_finite() && a.periods_per_year > 0.0) {
            return Err(ConfigError::Account("periods_per_year must be > 0".into()));
        }
        match &self.data {
            DataConfig::Csv { cross, .. } => match (&self.instruments.cross, cross) {
                (Some(_), None) => {
                    return Err(ConfigError::Data(
                        "cross instrument configured but no cross CSV given".into(),
                    ));
                }
                (None, Some(_)) => {
                    let missing = engine::ConfigError::MissingInstrument(InstrumentRole::Cross);
                    return Err(missing.into());
                }
                _ => {}
            },
            DataConfig::Synthetic(s) => s.validate().map_err(ConfigError::Data)?,
        }
        Ok(())
    }

    /// Validated engine configuration.
    pub fn engine_config(&self) -> Result<EngineConfig, ConfigError> {
        Ok(EngineConfig::new(
            self.engine.clone(),
            self.instruments.base.clone(),
            self.instruments.second.clone(),
            self.instruments.cross.clone(),
        )?)
    }

    /// Deterministic hash of the serialized configuration.
    ///
    /// Two runs with identical configs get the same id.
    pub fn run_id(&self) -> Result<RunId, ConfigError> {
        let json = serde_json::to_string(self)?;
        let hash = blake3::hash(json.as_bytes());
        Ok(hash.to_hex().to_string())
    }

    /// Relative CSV paths are taken relative to the config file.
    fn resolve_paths(&mut self, dir: &Path) {
        if let DataConfig::Csv { base, second, cross } = &mut self.data {
            for path in [Some(base), Some(second), cross.as_mut()].into_iter().flatten() {
                if path.is_relative() {
                    *path = dir.join(&*path);
                }
            }
        }
    }
}
