//! Engine configuration and start-up validation.

use crate::deviation::{Correlation, DeviationWindow};
use crate::domain::{InstrumentError, InstrumentRole, InstrumentSpec};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Strategy parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StrategyParams {
    /// Bars used to estimate the high/low ranges.
    pub training_range: usize,
    /// Bars between recalibrations (0 = calibrate once).
    pub retrain_interval: usize,
    /// Threshold multiplier on the running max deviation.
    pub signal_correction: f64,
    /// Deviation window sizing factor (>= 1).
    pub distance_multiplier: f64,
    /// Upper bound for the position multiplier.
    pub max_deals: u32,
    /// Fraction of the threshold below which positions are closed.
    pub close_correction: f64,
    /// Account profit, in percent of the baseline, that liquidates everything.
    pub profit_percent: f64,
    pub correlation: Correlation,
    /// Cross mode only: trade the cross in the deviation's direction when true.
    pub use_direct_cross_rate: bool,
    /// Volume per multiplier unit on the base (or cross) leg.
    pub base_lot: f64,
    /// Pending open times the synchronizer keeps before dropping the oldest.
    pub sync_ttl_bars: usize,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            training_range: 640,
            retrain_interval: 32,
            signal_correction: 0.9,
            distance_multiplier: 1.2,
            max_deals: 3,
            close_correction: 0.618034,
            profit_percent: 5.0,
            correlation: Correlation::Direct,
            use_direct_cross_rate: true,
            base_lot: 0.1,
            sync_ttl_bars: 16,
        }
    }
}

impl StrategyParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.training_range == 0 {
            return Err(invalid("training_range", "must be > 0"));
        }
        if !(self.signal_correction.is_finite() && self.signal_correction > 0.0) {
            return Err(invalid("signal_correction", "must be a positive number"));
        }
        if !(self.distance_multiplier.is_finite() && self.distance_multiplier >= 1.0) {
            return Err(invalid("distance_multiplier", "must be >= 1"));
        }
        if self.max_deals == 0 {
            return Err(invalid("max_deals", "must be > 0"));
        }
        if !(self.close_correction.is_finite() && self.close_correction >= 0.0) {
            return Err(invalid("close_correction", "must be >= 0"));
        }
        if !(self.profit_percent.is_finite() && self.profit_percent > 0.0) {
            return Err(invalid("profit_percent", "must be > 0"));
        }
        if !(self.base_lot.is_finite() && self.base_lot > 0.0) {
            return Err(invalid("base_lot", "must be > 0"));
        }
        if self.sync_ttl_bars == 0 {
            return Err(invalid("sync_ttl_bars", "must be > 0"));
        }
        Ok(())
    }

    /// Capacity of the deviation history and window.
    pub fn window_capacity(&self) -> usize {
        DeviationWindow::capacity_for(self.training_range, self.distance_multiplier)
    }
}

fn invalid(name: &'static str, reason: &str) -> ConfigError {
    ConfigError::InvalidParameter {
        name,
        reason: reason.to_string(),
    }
}

/// How intents are executed. Selected once at configuration time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExecutionMode {
    /// Trade the base and second instruments as two hedged legs.
    TwoLeg,
    /// Trade a single cross instrument.
    Cross(InstrumentSpec),
}

impl ExecutionMode {
    pub fn is_cross(&self) -> bool {
        matches!(self, ExecutionMode::Cross(_))
    }
}

/// Complete, validated engine configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub params: StrategyParams,
    pub base: InstrumentSpec,
    pub second: InstrumentSpec,
    pub mode: ExecutionMode,
}

impl EngineConfig {
    /// Validate parameters and instruments. A `cross` instrument selects
    /// [`ExecutionMode::Cross`].
    pub fn new(
        params: StrategyParams,
        base: InstrumentSpec,
        second: InstrumentSpec,
        cross: Option<InstrumentSpec>,
    ) -> Result<Self, ConfigError> {
        let mode = match cross {
            Some(spec) => ExecutionMode::Cross(spec),
            None => ExecutionMode::TwoLeg,
        };
        let config = Self { params, base, second, mode };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.params.validate()?;
        self.base
            .validate()
            .map_err(|source| ConfigError::Instrument { role: InstrumentRole::Base, source })?;
        self.second
            .validate()
            .map_err(|source| ConfigError::Instrument { role: InstrumentRole::Second, source })?;
        if let ExecutionMode::Cross(cross) = &self.mode {
            cross
                .validate()
                .map_err(|source| ConfigError::Instrument { role: InstrumentRole::Cross, source })?;
        }
        if self.base.symbol == self.second.symbol {
            return Err(ConfigError::DuplicateSymbol(self.base.symbol.clone()));
        }
        Ok(())
    }

    pub fn cross(&self) -> Option<&InstrumentSpec> {
        match &self.mode {
            ExecutionMode::Cross(spec) => Some(spec),
            ExecutionMode::TwoLeg => None,
        }
    }

    pub fn spec(&self, role: InstrumentRole) -> Option<&InstrumentSpec> {
        match role {
            InstrumentRole::Base => Some(&self.base),
            InstrumentRole::Second => Some(&self.second),
            InstrumentRole::Cross => self.cross(),
        }
    }
}

/// Fatal configuration errors: the engine refuses to start.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("missing {0} instrument")]
    MissingInstrument(InstrumentRole),

    #[error("invalid {role} instrument: {source}")]
    Instrument {
        role: InstrumentRole,
        #[source]
        source: InstrumentError,
    },

    #[error("base and second instruments are both '{0}'")]
    DuplicateSymbol(String),
}
