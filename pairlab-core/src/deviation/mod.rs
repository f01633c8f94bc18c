//! Deviation: residual between the base close and its projected fair value.
//!
//! The second close is projected through the calibration mapping into the
//! base price scale:
//!
//! ```text
//! aligned   = compaction * (second_close - second_low) + base_low
//! aligned   = base_high - (aligned - base_low)      // inverse pairs only
//! deviation = (base_close - aligned) / price_step
//! ```

pub mod history;
pub mod window;

pub use history::{ClosePoint, DeviationHistory, DeviationSample};
pub use window::DeviationWindow;

use crate::calibration::CalibrationState;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sign of the relationship between the two instruments.
///
/// Serialized as `1` / `-1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum Correlation {
    Direct,
    Inverse,
}

impl Correlation {
    pub fn sign(self) -> f64 {
        match self {
            Correlation::Direct => 1.0,
            Correlation::Inverse => -1.0,
        }
    }
}

impl TryFrom<i32> for Correlation {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Correlation::Direct),
            -1 => Ok(Correlation::Inverse),
            other => Err(format!("correlation must be 1 or -1, got {other}")),
        }
    }
}

impl From<Correlation> for i32 {
    fn from(c: Correlation) -> Self {
        match c {
            Correlation::Direct => 1,
            Correlation::Inverse => -1,
        }
    }
}

impl fmt::Display for Correlation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Correlation::Direct => write!(f, "direct"),
            Correlation::Inverse => write!(f, "inverse"),
        }
    }
}

/// Projects closes through a fixed calibration into base price steps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviationCalculator {
    pub calibration: CalibrationState,
    pub correlation: Correlation,
    /// Base instrument's price increment.
    pub price_step: f64,
}

impl DeviationCalculator {
    pub fn new(calibration: CalibrationState, correlation: Correlation, price_step: f64) -> Self {
        Self { calibration, correlation, price_step }
    }

    /// Second close projected into the base price scale.
    pub fn aligned_price(&self, second_close: f64) -> f64 {
        let c = &self.calibration;
        let aligned = c.compaction * (second_close - c.second_low) + c.base_low;
        match self.correlation {
            Correlation::Direct => aligned,
            Correlation::Inverse => c.base_high - (aligned - c.base_low),
        }
    }

    /// Deviation in base price steps, or `None` while the mapping is unformed.
    pub fn deviation(&self, base_close: f64, second_close: f64) -> Option<f64> {
        if !self.calibration.is_formed() || !(self.price_step > 0.0) {
            return None;
        }
        let deviation = (base_close - self.aligned_price(second_close)) / self.price_step;
        deviation.is_finite().then_some(deviation)
    }
}
