use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tolerance used when checking step alignment of float quantities.
const STEP_EPSILON: f64 = 1e-9;

/// Instrument reference data: price step, volume constraints and tick value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstrumentSpec {
    pub symbol: String,
    /// Minimum price increment.
    pub price_step: f64,
    /// Minimum volume increment.
    pub volume_step: f64,
    pub min_volume: f64,
    pub max_volume: f64,
    /// Money value of one price step for one unit of volume (tick value).
    pub step_price: f64,
}

impl InstrumentSpec {
    pub fn new(
        symbol: impl Into<String>,
        price_step: f64,
        volume_step: f64,
        min_volume: f64,
        max_volume: f64,
        step_price: f64,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            price_step,
            volume_step,
            min_volume,
            max_volume,
            step_price,
        }
    }

    /// Check that the reference data is usable for sizing and deviation math.
    pub fn validate(&self) -> Result<(), InstrumentError> {
        if self.symbol.trim().is_empty() {
            return Err(InstrumentError::EmptySymbol);
        }
        for (field, value) in [
            ("price_step", self.price_step),
            ("volume_step", self.volume_step),
            ("min_volume", self.min_volume),
            ("max_volume", self.max_volume),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(InstrumentError::NonPositive {
                    symbol: self.symbol.clone(),
                    field,
                    value,
                });
            }
        }
        if !(self.step_price.is_finite() && self.step_price >= 0.0) {
            return Err(InstrumentError::NonPositive {
                symbol: self.symbol.clone(),
                field: "step_price",
                value: self.step_price,
            });
        }
        if self.min_volume > self.max_volume {
            return Err(InstrumentError::InvertedVolumeRange {
                symbol: self.symbol.clone(),
                min: self.min_volume,
                max: self.max_volume,
            });
        }
        for bound in [self.min_volume, self.max_volume] {
            if !self.is_step_aligned(bound) {
                return Err(InstrumentError::InvalidLotSize {
                    quantity: bound,
                    volume_step: self.volume_step,
                });
            }
        }
        Ok(())
    }

    /// True if `volume` is a whole multiple of `volume_step`.
    pub fn is_step_aligned(&self, volume: f64) -> bool {
        let steps = volume / self.volume_step;
        (steps - steps.round()).abs() < 1e-6
    }

    /// Round a volume down to the volume step.
    pub fn floor_to_step(&self, volume: f64) -> f64 {
        if !(volume > 0.0) {
            return 0.0;
        }
        let steps = (volume / self.volume_step + STEP_EPSILON).floor();
        steps * self.volume_step
    }

    /// Normalize an order volume: floor to the step, then clamp into
    /// `[min_volume, max_volume]`.
    ///
    /// Returns `None` when nothing is left after flooring.
    pub fn normalize_volume(&self, volume: f64) -> Option<f64> {
        let floored = self.floor_to_step(volume);
        if floored <= 0.0 {
            return None;
        }
        Some(floored.clamp(self.min_volume, self.max_volume))
    }

    /// Order volumes that close an existing position: floored to the step,
    /// split into chunks of at most `max_volume`, never raised to `min_volume`.
    ///
    /// The chunks sum to the floored volume. Empty when nothing is left.
    pub fn closing_volumes(&self, volume: f64) -> Vec<f64> {
        let floored = self.floor_to_step(volume);
        if floored <= 0.0 {
            return Vec::new();
        }
        let mut remaining = (floored / self.volume_step).round() as u64;
        let per_order = ((self.max_volume / self.volume_step + STEP_EPSILON).floor() as u64).max(1);
        let mut chunks = Vec::with_capacity(remaining.div_ceil(per_order) as usize);
        while remaining > 0 {
            let steps = remaining.min(per_order);
            chunks.push(steps as f64 * self.volume_step);
            remaining -= steps;
        }
        chunks
    }

    /// Money value of a one-unit price move for one unit of volume.
    pub fn value_per_price_unit(&self) -> f64 {
        self.step_price / self.price_step
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum InstrumentError {
    #[error("instrument symbol is empty")]
    EmptySymbol,

    #[error("{symbol}: {field} must be positive, got {value}")]
    NonPositive {
        symbol: String,
        field: &'static str,
        value: f64,
    },

    #[error("{symbol}: min_volume {min} exceeds max_volume {max}")]
    InvertedVolumeRange { symbol: String, min: f64, max: f64 },

    #[error("Quantity {quantity} does not respect volume_step {volume_step}")]
    InvalidLotSize { quantity: f64, volume_step: f64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eurusd() -> InstrumentSpec {
        InstrumentSpec::new("EURUSD", 0.00001, 0.01, 0.01, 100.0, 1.0)
    }

    #[test]
    fn valid_spec_passes() {
        assert!(eurusd().validate().is_ok());
    }

    #[test]
    fn empty_symbol_rejected() {
        let mut spec = eurusd();
        spec.symbol = "  ".into();
        assert_eq!(spec.validate(), Err(InstrumentError::EmptySymbol));
    }

    #[test]
    fn zero_volume_step_rejected() {
        let mut spec = eurusd();
        spec.volume_step = 0.0;
        assert!(matches!(
            spec.validate(),
            Err(InstrumentError::NonPositive { field: "volume_step", .. })
        ));
    }

    #[test]
    fn inverted_range_rejected() {
        let mut spec = eurusd();
        spec.min_volume = 200.0;
        assert!(matches!(spec.validate(), Err(InstrumentError::InvertedVolumeRange { .. })));
    }

    #[test]
    fn misaligned_min_volume_rejected() {
        let mut spec = eurusd();
        spec.volume_step = 0.1;
        spec.min_volume = 0.15;
        assert!(matches!(spec.validate(), Err(InstrumentError::InvalidLotSize { .. })));
    }

    #[test]
    fn normalize_floors_to_step() {
        let spec = eurusd();
        let v = spec.normalize_volume(0.257).unwrap();
        assert!((v - 0.25).abs() < 1e-12);
    }

    #[test]
    fn normalize_keeps_exact_multiples() {
        let spec = eurusd();
        // 0.3 / 0.01 is 29.999999999999996 in f64; the epsilon keeps it at 30 steps.
        let v = spec.normalize_volume(0.3).unwrap();
        assert!((v - 0.3).abs() < 1e-12);
    }

    #[test]
    fn normalize_clamps_to_max() {
        let spec = eurusd();
        assert_eq!(spec.normalize_volume(250.0), Some(100.0));
    }

    #[test]
    fn normalize_raises_to_min() {
        let spec = InstrumentSpec::new("XAUUSD", 0.01, 0.01, 0.1, 50.0, 1.0);
        assert_eq!(spec.normalize_volume(0.05), Some(0.1));
    }

    #[test]
    fn normalize_drops_sub_step_volume() {
        let spec = eurusd();
        assert_eq!(spec.normalize_volume(0.004), None);
        assert_eq!(spec.normalize_volume(0.0), None);
        assert_eq!(spec.normalize_volume(-1.0), None);
    }

    #[test]
    fn closing_volume_never_raised_to_min() {
        let spec = InstrumentSpec::new("XAUUSD", 0.01, 0.01, 0.1, 50.0, 1.0);
        let v = spec.closing_volumes(0.05);
        assert_eq!(v.len(), 1);
        assert!((v[0] - 0.05).abs() < 1e-12);
    }

    #[test]
    fn closing_volume_splits_above_max() {
        let spec = InstrumentSpec::new("GBPUSD", 0.0001, 0.01, 0.01, 10.0, 1.0);
        let v = spec.closing_volumes(20.0);
        assert_eq!(v.len(), 2);
        assert!(v.iter().all(|c| (c - 10.0).abs() < 1e-9));

        let v = spec.closing_volumes(23.456);
        assert_eq!(v.len(), 3);
        assert!((v.iter().sum::<f64>() - 23.45).abs() < 1e-9);
        assert!((v[2] - 3.45).abs() < 1e-9);
        assert!(spec.closing_volumes(0.004).is_empty());
    }

    #[test]
    fn value_per_price_unit_from_tick_value() {
        let spec = eurusd();
        assert!((spec.value_per_price_unit() - 100_000.0).abs() < 1e-6);
    }
}
