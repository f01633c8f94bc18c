//! Candle samples: the market data unit consumed by the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which leg of the pair a feed belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentRole {
    /// Primary instrument; deviations are expressed in its price steps.
    Base,
    /// Secondary instrument projected onto the base price scale.
    Second,
    /// Optional synthetic cross traded instead of the two legs.
    Cross,
}

impl fmt::Display for InstrumentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstrumentRole::Base => write!(f, "base"),
            InstrumentRole::Second => write!(f, "second"),
            InstrumentRole::Cross => write!(f, "cross"),
        }
    }
}

/// One candle of a single instrument, keyed by its open time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CandleSample {
    pub time: DateTime<Utc>,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    /// False while the candle is still forming.
    pub is_final: bool,
}

impl CandleSample {
    /// A finished candle.
    pub fn new(time: DateTime<Utc>, high: f64, low: f64, close: f64) -> Self {
        Self { time, high, low, close, is_final: true }
    }

    /// Returns true if any price field is NaN.
    pub fn is_void(&self) -> bool {
        self.high.is_nan() || self.low.is_nan() || self.close.is_nan()
    }

    /// High/low/close sanity: high >= low and close inside the range.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.high >= self.low && self.close <= self.high && self.close >= self.low && self.low > 0.0
    }
}

/// Candles of all required instruments sharing the same open time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CombinedCandle {
    pub time: DateTime<Utc>,
    pub base: CandleSample,
    pub second: CandleSample,
    pub cross: Option<CandleSample>,
}

impl CombinedCandle {
    /// Combine a base and second candle (no cross leg).
    pub fn pair(base: CandleSample, second: CandleSample) -> Self {
        Self { time: base.time, base, second, cross: None }
    }

    pub fn is_final(&self) -> bool {
        self.base.is_final && self.second.is_final && self.cross.map_or(true, |c| c.is_final)
    }

    /// Close price of the given role, if that leg is part of the event.
    pub fn close(&self, role: InstrumentRole) -> Option<f64> {
        match role {
            InstrumentRole::Base => Some(self.base.close),
            InstrumentRole::Second => Some(self.second.close),
            InstrumentRole::Cross => self.cross.map(|c| c.close),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> CandleSample {
        let t = Utc.with_ymd_and_hms(2024, 1, 2, 10, 0, 0).unwrap();
        CandleSample::new(t, 1.3100, 1.3000, 1.3050)
    }

    #[test]
    fn candle_is_sane() {
        assert!(sample().is_sane());
    }

    #[test]
    fn candle_detects_void() {
        let mut c = sample();
        c.close = f64::NAN;
        assert!(c.is_void());
        assert!(!c.is_sane());
    }

    #[test]
    fn candle_detects_close_outside_range() {
        let mut c = sample();
        c.close = 1.3200;
        assert!(!c.is_sane());
    }

    #[test]
    fn combined_close_by_role() {
        let base = sample();
        let mut second = sample();
        second.close = 0.9025;
        let event = CombinedCandle::pair(base, second);
        assert_eq!(event.close(InstrumentRole::Base), Some(1.3050));
        assert_eq!(event.close(InstrumentRole::Second), Some(0.9025));
        assert_eq!(event.close(InstrumentRole::Cross), None);
    }

    #[test]
    fn combined_is_final_requires_every_leg() {
        let base = sample();
        let mut second = sample();
        second.is_final = false;
        assert!(!CombinedCandle::pair(base, second).is_final());
        assert!(CombinedCandle::pair(base, base).is_final());
    }

    #[test]
    fn role_serializes_snake_case() {
        let json = serde_json::to_string(&InstrumentRole::Second).unwrap();
        assert_eq!(json, "\"second\"");
    }
}
