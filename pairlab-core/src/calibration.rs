//! Calibration estimator: rolling linear mapping between the two price ranges.
//!
//! Over the last `training_range` combined candles we track the high/low of
//! both instruments. The mapping ("compaction") scales the second
//! instrument's range onto the base range:
//!
//! ```text
//! compaction = (base_high - base_low) / (second_high - second_low)
//! ```
//!
//! falling back to 1 when the second range is zero. The mapping is computed
//! on the first full window and then every `retrain_interval` candles.

use crate::domain::CombinedCandle;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;

/// Rolling high/low over a fixed window, O(1) amortized per update.
///
/// Uses monotonic deques holding `(sequence, value)` pairs.
#[derive(Debug, Clone)]
pub struct RollingRange {
    window: usize,
    seen: u64,
    highs: VecDeque<(u64, f64)>,
    lows: VecDeque<(u64, f64)>,
}

impl RollingRange {
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            seen: 0,
            highs: VecDeque::with_capacity(window),
            lows: VecDeque::with_capacity(window),
        }
    }

    pub fn push(&mut self, high: f64, low: f64) {
        let seq = self.seen;
        self.seen += 1;

        while self.highs.back().is_some_and(|&(_, h)| h <= high) {
            self.highs.pop_back();
        }
        self.highs.push_back((seq, high));

        while self.lows.back().is_some_and(|&(_, l)| l >= low) {
            self.lows.pop_back();
        }
        self.lows.push_back((seq, low));

        let window = self.window as u64;
        while self.highs.front().is_some_and(|&(s, _)| s + window <= seq) {
            self.highs.pop_front();
        }
        while self.lows.front().is_some_and(|&(s, _)| s + window <= seq) {
            self.lows.pop_front();
        }
    }

    /// True once `window` samples have been observed.
    pub fn is_full(&self) -> bool {
        self.seen >= self.window as u64
    }

    pub fn high(&self) -> Option<f64> {
        self.highs.front().map(|&(_, h)| h)
    }

    pub fn low(&self) -> Option<f64> {
        self.lows.front().map(|&(_, l)| l)
    }
}

/// The current price mapping. Replaced wholesale on every re-estimation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationState {
    pub compaction: f64,
    pub base_high: f64,
    pub base_low: f64,
    pub second_low: f64,
    pub computed_at: DateTime<Utc>,
}

impl CalibrationState {
    /// Build the mapping from the two observed ranges.
    pub fn from_ranges(
        base_high: f64,
        base_low: f64,
        second_high: f64,
        second_low: f64,
        computed_at: DateTime<Utc>,
    ) -> Self {
        let base_range = base_high - base_low;
        let second_range = second_high - second_low;
        let compaction = if second_range == 0.0 { 1.0 } else { base_range / second_range };
        Self {
            compaction,
            base_high,
            base_low,
            second_low,
            computed_at,
        }
    }

    /// A mapping with non-positive compaction cannot project prices.
    pub fn is_formed(&self) -> bool {
        self.compaction.is_finite() && self.compaction > 0.0
    }
}

/// Owns the rolling ranges and the current [`CalibrationState`].
#[derive(Debug, Clone)]
pub struct CalibrationEstimator {
    retrain_interval: usize,
    base: RollingRange,
    second: RollingRange,
    since_last: usize,
    state: Option<CalibrationState>,
}

impl CalibrationEstimator {
    pub fn new(training_range: usize, retrain_interval: usize) -> Self {
        Self {
            retrain_interval,
            base: RollingRange::new(training_range),
            second: RollingRange::new(training_range),
            since_last: 0,
            state: None,
        }
    }

    /// Feed one finished combined candle. Returns true if the mapping was
    /// re-estimated, in which case every cached deviation is stale.
    pub fn observe(&mut self, event: &CombinedCandle) -> bool {
        self.base.push(event.base.high, event.base.low);
        self.second.push(event.second.high, event.second.low);

        if !self.base.is_full() || !self.second.is_full() {
            return false;
        }

        if self.state.is_none() {
            return self.recalibrate(event.time);
        }

        if self.retrain_interval == 0 {
            return false;
        }
        self.since_last += 1;
        if self.since_last >= self.retrain_interval {
            return self.recalibrate(event.time);
        }
        false
    }

    /// Recompute the mapping from the current windows.
    ///
    /// Returns false (and leaves the state untouched) if a window is still empty.
    pub fn recalibrate(&mut self, at: DateTime<Utc>) -> bool {
        let (Some(base_high), Some(base_low), Some(second_high), Some(second_low)) = (
            self.base.high(),
            self.base.low(),
            self.second.high(),
            self.second.low(),
        ) else {
            return false;
        };

        let state = CalibrationState::from_ranges(base_high, base_low, second_high, second_low, at);
        debug!(
            compaction = state.compaction,
            base_low, base_high, second_low, second_high, "recalibrated price mapping"
        );
        self.state = Some(state);
        self.since_last = 0;
        true
    }

    pub fn state(&self) -> Option<&CalibrationState> {
        self.state.as_ref()
    }
}
