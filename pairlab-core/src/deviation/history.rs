//! Deviation history: cached closes, derived deviations and the threshold window.
//!
//! Closes are cached even before the first calibration so the first rebuild
//! has a full window to replay. Between recalibrations deviations are appended
//! incrementally; after a recalibration the whole cache is replayed from an
//! immutable snapshot and the window is replaced.

use super::window::DeviationWindow;
use super::DeviationCalculator;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Closes of both instruments at one combined open time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClosePoint {
    pub time: DateTime<Utc>,
    pub base_close: f64,
    pub second_close: f64,
}

/// A close point with its deviation under the current mapping.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeviationSample {
    pub time: DateTime<Utc>,
    pub base_close: f64,
    pub second_close: f64,
    pub deviation: f64,
}

#[derive(Debug, Clone)]
pub struct DeviationHistory {
    capacity: usize,
    closes: VecDeque<ClosePoint>,
    samples: VecDeque<DeviationSample>,
    window: DeviationWindow,
}

impl DeviationHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            closes: VecDeque::with_capacity(capacity),
            samples: VecDeque::with_capacity(capacity),
            window: DeviationWindow::new(capacity),
        }
    }

    /// Cache a close point and, if a mapping is available, append its deviation.
    ///
    /// Returns the new deviation, or `None` when the mapping is absent or unformed.
    pub fn push(&mut self, point: ClosePoint, calculator: Option<&DeviationCalculator>) -> Option<f64> {
        if self.closes.len() == self.capacity {
            self.closes.pop_front();
        }
        self.closes.push_back(point);

        let deviation = calculator?.deviation(point.base_close, point.second_close)?;
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(DeviationSample {
            time: point.time,
            base_close: point.base_close,
            second_close: point.second_close,
            deviation,
        });
        self.window.push(deviation);
        Some(deviation)
    }

    /// Replay every cached close through `calculator` and replace the derived
    /// samples and the threshold window.
    pub fn rebuild(&mut self, calculator: &DeviationCalculator) {
        let snapshot: Vec<ClosePoint> = self.closes.iter().copied().collect();
        let samples: VecDeque<DeviationSample> = snapshot
            .iter()
            .filter_map(|p| {
                calculator
                    .deviation(p.base_close, p.second_close)
                    .map(|deviation| DeviationSample {
                        time: p.time,
                        base_close: p.base_close,
                        second_close: p.second_close,
                        deviation,
                    })
            })
            .collect();

        let mut window = DeviationWindow::new(self.capacity);
        window.rebuild(samples.iter().map(|s| s.deviation));

        self.samples = samples;
        self.window = window;
    }

    /// Deviation of the newest sample.
    pub fn last_deviation(&self) -> Option<f64> {
        self.samples.back().map(|s| s.deviation)
    }

    /// Deviation of the sample before the newest one.
    pub fn previous_deviation(&self) -> Option<f64> {
        let n = self.samples.len();
        if n < 2 {
            return None;
        }
        self.samples.get(n - 2).map(|s| s.deviation)
    }

    pub fn threshold(&self, signal_correction: f64) -> f64 {
        self.window.threshold(signal_correction)
    }

    pub fn window(&self) -> &DeviationWindow {
        &self.window
    }

    pub fn samples(&self) -> impl Iterator<Item = &DeviationSample> {
        self.samples.iter()
    }

    pub fn cached_closes(&self) -> usize {
        self.closes.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
