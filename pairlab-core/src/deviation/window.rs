//! Bounded window of absolute deviations.

use std::collections::VecDeque;

/// Capacity-bounded FIFO of absolute deviations plus a running maximum.
///
/// The running maximum only grows between rebuilds: evicting the sample that
/// set it does not lower it. [`DeviationWindow::rebuild`] resets it to the
/// maximum of the retained samples.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviationWindow {
    capacity: usize,
    values: VecDeque<f64>,
    running_max: f64,
}

impl DeviationWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            values: VecDeque::with_capacity(capacity),
            running_max: 0.0,
        }
    }

    /// Capacity for a training range: `ceil(training_range * distance_multiplier)`.
    pub fn capacity_for(training_range: usize, distance_multiplier: f64) -> usize {
        let raw = (training_range as f64 * distance_multiplier).ceil();
        if raw.is_finite() && raw >= 1.0 {
            raw as usize
        } else {
            1
        }
    }

    /// Enqueue a deviation (its absolute value is stored).
    pub fn push(&mut self, deviation: f64) {
        let abs = deviation.abs();
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(abs);
        if abs > self.running_max {
            self.running_max = abs;
        }
    }

    /// Replace the contents with `deviations` (keeping the newest `capacity`)
    /// and recompute the running maximum from what is retained.
    pub fn rebuild<I>(&mut self, deviations: I)
    where
        I: IntoIterator<Item = f64>,
    {
        self.values.clear();
        self.running_max = 0.0;
        for d in deviations {
            if self.values.len() == self.capacity {
                self.values.pop_front();
            }
            self.values.push_back(d.abs());
        }
        self.running_max = self.values.iter().copied().fold(0.0, f64::max);
    }

    pub fn running_max(&self) -> f64 {
        self.running_max
    }

    /// Adaptive entry threshold: `running_max * signal_correction`.
    pub fn threshold(&self, signal_correction: f64) -> f64 {
        self.running_max * signal_correction
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.values.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_rounds_up() {
        assert_eq!(DeviationWindow::capacity_for(640, 1.2), 768);
        assert_eq!(DeviationWindow::capacity_for(10, 1.0), 10);
        assert_eq!(DeviationWindow::capacity_for(10, 1.01), 11);
    }

    #[test]
    fn evicts_oldest_first() {
        let mut w = DeviationWindow::new(3);
        for d in [1.0, -2.0, 3.0, -4.0] {
            w.push(d);
        }
        assert_eq!(w.iter().collect::<Vec<_>>(), vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn running_max_survives_eviction_until_rebuild() {
        let mut w = DeviationWindow::new(2);
        w.push(10.0);
        w.push(1.0);
        w.push(2.0); // 10 evicted
        assert_eq!(w.running_max(), 10.0);
        let retained: Vec<f64> = w.iter().collect();
        w.rebuild(retained);
        assert_eq!(w.running_max(), 2.0);
    }

    #[test]
    fn threshold_scales_running_max() {
        let mut w = DeviationWindow::new(4);
        w.push(-20.0);
        w.push(5.0);
        assert_eq!(w.threshold(0.75), 15.0);
    }

    #[test]
    fn rebuild_keeps_newest() {
        let mut w = DeviationWindow::new(2);
        w.rebuild([5.0, -7.0, 1.0]);
        assert_eq!(w.len(), 2);
        assert_eq!(w.running_max(), 7.0);
    }
}
