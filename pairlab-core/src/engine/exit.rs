//! Exit controller: decides when open exposure is liquidated.
//!
//! Evaluated on every combined candle before new entries are considered.

use super::decision::{Direction, PositionState};
use super::gateway::AccountView;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    /// The deviation flipped against the open exposure.
    Reversal,
    /// `|deviation|` decayed below `close_correction * threshold`.
    Decay,
    /// Account profit exceeded `profit_percent` of the baseline.
    ProfitTarget,
    /// Explicit stop of the engine.
    Stop,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExitReason::Reversal => "reversal",
            ExitReason::Decay => "decay",
            ExitReason::ProfitTarget => "profit_target",
            ExitReason::Stop => "stop",
        };
        f.write_str(s)
    }
}

/// Deviation reading handed to the exit controller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviationReading {
    pub deviation: f64,
    /// Direction the decision engine would trade this deviation in.
    pub signal_direction: Direction,
    pub threshold: f64,
}

#[derive(Debug, Clone)]
pub struct ExitController {
    close_correction: f64,
    profit_percent: f64,
    /// Equity baseline for the profit check; taken from the account on first
    /// use and moved up after each profit-target liquidation.
    baseline: Option<f64>,
}

impl ExitController {
    pub fn new(close_correction: f64, profit_percent: f64) -> Self {
        Self {
            close_correction,
            profit_percent,
            baseline: None,
        }
    }

    /// `|deviation|` below which an open position is closed.
    pub fn decay_level(&self, threshold: f64) -> f64 {
        self.close_correction * threshold
    }

    pub fn baseline(&self) -> Option<f64> {
        self.baseline
    }

    /// Returns the reason to liquidate, if any. `Flat` never exits.
    pub fn evaluate(
        &mut self,
        state: PositionState,
        reading: Option<DeviationReading>,
        account: &dyn AccountView,
    ) -> Option<ExitReason> {
        let held = state.direction()?;

        if let Some(r) = reading {
            if r.signal_direction != held && r.deviation != 0.0 {
                return Some(ExitReason::Reversal);
            }
            if r.deviation.abs() < self.decay_level(r.threshold) {
                return Some(ExitReason::Decay);
            }
        }

        let baseline = *self.baseline.get_or_insert_with(|| account.begin_value());
        let current = account.current_value();
        if baseline > 0.0 && current - baseline > self.profit_percent / 100.0 * baseline {
            self.baseline = Some(current);
            return Some(ExitReason::ProfitTarget);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Account {
        begin: f64,
        current: f64,
    }

    impl AccountView for Account {
        fn begin_value(&self) -> f64 {
            self.begin
        }
        fn current_value(&self) -> f64 {
            self.current
        }
    }

    fn flat_account() -> Account {
        Account { begin: 10_000.0, current: 10_000.0 }
    }

    fn reading(deviation: f64, threshold: f64) -> Option<DeviationReading> {
        let signal_direction = if deviation > 0.0 { Direction::Short } else { Direction::Long };
        Some(DeviationReading {
            deviation,
            signal_direction,
            threshold,
        })
    }

    #[test]
    fn flat_never_exits() {
        let mut exit = ExitController::new(0.618034, 5.0);
        let rich = Account { begin: 10_000.0, current: 20_000.0 };
        assert_eq!(exit.evaluate(PositionState::Flat, reading(1.0, 15.0), &rich), None);
    }

    #[test]
    fn decay_level_matches_close_correction() {
        let exit = ExitController::new(0.618034, 5.0);
        assert!((exit.decay_level(15.0) - 9.27051).abs() < 1e-9);
    }

    #[test]
    fn decay_triggers_below_level() {
        let mut exit = ExitController::new(0.618034, 5.0);
        let held = PositionState::Positioned(Direction::Long);
        let account = flat_account();
        assert_eq!(exit.evaluate(held, reading(-9.30, 15.0), &account), None);
        assert_eq!(
            exit.evaluate(held, reading(-9.26, 15.0), &account),
            Some(ExitReason::Decay)
        );
    }

    #[test]
    fn reversal_beats_decay_check() {
        let mut exit = ExitController::new(0.1, 5.0);
        let held = PositionState::Positioned(Direction::Long);
        // +5 is above the decay level (1.5) but points the other way.
        assert_eq!(
            exit.evaluate(held, reading(5.0, 15.0), &flat_account()),
            Some(ExitReason::Reversal)
        );
    }

    #[test]
    fn profit_target_closes_and_rebaselines() {
        let mut exit = ExitController::new(0.0, 5.0);
        let held = PositionState::Positioned(Direction::Short);
        let up = Account { begin: 10_000.0, current: 10_600.0 };
        assert_eq!(exit.evaluate(held, None, &up), Some(ExitReason::ProfitTarget));
        assert_eq!(exit.baseline(), Some(10_600.0));
        // Same equity again is no longer above the moved baseline.
        assert_eq!(exit.evaluate(held, None, &up), None);
    }

    #[test]
    fn profit_below_target_holds() {
        let mut exit = ExitController::new(0.0, 5.0);
        let held = PositionState::Positioned(Direction::Short);
        let up = Account { begin: 10_000.0, current: 10_400.0 };
        assert_eq!(exit.evaluate(held, reading(30.0, 15.0), &up), None);
    }
}
