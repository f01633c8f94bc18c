//! Decision engine: turns threshold crossings into sized trade intents.
//!
//! Entry requires a formed threshold, `|deviation| >= threshold`, and a local
//! peak: the previous bar's `|deviation|` must be at least the current one.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Exposure direction, expressed on the base leg (two-leg mode) or the cross.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn opposite(self) -> Self {
        match self {
            Direction::Long => Direction::Short,
            Direction::Short => Direction::Long,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => write!(f, "long"),
            Direction::Short => write!(f, "short"),
        }
    }
}

/// The engine's two-state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "direction")]
pub enum PositionState {
    Flat,
    Positioned(Direction),
}

impl PositionState {
    pub fn direction(self) -> Option<Direction> {
        match self {
            PositionState::Flat => None,
            PositionState::Positioned(d) => Some(d),
        }
    }

    pub fn is_flat(self) -> bool {
        self == PositionState::Flat
    }
}

/// A sized entry decision. Consumed immediately by the order dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TradeIntent {
    pub direction: Direction,
    /// In `[1, max_deals]`.
    pub multiplier: u32,
    /// Target absolute volume of the base (or cross) leg.
    pub per_leg_target_volume: f64,
    pub deviation: f64,
    pub threshold: f64,
}

/// `clamp(round(|deviation| / threshold), 1, max_deals)`.
///
/// Rounds half away from zero. Returns 1 for a non-positive threshold.
pub fn multiplier(deviation: f64, threshold: f64, max_deals: u32) -> u32 {
    let max_deals = max_deals.max(1);
    if !(threshold > 0.0) {
        return 1;
    }
    let ratio = (deviation.abs() / threshold).round();
    if !ratio.is_finite() || ratio >= max_deals as f64 {
        return max_deals;
    }
    (ratio as u32).clamp(1, max_deals)
}

#[derive(Debug, Clone)]
pub struct DecisionEngine {
    max_deals: u32,
    base_lot: f64,
    /// `Some(use_direct_cross_rate)` in cross mode.
    cross_direct: Option<bool>,
}

impl DecisionEngine {
    pub fn two_leg(max_deals: u32, base_lot: f64) -> Self {
        Self { max_deals, base_lot, cross_direct: None }
    }

    pub fn cross(max_deals: u32, base_lot: f64, use_direct_cross_rate: bool) -> Self {
        Self {
            max_deals,
            base_lot,
            cross_direct: Some(use_direct_cross_rate),
        }
    }

    /// Direction that trades a deviation back toward fair value.
    ///
    /// A positive deviation means the base is rich: sell it. In cross mode an
    /// indirect cross rate inverts the direction.
    pub fn signal_direction(&self, deviation: f64) -> Direction {
        let base = if deviation > 0.0 { Direction::Short } else { Direction::Long };
        match self.cross_direct {
            Some(false) => base.opposite(),
            _ => base,
        }
    }

    /// Evaluate one bar.
    ///
    /// While positioned, only intents in the held direction are returned (the
    /// dispatcher turns them into scale-in deltas); reversals are left to the
    /// exit controller.
    pub fn evaluate(
        &self,
        state: PositionState,
        deviation: f64,
        previous: Option<f64>,
        threshold: f64,
    ) -> Option<TradeIntent> {
        if !(threshold > 0.0) {
            return None;
        }
        if deviation.abs() < threshold {
            return None;
        }
        let previous = previous?;
        if previous.abs() < deviation.abs() {
            return None;
        }

        let direction = self.signal_direction(deviation);
        if let PositionState::Positioned(held) = state {
            if held != direction {
                return None;
            }
        }

        let multiplier = multiplier(deviation, threshold, self.max_deals);
        Some(TradeIntent {
            direction,
            multiplier,
            per_leg_target_volume: multiplier as f64 * self.base_lot,
            deviation,
            threshold,
        })
    }
}
