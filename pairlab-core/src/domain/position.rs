//! Position legs, mutated only by confirmed fills.

use crate::domain::candle::InstrumentRole;
use crate::domain::order::Fill;
use serde::{Deserialize, Serialize};

/// Volumes below this are treated as flat.
const FLAT_EPSILON: f64 = 1e-9;

/// Position in one traded instrument.
///
/// Only confirmed fills mutate a leg (see [`PositionLeg::apply_fill`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionLeg {
    pub instrument: InstrumentRole,
    pub symbol: String,
    /// Positive = long, negative = short.
    pub signed_volume: f64,
    pub avg_price: f64,
}

impl PositionLeg {
    pub fn flat(instrument: InstrumentRole, symbol: impl Into<String>) -> Self {
        Self {
            instrument,
            symbol: symbol.into(),
            signed_volume: 0.0,
            avg_price: 0.0,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.signed_volume.abs() < FLAT_EPSILON
    }

    pub fn is_long(&self) -> bool {
        self.signed_volume >= FLAT_EPSILON
    }

    pub fn is_short(&self) -> bool {
        self.signed_volume <= -FLAT_EPSILON
    }

    pub fn abs_volume(&self) -> f64 {
        self.signed_volume.abs()
    }

    /// Unrealized P&L in price units × volume.
    pub fn unrealized(&self, price: f64) -> f64 {
        if self.is_flat() {
            return 0.0;
        }
        self.signed_volume * (price - self.avg_price)
    }

    /// Apply a fill and return the realized P&L (price units × volume).
    ///
    /// Adding to the position moves the average price; reducing keeps it;
    /// crossing through zero re-opens at the fill price.
    pub fn apply_fill(&mut self, fill: &Fill) -> f64 {
        let delta = fill.signed_volume();
        let current = self.signed_volume;

        if self.is_flat() || current.signum() == delta.signum() {
            let new_volume = current + delta;
            self.avg_price = if self.is_flat() {
                fill.price
            } else {
                (current.abs() * self.avg_price + delta.abs() * fill.price) / new_volume.abs()
            };
            self.signed_volume = new_volume;
            return 0.0;
        }

        let closed = delta.abs().min(current.abs());
        let realized = closed * current.signum() * (fill.price - self.avg_price);
        let remaining = current + delta;

        if remaining.abs() < FLAT_EPSILON {
            self.signed_volume = 0.0;
            self.avg_price = 0.0;
        } else if remaining.signum() != current.signum() {
            self.signed_volume = remaining;
            self.avg_price = fill.price;
        } else {
            self.signed_volume = remaining;
        }
        realized
    }
}

/// The set of legs the engine may hold: base, second and optional cross.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Legs {
    pub base: PositionLeg,
    pub second: PositionLeg,
    pub cross: Option<PositionLeg>,
}

impl Legs {
    pub fn new(base_symbol: &str, second_symbol: &str, cross_symbol: Option<&str>) -> Self {
        Self {
            base: PositionLeg::flat(InstrumentRole::Base, base_symbol),
            second: PositionLeg::flat(InstrumentRole::Second, second_symbol),
            cross: cross_symbol.map(|s| PositionLeg::flat(InstrumentRole::Cross, s)),
        }
    }

    pub fn get(&self, role: InstrumentRole) -> Option<&PositionLeg> {
        match role {
            InstrumentRole::Base => Some(&self.base),
            InstrumentRole::Second => Some(&self.second),
            InstrumentRole::Cross => self.cross.as_ref(),
        }
    }

    pub fn get_mut(&mut self, role: InstrumentRole) -> Option<&mut PositionLeg> {
        match role {
            InstrumentRole::Base => Some(&mut self.base),
            InstrumentRole::Second => Some(&mut self.second),
            InstrumentRole::Cross => self.cross.as_mut(),
        }
    }

    /// Absolute volume held in a role (0 when the role is not tracked).
    pub fn abs_volume(&self, role: InstrumentRole) -> f64 {
        self.get(role).map_or(0.0, PositionLeg::abs_volume)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PositionLeg> {
        [Some(&self.base), Some(&self.second), self.cross.as_ref()]
            .into_iter()
            .flatten()
    }

    pub fn is_flat(&self) -> bool {
        self.iter().all(PositionLeg::is_flat)
    }
}
