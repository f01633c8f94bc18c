//! Order dispatcher: intents to normalized, incremental market orders.
//!
//! Each leg gets a target absolute volume. Only the positive difference to the
//! volume already held is sent, so re-evaluating the same intent every bar
//! never over-sizes a position.

use super::config::ExecutionMode;
use super::decision::{Direction, TradeIntent};
use crate::deviation::Correlation;
use crate::domain::{InstrumentRole, InstrumentSpec, Legs, MarketOrder, OrderSide};
use chrono::{DateTime, Utc};
use tracing::debug;

/// Second-leg volume per unit of base volume:
/// `compaction * step_price(base) / step_price(second)`, with the tick-value
/// ratio falling back to 1 when the second tick value is zero.
pub fn hedge_ratio(compaction: f64, base: &InstrumentSpec, second: &InstrumentSpec) -> f64 {
    let tick_ratio = if second.step_price == 0.0 {
        1.0
    } else {
        base.step_price / second.step_price
    };
    compaction * tick_ratio
}

/// Target absolute volume for one leg.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LegTarget {
    pub role: InstrumentRole,
    pub side: OrderSide,
    pub volume: f64,
}

#[derive(Debug, Clone)]
pub struct OrderDispatcher {
    base: InstrumentSpec,
    second: InstrumentSpec,
    mode: ExecutionMode,
    correlation: Correlation,
}

impl OrderDispatcher {
    pub fn new(
        base: InstrumentSpec,
        second: InstrumentSpec,
        mode: ExecutionMode,
        correlation: Correlation,
    ) -> Self {
        Self { base, second, mode, correlation }
    }

    fn spec(&self, role: InstrumentRole) -> Option<&InstrumentSpec> {
        match role {
            InstrumentRole::Base => Some(&self.base),
            InstrumentRole::Second => Some(&self.second),
            InstrumentRole::Cross => match &self.mode {
                ExecutionMode::Cross(spec) => Some(spec),
                ExecutionMode::TwoLeg => None,
            },
        }
    }

    /// Target volumes for an intent under the given compaction.
    pub fn targets(&self, intent: &TradeIntent, compaction: f64) -> Vec<LegTarget> {
        let side = match intent.direction {
            Direction::Long => OrderSide::Buy,
            Direction::Short => OrderSide::Sell,
        };
        match &self.mode {
            ExecutionMode::Cross(_) => vec![LegTarget {
                role: InstrumentRole::Cross,
                side,
                volume: intent.per_leg_target_volume,
            }],
            ExecutionMode::TwoLeg => {
                let second_side = match self.correlation {
                    Correlation::Direct => side.opposite(),
                    Correlation::Inverse => side,
                };
                let second_volume =
                    intent.per_leg_target_volume * hedge_ratio(compaction, &self.base, &self.second);
                vec![
                    LegTarget {
                        role: InstrumentRole::Base,
                        side,
                        volume: intent.per_leg_target_volume,
                    },
                    LegTarget {
                        role: InstrumentRole::Second,
                        side: second_side,
                        volume: second_volume,
                    },
                ]
            }
        }
    }

    /// Incremental orders that bring each leg up to its target.
    ///
    /// `delta = target - |held|`; legs with `delta <= 0` or a delta that
    /// normalizes to nothing are skipped.
    pub fn plan(
        &self,
        intent: &TradeIntent,
        compaction: f64,
        legs: &Legs,
        time: DateTime<Utc>,
    ) -> Vec<MarketOrder> {
        self.targets(intent, compaction)
            .into_iter()
            .filter_map(|target| {
                let spec = self.spec(target.role)?;
                let delta = target.volume - legs.abs_volume(target.role);
                if delta <= 0.0 {
                    return None;
                }
                let Some(volume) = spec.normalize_volume(delta) else {
                    debug!(role = %target.role, delta, "delta below volume step, order dropped");
                    return None;
                };
                Some(MarketOrder {
                    role: target.role,
                    symbol: spec.symbol.clone(),
                    side: target.side,
                    volume,
                    time,
                })
            })
            .collect()
    }

    /// Orders that flatten every open leg. A leg above `max_volume` is
    /// closed with several orders.
    pub fn plan_liquidation(&self, legs: &Legs, time: DateTime<Utc>) -> Vec<MarketOrder> {
        let mut orders = Vec::new();
        for leg in legs.iter().filter(|leg| !leg.is_flat()) {
            let Some(spec) = self.spec(leg.instrument) else {
                continue;
            };
            let side = if leg.is_long() { OrderSide::Sell } else { OrderSide::Buy };
            for volume in spec.closing_volumes(leg.abs_volume()) {
                orders.push(MarketOrder {
                    role: leg.instrument,
                    symbol: spec.symbol.clone(),
                    side,
                    volume,
                    time,
                });
            }
        }
        orders
    }
}
