//! Paper execution: fills market orders at the last close of their instrument.
//!
//! Implements both collaborator traits of the engine. Fills are queued and
//! handed back to the engine by the runner through
//! [`PairEngine::apply_fill`](pairlab_core::engine::PairEngine::apply_fill).

use pairlab_core::domain::{Fill, InstrumentRole, InstrumentSpec, Legs, MarketOrder};
use pairlab_core::engine::{AccountView, EngineConfig, ExecutionGateway, GatewayError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::AccountConfig;

/// One executed order, as written to `orders.csv`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub time: chrono::DateTime<chrono::Utc>,
    pub role: InstrumentRole,
    pub symbol: String,
    pub side: pairlab_core::domain::OrderSide,
    pub volume: f64,
    pub price: f64,
    pub commission: f64,
    /// Realized P&L of this fill in account currency, before commission.
    pub realized: f64,
}

#[derive(Debug)]
pub struct PaperGateway {
    specs: HashMap<InstrumentRole, InstrumentSpec>,
    last_price: HashMap<InstrumentRole, f64>,
    legs: Legs,
    initial_capital: f64,
    commission_per_unit: f64,
    realized: f64,
    commissions: f64,
    pending: Vec<Fill>,
    records: Vec<OrderRecord>,
}

impl PaperGateway {
    pub fn new(engine: &EngineConfig, account: &AccountConfig) -> Self {
        let mut specs = HashMap::new();
        specs.insert(InstrumentRole::Base, engine.base.clone());
        specs.insert(InstrumentRole::Second, engine.second.clone());
        if let Some(cross) = engine.cross() {
            specs.insert(InstrumentRole::Cross, cross.clone());
        }
        Self {
            legs: Legs::new(
                &engine.base.symbol,
                &engine.second.symbol,
                engine.cross().map(|c| c.symbol.as_str()),
            ),
            specs,
            last_price: HashMap::new(),
            initial_capital: account.initial_capital,
            commission_per_unit: account.commission_per_unit,
            realized: 0.0,
            commissions: 0.0,
            pending: Vec::new(),
            records: Vec::new(),
        }
    }

    /// Record the latest close of an instrument; used for fills and marking.
    pub fn mark(&mut self, role: InstrumentRole, price: f64) {
        if price.is_finite() && price > 0.0 {
            self.last_price.insert(role, price);
        }
    }

    /// Drain fills not yet delivered to the engine.
    pub fn take_fills(&mut self) -> Vec<Fill> {
        std::mem::take(&mut self.pending)
    }

    pub fn records(&self) -> &[OrderRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<OrderRecord> {
        self.records
    }

    pub fn legs(&self) -> &Legs {
        &self.legs
    }

    pub fn realized(&self) -> f64 {
        self.realized
    }

    pub fn commissions(&self) -> f64 {
        self.commissions
    }

    /// Mark-to-market value of the open legs in account currency.
    pub fn unrealized(&self) -> f64 {
        self.legs
            .iter()
            .filter(|leg| !leg.is_flat())
            .filter_map(|leg| {
                let spec = self.specs.get(&leg.instrument)?;
                let price = self.last_price.get(&leg.instrument)?;
                Some(leg.unrealized(*price) * spec.value_per_price_unit())
            })
            .sum()
    }
}

impl ExecutionGateway for PaperGateway {
    fn place_market_order(&mut self, order: &MarketOrder) -> Result<(), GatewayError> {
        let spec = self.specs.get(&order.role).ok_or_else(|| GatewayError::Rejected {
            symbol: order.symbol.clone(),
            reason: format!("no {} instrument configured", order.role),
        })?;
        if !(order.volume > 0.0) {
            return Err(GatewayError::Rejected {
                symbol: order.symbol.clone(),
                reason: format!("non-positive volume {}", order.volume),
            });
        }
        let price = *self
            .last_price
            .get(&order.role)
            .ok_or_else(|| GatewayError::NoPrice(order.symbol.clone()))?;

        let fill = Fill {
            role: order.role,
            time: order.time,
            side: order.side,
            volume: order.volume,
            price,
        };
        let value_per_unit = spec.value_per_price_unit();
        let realized = match self.legs.get_mut(order.role) {
            Some(leg) => leg.apply_fill(&fill) * value_per_unit,
            None => 0.0,
        };
        let commission = order.volume * self.commission_per_unit;
        self.realized += realized;
        self.commissions += commission;

        self.records.push(OrderRecord {
            time: order.time,
            role: order.role,
            symbol: order.symbol.clone(),
            side: order.side,
            volume: order.volume,
            price,
            commission,
            realized,
        });
        self.pending.push(fill);
        Ok(())
    }
}

impl AccountView for PaperGateway {
    fn begin_value(&self) -> f64 {
        self.initial_capital
    }

    fn current_value(&self) -> f64 {
        self.initial_capital + self.realized - self.commissions + self.unrealized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pairlab_core::domain::OrderSide;
    use pairlab_core::engine::StrategyParams;

    fn gateway(commission: f64) -> PaperGateway {
        let config = EngineConfig::new(
            StrategyParams::default(),
            InstrumentSpec::new("AAA", 0.0001, 0.01, 0.01, 10.0, 1.0),
            InstrumentSpec::new("BBB", 0.0001, 0.01, 0.01, 10.0, 2.0),
            None,
        )
        .unwrap();
        let account = AccountConfig {
            initial_capital: 10_000.0,
            commission_per_unit: commission,
            ..AccountConfig::default()
        };
        PaperGateway::new(&config, &account)
    }

    fn order(role: InstrumentRole, side: OrderSide, volume: f64) -> MarketOrder {
        MarketOrder {
            role,
            symbol: "AAA".into(),
            side,
            volume,
            time: Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn rejects_without_price() {
        let mut gw = gateway(0.0);
        let err = gw
            .place_market_order(&order(InstrumentRole::Base, OrderSide::Buy, 0.1))
            .unwrap_err();
        assert_eq!(err, GatewayError::NoPrice("AAA".into()));
    }

    #[test]
    fn rejects_unconfigured_cross() {
        let mut gw = gateway(0.0);
        gw.mark(InstrumentRole::Cross, 1.0);
        assert!(matches!(
            gw.place_market_order(&order(InstrumentRole::Cross, OrderSide::Buy, 0.1)),
            Err(GatewayError::Rejected { .. })
        ));
    }

    #[test]
    fn fills_at_last_close_and_queues_fill() {
        let mut gw = gateway(0.0);
        gw.mark(InstrumentRole::Base, 1.2000);
        gw.place_market_order(&order(InstrumentRole::Base, OrderSide::Buy, 0.5)).unwrap();
        let fills = gw.take_fills();
        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].price, 1.2000);
        assert!(gw.take_fills().is_empty());
        assert!(gw.legs().base.is_long());
    }

    #[test]
    fn equity_marks_open_legs_and_realizes_on_close() {
        let mut gw = gateway(0.0);
        gw.mark(InstrumentRole::Base, 1.2000);
        gw.place_market_order(&order(InstrumentRole::Base, OrderSide::Buy, 1.0)).unwrap();
        assert!((gw.current_value() - 10_000.0).abs() < 1e-9);

        // +10 steps at 1.0 per step per unit.
        gw.mark(InstrumentRole::Base, 1.2010);
        assert!((gw.current_value() - 10_010.0).abs() < 1e-6);

        gw.place_market_order(&order(InstrumentRole::Base, OrderSide::Sell, 1.0)).unwrap();
        assert!((gw.realized() - 10.0).abs() < 1e-6);
        assert!(gw.unrealized().abs() < 1e-9);
        assert!((gw.current_value() - 10_010.0).abs() < 1e-6);
    }

    #[test]
    fn commission_reduces_equity() {
        let mut gw = gateway(2.5);
        gw.mark(InstrumentRole::Base, 1.0);
        gw.place_market_order(&order(InstrumentRole::Base, OrderSide::Buy, 2.0)).unwrap();
        assert!((gw.commissions() - 5.0).abs() < 1e-12);
        assert!((gw.current_value() - 9_995.0).abs() < 1e-9);
        assert_eq!(gw.records()[0].commission, 5.0);
    }
}
