//! Market orders and the fills that confirm them.

use crate::domain::candle::InstrumentRole;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Order side (buy or sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// +1 for buys, -1 for sells.
    pub fn sign(self) -> f64 {
        match self {
            OrderSide::Buy => 1.0,
            OrderSide::Sell => -1.0,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "buy"),
            OrderSide::Sell => write!(f, "sell"),
        }
    }
}

/// An incremental market order handed to the execution gateway.
///
/// `volume` is always positive and already normalized to the instrument's
/// step/min/max constraints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketOrder {
    pub role: InstrumentRole,
    pub symbol: String,
    pub side: OrderSide,
    pub volume: f64,
    pub time: DateTime<Utc>,
}

impl MarketOrder {
    /// Signed volume delta: positive for buys, negative for sells.
    pub fn signed_volume(&self) -> f64 {
        self.side.sign() * self.volume
    }
}

/// A confirmed execution reported back by the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub role: InstrumentRole,
    pub time: DateTime<Utc>,
    pub side: OrderSide,
    pub volume: f64,
    pub price: f64,
}

impl Fill {
    pub fn signed_volume(&self) -> f64 {
        self.side.sign() * self.volume
    }
}
