//! Domain types for PairLab

pub mod candle;
pub mod instrument;
pub mod order;
pub mod position;

pub use candle::{CandleSample, CombinedCandle, InstrumentRole};
pub use instrument::{InstrumentError, InstrumentSpec};
pub use order::{Fill, MarketOrder, OrderSide};
pub use position::{Legs, PositionLeg};
