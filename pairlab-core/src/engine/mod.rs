//! Pair engine: entry decisions, exits, leg dispatch and the owning engine.
//!
//! Per combined candle:
//!
//! 1. Calibration update (rebuilds the deviation history on recalibration)
//! 2. Deviation and threshold
//! 3. Exit check while positioned; a liquidation ends the bar
//! 4. Entry or scale-in decision
//! 5. Delta orders through the execution gateway

pub mod config;
pub mod decision;
pub mod dispatch;
pub mod exit;
pub mod gateway;
pub mod pair_engine;

pub use config::{ConfigError, EngineConfig, ExecutionMode, StrategyParams};
pub use decision::{multiplier, DecisionEngine, Direction, PositionState, TradeIntent};
pub use dispatch::{hedge_ratio, LegTarget, OrderDispatcher};
pub use exit::{DeviationReading, ExitController, ExitReason};
pub use gateway::{AccountView, ExecutionGateway, GatewayError};
pub use pair_engine::{BarOutcome, EngineError, EngineStats, PairEngine};
