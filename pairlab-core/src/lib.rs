//! PairLab Core: statistical-arbitrage engine for one correlated instrument pair.
//!
//! This crate contains the whole decision pipeline:
//! - Domain types (candles, instruments, orders, fills, position legs)
//! - Stream synchronizer joining independently clocked feeds
//! - Rolling calibration of the price mapping between the two instruments
//! - Deviation history with an adaptive entry threshold
//! - Decision engine, exit controller and order dispatcher
//!
//! Execution and account valuation are collaborators behind the
//! [`engine::ExecutionGateway`] and [`engine::AccountView`] traits.

pub mod calibration;
pub mod deviation;
pub mod domain;
pub mod engine;
pub mod sync;
