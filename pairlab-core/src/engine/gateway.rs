//! Collaborator seams: order execution and account valuation.

use crate::domain::MarketOrder;
use thiserror::Error;

/// Receives market orders. Fills come back through
/// [`PairEngine::apply_fill`](crate::engine::PairEngine::apply_fill).
pub trait ExecutionGateway {
    fn place_market_order(&mut self, order: &MarketOrder) -> Result<(), GatewayError>;
}

/// Account equity as seen by the profit circuit breaker.
pub trait AccountView {
    /// Baseline equity (value at start).
    fn begin_value(&self) -> f64;
    /// Current equity.
    fn current_value(&self) -> f64;
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum GatewayError {
    #[error("order rejected for {symbol}: {reason}")]
    Rejected { symbol: String, reason: String },

    #[error("no price available for {0}")]
    NoPrice(String),

    #[error("gateway unavailable: {0}")]
    Unavailable(String),
}
