//! The owning engine object: one per traded pair.
//!
//! Per combined candle the pipeline runs in a fixed order:
//! calibration, deviation history, threshold, exit check, entry decision,
//! dispatch. An exit on a bar suppresses the entry decision for that bar.

use super::config::{ConfigError, EngineConfig};
use super::decision::{DecisionEngine, PositionState, TradeIntent};
use super::dispatch::OrderDispatcher;
use super::exit::{DeviationReading, ExitController, ExitReason};
use super::gateway::{AccountView, ExecutionGateway};
use crate::calibration::{CalibrationEstimator, CalibrationState};
use crate::deviation::{ClosePoint, DeviationCalculator, DeviationHistory};
use crate::domain::{CandleSample, CombinedCandle, Fill, InstrumentRole, Legs, MarketOrder};
use crate::sync::StreamSynchronizer;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error, PartialEq)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("fill for {0} leg, which this engine does not trade")]
    UnknownLeg(InstrumentRole),
}

/// Counters exposed for monitoring and run artifacts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    pub combined_events: u64,
    pub recalibrations: u64,
    /// Flat to Positioned transitions.
    pub entries: u64,
    /// Bars that added volume to an open position.
    pub scale_ins: u64,
    pub exits_reversal: u64,
    pub exits_decay: u64,
    pub exits_profit_target: u64,
    pub exits_stop: u64,
    /// Orders rejected by the execution gateway. Never retried.
    pub rejected_orders: u64,
    /// Bars without a deviation (calibration not formed yet).
    pub skipped_not_ready: u64,
    /// Candles or combined events ignored because they were not final or failed
    /// sanity checks.
    pub ignored_candles: u64,
}

impl EngineStats {
    fn record_exit(&mut self, reason: ExitReason) {
        match reason {
            ExitReason::Reversal => self.exits_reversal += 1,
            ExitReason::Decay => self.exits_decay += 1,
            ExitReason::ProfitTarget => self.exits_profit_target += 1,
            ExitReason::Stop => self.exits_stop += 1,
        }
    }

    pub fn exits(&self) -> u64 {
        self.exits_reversal + self.exits_decay + self.exits_profit_target + self.exits_stop
    }
}

/// Everything the engine decided for one combined candle.
#[derive(Debug, Clone, PartialEq)]
pub struct BarOutcome {
    pub time: DateTime<Utc>,
    pub deviation: Option<f64>,
    pub threshold: f64,
    pub exit: Option<ExitReason>,
    pub intent: Option<TradeIntent>,
    /// Orders to send, liquidation orders first.
    pub orders: Vec<MarketOrder>,
    /// True when this bar moved the engine from Flat to Positioned.
    pub entered: bool,
}

/// Pair-trading engine.
///
/// Owns all mutable state and is `Send`. It is not internally synchronized: a
/// host that delivers feeds from several threads should wrap it in a single
/// `std::sync::Mutex` and call [`PairEngine::on_candle`] under the lock.
#[derive(Debug)]
pub struct PairEngine {
    config: EngineConfig,
    synchronizer: StreamSynchronizer,
    calibration: CalibrationEstimator,
    history: DeviationHistory,
    decision: DecisionEngine,
    exit: ExitController,
    dispatcher: OrderDispatcher,
    legs: Legs,
    state: PositionState,
    stats: EngineStats,
    /// Latest combined-candle or fill time; stamps stop orders.
    last_seen: Option<DateTime<Utc>>,
}

impl PairEngine {
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let p = &config.params;
        let cross = config.cross();

        let decision = match cross {
            Some(_) => DecisionEngine::cross(p.max_deals, p.base_lot, p.use_direct_cross_rate),
            None => DecisionEngine::two_leg(p.max_deals, p.base_lot),
        };
        let legs = Legs::new(
            &config.base.symbol,
            &config.second.symbol,
            cross.map(|c| c.symbol.as_str()),
        );
        let dispatcher = OrderDispatcher::new(
            config.base.clone(),
            config.second.clone(),
            config.mode.clone(),
            p.correlation,
        );

        Ok(Self {
            synchronizer: StreamSynchronizer::new(cross.is_some(), p.sync_ttl_bars),
            calibration: CalibrationEstimator::new(p.training_range, p.retrain_interval),
            history: DeviationHistory::new(p.window_capacity()),
            decision,
            exit: ExitController::new(p.close_correction, p.profit_percent),
            dispatcher,
            legs,
            state: PositionState::Flat,
            stats: EngineStats::default(),
            last_seen: None,
            config,
        })
    }

    /// Feed one per-instrument candle. Non-final candles are ignored.
    ///
    /// Returns the outcome when this candle completed a combined event.
    pub fn on_candle<G>(
        &mut self,
        role: InstrumentRole,
        sample: CandleSample,
        gateway: &mut G,
    ) -> Option<BarOutcome>
    where
        G: ExecutionGateway + AccountView,
    {
        if !sample.is_final {
            self.stats.ignored_candles += 1;
            return None;
        }
        if !sample.is_sane() {
            warn!(%role, time = %sample.time, "ignoring malformed candle");
            self.stats.ignored_candles += 1;
            return None;
        }
        let event = self.synchronizer.push(role, sample)?;
        let outcome = self.evaluate(&event, &*gateway);
        self.dispatch(&outcome.orders, gateway);
        Some(outcome)
    }

    /// Process one combined candle and send the resulting orders.
    pub fn on_combined_candle<G>(&mut self, event: &CombinedCandle, gateway: &mut G) -> Option<TradeIntent>
    where
        G: ExecutionGateway + AccountView,
    {
        let outcome = self.evaluate(event, &*gateway);
        self.dispatch(&outcome.orders, gateway);
        outcome.intent
    }

    /// Run the pipeline for one combined candle without sending anything.
    ///
    /// State transitions are applied: the returned orders are assumed to be
    /// sent by the caller.
    ///
    /// Events with any non-final candle are ignored and leave all state as is.
    pub fn evaluate(&mut self, event: &CombinedCandle, account: &dyn AccountView) -> BarOutcome {
        let mut outcome = BarOutcome {
            time: event.time,
            deviation: None,
            threshold: 0.0,
            exit: None,
            intent: None,
            orders: Vec::new(),
            entered: false,
        };
        if !event.is_final() {
            self.stats.ignored_candles += 1;
            return outcome;
        }
        self.stats.combined_events += 1;
        self.last_seen = self.last_seen.max(Some(event.time));

        let recalibrated = self.calibration.observe(event);
        let point = ClosePoint {
            time: event.time,
            base_close: event.base.close,
            second_close: event.second.close,
        };
        let calculator = self.calculator();
        let deviation = match (recalibrated, calculator) {
            (true, Some(calc)) => {
                self.stats.recalibrations += 1;
                self.history.push(point, None);
                self.history.rebuild(&calc);
                debug!(
                    compaction = calc.calibration.compaction,
                    window = self.history.window().len(),
                    running_max = self.history.window().running_max(),
                    "deviation history rebuilt"
                );
                self.history.last_deviation()
            }
            (_, calc) => self.history.push(point, calc.as_ref()),
        };
        let threshold = self.history.threshold(self.config.params.signal_correction);
        outcome.deviation = deviation;
        outcome.threshold = threshold;

        if deviation.is_none() {
            self.stats.skipped_not_ready += 1;
        }

        let reading = deviation.map(|deviation| DeviationReading {
            deviation,
            signal_direction: self.decision.signal_direction(deviation),
            threshold,
        });
        if let Some(reason) = self.exit.evaluate(self.state, reading, account) {
            outcome.exit = Some(reason);
            outcome.orders = self.liquidate(reason, event.time);
            return outcome;
        }

        let Some(deviation) = deviation else {
            return outcome;
        };
        let previous = self.history.previous_deviation();
        let Some(intent) = self.decision.evaluate(self.state, deviation, previous, threshold) else {
            return outcome;
        };
        outcome.intent = Some(intent);

        let compaction = self.calibration.state().map_or(1.0, |c| c.compaction);
        let orders = self.dispatcher.plan(&intent, compaction, &self.legs, event.time);
        if orders.is_empty() {
            return outcome;
        }

        match self.state {
            PositionState::Flat => {
                self.state = PositionState::Positioned(intent.direction);
                self.stats.entries += 1;
                outcome.entered = true;
                info!(
                    direction = %intent.direction,
                    multiplier = intent.multiplier,
                    deviation = intent.deviation,
                    threshold = intent.threshold,
                    "entered position"
                );
            }
            PositionState::Positioned(_) => {
                self.stats.scale_ins += 1;
                info!(
                    direction = %intent.direction,
                    multiplier = intent.multiplier,
                    deviation = intent.deviation,
                    "scaled in"
                );
            }
        }
        outcome.orders = orders;
        outcome
    }

    /// Liquidate all legs and return to Flat. Returns the orders sent.
    pub fn stop<G: ExecutionGateway + ?Sized>(&mut self, gateway: &mut G) -> Vec<MarketOrder> {
        if self.state.is_flat() && self.legs.is_flat() {
            return Vec::new();
        }
        // Nothing was ever processed or filled, so there is nothing to close.
        let Some(time) = self.last_seen else {
            return Vec::new();
        };
        let orders = self.liquidate(ExitReason::Stop, time);
        self.dispatch(&orders, gateway);
        orders
    }

    /// Record a confirmed fill. The only place leg volumes change.
    ///
    /// Returns the realized P&L of the fill in price units times volume.
    pub fn apply_fill(&mut self, fill: &Fill) -> Result<f64, EngineError> {
        let leg = self
            .legs
            .get_mut(fill.role)
            .ok_or(EngineError::UnknownLeg(fill.role))?;
        let realized = leg.apply_fill(fill);
        self.last_seen = self.last_seen.max(Some(fill.time));
        Ok(realized)
    }

    fn calculator(&self) -> Option<DeviationCalculator> {
        self.calibration.state().map(|state| {
            DeviationCalculator::new(*state, self.config.params.correlation, self.config.base.price_step)
        })
    }

    fn liquidate(&mut self, reason: ExitReason, time: DateTime<Utc>) -> Vec<MarketOrder> {
        let orders = self.dispatcher.plan_liquidation(&self.legs, time);
        info!(%reason, orders = orders.len(), "liquidating position");
        self.stats.record_exit(reason);
        self.state = PositionState::Flat;
        orders
    }

    fn dispatch<G: ExecutionGateway + ?Sized>(&mut self, orders: &[MarketOrder], gateway: &mut G) {
        for order in orders {
            if let Err(err) = gateway.place_market_order(order) {
                warn!(symbol = %order.symbol, side = %order.side, volume = order.volume, error = %err, "order rejected");
                self.stats.rejected_orders += 1;
            }
        }
    }

    pub fn state(&self) -> PositionState {
        self.state
    }

    pub fn legs(&self) -> &Legs {
        &self.legs
    }

    pub fn calibration(&self) -> Option<&CalibrationState> {
        self.calibration.state()
    }

    pub fn threshold(&self) -> f64 {
        self.history.threshold(self.config.params.signal_correction)
    }

    pub fn last_deviation(&self) -> Option<f64> {
        self.history.last_deviation()
    }

    pub fn history(&self) -> &DeviationHistory {
        &self.history
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Open times dropped by the synchronizer without completing.
    pub fn dropped_sync_keys(&self) -> usize {
        self.synchronizer.dropped_keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{InstrumentSpec, OrderSide};
    use crate::engine::config::StrategyParams;
    use crate::engine::decision::Direction;
    use crate::engine::gateway::GatewayError;
    use chrono::{Duration, TimeZone};

    /// Records orders and fills everything at a fixed price.
    #[derive(Default)]
    struct Recorder {
        orders: Vec<MarketOrder>,
        reject: bool,
    }

    impl ExecutionGateway for Recorder {
        fn place_market_order(&mut self, order: &MarketOrder) -> Result<(), GatewayError> {
            if self.reject {
                return Err(GatewayError::Unavailable("closed".into()));
            }
            self.orders.push(order.clone());
            Ok(())
        }
    }

    impl AccountView for Recorder {
        fn begin_value(&self) -> f64 {
            10_000.0
        }
        fn current_value(&self) -> f64 {
            10_000.0
        }
    }

    fn at(i: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap() + Duration::hours(i)
    }

    fn config(training_range: usize) -> EngineConfig {
        let params = StrategyParams {
            training_range,
            retrain_interval: 0,
            ..StrategyParams::default()
        };
        EngineConfig::new(
            params,
            InstrumentSpec::new("AAA", 0.0001, 0.01, 0.01, 10.0, 1.0),
            InstrumentSpec::new("BBB", 0.0001, 0.01, 0.01, 10.0, 1.0),
            None,
        )
        .unwrap()
    }

    fn candle(i: i64, close: f64) -> CandleSample {
        CandleSample::new(at(i), close + 0.001, close - 0.001, close)
    }

    fn fill_all(engine: &mut PairEngine, gw: &mut Recorder) {
        for order in gw.orders.drain(..) {
            let fill = Fill {
                role: order.role,
                time: order.time,
                side: order.side,
                volume: order.volume,
                price: 1.0,
            };
            engine.apply_fill(&fill).unwrap();
        }
    }

    #[test]
    fn non_final_candles_are_ignored() {
        let mut engine = PairEngine::new(config(4)).unwrap();
        let mut gw = Recorder::default();
        let mut sample = candle(0, 1.0);
        sample.is_final = false;
        assert!(engine.on_candle(InstrumentRole::Base, sample, &mut gw).is_none());
        assert!(engine.on_candle(InstrumentRole::Second, candle(0, 1.0), &mut gw).is_none());
        assert_eq!(engine.stats().ignored_candles, 1);
        assert_eq!(engine.stats().combined_events, 0);
    }

    #[test]
    fn not_ready_until_training_window_full() {
        let mut engine = PairEngine::new(config(4)).unwrap();
        let mut gw = Recorder::default();
        for i in 0..3 {
            engine.on_candle(InstrumentRole::Base, candle(i, 1.0 + i as f64 * 0.001), &mut gw);
            let out = engine
                .on_candle(InstrumentRole::Second, candle(i, 2.0), &mut gw)
                .unwrap();
            assert_eq!(out.deviation, None);
        }
        assert_eq!(engine.stats().skipped_not_ready, 3);
        assert!(engine.calibration().is_none());
    }

    #[test]
    fn enters_on_receding_peak_and_exits_on_decay() {
        let mut engine = PairEngine::new(config(4)).unwrap();
        let mut gw = Recorder::default();

        // Base wanders while second is flat, then spikes and recedes.
        let closes = [1.000, 1.002, 1.004, 1.002, 1.010, 1.0095, 1.003];
        let mut outcomes = Vec::new();
        for (i, close) in closes.iter().enumerate() {
            let i = i as i64;
            engine.on_candle(InstrumentRole::Second, candle(i, 2.0), &mut gw);
            outcomes.push(
                engine
                    .on_candle(InstrumentRole::Base, candle(i, *close), &mut gw)
                    .unwrap(),
            );
            fill_all(&mut engine, &mut gw);
        }

        assert!(outcomes[3].deviation.is_some());
        // Peak at bar 4 has not receded yet.
        assert!(outcomes[4].intent.is_none());
        // Bar 5 recedes from the peak and stays above the threshold.
        assert!(outcomes[5].entered);
        assert_eq!(engine.stats().entries, 1);
        // Bar 6 collapses toward fair value.
        assert_eq!(outcomes[6].exit, Some(ExitReason::Decay));
        assert_eq!(engine.state(), PositionState::Flat);
        assert!(engine.legs().is_flat());
    }

    #[test]
    fn rejected_orders_are_counted_and_not_retried() {
        let mut engine = PairEngine::new(config(4)).unwrap();
        let mut gw = Recorder {
            reject: true,
            ..Recorder::default()
        };
        let closes = [1.000, 1.002, 1.004, 1.002, 1.010, 1.0095];
        for (i, close) in closes.iter().enumerate() {
            let i = i as i64;
            engine.on_candle(InstrumentRole::Second, candle(i, 2.0), &mut gw);
            engine.on_candle(InstrumentRole::Base, candle(i, *close), &mut gw);
        }
        assert_eq!(engine.stats().entries, 1);
        assert_eq!(engine.stats().rejected_orders, 2);
    }

    #[test]
    fn stop_liquidates_open_legs() {
        let mut engine = PairEngine::new(config(4)).unwrap();
        let mut gw = Recorder::default();
        engine
            .apply_fill(&Fill {
                role: InstrumentRole::Base,
                time: at(0),
                side: OrderSide::Buy,
                volume: 0.3,
                price: 1.0,
            })
            .unwrap();
        let orders = engine.stop(&mut gw);
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].side, OrderSide::Sell);
        assert_eq!(engine.stats().exits_stop, 1);
        assert_eq!(engine.state(), PositionState::Flat);
    }

    #[test]
    fn stop_closes_legs_larger_than_max_volume() {
        let mut engine = PairEngine::new(config(4)).unwrap();
        let mut gw = Recorder::default();
        for _ in 0..2 {
            engine
                .apply_fill(&Fill {
                    role: InstrumentRole::Second,
                    time: at(3),
                    side: OrderSide::Buy,
                    volume: 10.0,
                    price: 1.0,
                })
                .unwrap();
        }

        let orders = engine.stop(&mut gw);
        assert_eq!(orders.len(), 2);
        assert!(orders.iter().all(|o| o.side == OrderSide::Sell && o.volume <= 10.0));
        // Stamped with the latest fill when no bar was processed.
        assert!(orders.iter().all(|o| o.time == at(3)));

        fill_all(&mut engine, &mut gw);
        assert!(engine.legs().is_flat());
        assert!(engine.stop(&mut gw).is_empty());
    }

    #[test]
    fn non_final_combined_events_never_reach_calibration() {
        let mut engine = PairEngine::new(config(2)).unwrap();
        let mut gw = Recorder::default();
        for i in 0..2 {
            let mut base = candle(i, 1.0 + i as f64 * 0.001);
            base.is_final = false;
            let event = CombinedCandle::pair(base, candle(i, 2.0));
            assert!(engine.on_combined_candle(&event, &mut gw).is_none());
        }
        assert!(engine.calibration().is_none());
        assert_eq!(engine.history().cached_closes(), 0);
        assert_eq!(engine.stats().ignored_candles, 2);
        assert_eq!(engine.stats().combined_events, 0);

        for i in 2..4 {
            let event = CombinedCandle::pair(candle(i, 1.0 + i as f64 * 0.001), candle(i, 2.0));
            engine.on_combined_candle(&event, &mut gw);
        }
        assert!(engine.calibration().is_some());
        assert_eq!(engine.stats().combined_events, 2);
    }

    #[test]
    fn stop_when_flat_is_noop() {
        let mut engine = PairEngine::new(config(4)).unwrap();
        let mut gw = Recorder::default();
        assert!(engine.stop(&mut gw).is_empty());
        assert_eq!(engine.stats().exits(), 0);
    }

    #[test]
    fn fill_for_untraded_leg_is_an_error() {
        let mut engine = PairEngine::new(config(4)).unwrap();
        let err = engine
            .apply_fill(&Fill {
                role: InstrumentRole::Cross,
                time: at(0),
                side: OrderSide::Buy,
                volume: 0.1,
                price: 1.0,
            })
            .unwrap_err();
        assert_eq!(err, EngineError::UnknownLeg(InstrumentRole::Cross));
    }

    #[test]
    fn direction_follows_deviation_sign() {
        let engine = PairEngine::new(config(4)).unwrap();
        assert_eq!(engine.decision.signal_direction(3.0), Direction::Short);
        assert_eq!(engine.decision.signal_direction(-3.0), Direction::Long);
    }
}
