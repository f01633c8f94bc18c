//! Criterion benchmarks for PairLab hot paths.
//!
//! Benchmarks:
//! 1. Combined-candle pipeline (full engine per bar)
//! 2. Deviation history rebuild after recalibration
//! 3. Rolling range updates

use chrono::{DateTime, Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use pairlab_core::calibration::{CalibrationState, RollingRange};
use pairlab_core::deviation::{ClosePoint, Correlation, DeviationCalculator, DeviationHistory};
use pairlab_core::domain::{CandleSample, CombinedCandle, InstrumentSpec, MarketOrder};
use pairlab_core::engine::{
    AccountView, EngineConfig, ExecutionGateway, GatewayError, PairEngine, StrategyParams,
};

// ── Helpers ──────────────────────────────────────────────────────────

struct NullGateway;

impl ExecutionGateway for NullGateway {
    fn place_market_order(&mut self, _order: &MarketOrder) -> Result<(), GatewayError> {
        Ok(())
    }
}

impl AccountView for NullGateway {
    fn begin_value(&self) -> f64 {
        100_000.0
    }
    fn current_value(&self) -> f64 {
        100_000.0
    }
}

fn at(i: usize) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2020, 1, 2, 0, 0, 0).unwrap() + Duration::hours(i as i64)
}

fn make_events(n: usize) -> Vec<CombinedCandle> {
    (0..n)
        .map(|i| {
            let x = i as f64 * 0.05;
            let second = 0.90 + x.sin() * 0.01;
            let base = 1.30 + x.sin() * 0.02 + (x * 3.1).cos() * 0.002;
            CombinedCandle::pair(
                CandleSample::new(at(i), base + 0.0005, base - 0.0005, base),
                CandleSample::new(at(i), second + 0.0003, second - 0.0003, second),
            )
        })
        .collect()
}

fn make_config(training_range: usize) -> EngineConfig {
    let params = StrategyParams {
        training_range,
        retrain_interval: 32,
        ..StrategyParams::default()
    };
    EngineConfig::new(
        params,
        InstrumentSpec::new("EURUSD", 0.00001, 0.01, 0.01, 100.0, 1.0),
        InstrumentSpec::new("GBPUSD", 0.00001, 0.01, 0.01, 100.0, 1.0),
        None,
    )
    .unwrap()
}

// ── 1. Combined-candle pipeline ──────────────────────────────────────

fn bench_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("combined_candle_pipeline");

    for &bar_count in &[1_000, 5_000, 20_000] {
        let events = make_events(bar_count);
        let config = make_config(640);

        group.bench_with_input(BenchmarkId::new("two_leg", bar_count), &bar_count, |b, _| {
            b.iter(|| {
                let mut engine = PairEngine::new(config.clone()).unwrap();
                let mut gateway = NullGateway;
                for event in &events {
                    black_box(engine.on_combined_candle(black_box(event), &mut gateway));
                }
                engine.stats().combined_events
            });
        });
    }

    group.finish();
}

// ── 2. History rebuild ───────────────────────────────────────────────

fn bench_rebuild(c: &mut Criterion) {
    let mut group = c.benchmark_group("history_rebuild");

    let calibration = CalibrationState::from_ranges(1.33, 1.27, 0.92, 0.88, at(0));
    let calc = DeviationCalculator::new(calibration, Correlation::Direct, 0.00001);

    for &capacity in &[256, 768, 4096] {
        let mut history = DeviationHistory::new(capacity);
        for event in make_events(capacity) {
            history.push(
                ClosePoint {
                    time: event.time,
                    base_close: event.base.close,
                    second_close: event.second.close,
                },
                None,
            );
        }

        group.bench_with_input(BenchmarkId::new("replay", capacity), &capacity, |b, _| {
            b.iter(|| {
                history.rebuild(black_box(&calc));
                history.window().running_max()
            });
        });
    }

    group.finish();
}

// ── 3. Rolling range ─────────────────────────────────────────────────

fn bench_rolling_range(c: &mut Criterion) {
    let events = make_events(10_000);

    c.bench_function("rolling_range_640_x_10000", |b| {
        b.iter(|| {
            let mut range = RollingRange::new(640);
            for event in &events {
                range.push(black_box(event.base.high), black_box(event.base.low));
            }
            range.high()
        });
    });
}

criterion_group!(benches, bench_pipeline, bench_rebuild, bench_rolling_range);
criterion_main!(benches);
