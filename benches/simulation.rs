//! Benchmarks for the simulation loop

use chrono::NaiveDate;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rust_decimal_macros::dec;
use trading_hub::backtest::{RunControl, SimulationEngine};
use trading_hub::market_data::{BarQuery, BarSeries, SyntheticBarSource, Timeframe};
use trading_hub::portfolio::CostModel;
use trading_hub::strategy::StrategyConfig;

fn hourly_series() -> BarSeries {
    let query = BarQuery::new(
        "BENCH",
        Timeframe::H1,
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
    );
    let bars = SyntheticBarSource::new(dec!(100), 1).generate(&query);
    BarSeries::new(bars).unwrap()
}

fn run(strategy: &StrategyConfig, series: &BarSeries) -> usize {
    let mut engine = SimulationEngine::new(
        strategy.clone(),
        dec!(100000),
        CostModel::new(dec!(0.001), dec!(0.0005)),
        Timeframe::H1,
    )
    .unwrap();
    engine.run(series, &RunControl::new()).bars_processed
}

fn benchmark_ma_cross(c: &mut Criterion) {
    let series = hourly_series();
    let strategy = StrategyConfig::ma_cross(10, 50).with_param("allow_short", true);

    c.bench_function("simulate_ma_cross_h1_quarter", |b| {
        b.iter(|| run(black_box(&strategy), black_box(&series)))
    });
}

fn benchmark_mean_reversion(c: &mut Criterion) {
    let series = hourly_series();
    let strategy = StrategyConfig::new("mean_reversion")
        .with_param("period", 48i64)
        .with_param("entry_z", dec!(2));

    c.bench_function("simulate_mean_reversion_h1_quarter", |b| {
        b.iter(|| run(black_box(&strategy), black_box(&series)))
    });
}

criterion_group!(benches, benchmark_ma_cross, benchmark_mean_reversion);
criterion_main!(benches);
