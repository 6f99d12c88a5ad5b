//! Simulation engine scenarios

use crate::support::{daily_series, linear_closes};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use trading_hub::backtest::{EngineState, RunControl, RunOutcome, SimulationEngine};
use trading_hub::error::ErrorKind;
use trading_hub::market_data::{BarSeries, Timeframe};
use trading_hub::portfolio::{CostModel, Side};
use trading_hub::risk::{DowngradeReason, RiskLimits};
use trading_hub::strategy::StrategyConfig;

fn engine(strategy: StrategyConfig, costs: CostModel) -> SimulationEngine {
    SimulationEngine::new(strategy, dec!(10000), costs, Timeframe::D1).unwrap()
}

#[test]
fn test_ma_cross_on_rising_market() {
    let series = daily_series(&linear_closes(dec!(100), dec!(200), 100));
    let mut engine = engine(StrategyConfig::ma_cross(5, 20), CostModel::zero());
    let report = engine.run(&series, &RunControl::new());

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(engine.state(), EngineState::Completed);
    assert_eq!(report.equity_curve.len(), 100);
    assert_eq!(report.bars_processed, 100);
    assert_eq!(report.ledger_applications, 100);

    // one long held from the first full slow window to the final bar
    assert_eq!(report.trades.len(), 1);
    let trade = &report.trades[0];
    assert_eq!(trade.side, Side::Long);
    assert!(trade.exit_timestamp.unwrap() > trade.entry_timestamp);
    assert!(trade.realized_pnl.unwrap() > Decimal::ZERO);

    let metrics = report.metrics.unwrap();
    assert!(metrics.total_return > Decimal::ZERO);
    assert_eq!(metrics.win_rate, Decimal::ONE);
    assert_eq!(metrics.total_trades, 1);
    assert_eq!(metrics.max_drawdown, Decimal::ZERO);

    // flat after liquidation, so equity is cash
    assert!(report.final_state.is_flat());
    assert_eq!(report.final_equity, report.final_state.cash);
    assert_eq!(report.equity_curve.last().unwrap().equity, report.final_equity);
}

#[test]
fn test_position_limit_caps_size_and_warns() {
    let series = daily_series(&linear_closes(dec!(100), dec!(200), 100));
    let strategy = StrategyConfig::ma_cross(5, 20)
        .with_risk(RiskLimits::default().with_max_position_size(dec!(1)));
    let report = engine(strategy, CostModel::zero()).run(&series, &RunControl::new());

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert!(report.trades.iter().all(|t| t.size <= dec!(1)));
    assert!(!report.warnings.is_empty());
    assert!(report.warnings.iter().all(|w| w.kind() == ErrorKind::RiskLimitBreach));
    assert!(matches!(
        report.warnings[0].reason,
        DowngradeReason::MaxPositionSize { permitted, .. } if permitted == dec!(1)
    ));
}

#[test]
fn test_runs_are_deterministic() {
    let mut closes = linear_closes(dec!(100), dec!(140), 60);
    closes.extend(linear_closes(dec!(140), dec!(90), 60));
    closes.extend(linear_closes(dec!(90), dec!(130), 60));
    let series = daily_series(&closes);
    let strategy = StrategyConfig::ma_cross(3, 10).with_param("allow_short", true);
    let costs = CostModel::new(dec!(0.001), dec!(0.0005));

    let first = engine(strategy.clone(), costs).run(&series, &RunControl::new());
    let second = engine(strategy, costs).run(&series, &RunControl::new());
    assert_eq!(first.equity_curve, second.equity_curve);
    assert_eq!(first.trades, second.trades);
    assert_eq!(first.metrics, second.metrics);
    assert!(first.trades.len() >= 2);
}

#[test]
fn test_equity_reconciles_with_trade_pnl() {
    let mut closes = linear_closes(dec!(100), dec!(130), 40);
    closes.extend(linear_closes(dec!(130), dec!(95), 40));
    let series = daily_series(&closes);
    let costs = CostModel::new(dec!(0.002), dec!(0.001));
    let report = engine(StrategyConfig::ma_cross(3, 8), costs).run(&series, &RunControl::new());

    assert_eq!(report.outcome, RunOutcome::Completed);
    let realized: Decimal = report.trades.iter().filter_map(|t| t.realized_pnl).sum();
    assert_eq!(report.final_equity, dec!(10000) + realized);
    let fees: Decimal = report.trades.iter().map(|t| t.fees).sum();
    assert_eq!(report.metrics.unwrap().total_fees, fees);
}

#[test]
fn test_cancelled_before_start_keeps_capital() {
    let series = daily_series(&linear_closes(dec!(100), dec!(200), 50));
    let control = RunControl::new();
    control.cancel();
    let mut engine = engine(StrategyConfig::ma_cross(5, 20), CostModel::zero());
    let report = engine.run(&series, &control);

    assert_eq!(report.outcome, RunOutcome::Cancelled);
    assert_eq!(engine.state(), EngineState::Cancelled);
    assert!(report.equity_curve.is_empty());
    assert!(report.metrics.is_none());
    assert_eq!(report.final_equity, dec!(10000));
}

#[test]
fn test_empty_series_fails() {
    let series = BarSeries::new(Vec::new()).unwrap();
    let report = engine(StrategyConfig::ma_cross(5, 20), CostModel::zero())
        .run(&series, &RunControl::new());
    let RunOutcome::Failed(error) = report.outcome else {
        panic!("expected failure");
    };
    assert_eq!(error.kind, ErrorKind::DataUnavailable);
}

#[test]
fn test_rejects_invalid_configuration() {
    let err = SimulationEngine::new(
        StrategyConfig::new("grid"),
        dec!(10000),
        CostModel::zero(),
        Timeframe::D1,
    )
    .err()
    .unwrap();
    assert_eq!(err.kind(), ErrorKind::UnsupportedStrategy);

    let err = SimulationEngine::new(
        StrategyConfig::ma_cross(20, 5),
        dec!(10000),
        CostModel::zero(),
        Timeframe::D1,
    )
    .err()
    .unwrap();
    assert_eq!(err.kind(), ErrorKind::UnsupportedStrategy);

    assert!(SimulationEngine::new(
        StrategyConfig::ma_cross(5, 20),
        Decimal::ZERO,
        CostModel::zero(),
        Timeframe::D1,
    )
    .is_err());
}
