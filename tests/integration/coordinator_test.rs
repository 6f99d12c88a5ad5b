//! Job coordinator scenarios

use crate::support::{daily_series, date, fast_config, linear_closes, CountingSource};
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use trading_hub::backtest::{BacktestRequest, JobStatus};
use trading_hub::error::ErrorKind;
use trading_hub::jobs::{InMemoryJobStore, JobCoordinator, JobStore, Page, Transition};
use trading_hub::market_data::Timeframe;
use trading_hub::risk::RiskLimits;
use trading_hub::strategy::StrategyConfig;

const WAIT: Duration = Duration::from_secs(10);

async fn rising_source() -> Arc<CountingSource> {
    let source = Arc::new(CountingSource::default());
    let series = daily_series(&linear_closes(dec!(100), dec!(200), 100));
    source.inner.insert("SYMBOL1", Timeframe::D1, series).await;
    source
}

fn request(bot: &str, strategy: StrategyConfig) -> BacktestRequest {
    BacktestRequest::new(
        bot,
        strategy,
        "SYMBOL1",
        Timeframe::D1,
        date(2024, 1, 1),
        date(2024, 4, 9),
        dec!(10000),
    )
}

#[tokio::test]
async fn test_submit_is_idempotent_and_runs_once() {
    let source = rising_source().await;
    let coordinator =
        JobCoordinator::start(fast_config(), Arc::new(InMemoryJobStore::new()), source.clone());
    let req = request("bot-1", StrategyConfig::ma_cross(5, 20));

    let job_id = coordinator.submit(&req).await.unwrap();
    assert_eq!(coordinator.submit(&req).await.unwrap(), job_id);

    let result = coordinator.wait_for_terminal(job_id, WAIT).await.unwrap();
    assert_eq!(result.status, JobStatus::Completed);
    assert_eq!(result.bars_processed, 100);
    assert!(result.metrics.as_ref().unwrap().total_return > Decimal::ZERO);

    assert_eq!(coordinator.submit(&req).await.unwrap(), job_id);
    let by_request = coordinator.status_for_request(req.id).await.unwrap().unwrap();
    assert_eq!(by_request.job_id, job_id);
    assert_eq!(source.fetches(), 1);

    assert_eq!(coordinator.equity_curve(job_id).await.unwrap().len(), 100);
    assert_eq!(coordinator.trades(job_id).await.unwrap().len(), 1);
    coordinator.shutdown().await;
}

#[tokio::test]
async fn test_overflowing_prices_keep_partial_run() {
    let source = Arc::new(CountingSource::default());
    let low = dec!(100000000000000000000);
    let high = dec!(300000000000000000000);
    let closes: Vec<Decimal> = (0..10)
        .map(|i| if i % 2 == 0 { low } else { high })
        .collect();
    let series = daily_series(&closes);
    source.inner.insert("SYMBOL1", Timeframe::D1, series).await;
    let coordinator =
        JobCoordinator::start(fast_config(), Arc::new(InMemoryJobStore::new()), source);
    let strategy = StrategyConfig::new("mean_reversion")
        .with_param("period", 5i64);
    let req = request("bot-1", strategy);

    let job_id = coordinator.submit(&req).await.unwrap();
    let result = coordinator.wait_for_terminal(job_id, WAIT).await.unwrap();
    assert_eq!(result.status, JobStatus::Failed);
    assert_eq!(result.error.unwrap().kind, ErrorKind::SimulationFault);
    assert_eq!(result.bars_processed, 4);
    assert_eq!(result.final_equity, Some(dec!(10000)));

    let curve = coordinator.equity_curve(job_id).await.unwrap();
    assert_eq!(curve.len(), 4);
    coordinator.shutdown().await;
}

#[tokio::test]
async fn test_invalid_range_never_runs() {
    let source = rising_source().await;
    let coordinator =
        JobCoordinator::start(fast_config(), Arc::new(InMemoryJobStore::new()), source.clone());
    let mut req = request("bot-1", StrategyConfig::ma_cross(5, 20));
    req.start = date(2024, 5, 1);
    req.end = date(2024, 1, 1);

    let job_id = coordinator.submit(&req).await.unwrap();
    let result = coordinator.wait_for_terminal(job_id, WAIT).await.unwrap();
    assert_eq!(result.status, JobStatus::Failed);
    assert_eq!(result.error.unwrap().kind, ErrorKind::InvalidRange);
    assert!(result.started_at.is_none());
    assert_eq!(source.fetches(), 0);
    coordinator.shutdown().await;
}

#[tokio::test]
async fn test_risk_warnings_reach_the_result() {
    let source = rising_source().await;
    let coordinator =
        JobCoordinator::start(fast_config(), Arc::new(InMemoryJobStore::new()), source);
    let strategy = StrategyConfig::ma_cross(5, 20)
        .with_risk(RiskLimits::default().with_max_position_size(dec!(1)));

    let job_id = coordinator.submit(&request("bot-1", strategy)).await.unwrap();
    let result = coordinator.wait_for_terminal(job_id, WAIT).await.unwrap();
    assert_eq!(result.status, JobStatus::Completed);
    assert!(!result.warnings.is_empty());
    let trades = coordinator.trades(job_id).await.unwrap();
    assert!(trades.iter().all(|t| t.size <= dec!(1)));
    coordinator.shutdown().await;
}

#[tokio::test]
async fn test_lost_worker_then_resubmission() {
    let source = rising_source().await;
    let store = Arc::new(InMemoryJobStore::new());
    let mut config = fast_config();
    config.max_run_duration = Duration::from_secs(5);
    let coordinator = JobCoordinator::start(config, store.clone(), source);

    // claimed long ago by a worker that never reported back
    let req = request("bot-1", StrategyConfig::ma_cross(5, 20));
    let long_ago = Utc::now() - chrono::Duration::minutes(10);
    let lost = store.enqueue(&req, long_ago).await.unwrap();
    store
        .transition(lost.job_id, JobStatus::Queued, Transition::Start { at: long_ago })
        .await
        .unwrap();

    let result = coordinator.status(lost.job_id).await.unwrap();
    assert_eq!(result.status, JobStatus::Failed);
    assert_eq!(result.error.unwrap().kind, ErrorKind::WorkerLost);

    let retried = coordinator.submit(&req).await.unwrap();
    assert_ne!(retried, lost.job_id);
    let result = coordinator.wait_for_terminal(retried, WAIT).await.unwrap();
    assert_eq!(result.status, JobStatus::Completed);
    assert_eq!(result.attempt, 2);
    coordinator.shutdown().await;
}

#[tokio::test]
async fn test_concurrent_jobs_are_isolated() {
    let source = rising_source().await;
    let coordinator = Arc::new(JobCoordinator::start(
        fast_config(),
        Arc::new(InMemoryJobStore::new()),
        source,
    ));

    let mut handles = Vec::new();
    for i in 0..8 {
        let coordinator = coordinator.clone();
        handles.push(tokio::spawn(async move {
            let req = request(&format!("bot-{}", i % 2), StrategyConfig::ma_cross(5, 20));
            let job_id = coordinator.submit(&req).await.unwrap();
            coordinator.wait_for_terminal(job_id, WAIT).await.unwrap()
        }));
    }

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap());
    }
    assert!(results.iter().all(|r| r.status == JobStatus::Completed));
    // same inputs, same outcome
    let first = &results[0];
    assert!(results
        .iter()
        .all(|r| r.final_equity == first.final_equity && r.metrics == first.metrics));

    let listed = coordinator.list_by_bot("bot-0", Page::first(10)).await.unwrap();
    assert_eq!(listed.len(), 4);
    assert!(listed.iter().all(|r| r.bot_id == "bot-0"));
    let latest = coordinator.latest_for_bot("bot-1").await.unwrap().unwrap();
    assert_eq!(latest.bot_id, "bot-1");
}
