//! Shared fixtures

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use trading_hub::jobs::{CoordinatorConfig, RetryPolicy};
use trading_hub::market_data::{
    BarQuery, BarSeries, InMemoryBarSource, MarketDataError, MarketDataSource, PriceBar,
};

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Daily flat bars from 2024-01-01 with the given closes
pub fn daily_series(closes: &[Decimal]) -> BarSeries {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let bars = closes
        .iter()
        .enumerate()
        .map(|(i, close)| {
            PriceBar::flat(start + chrono::Duration::days(i as i64), *close, dec!(1000))
        })
        .collect();
    BarSeries::new(bars).unwrap()
}

/// `count` closes moving linearly from `from` to `to`, at 4 decimal places
pub fn linear_closes(from: Decimal, to: Decimal, count: usize) -> Vec<Decimal> {
    let step = (to - from) / Decimal::from(count - 1);
    (0..count)
        .map(|i| (from + step * Decimal::from(i)).round_dp(4))
        .collect()
}

pub fn fast_config() -> CoordinatorConfig {
    CoordinatorConfig {
        workers: 2,
        queue_capacity: 16,
        max_run_duration: Duration::from_secs(60),
        reconcile_interval: Duration::from_secs(3600),
        heartbeat_interval: Duration::from_millis(10),
        retry: RetryPolicy {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            max_attempts: 5,
        },
    }
}

/// Wraps a source and counts fetches
#[derive(Default)]
pub struct CountingSource {
    pub inner: InMemoryBarSource,
    fetches: AtomicUsize,
}

impl CountingSource {
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MarketDataSource for CountingSource {
    async fn fetch(&self, query: &BarQuery) -> Result<BarSeries, MarketDataError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.inner.fetch(query).await
    }
}
