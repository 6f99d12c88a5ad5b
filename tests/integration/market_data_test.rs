//! Market data sources

use crate::support::{daily_series, date, linear_closes};
use rust_decimal_macros::dec;
use tempfile::TempDir;
use trading_hub::error::ErrorKind;
use trading_hub::market_data::{
    bar_file_name, write_bars, BarQuery, MarketDataSource, ParquetBarSource, SyntheticBarSource,
    Timeframe,
};

#[tokio::test]
async fn test_parquet_source_slices_by_day() {
    let dir = TempDir::new().unwrap();
    let series = daily_series(&linear_closes(dec!(100), dec!(150), 60));
    write_bars(
        &dir.path().join(bar_file_name("SYMBOL1", Timeframe::D1)),
        series.as_slice(),
    )
    .unwrap();

    let source = ParquetBarSource::new(dir.path());
    let query = BarQuery::new("SYMBOL1", Timeframe::D1, date(2024, 1, 10), date(2024, 1, 19));
    let sliced = source.fetch(&query).await.unwrap();
    assert_eq!(sliced.len(), 10);
    assert_eq!(sliced.first(), series.as_slice().get(9));
    assert_eq!(sliced.last(), series.as_slice().get(18));
    assert!(sliced
        .as_slice()
        .windows(2)
        .all(|w| w[0].timestamp < w[1].timestamp));
}

#[tokio::test]
async fn test_parquet_source_reports_missing_data() {
    let dir = TempDir::new().unwrap();
    let source = ParquetBarSource::new(dir.path());

    let query = BarQuery::new("NOPE", Timeframe::D1, date(2024, 1, 1), date(2024, 1, 31));
    let err = source.fetch(&query).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DataUnavailable);

    let backwards = BarQuery::new("NOPE", Timeframe::D1, date(2024, 2, 1), date(2024, 1, 1));
    let err = source.fetch(&backwards).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidRange);
}

#[tokio::test]
async fn test_synthetic_source_is_deterministic() {
    let query = BarQuery::new("SYMBOL1", Timeframe::H1, date(2024, 1, 1), date(2024, 1, 7));
    let first = SyntheticBarSource::new(dec!(100), 42).fetch(&query).await.unwrap();
    let second = SyntheticBarSource::new(dec!(100), 42).fetch(&query).await.unwrap();
    assert_eq!(first.as_slice(), second.as_slice());
    assert_eq!(first.len(), 7 * 24);
    assert!(first.iter().all(|bar| bar.low <= bar.open.min(bar.close)
        && bar.high >= bar.open.max(bar.close)));

    let other = SyntheticBarSource::new(dec!(100), 43).fetch(&query).await.unwrap();
    assert_ne!(first.as_slice(), other.as_slice());
}
