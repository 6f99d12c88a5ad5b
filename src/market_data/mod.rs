//! Historical market data module
//!
//! Supplies ordered OHLCV bars for a symbol, timeframe and day range. Every
//! source is read-only and deterministic: identical queries return identical
//! series.

mod memory;
mod parquet_file;
mod synthetic;
mod types;

pub use memory::InMemoryBarSource;
pub use parquet_file::{bar_file_name, bar_schema, write_bars, ParquetBarSource};
pub use synthetic::SyntheticBarSource;
pub use types::{BarQuery, BarSeries, PriceBar, Timeframe};

use crate::error::ErrorKind;
use async_trait::async_trait;
use thiserror::Error;

/// Market data errors
#[derive(Debug, Error)]
pub enum MarketDataError {
    /// Start after end, or unrecognized timeframe
    #[error("Invalid range: {0}")]
    InvalidRange(String),
    /// No bars for the requested range
    #[error("No data for {symbol} {timeframe} between {start} and {end}")]
    DataUnavailable {
        symbol: String,
        timeframe: Timeframe,
        start: chrono::NaiveDate,
        end: chrono::NaiveDate,
    },
    /// Stored data violates the bar contract
    #[error("Malformed market data: {0}")]
    Malformed(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MarketDataError {
    pub fn unavailable(query: &BarQuery) -> Self {
        MarketDataError::DataUnavailable {
            symbol: query.symbol.clone(),
            timeframe: query.timeframe,
            start: query.start,
            end: query.end,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            MarketDataError::InvalidRange(_) => ErrorKind::InvalidRange,
            MarketDataError::DataUnavailable { .. } => ErrorKind::DataUnavailable,
            MarketDataError::Malformed(_) | MarketDataError::Io(_) => ErrorKind::DataUnavailable,
        }
    }
}

/// Trait for historical bar sources
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Fetch the bars for a query in ascending timestamp order
    async fn fetch(&self, query: &BarQuery) -> Result<BarSeries, MarketDataError>;
}
