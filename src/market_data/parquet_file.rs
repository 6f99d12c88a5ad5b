//! Parquet-backed bar storage
//!
//! One file per symbol and timeframe, `{data_dir}/{SYMBOL}_{tf}.parquet`.
//! Prices and volume are stored as strings to keep full decimal precision.

use super::{BarQuery, BarSeries, MarketDataError, MarketDataSource, PriceBar, Timeframe};
use arrow::array::{Array, ArrayRef, StringArray, TimestampMicrosecondArray};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use chrono::DateTime;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use rust_decimal::Decimal;
use std::fmt::Display;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

const PRICE_COLUMNS: [&str; 5] = ["open", "high", "low", "close", "volume"];

/// OHLCV bar schema
pub fn bar_schema() -> Schema {
    let mut fields = vec![Field::new(
        "timestamp",
        DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
        false,
    )];
    for name in PRICE_COLUMNS {
        fields.push(Field::new(name, DataType::Utf8, false));
    }
    Schema::new(fields)
}

/// File name for a symbol/timeframe pair
pub fn bar_file_name(symbol: &str, timeframe: Timeframe) -> String {
    format!("{}_{}.parquet", symbol.to_uppercase(), timeframe)
}

fn malformed(e: impl Display) -> MarketDataError {
    MarketDataError::Malformed(e.to_string())
}

/// Write bars to a Parquet file, creating parent directories
pub fn write_bars(path: &Path, bars: &[PriceBar]) -> Result<(), MarketDataError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let schema = Arc::new(bar_schema());
    let file = File::create(path)?;

    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();

    let mut writer = ArrowWriter::try_new(file, schema.clone(), Some(props)).map_err(malformed)?;

    let timestamps: Vec<i64> = bars.iter().map(|b| b.timestamp.timestamp_micros()).collect();
    let mut columns: Vec<ArrayRef> =
        vec![Arc::new(TimestampMicrosecondArray::from(timestamps).with_timezone("UTC"))];

    let fields: [fn(&PriceBar) -> Decimal; 5] = [
        |b| b.open,
        |b| b.high,
        |b| b.low,
        |b| b.close,
        |b| b.volume,
    ];
    for field in fields {
        let values: Vec<String> = bars.iter().map(|b| field(b).to_string()).collect();
        columns.push(Arc::new(StringArray::from(values)));
    }

    let batch = RecordBatch::try_new(schema, columns).map_err(malformed)?;
    writer.write(&batch).map_err(malformed)?;
    writer.close().map_err(malformed)?;

    tracing::debug!(path = ?path, count = bars.len(), "Wrote bars to Parquet");
    Ok(())
}

fn string_column<'a>(
    batch: &'a RecordBatch,
    name: &str,
) -> Result<&'a StringArray, MarketDataError> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| MarketDataError::Malformed(format!("Invalid {name} column")))
}

fn decimal_at(column: &StringArray, row: usize, name: &str) -> Result<Decimal, MarketDataError> {
    if column.is_null(row) {
        return Err(MarketDataError::Malformed(format!("null {name} at row {row}")));
    }
    Decimal::from_str(column.value(row)).map_err(malformed)
}

/// Read every bar in a file
pub(crate) fn read_bars(path: &Path) -> Result<Vec<PriceBar>, MarketDataError> {
    let file = File::open(path)?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)
        .map_err(malformed)?
        .build()
        .map_err(malformed)?;

    let mut bars = Vec::new();

    for batch_result in reader {
        let batch = batch_result.map_err(malformed)?;

        let timestamps = batch
            .column_by_name("timestamp")
            .and_then(|c| c.as_any().downcast_ref::<TimestampMicrosecondArray>())
            .ok_or_else(|| MarketDataError::Malformed("Invalid timestamp column".into()))?;
        let opens = string_column(&batch, "open")?;
        let highs = string_column(&batch, "high")?;
        let lows = string_column(&batch, "low")?;
        let closes = string_column(&batch, "close")?;
        let volumes = string_column(&batch, "volume")?;

        for i in 0..batch.num_rows() {
            let timestamp = DateTime::from_timestamp_micros(timestamps.value(i)).ok_or_else(|| {
                MarketDataError::Malformed(format!("Invalid timestamp at row {i}"))
            })?;
            bars.push(PriceBar {
                timestamp,
                open: decimal_at(opens, i, "open")?,
                high: decimal_at(highs, i, "high")?,
                low: decimal_at(lows, i, "low")?,
                close: decimal_at(closes, i, "close")?,
                volume: decimal_at(volumes, i, "volume")?,
            });
        }
    }

    Ok(bars)
}

/// Reads bars from a directory of Parquet files
#[derive(Debug, Clone)]
pub struct ParquetBarSource {
    data_dir: PathBuf,
}

impl ParquetBarSource {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Path of the file holding a symbol/timeframe series
    pub fn path_for(&self, symbol: &str, timeframe: Timeframe) -> PathBuf {
        self.data_dir.join(bar_file_name(symbol, timeframe))
    }
}

#[async_trait]
impl MarketDataSource for ParquetBarSource {
    async fn fetch(&self, query: &BarQuery) -> Result<BarSeries, MarketDataError> {
        query.validate()?;

        let path = self.path_for(&query.symbol, query.timeframe);
        if !path.exists() {
            tracing::debug!(path = ?path, "No bar file for query");
            return Err(MarketDataError::unavailable(query));
        }

        let bars = tokio::task::spawn_blocking(move || read_bars(&path))
            .await
            .map_err(|e| MarketDataError::Malformed(format!("reader task failed: {e}")))??;

        let series = BarSeries::from_unsorted(bars)?.slice_for(query)?;
        if series.is_empty() {
            return Err(MarketDataError::unavailable(query));
        }

        tracing::debug!(
            symbol = %query.symbol,
            timeframe = %query.timeframe,
            bars = series.len(),
            "Loaded bars from Parquet"
        );
        Ok(series)
    }
}
