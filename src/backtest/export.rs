//! Parquet export of trades and equity curves

use super::EquityPoint;
use crate::portfolio::Trade;
use arrow::array::{ArrayRef, Int64Array, StringArray, TimestampMicrosecondArray, UInt32Array};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;

fn timestamp_field(name: &str, nullable: bool) -> Field {
    Field::new(
        name,
        DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
        nullable,
    )
}

/// Trade schema
pub fn trade_schema() -> Schema {
    Schema::new(vec![
        Field::new("seq", DataType::UInt32, false),
        Field::new("side", DataType::Utf8, false),
        timestamp_field("entry_timestamp", false),
        timestamp_field("exit_timestamp", true),
        Field::new("entry_price", DataType::Utf8, false),
        Field::new("exit_price", DataType::Utf8, true),
        Field::new("size", DataType::Utf8, false),
        Field::new("realized_pnl", DataType::Utf8, true),
        Field::new("fees", DataType::Utf8, false),
        Field::new("duration_secs", DataType::Int64, true),
    ])
}

/// Equity curve schema
pub fn equity_schema() -> Schema {
    Schema::new(vec![
        timestamp_field("timestamp", false),
        Field::new("equity", DataType::Utf8, false),
    ])
}

fn write_batch(path: &Path, schema: Arc<Schema>, columns: Vec<ArrayRef>) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(file, schema.clone(), Some(props))?;
    let batch = RecordBatch::try_new(schema, columns)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

/// Write trades to a Parquet file
pub fn write_trades(path: &Path, trades: &[Trade]) -> anyhow::Result<()> {
    let columns: Vec<ArrayRef> = vec![
        Arc::new(UInt32Array::from(
            trades.iter().map(|t| t.seq).collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from(
            trades.iter().map(|t| t.side.to_string()).collect::<Vec<_>>(),
        )),
        Arc::new(
            TimestampMicrosecondArray::from(
                trades
                    .iter()
                    .map(|t| t.entry_timestamp.timestamp_micros())
                    .collect::<Vec<_>>(),
            )
            .with_timezone("UTC"),
        ),
        Arc::new(
            TimestampMicrosecondArray::from(
                trades
                    .iter()
                    .map(|t| t.exit_timestamp.map(|ts| ts.timestamp_micros()))
                    .collect::<Vec<_>>(),
            )
            .with_timezone("UTC"),
        ),
        Arc::new(StringArray::from(
            trades
                .iter()
                .map(|t| t.entry_price.to_string())
                .collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from(
            trades
                .iter()
                .map(|t| t.exit_price.map(|p| p.to_string()))
                .collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from(
            trades.iter().map(|t| t.size.to_string()).collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from(
            trades
                .iter()
                .map(|t| t.realized_pnl.map(|p| p.to_string()))
                .collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from(
            trades.iter().map(|t| t.fees.to_string()).collect::<Vec<_>>(),
        )),
        Arc::new(Int64Array::from(
            trades
                .iter()
                .map(|t| t.duration().map(|d| d.num_seconds()))
                .collect::<Vec<_>>(),
        )),
    ];
    write_batch(path, Arc::new(trade_schema()), columns)?;
    tracing::debug!(path = ?path, count = trades.len(), "Wrote trades to Parquet");
    Ok(())
}

/// Write an equity curve to a Parquet file
pub fn write_equity_curve(path: &Path, curve: &[EquityPoint]) -> anyhow::Result<()> {
    let columns: Vec<ArrayRef> = vec![
        Arc::new(
            TimestampMicrosecondArray::from(
                curve
                    .iter()
                    .map(|p| p.timestamp.timestamp_micros())
                    .collect::<Vec<_>>(),
            )
            .with_timezone("UTC"),
        ),
        Arc::new(StringArray::from(
            curve.iter().map(|p| p.equity.to_string()).collect::<Vec<_>>(),
        )),
    ];
    write_batch(path, Arc::new(equity_schema()), columns)?;
    tracing::debug!(path = ?path, count = curve.len(), "Wrote equity curve to Parquet");
    Ok(())
}
