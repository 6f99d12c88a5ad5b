//! Generate command implementation

use crate::config::Config;
use crate::market_data::{bar_file_name, write_bars, BarQuery, SyntheticBarSource, Timeframe};
use chrono::NaiveDate;
use clap::Args;
use rust_decimal::Decimal;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Symbol to generate, repeatable
    #[arg(long = "symbol", required = true)]
    pub symbols: Vec<String>,

    /// Bar interval: 1m, 5m, 15m, 1h, 4h or 1d
    #[arg(long, default_value = "1d")]
    pub timeframe: Timeframe,

    /// First day included (YYYY-MM-DD)
    #[arg(long)]
    pub start: NaiveDate,

    /// Last day included (YYYY-MM-DD)
    #[arg(long)]
    pub end: NaiveDate,

    /// Price of the first bar
    #[arg(long, default_value = "100")]
    pub start_price: Decimal,

    /// Random walk seed
    #[arg(short, long, default_value = "0")]
    pub seed: u64,

    /// Output directory (defaults to the configured data directory)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl GenerateArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let dir = self
            .output
            .clone()
            .unwrap_or_else(|| config.backtest.data_dir.clone());
        std::fs::create_dir_all(&dir)?;

        let source = SyntheticBarSource::new(self.start_price, self.seed);
        for symbol in &self.symbols {
            let query = BarQuery::new(symbol.as_str(), self.timeframe, self.start, self.end);
            query.validate()?;

            let bars = source.generate(&query);
            let path = dir.join(bar_file_name(symbol, self.timeframe));
            write_bars(&path, &bars)?;
            tracing::info!(
                %symbol,
                timeframe = %self.timeframe,
                bars = bars.len(),
                ?path,
                "Wrote synthetic bars"
            );
        }
        Ok(())
    }
}
