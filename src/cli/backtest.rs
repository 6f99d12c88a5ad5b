//! Backtest command implementation

use crate::backtest::{
    write_equity_curve, write_trades, BacktestRequest, BacktestResult, JobStatus,
};
use crate::config::Config;
use crate::jobs::{InMemoryJobStore, JobCoordinator};
use crate::market_data::{MarketDataSource, ParquetBarSource, SyntheticBarSource, Timeframe};
use crate::portfolio::Trade;
use crate::risk::{PositionSizing, RiskLimits};
use crate::strategy::{ParamValue, StrategyConfig};
use chrono::NaiveDate;
use clap::{Args, ValueEnum};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Output format for the run summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

#[derive(Args, Debug)]
pub struct BacktestArgs {
    /// Symbol to replay
    #[arg(long)]
    pub symbol: String,

    /// Bar interval: 1m, 5m, 15m, 1h, 4h or 1d
    #[arg(long, default_value = "1d")]
    pub timeframe: Timeframe,

    /// First day included (YYYY-MM-DD)
    #[arg(long)]
    pub start: NaiveDate,

    /// Last day included (YYYY-MM-DD)
    #[arg(long)]
    pub end: NaiveDate,

    /// Strategy kind: ma_cross, breakout or mean_reversion
    #[arg(long, default_value = "ma_cross")]
    pub strategy: String,

    /// Strategy parameter as name=value, repeatable
    #[arg(long = "param", value_parser = parse_param)]
    pub params: Vec<(String, ParamValue)>,

    /// Trade a fixed number of units instead of a share of equity
    #[arg(long, conflicts_with = "equity_fraction")]
    pub units: Option<Decimal>,

    /// Share of equity committed per entry
    #[arg(long)]
    pub equity_fraction: Option<Decimal>,

    /// Relative drift that triggers a resize of an open position
    #[arg(long, requires = "equity_fraction")]
    pub rebalance_tolerance: Option<Decimal>,

    /// Largest absolute position in units
    #[arg(long)]
    pub max_position: Option<Decimal>,

    /// Drawdown fraction that stops new exposure
    #[arg(long)]
    pub max_drawdown: Option<Decimal>,

    /// Initial capital (defaults to the configured value)
    #[arg(long)]
    pub capital: Option<Decimal>,

    /// Directory containing Parquet bar files (defaults to the configured value)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Replay generated bars instead of Parquet files
    #[arg(long)]
    pub synthetic: bool,

    /// Seed for synthetic bars
    #[arg(long, default_value = "0")]
    pub seed: u64,

    /// Bot the request is submitted for
    #[arg(long, default_value = "cli")]
    pub bot_id: String,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,

    /// Directory for Parquet exports of trades and equity curve
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Seconds to wait for the run to finish
    #[arg(long, default_value = "300")]
    pub timeout_secs: u64,
}

fn parse_param(raw: &str) -> Result<(String, ParamValue), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{raw}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing parameter name in '{raw}'"));
    }
    Ok((name.to_string(), ParamValue::parse(value.trim())))
}

impl BacktestArgs {
    /// Strategy description assembled from the flags
    pub fn strategy_config(&self) -> StrategyConfig {
        let mut strategy = StrategyConfig::new(self.strategy.as_str());
        for (name, value) in &self.params {
            strategy = strategy.with_param(name.as_str(), value.clone());
        }

        if let Some(units) = self.units {
            strategy = strategy.with_sizing(PositionSizing::FixedUnits { units });
        } else if let Some(fraction) = self.equity_fraction {
            strategy = strategy.with_sizing(PositionSizing::PercentOfEquity {
                fraction,
                rebalance_tolerance: self.rebalance_tolerance,
            });
        }

        let mut risk = RiskLimits::default();
        if let Some(max) = self.max_position {
            risk = risk.with_max_position_size(max);
        }
        if let Some(pct) = self.max_drawdown {
            risk = risk.with_max_drawdown_pct(pct);
        }
        strategy.with_risk(risk)
    }

    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let capital = self.capital.unwrap_or(config.backtest.initial_capital);
        let request = BacktestRequest::new(
            self.bot_id.as_str(),
            self.strategy_config(),
            self.symbol.as_str(),
            self.timeframe,
            self.start,
            self.end,
            capital,
        )
        .with_costs(config.engine.cost_model());

        let data: Arc<dyn MarketDataSource> = if self.synthetic {
            Arc::new(SyntheticBarSource::new(dec!(100), self.seed))
        } else {
            let dir = self
                .data_dir
                .clone()
                .unwrap_or_else(|| config.backtest.data_dir.clone());
            tracing::info!("Reading bars from {:?}...", dir);
            Arc::new(ParquetBarSource::new(dir))
        };

        let coordinator = JobCoordinator::start(
            config.coordinator.to_coordinator_config(),
            Arc::new(InMemoryJobStore::new()),
            data,
        );
        let job_id = coordinator.submit(&request).await?;
        let result = coordinator
            .wait_for_terminal(job_id, Duration::from_secs(self.timeout_secs))
            .await?;
        let trades = coordinator.trades(job_id).await?;
        let curve = coordinator.equity_curve(job_id).await?;
        coordinator.shutdown().await;

        match self.format {
            OutputFormat::Table => print_summary(&request, &result, &trades),
            OutputFormat::Json => {
                let report = serde_json::json!({
                    "request": request,
                    "result": result,
                    "trades": trades,
                });
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
        }

        if let Some(dir) = &self.output {
            std::fs::create_dir_all(dir)?;
            let trades_path = dir.join(format!("{job_id}_trades.parquet"));
            let equity_path = dir.join(format!("{job_id}_equity.parquet"));
            write_trades(&trades_path, &trades)?;
            write_equity_curve(&equity_path, &curve)?;
            tracing::info!(?trades_path, ?equity_path, "Exported run artifacts");
        }

        if result.status != JobStatus::Completed {
            match &result.error {
                Some(error) => anyhow::bail!("Backtest {}: {}", result.status, error),
                None => anyhow::bail!("Backtest {}", result.status),
            }
        }
        Ok(())
    }
}

fn print_summary(request: &BacktestRequest, result: &BacktestResult, trades: &[Trade]) {
    println!();
    println!(
        "Backtest {} {} {} .. {} ({})",
        request.symbol, request.timeframe, request.start, request.end, request.strategy.kind
    );
    println!("  Job:            {}", result.job_id);
    println!("  Status:         {}", result.status);
    println!("  Bars:           {}", result.bars_processed);
    println!("  Initial:        {}", request.initial_capital);
    if let Some(equity) = result.final_equity {
        println!("  Final equity:   {}", equity.round_dp(2));
    }
    if let Some(error) = &result.error {
        println!("  Error:          {}", error);
    }
    if !result.warnings.is_empty() {
        println!("  Risk warnings:  {}", result.warnings.len());
    }
    if let Some(metrics) = &result.metrics {
        println!();
        println!("{}", metrics.format_table());
    }
    if !trades.is_empty() {
        println!();
        println!(
            "{:>4}  {:<5}  {:<20}  {:<20}  {:>12}  {:>12}",
            "#", "Side", "Entry", "Exit", "Size", "P&L"
        );
        for trade in trades {
            println!(
                "{:>4}  {:<5}  {:<20}  {:<20}  {:>12}  {:>12}",
                trade.seq,
                trade.side.to_string(),
                trade.entry_timestamp.format("%Y-%m-%d %H:%M").to_string(),
                trade
                    .exit_timestamp
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_default(),
                trade.size.to_string(),
                trade.realized_pnl.unwrap_or(Decimal::ZERO).round_dp(2).to_string(),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_param() {
        assert_eq!(
            parse_param("fast=5").unwrap(),
            ("fast".to_string(), ParamValue::Number(dec!(5)))
        );
        assert_eq!(
            parse_param(" allow_short = false").unwrap(),
            ("allow_short".to_string(), ParamValue::Flag(false))
        );
        assert!(parse_param("fast").is_err());
        assert!(parse_param("=5").is_err());
    }
}
