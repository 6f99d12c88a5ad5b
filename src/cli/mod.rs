//! CLI interface for trading-hub
//!
//! Provides subcommands for:
//! - `backtest`: Run one backtest request through the job coordinator
//! - `generate`: Write synthetic bar files
//! - `config`: Show configuration

mod backtest;
mod generate;

pub use backtest::{BacktestArgs, OutputFormat};
pub use generate::GenerateArgs;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "trading-hub")]
#[command(about = "Backtest execution pipeline for trading bot strategies")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a backtest and print its summary
    Backtest(BacktestArgs),
    /// Write synthetic bars in the Parquet bar format
    Generate(GenerateArgs),
    /// Show configuration
    Config,
}
