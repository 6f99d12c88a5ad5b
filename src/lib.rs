//! trading-hub: Backtest execution pipeline for trading bot strategies
//!
//! This library provides the core components for:
//! - Historical OHLCV bars from Parquet, memory or a seeded random walk
//! - Moving-average cross, breakout and mean-reversion strategies
//! - Position sizing, position limits and drawdown stops
//! - A portfolio ledger with commission and slippage
//! - Deterministic bar-by-bar simulation with summary metrics
//! - Idempotent job submission, a worker pool and lost-job reconciliation
//! - Structured logging and Prometheus metrics

pub mod backtest;
pub mod cli;
pub mod config;
pub mod error;
pub mod jobs;
pub mod market_data;
pub mod portfolio;
pub mod risk;
pub mod strategy;
pub mod telemetry;
