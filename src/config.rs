//! Configuration types for trading-hub

use crate::jobs::{CoordinatorConfig, RetryPolicy};
use crate::portfolio::CostModel;
use crate::telemetry::LogFormat;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub backtest: BacktestDefaults,
    #[serde(default)]
    pub coordinator: CoordinatorSection,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Fill-cost policy applied to every run
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Commission as a fraction of fill notional
    #[serde(default = "default_commission_rate")]
    pub commission_rate: Decimal,
    /// Adverse price move applied to every fill
    #[serde(default)]
    pub slippage_rate: Decimal,
}

fn default_commission_rate() -> Decimal {
    Decimal::new(1, 3) // 0.001 = 0.1%
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            commission_rate: default_commission_rate(),
            slippage_rate: Decimal::ZERO,
        }
    }
}

impl EngineConfig {
    pub fn cost_model(&self) -> CostModel {
        CostModel::new(self.commission_rate, self.slippage_rate)
    }
}

/// Defaults for requests built from the CLI
#[derive(Debug, Clone, Deserialize)]
pub struct BacktestDefaults {
    #[serde(default = "default_initial_capital")]
    pub initial_capital: Decimal,
    /// Directory holding `{SYMBOL}_{tf}.parquet` bar files
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_initial_capital() -> Decimal {
    Decimal::new(100_000, 0)
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

impl Default for BacktestDefaults {
    fn default() -> Self {
        Self {
            initial_capital: default_initial_capital(),
            data_dir: default_data_dir(),
        }
    }
}

/// Worker pool and reconciliation settings
#[derive(Debug, Clone, Deserialize)]
pub struct CoordinatorSection {
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Dispatch queue capacity; submit waits when it is full
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Running jobs without progress for this long are failed as lost
    #[serde(default = "default_max_run_duration_secs")]
    pub max_run_duration_secs: u64,
    #[serde(default = "default_reconcile_interval_secs")]
    pub reconcile_interval_secs: u64,
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    #[serde(default)]
    pub retry: RetrySection,
}

fn default_workers() -> usize {
    4
}
fn default_queue_capacity() -> usize {
    64
}
fn default_max_run_duration_secs() -> u64 {
    300
}
fn default_reconcile_interval_secs() -> u64 {
    30
}
fn default_heartbeat_interval_ms() -> u64 {
    500
}

impl Default for CoordinatorSection {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            max_run_duration_secs: default_max_run_duration_secs(),
            reconcile_interval_secs: default_reconcile_interval_secs(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            retry: RetrySection::default(),
        }
    }
}

impl CoordinatorSection {
    pub fn to_coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            workers: self.workers.max(1),
            queue_capacity: self.queue_capacity.max(1),
            max_run_duration: Duration::from_secs(self.max_run_duration_secs),
            reconcile_interval: Duration::from_secs(self.reconcile_interval_secs.max(1)),
            heartbeat_interval: Duration::from_millis(self.heartbeat_interval_ms.max(1)),
            retry: self.retry.to_policy(),
        }
    }
}

/// Backoff for transient store failures
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySection {
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_initial_delay_ms() -> u64 {
    50
}
fn default_max_delay_ms() -> u64 {
    2_000
}
fn default_max_attempts() -> u32 {
    5
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl RetrySection {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            max_attempts: self.max_attempts.max(1),
        }
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
    /// Prometheus exporter port; no exporter when absent
    #[serde(default)]
    pub metrics_port: Option<u16>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::Pretty,
            metrics_port: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}
