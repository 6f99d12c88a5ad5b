//! Prometheus metrics

use crate::backtest::JobStatus;
use std::time::Duration;

/// Counter metric types
#[derive(Debug, Clone, Copy)]
pub enum CounterMetric {
    /// Accepted submissions that created a job
    JobsSubmitted,
    /// Submissions answered with an existing job
    JobsDeduplicated,
    /// Bars replayed across all runs
    BarsProcessed,
    /// Store calls retried after a transient error
    StoreRetries,
    /// Jobs failed by reconciliation
    JobsReconciled,
    /// Risk downgrades recorded on results
    RiskWarnings,
}

impl CounterMetric {
    fn name(&self) -> &'static str {
        match self {
            CounterMetric::JobsSubmitted => "trading_hub_jobs_submitted_total",
            CounterMetric::JobsDeduplicated => "trading_hub_jobs_deduplicated_total",
            CounterMetric::BarsProcessed => "trading_hub_bars_processed_total",
            CounterMetric::StoreRetries => "trading_hub_store_retries_total",
            CounterMetric::JobsReconciled => "trading_hub_jobs_reconciled_total",
            CounterMetric::RiskWarnings => "trading_hub_risk_warnings_total",
        }
    }
}

/// Gauge metric types
#[derive(Debug, Clone, Copy)]
pub enum GaugeMetric {
    /// Jobs currently executing
    JobsRunning,
    /// Jobs waiting for a worker
    QueueDepth,
}

impl GaugeMetric {
    fn name(&self) -> &'static str {
        match self {
            GaugeMetric::JobsRunning => "trading_hub_jobs_running",
            GaugeMetric::QueueDepth => "trading_hub_queue_depth",
        }
    }
}

/// Increment a counter
pub fn increment(metric: CounterMetric, value: u64) {
    metrics::counter!(metric.name()).increment(value);
}

/// Set a gauge value
pub fn set_gauge(metric: GaugeMetric, value: f64) {
    metrics::gauge!(metric.name()).set(value);
}

/// Adjust a gauge by `delta`
pub fn adjust_gauge(metric: GaugeMetric, delta: f64) {
    if delta >= 0.0 {
        metrics::gauge!(metric.name()).increment(delta);
    } else {
        metrics::gauge!(metric.name()).decrement(-delta);
    }
}

/// Count a job reaching a terminal status
pub fn record_job_finished(status: JobStatus) {
    metrics::counter!("trading_hub_jobs_finished_total", "status" => status.as_str()).increment(1);
}

/// Record how long a run took
pub fn record_run_duration(duration: Duration) {
    metrics::histogram!("trading_hub_run_duration_seconds").record(duration.as_secs_f64());
}
