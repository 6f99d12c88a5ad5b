//! Backtest result records

use super::{BacktestRequest, JobId, RequestId, SummaryMetrics};
use crate::error::JobError;
use crate::risk::RiskWarning;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Job lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One point of the equity curve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub equity: Decimal,
}

/// Status and outcome of one job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub job_id: JobId,
    pub request_id: RequestId,
    pub bot_id: String,
    /// 1 for the first run of a request, incremented on each resubmission
    pub attempt: u32,
    pub status: JobStatus,
    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Last heartbeat written by the worker
    pub last_progress_at: Option<DateTime<Utc>>,
    pub bars_processed: usize,
    pub final_equity: Option<Decimal>,
    pub metrics: Option<SummaryMetrics>,
    #[serde(default)]
    pub warnings: Vec<RiskWarning>,
    pub error: Option<JobError>,
    #[serde(default)]
    pub cancel_requested: bool,
}

impl BacktestResult {
    /// Fresh record for a newly enqueued attempt
    pub fn queued(
        job_id: JobId,
        request: &BacktestRequest,
        attempt: u32,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            job_id,
            request_id: request.id,
            bot_id: request.bot_id.clone(),
            attempt,
            status: JobStatus::Queued,
            submitted_at: at,
            started_at: None,
            finished_at: None,
            last_progress_at: None,
            bars_processed: 0,
            final_equity: None,
            metrics: None,
            warnings: Vec::new(),
            error: None,
            cancel_requested: false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Time spent running, once finished
    pub fn run_duration(&self) -> Option<chrono::Duration> {
        Some(self.finished_at? - self.started_at?)
    }
}
