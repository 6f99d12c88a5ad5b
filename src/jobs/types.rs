//! Job coordination types

use super::RetryPolicy;
use crate::backtest::{BacktestResult, JobId, JobStatus, RequestId, SummaryMetrics};
use crate::error::JobError;
use crate::risk::RiskWarning;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Worker pool and reconciliation settings
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub workers: usize,
    /// Dispatch queue capacity; `submit` waits while it is full
    pub queue_capacity: usize,
    /// Running jobs without progress for this long are failed as lost
    pub max_run_duration: Duration,
    pub reconcile_interval: Duration,
    pub heartbeat_interval: Duration,
    pub retry: RetryPolicy,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 64,
            max_run_duration: Duration::from_secs(300),
            reconcile_interval: Duration::from_secs(30),
            heartbeat_interval: Duration::from_millis(500),
            retry: RetryPolicy::default(),
        }
    }
}

impl CoordinatorConfig {
    /// Staleness bound as a chrono duration
    pub(crate) fn stale_after(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.max_run_duration).unwrap_or(chrono::Duration::MAX)
    }
}

/// Offset pagination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub offset: usize,
    pub limit: usize,
}

impl Page {
    pub fn first(limit: usize) -> Self {
        Self { offset: 0, limit }
    }
}

/// Outcome of an enqueue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Enqueued {
    pub job_id: JobId,
    /// False when an existing job absorbed the submission
    pub created: bool,
    pub status: JobStatus,
}

/// A status change, carrying what the new status records
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Start {
        at: DateTime<Utc>,
    },
    Complete {
        at: DateTime<Utc>,
        final_equity: Decimal,
        metrics: SummaryMetrics,
        bars_processed: usize,
        warnings: Vec<RiskWarning>,
    },
    Fail {
        at: DateTime<Utc>,
        error: JobError,
        final_equity: Option<Decimal>,
        bars_processed: usize,
        warnings: Vec<RiskWarning>,
    },
    Cancel {
        at: DateTime<Utc>,
        final_equity: Option<Decimal>,
        bars_processed: usize,
        warnings: Vec<RiskWarning>,
    },
}

impl Transition {
    /// Failure before anything ran
    pub fn fail(at: DateTime<Utc>, error: JobError) -> Self {
        Transition::Fail {
            at,
            error,
            final_equity: None,
            bars_processed: 0,
            warnings: Vec::new(),
        }
    }

    /// Cancellation before anything ran
    pub fn cancel(at: DateTime<Utc>) -> Self {
        Transition::Cancel {
            at,
            final_equity: None,
            bars_processed: 0,
            warnings: Vec::new(),
        }
    }

    pub fn target(&self) -> JobStatus {
        match self {
            Transition::Start { .. } => JobStatus::Running,
            Transition::Complete { .. } => JobStatus::Completed,
            Transition::Fail { .. } => JobStatus::Failed,
            Transition::Cancel { .. } => JobStatus::Cancelled,
        }
    }

    /// Whether `from -> self.target()` is a legal edge
    pub fn allowed_from(&self, from: JobStatus) -> bool {
        matches!(
            (from, self.target()),
            (JobStatus::Queued, JobStatus::Running)
                | (JobStatus::Queued, JobStatus::Failed)
                | (JobStatus::Queued, JobStatus::Cancelled)
                | (JobStatus::Running, JobStatus::Completed)
                | (JobStatus::Running, JobStatus::Failed)
                | (JobStatus::Running, JobStatus::Cancelled)
        )
    }

    /// Write this transition onto a result
    pub(crate) fn apply_to(self, result: &mut BacktestResult) {
        result.status = self.target();
        match self {
            Transition::Start { at } => {
                result.started_at = Some(at);
                result.last_progress_at = Some(at);
            }
            Transition::Complete {
                at,
                final_equity,
                metrics,
                bars_processed,
                warnings,
            } => {
                result.finished_at = Some(at);
                result.final_equity = Some(final_equity);
                result.metrics = Some(metrics);
                result.bars_processed = bars_processed;
                result.warnings = warnings;
            }
            Transition::Fail {
                at,
                error,
                final_equity,
                bars_processed,
                warnings,
            } => {
                result.finished_at = Some(at);
                result.error = Some(error);
                result.final_equity = final_equity;
                result.bars_processed = result.bars_processed.max(bars_processed);
                result.warnings = warnings;
            }
            Transition::Cancel {
                at,
                final_equity,
                bars_processed,
                warnings,
            } => {
                result.finished_at = Some(at);
                result.final_equity = final_equity;
                result.bars_processed = result.bars_processed.max(bars_processed);
                result.warnings = warnings;
            }
        }
    }
}

/// Status change notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobEvent {
    pub job_id: JobId,
    pub request_id: RequestId,
    pub bot_id: String,
    pub status: JobStatus,
    pub at: DateTime<Utc>,
}

impl From<&BacktestResult> for JobEvent {
    fn from(result: &BacktestResult) -> Self {
        Self {
            job_id: result.job_id,
            request_id: result.request_id,
            bot_id: result.bot_id.clone(),
            status: result.status,
            at: result
                .finished_at
                .or(result.started_at)
                .unwrap_or(result.submitted_at),
        }
    }
}

/// Work done by one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Running jobs failed with `WorkerLost`
    pub lost: Vec<JobId>,
    /// Queued jobs handed to the dispatch queue again
    pub redispatched: usize,
}
