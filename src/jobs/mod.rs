//! Job coordination module
//!
//! Owns the backtest job lifecycle: idempotent submission, a worker pool fed
//! by a bounded dispatch queue, compare-and-set status transitions in the
//! [`JobStore`], heartbeats, cancellation and reconciliation of lost runs.

mod coordinator;
mod retry;
mod store;
mod types;
mod worker;

pub use coordinator::JobCoordinator;
pub use retry::{retry, RetryPolicy};
pub use store::{InMemoryJobStore, JobStore};
pub use types::{CoordinatorConfig, Enqueued, JobEvent, Page, ReconcileReport, Transition};

use crate::backtest::{JobId, JobStatus};
use thiserror::Error;

/// Job store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Transient; retried with backoff
    #[error("Job store unavailable: {0}")]
    Unavailable(String),
    #[error("Job not found: {0}")]
    NotFound(JobId),
    #[error("Invalid transition for job {job_id}: {from} -> {to}")]
    InvalidTransition {
        job_id: JobId,
        from: JobStatus,
        to: JobStatus,
    },
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Coordinator errors
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Job not found: {0}")]
    NotFound(JobId),
    #[error("Dispatch queue closed")]
    QueueClosed,
    #[error("Timed out waiting for job {0}")]
    Timeout(JobId),
}
