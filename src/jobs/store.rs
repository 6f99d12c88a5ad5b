//! Job store
//!
//! The store is the single source of truth for job status. Every status
//! change is a compare-and-set against the caller's expected status, so two
//! workers can never both claim or both finalize a job.

use super::{Enqueued, Page, StoreError, Transition};
use crate::backtest::{
    BacktestRequest, BacktestResult, EquityPoint, JobId, JobStatus, RequestId,
};
use crate::portfolio::Trade;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
#[cfg(test)]
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Repository for requests, results and run artifacts
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Create a job for `request`, or return the job that already covers it
    ///
    /// A queued, running or completed job absorbs the submission. After a
    /// failure or cancellation a new attempt with a fresh job id replaces it.
    async fn enqueue(
        &self,
        request: &BacktestRequest,
        at: DateTime<Utc>,
    ) -> Result<Enqueued, StoreError>;

    async fn load(&self, job_id: JobId) -> Result<Option<BacktestResult>, StoreError>;

    async fn load_request(&self, job_id: JobId) -> Result<Option<BacktestRequest>, StoreError>;

    /// Current attempt for a request
    async fn find_by_request(
        &self,
        request_id: RequestId,
    ) -> Result<Option<BacktestResult>, StoreError>;

    /// Apply `transition` if the job is still in `expected`
    ///
    /// Returns `Ok(None)` when another writer got there first.
    async fn transition(
        &self,
        job_id: JobId,
        expected: JobStatus,
        transition: Transition,
    ) -> Result<Option<BacktestResult>, StoreError>;

    /// Heartbeat from a running job
    ///
    /// Returns whether cancellation was requested, or `None` if the job is no
    /// longer running.
    async fn record_progress(
        &self,
        job_id: JobId,
        bars_processed: usize,
        at: DateTime<Utc>,
    ) -> Result<Option<bool>, StoreError>;

    /// Flag a running job for cancellation
    async fn request_cancel(&self, job_id: JobId) -> Result<Option<BacktestResult>, StoreError>;

    async fn save_artifacts(
        &self,
        job_id: JobId,
        trades: &[Trade],
        equity_curve: &[EquityPoint],
    ) -> Result<(), StoreError>;

    async fn load_trades(&self, job_id: JobId) -> Result<Option<Vec<Trade>>, StoreError>;

    async fn load_equity_curve(
        &self,
        job_id: JobId,
    ) -> Result<Option<Vec<EquityPoint>>, StoreError>;

    /// Current attempts of a bot's requests, newest first
    async fn list_by_bot(
        &self,
        bot_id: &str,
        page: Page,
    ) -> Result<Vec<BacktestResult>, StoreError>;

    async fn list_by_status(&self, status: JobStatus) -> Result<Vec<BacktestResult>, StoreError>;
}

struct JobRecord {
    seq: u64,
    request: BacktestRequest,
    result: BacktestResult,
    trades: Option<Vec<Trade>>,
    equity_curve: Option<Vec<EquityPoint>>,
}

#[derive(Default)]
struct Inner {
    jobs: HashMap<JobId, JobRecord>,
    current: HashMap<RequestId, JobId>,
    next_seq: u64,
}

impl Inner {
    fn record_mut(&mut self, job_id: JobId) -> Result<&mut JobRecord, StoreError> {
        self.jobs.get_mut(&job_id).ok_or(StoreError::NotFound(job_id))
    }
}

/// In-process job store
#[derive(Clone, Default)]
pub struct InMemoryJobStore {
    inner: Arc<RwLock<Inner>>,
    /// Remaining calls to fail, for outage tests
    #[cfg(test)]
    outage: Arc<AtomicU32>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(not(test))]
    fn check_available(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
impl InMemoryJobStore {
    /// Make the next `calls` operations fail with `StoreError::Unavailable`
    pub fn fail_next(&self, calls: u32) {
        self.outage.store(calls, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        let remaining = self
            .outage
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match remaining {
            Ok(_) => Err(StoreError::Unavailable("simulated outage".into())),
            Err(_) => Ok(()),
        }
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn enqueue(
        &self,
        request: &BacktestRequest,
        at: DateTime<Utc>,
    ) -> Result<Enqueued, StoreError> {
        self.check_available()?;
        let mut inner = self.inner.write().await;

        let mut attempt = 1;
        if let Some(existing) = inner
            .current
            .get(&request.id)
            .and_then(|job_id| inner.jobs.get(job_id))
        {
            match existing.result.status {
                JobStatus::Queued | JobStatus::Running | JobStatus::Completed => {
                    return Ok(Enqueued {
                        job_id: existing.result.job_id,
                        created: false,
                        status: existing.result.status,
                    });
                }
                JobStatus::Failed | JobStatus::Cancelled => attempt = existing.result.attempt + 1,
            }
        }

        let job_id = JobId::new();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.jobs.insert(
            job_id,
            JobRecord {
                seq,
                request: request.clone(),
                result: BacktestResult::queued(job_id, request, attempt, at),
                trades: None,
                equity_curve: None,
            },
        );
        inner.current.insert(request.id, job_id);

        Ok(Enqueued {
            job_id,
            created: true,
            status: JobStatus::Queued,
        })
    }

    async fn load(&self, job_id: JobId) -> Result<Option<BacktestResult>, StoreError> {
        self.check_available()?;
        let inner = self.inner.read().await;
        Ok(inner.jobs.get(&job_id).map(|r| r.result.clone()))
    }

    async fn load_request(&self, job_id: JobId) -> Result<Option<BacktestRequest>, StoreError> {
        self.check_available()?;
        let inner = self.inner.read().await;
        Ok(inner.jobs.get(&job_id).map(|r| r.request.clone()))
    }

    async fn find_by_request(
        &self,
        request_id: RequestId,
    ) -> Result<Option<BacktestResult>, StoreError> {
        self.check_available()?;
        let inner = self.inner.read().await;
        Ok(inner
            .current
            .get(&request_id)
            .and_then(|job_id| inner.jobs.get(job_id))
            .map(|r| r.result.clone()))
    }

    async fn transition(
        &self,
        job_id: JobId,
        expected: JobStatus,
        transition: Transition,
    ) -> Result<Option<BacktestResult>, StoreError> {
        self.check_available()?;
        if !transition.allowed_from(expected) {
            return Err(StoreError::InvalidTransition {
                job_id,
                from: expected,
                to: transition.target(),
            });
        }

        let mut inner = self.inner.write().await;
        let record = inner.record_mut(job_id)?;
        if record.result.status != expected {
            return Ok(None);
        }
        transition.apply_to(&mut record.result);
        Ok(Some(record.result.clone()))
    }

    async fn record_progress(
        &self,
        job_id: JobId,
        bars_processed: usize,
        at: DateTime<Utc>,
    ) -> Result<Option<bool>, StoreError> {
        self.check_available()?;
        let mut inner = self.inner.write().await;
        let record = inner.record_mut(job_id)?;
        if record.result.status != JobStatus::Running {
            return Ok(None);
        }
        record.result.bars_processed = bars_processed;
        record.result.last_progress_at = Some(at);
        Ok(Some(record.result.cancel_requested))
    }

    async fn request_cancel(&self, job_id: JobId) -> Result<Option<BacktestResult>, StoreError> {
        self.check_available()?;
        let mut inner = self.inner.write().await;
        let Some(record) = inner.jobs.get_mut(&job_id) else {
            return Ok(None);
        };
        if record.result.status == JobStatus::Running {
            record.result.cancel_requested = true;
        }
        Ok(Some(record.result.clone()))
    }

    async fn save_artifacts(
        &self,
        job_id: JobId,
        trades: &[Trade],
        equity_curve: &[EquityPoint],
    ) -> Result<(), StoreError> {
        self.check_available()?;
        let mut inner = self.inner.write().await;
        let record = inner.record_mut(job_id)?;
        if record.result.is_terminal() {
            // results never change after a terminal status
            return Ok(());
        }
        record.trades = Some(trades.to_vec());
        record.equity_curve = Some(equity_curve.to_vec());
        Ok(())
    }

    async fn load_trades(&self, job_id: JobId) -> Result<Option<Vec<Trade>>, StoreError> {
        self.check_available()?;
        let inner = self.inner.read().await;
        Ok(inner.jobs.get(&job_id).and_then(|r| r.trades.clone()))
    }

    async fn load_equity_curve(
        &self,
        job_id: JobId,
    ) -> Result<Option<Vec<EquityPoint>>, StoreError> {
        self.check_available()?;
        let inner = self.inner.read().await;
        Ok(inner.jobs.get(&job_id).and_then(|r| r.equity_curve.clone()))
    }

    async fn list_by_bot(
        &self,
        bot_id: &str,
        page: Page,
    ) -> Result<Vec<BacktestResult>, StoreError> {
        self.check_available()?;
        let inner = self.inner.read().await;
        let mut records: Vec<&JobRecord> = inner
            .current
            .values()
            .filter_map(|job_id| inner.jobs.get(job_id))
            .filter(|r| r.result.bot_id == bot_id)
            .collect();
        records.sort_by(|a, b| b.seq.cmp(&a.seq));
        Ok(records
            .into_iter()
            .skip(page.offset)
            .take(page.limit)
            .map(|r| r.result.clone())
            .collect())
    }

    async fn list_by_status(&self, status: JobStatus) -> Result<Vec<BacktestResult>, StoreError> {
        self.check_available()?;
        let inner = self.inner.read().await;
        let mut records: Vec<&JobRecord> = inner
            .jobs
            .values()
            .filter(|r| r.result.status == status)
            .collect();
        records.sort_by_key(|r| r.seq);
        Ok(records.into_iter().map(|r| r.result.clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, JobError};
    use crate::market_data::Timeframe;
    use crate::strategy::StrategyConfig;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn request(bot: &str) -> BacktestRequest {
        BacktestRequest::new(
            bot,
            StrategyConfig::ma_cross(5, 20),
            "SYMBOL1",
            Timeframe::D1,
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 4, 9).unwrap(),
            dec!(10000),
        )
    }

    #[tokio::test]
    async fn test_enqueue_is_idempotent_while_active() {
        let store = InMemoryJobStore::new();
        let req = request("bot-1");
        let first = store.enqueue(&req, Utc::now()).await.unwrap();
        let second = store.enqueue(&req, Utc::now()).await.unwrap();
        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.job_id, second.job_id);

        store
            .transition(first.job_id, JobStatus::Queued, Transition::Start { at: Utc::now() })
            .await
            .unwrap()
            .unwrap();
        let third = store.enqueue(&req, Utc::now()).await.unwrap();
        assert_eq!(third.job_id, first.job_id);
        assert_eq!(third.status, JobStatus::Running);
    }

    #[tokio::test]
    async fn test_resubmission_after_failure_creates_new_attempt() {
        let store = InMemoryJobStore::new();
        let req = request("bot-1");
        let first = store.enqueue(&req, Utc::now()).await.unwrap();
        let error = JobError::new(ErrorKind::DataUnavailable, "no bars");
        store
            .transition(first.job_id, JobStatus::Queued, Transition::fail(Utc::now(), error))
            .await
            .unwrap()
            .unwrap();

        let retry = store.enqueue(&req, Utc::now()).await.unwrap();
        assert!(retry.created);
        assert_ne!(retry.job_id, first.job_id);
        let current = store.find_by_request(req.id).await.unwrap().unwrap();
        assert_eq!(current.job_id, retry.job_id);
        assert_eq!(current.attempt, 2);
        // the old attempt stays readable
        let old = store.load(first.job_id).await.unwrap().unwrap();
        assert_eq!(old.status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn test_compare_and_set() {
        let store = InMemoryJobStore::new();
        let job = store.enqueue(&request("bot-1"), Utc::now()).await.unwrap();

        let claimed = store
            .transition(job.job_id, JobStatus::Queued, Transition::Start { at: Utc::now() })
            .await
            .unwrap();
        assert!(claimed.is_some());

        // a second claim loses
        let again = store
            .transition(job.job_id, JobStatus::Queued, Transition::Start { at: Utc::now() })
            .await
            .unwrap();
        assert!(again.is_none());

        // illegal edge is an error, not a lost race
        let err = store
            .transition(job.job_id, JobStatus::Completed, Transition::cancel(Utc::now()))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));

        let missing = store
            .transition(JobId::new(), JobStatus::Queued, Transition::cancel(Utc::now()))
            .await
            .unwrap_err();
        assert!(matches!(missing, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_progress_and_cancel_flag() {
        let store = InMemoryJobStore::new();
        let job = store.enqueue(&request("bot-1"), Utc::now()).await.unwrap();
        assert_eq!(
            store.record_progress(job.job_id, 1, Utc::now()).await.unwrap(),
            None
        );

        store
            .transition(job.job_id, JobStatus::Queued, Transition::Start { at: Utc::now() })
            .await
            .unwrap();
        assert_eq!(
            store.record_progress(job.job_id, 10, Utc::now()).await.unwrap(),
            Some(false)
        );
        store.request_cancel(job.job_id).await.unwrap();
        assert_eq!(
            store.record_progress(job.job_id, 20, Utc::now()).await.unwrap(),
            Some(true)
        );
        let result = store.load(job.job_id).await.unwrap().unwrap();
        assert_eq!(result.bars_processed, 20);
        assert!(result.cancel_requested);
    }

    #[tokio::test]
    async fn test_list_by_bot_newest_first() {
        let store = InMemoryJobStore::new();
        let mut ids = Vec::new();
        for _ in 0..3 {
            ids.push(store.enqueue(&request("bot-1"), Utc::now()).await.unwrap().job_id);
        }
        store.enqueue(&request("bot-2"), Utc::now()).await.unwrap();

        let page = store.list_by_bot("bot-1", Page::first(2)).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].job_id, ids[2]);
        assert_eq!(page[1].job_id, ids[1]);

        let rest = store
            .list_by_bot("bot-1", Page { offset: 2, limit: 10 })
            .await
            .unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].job_id, ids[0]);
    }

    #[tokio::test]
    async fn test_simulated_outage() {
        let store = InMemoryJobStore::new();
        store.fail_next(2);
        assert!(matches!(
            store.load(JobId::new()).await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(store.load(JobId::new()).await.is_err());
        assert!(store.load(JobId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_artifacts_frozen_after_terminal() {
        let store = InMemoryJobStore::new();
        let job = store.enqueue(&request("bot-1"), Utc::now()).await.unwrap();
        store.save_artifacts(job.job_id, &[], &[]).await.unwrap();
        store
            .transition(job.job_id, JobStatus::Queued, Transition::cancel(Utc::now()))
            .await
            .unwrap();
        let point = EquityPoint {
            timestamp: Utc::now(),
            equity: dec!(1),
        };
        store.save_artifacts(job.job_id, &[], &[point]).await.unwrap();
        assert_eq!(
            store.load_equity_curve(job.job_id).await.unwrap(),
            Some(Vec::new())
        );
    }
}
