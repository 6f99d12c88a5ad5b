//! Job coordinator
//!
//! Accepts backtest requests, dispatches them to a fixed worker pool and
//! answers status queries from the store. A periodic reconciliation pass
//! fails running jobs whose worker went silent and re-dispatches queued jobs
//! that were never picked up.

use super::worker::run_worker;
use super::{
    retry, CoordinatorConfig, CoordinatorError, JobEvent, JobStore, Page, ReconcileReport,
    StoreError, Transition,
};
use crate::backtest::{
    BacktestRequest, BacktestResult, EquityPoint, JobId, JobStatus, RequestId, RunControl,
};
use crate::error::{ErrorKind, JobError};
use crate::market_data::MarketDataSource;
use crate::portfolio::Trade;
use crate::telemetry::{increment, record_job_finished, set_gauge, CounterMetric, GaugeMetric};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

const EVENT_CAPACITY: usize = 256;
const MIN_TICK: Duration = Duration::from_millis(1);

/// State shared by the coordinator, its workers and the reconciler
pub(crate) struct Shared {
    pub(crate) store: Arc<dyn JobStore>,
    pub(crate) data: Arc<dyn MarketDataSource>,
    pub(crate) config: CoordinatorConfig,
    pub(crate) active: RwLock<HashMap<JobId, Arc<RunControl>>>,
    events: broadcast::Sender<JobEvent>,
    dispatch: mpsc::Sender<JobId>,
}

impl Shared {
    /// Broadcast a status change
    pub(crate) fn publish(&self, result: &BacktestResult) {
        self.announce(JobEvent::from(result));
    }

    fn announce(&self, event: JobEvent) {
        // no subscribers is not an error
        let _ = self.events.send(event);
    }

    fn update_queue_depth(&self) {
        let depth = self.dispatch.max_capacity() - self.dispatch.capacity();
        set_gauge(GaugeMetric::QueueDepth, depth as f64);
    }

    async fn load(&self, job_id: JobId) -> Result<BacktestResult, CoordinatorError> {
        retry(&self.config.retry, "load", || self.store.load(job_id))
            .await?
            .ok_or(CoordinatorError::NotFound(job_id))
    }

    /// Fail `job` as lost if it is running without recent progress
    ///
    /// Returns the job as it stands afterwards.
    async fn check_stale(
        &self,
        job: BacktestResult,
        now: DateTime<Utc>,
    ) -> Result<BacktestResult, StoreError> {
        if job.status != JobStatus::Running {
            return Ok(job);
        }
        let last_seen = job
            .last_progress_at
            .or(job.started_at)
            .unwrap_or(job.submitted_at);
        if now.signed_duration_since(last_seen) <= self.config.stale_after() {
            return Ok(job);
        }

        let error = JobError::new(
            ErrorKind::WorkerLost,
            format!("no progress since {}", last_seen.to_rfc3339()),
        );
        let transition = Transition::Fail {
            at: now,
            error,
            final_equity: None,
            bars_processed: job.bars_processed,
            warnings: Vec::new(),
        };
        let failed = retry(&self.config.retry, "fail_lost", || {
            self.store
                .transition(job.job_id, JobStatus::Running, transition.clone())
        })
        .await?;

        match failed {
            Some(failed) => {
                tracing::warn!(
                    job_id = %failed.job_id,
                    request_id = %failed.request_id,
                    bars = failed.bars_processed,
                    %last_seen,
                    "Job lost, marked failed"
                );
                increment(CounterMetric::JobsReconciled, 1);
                record_job_finished(JobStatus::Failed);
                // a slow but live engine must not keep running
                if let Some(control) = self.active.read().await.get(&failed.job_id) {
                    control.cancel();
                }
                self.publish(&failed);
                Ok(failed)
            }
            // finished in the meantime
            None => Ok(self.store.load(job.job_id).await?.unwrap_or(job)),
        }
    }

    async fn reconcile(&self) -> Result<ReconcileReport, StoreError> {
        let now = Utc::now();
        let mut report = ReconcileReport::default();

        let running = retry(&self.config.retry, "list_running", || {
            self.store.list_by_status(JobStatus::Running)
        })
        .await?;
        for job in running {
            let job_id = job.job_id;
            if self.check_stale(job, now).await?.status == JobStatus::Failed {
                report.lost.push(job_id);
            }
        }

        let queued = retry(&self.config.retry, "list_queued", || {
            self.store.list_by_status(JobStatus::Queued)
        })
        .await?;
        for job in queued {
            if now.signed_duration_since(job.submitted_at) <= self.config.stale_after() {
                continue;
            }
            // duplicates are harmless: workers claim with compare-and-set
            if self.dispatch.try_send(job.job_id).is_err() {
                break;
            }
            report.redispatched += 1;
        }

        self.update_queue_depth();
        Ok(report)
    }
}

/// Runs backtest jobs on a fixed worker pool
pub struct JobCoordinator {
    shared: Arc<Shared>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl JobCoordinator {
    /// Spawn the workers and the reconciliation loop
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(
        mut config: CoordinatorConfig,
        store: Arc<dyn JobStore>,
        data: Arc<dyn MarketDataSource>,
    ) -> Self {
        config.workers = config.workers.max(1);
        config.queue_capacity = config.queue_capacity.max(1);
        config.heartbeat_interval = config.heartbeat_interval.max(MIN_TICK);
        config.reconcile_interval = config.reconcile_interval.max(MIN_TICK);

        let (dispatch, queue) = mpsc::channel(config.queue_capacity);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (shutdown, shutdown_rx) = watch::channel(false);

        let workers = config.workers;
        tracing::info!(
            workers,
            queue_capacity = config.queue_capacity,
            max_run_duration_secs = config.max_run_duration.as_secs(),
            "Starting job coordinator"
        );

        let shared = Arc::new(Shared {
            store,
            data,
            config,
            active: RwLock::new(HashMap::new()),
            events,
            dispatch,
        });

        let queue = Arc::new(Mutex::new(queue));
        let mut tasks = Vec::with_capacity(workers + 1);
        for worker in 0..workers {
            tasks.push(tokio::spawn(run_worker(
                worker,
                shared.clone(),
                queue.clone(),
                shutdown_rx.clone(),
            )));
        }
        tasks.push(tokio::spawn(reconcile_loop(shared.clone(), shutdown_rx)));

        Self {
            shared,
            shutdown,
            tasks,
        }
    }

    /// Submit a request and return the job that covers it
    ///
    /// Resubmitting a request that is queued, running or completed returns
    /// the existing job without running anything again.
    pub async fn submit(&self, request: &BacktestRequest) -> Result<JobId, CoordinatorError> {
        let shared = &self.shared;
        let now = Utc::now();
        let enqueued = retry(&shared.config.retry, "enqueue", || {
            shared.store.enqueue(request, now)
        })
        .await?;

        if !enqueued.created {
            increment(CounterMetric::JobsDeduplicated, 1);
            tracing::debug!(
                job_id = %enqueued.job_id,
                request_id = %request.id,
                status = %enqueued.status,
                "Request already covered by an existing job"
            );
            return Ok(enqueued.job_id);
        }

        increment(CounterMetric::JobsSubmitted, 1);
        tracing::info!(
            job_id = %enqueued.job_id,
            request_id = %request.id,
            bot_id = %request.bot_id,
            strategy = %request.strategy.kind,
            symbol = %request.symbol,
            "Job queued"
        );
        shared.announce(JobEvent {
            job_id: enqueued.job_id,
            request_id: request.id,
            bot_id: request.bot_id.clone(),
            status: JobStatus::Queued,
            at: now,
        });

        shared
            .dispatch
            .send(enqueued.job_id)
            .await
            .map_err(|_| CoordinatorError::QueueClosed)?;
        shared.update_queue_depth();
        Ok(enqueued.job_id)
    }

    /// Current status of a job
    ///
    /// A running job past the staleness bound is failed as lost first.
    pub async fn status(&self, job_id: JobId) -> Result<BacktestResult, CoordinatorError> {
        let job = self.shared.load(job_id).await?;
        Ok(self.shared.check_stale(job, Utc::now()).await?)
    }

    /// Current attempt for a request
    pub async fn status_for_request(
        &self,
        request_id: RequestId,
    ) -> Result<Option<BacktestResult>, CoordinatorError> {
        let shared = &self.shared;
        let found = retry(&shared.config.retry, "find_by_request", || {
            shared.store.find_by_request(request_id)
        })
        .await?;
        match found {
            Some(job) => Ok(Some(shared.check_stale(job, Utc::now()).await?)),
            None => Ok(None),
        }
    }

    /// Cancel a job
    ///
    /// Queued jobs are cancelled at once. Running jobs are flagged and stop
    /// at the next bar boundary. Terminal jobs are returned unchanged.
    pub async fn cancel(&self, job_id: JobId) -> Result<BacktestResult, CoordinatorError> {
        let shared = &self.shared;
        let current = self.status(job_id).await?;

        match current.status {
            JobStatus::Queued => {
                let cancelled = retry(&shared.config.retry, "cancel", || {
                    shared
                        .store
                        .transition(job_id, JobStatus::Queued, Transition::cancel(Utc::now()))
                })
                .await?;
                match cancelled {
                    Some(cancelled) => {
                        tracing::info!(%job_id, "Queued job cancelled");
                        record_job_finished(JobStatus::Cancelled);
                        shared.publish(&cancelled);
                        Ok(cancelled)
                    }
                    // a worker claimed it first
                    None => self.cancel_running(job_id).await,
                }
            }
            JobStatus::Running => self.cancel_running(job_id).await,
            _ => Ok(current),
        }
    }

    async fn cancel_running(&self, job_id: JobId) -> Result<BacktestResult, CoordinatorError> {
        let shared = &self.shared;
        let flagged = retry(&shared.config.retry, "request_cancel", || {
            shared.store.request_cancel(job_id)
        })
        .await?
        .ok_or(CoordinatorError::NotFound(job_id))?;

        if let Some(control) = shared.active.read().await.get(&job_id) {
            control.cancel();
        }
        tracing::info!(%job_id, status = %flagged.status, "Cancellation requested");
        Ok(flagged)
    }

    /// Run one reconciliation pass now
    pub async fn reconcile(&self) -> Result<ReconcileReport, CoordinatorError> {
        Ok(self.shared.reconcile().await?)
    }

    /// Closed trades of a finished run, empty if none were recorded
    pub async fn trades(&self, job_id: JobId) -> Result<Vec<Trade>, CoordinatorError> {
        let shared = &self.shared;
        let trades = retry(&shared.config.retry, "load_trades", || {
            shared.store.load_trades(job_id)
        })
        .await?;
        match trades {
            Some(trades) => Ok(trades),
            None => shared.load(job_id).await.map(|_| Vec::new()),
        }
    }

    /// Equity curve of a finished run, empty if none was recorded
    pub async fn equity_curve(&self, job_id: JobId) -> Result<Vec<EquityPoint>, CoordinatorError> {
        let shared = &self.shared;
        let curve = retry(&shared.config.retry, "load_equity_curve", || {
            shared.store.load_equity_curve(job_id)
        })
        .await?;
        match curve {
            Some(curve) => Ok(curve),
            None => shared.load(job_id).await.map(|_| Vec::new()),
        }
    }

    /// A bot's jobs, newest first
    pub async fn list_by_bot(
        &self,
        bot_id: &str,
        page: Page,
    ) -> Result<Vec<BacktestResult>, CoordinatorError> {
        let shared = &self.shared;
        Ok(retry(&shared.config.retry, "list_by_bot", || {
            shared.store.list_by_bot(bot_id, page)
        })
        .await?)
    }

    /// Most recently submitted job of a bot
    pub async fn latest_for_bot(
        &self,
        bot_id: &str,
    ) -> Result<Option<BacktestResult>, CoordinatorError> {
        Ok(self.list_by_bot(bot_id, Page::first(1)).await?.into_iter().next())
    }

    /// Subscribe to status changes
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.shared.events.subscribe()
    }

    /// Wait until a job reaches a terminal status
    pub async fn wait_for_terminal(
        &self,
        job_id: JobId,
        timeout: Duration,
    ) -> Result<BacktestResult, CoordinatorError> {
        let events = self.subscribe();
        tokio::time::timeout(timeout, self.await_terminal(job_id, events))
            .await
            .map_err(|_| CoordinatorError::Timeout(job_id))?
    }

    async fn await_terminal(
        &self,
        job_id: JobId,
        mut events: broadcast::Receiver<JobEvent>,
    ) -> Result<BacktestResult, CoordinatorError> {
        // polling also catches jobs whose worker died without publishing
        let mut poll = tokio::time::interval(self.shared.config.heartbeat_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let current = self.status(job_id).await?;
            if current.is_terminal() {
                return Ok(current);
            }
            poll.reset();
            loop {
                tokio::select! {
                    event = events.recv() => match event {
                        Ok(event) if event.job_id == job_id && event.status.is_terminal() => break,
                        Ok(_) => continue,
                        Err(RecvError::Lagged(_)) => break,
                        Err(RecvError::Closed) => return Err(CoordinatorError::QueueClosed),
                    },
                    _ = poll.tick() => break,
                }
            }
        }
    }

    /// Stop accepting work and wait for workers to finish their current job
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Coordinator task ended abnormally");
            }
        }
        tracing::info!("Job coordinator stopped");
    }
}

async fn reconcile_loop(shared: Arc<Shared>, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(shared.config.reconcile_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => match shared.reconcile().await {
                Ok(report) if !report.lost.is_empty() || report.redispatched > 0 => {
                    tracing::info!(
                        lost = report.lost.len(),
                        redispatched = report.redispatched,
                        "Reconciliation pass"
                    );
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "Reconciliation failed"),
            },
        }
    }
    tracing::debug!("Reconciler stopped");
}
