//! Worker loop and per-job execution

use super::coordinator::Shared;
use super::{retry, StoreError, Transition};
use crate::backtest::{
    BacktestRequest, JobId, JobStatus, RunControl, RunOutcome, SimulationEngine, SimulationReport,
};
use crate::error::{ErrorKind, JobError};
use crate::market_data::BarQuery;
use crate::telemetry::{
    adjust_gauge, increment, record_job_finished, record_run_duration, CounterMetric, GaugeMetric,
};
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinError;
use tokio::time::MissedTickBehavior;

/// Pull job ids off the shared queue until shutdown
pub(super) async fn run_worker(
    worker: usize,
    shared: Arc<Shared>,
    queue: Arc<Mutex<mpsc::Receiver<JobId>>>,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::debug!(worker, "Worker started");
    loop {
        if *shutdown.borrow() {
            break;
        }
        let next = {
            let mut queue = queue.lock().await;
            tokio::select! {
                biased;
                _ = shutdown.changed() => None,
                job = queue.recv() => job,
            }
        };
        let Some(job_id) = next else {
            break;
        };
        if let Err(e) = execute(&shared, job_id).await {
            tracing::error!(worker, %job_id, error = %e, "Job execution aborted");
        }
    }
    tracing::debug!(worker, "Worker stopped");
}

/// Validate, claim and run one job
///
/// Anything that can be rejected without data (strategy, capital, date
/// range) fails the job straight from Queued. Duplicate deliveries lose the
/// Queued -> Running claim and are dropped.
pub(super) async fn execute(shared: &Shared, job_id: JobId) -> Result<(), StoreError> {
    let policy = shared.config.retry;
    let store = &shared.store;

    let Some(current) = retry(&policy, "load", || store.load(job_id)).await? else {
        tracing::warn!(%job_id, "Dispatched job not found");
        return Ok(());
    };
    if current.status != JobStatus::Queued {
        tracing::debug!(%job_id, status = %current.status, "Skipping job that is not queued");
        return Ok(());
    }
    let loaded = retry(&policy, "load_request", || store.load_request(job_id)).await?;
    let Some(request) = loaded else {
        tracing::warn!(%job_id, "Request missing for queued job");
        return Ok(());
    };

    let engine = match SimulationEngine::from_request(&request) {
        Ok(engine) => engine,
        Err(e) => {
            let error = JobError::new(e.kind(), e.to_string());
            let transition = Transition::fail(Utc::now(), error);
            return finish(shared, job_id, JobStatus::Queued, transition).await;
        }
    };
    let query = request.query();
    if let Err(e) = query.validate() {
        let error = JobError::new(e.kind(), e.to_string());
        let transition = Transition::fail(Utc::now(), error);
        return finish(shared, job_id, JobStatus::Queued, transition).await;
    }

    let started_at = Utc::now();
    let claimed = retry(&policy, "claim", || {
        store.transition(job_id, JobStatus::Queued, Transition::Start { at: started_at })
    })
    .await?;
    let Some(running) = claimed else {
        tracing::debug!(%job_id, "Job claimed or cancelled elsewhere");
        return Ok(());
    };
    shared.publish(&running);
    tracing::info!(
        %job_id,
        request_id = %request.id,
        bot_id = %request.bot_id,
        attempt = running.attempt,
        symbol = %request.symbol,
        timeframe = %request.timeframe,
        "Job running"
    );

    adjust_gauge(GaugeMetric::JobsRunning, 1.0);
    let timer = Instant::now();
    let result = run_claimed(shared, job_id, &request, engine, &query).await;
    adjust_gauge(GaugeMetric::JobsRunning, -1.0);
    record_run_duration(timer.elapsed());
    result
}

async fn run_claimed(
    shared: &Shared,
    job_id: JobId,
    request: &BacktestRequest,
    engine: SimulationEngine,
    query: &BarQuery,
) -> Result<(), StoreError> {
    // registered before the fetch so a cancel during it reaches the engine
    let control = Arc::new(RunControl::new());
    shared.active.write().await.insert(job_id, control.clone());
    let transition = run_engine(shared, job_id, request, engine, query, control).await;
    shared.active.write().await.remove(&job_id);
    finish(shared, job_id, JobStatus::Running, transition?).await
}

async fn run_engine(
    shared: &Shared,
    job_id: JobId,
    request: &BacktestRequest,
    engine: SimulationEngine,
    query: &BarQuery,
    control: Arc<RunControl>,
) -> Result<Transition, StoreError> {
    // a slow source still counts as a live worker
    let fetched = supervise(shared, job_id, &control, shared.data.fetch(query)).await;
    let series = match fetched {
        Ok(series) => series,
        Err(e) => {
            let error = JobError::new(e.kind(), e.to_string());
            return Ok(Transition::fail(Utc::now(), error));
        }
    };
    tracing::debug!(%job_id, request_id = %request.id, bars = series.len(), "Fetched bars");

    let handle = tokio::task::spawn_blocking({
        let control = control.clone();
        move || {
            let mut engine = engine;
            engine.run(&series, &control)
        }
    });

    match supervise(shared, job_id, &control, handle).await {
        Ok(report) => {
            retry(&shared.config.retry, "save_artifacts", || {
                shared
                    .store
                    .save_artifacts(job_id, &report.trades, &report.equity_curve)
            })
            .await?;
            Ok(report_transition(report))
        }
        Err(e) => {
            let error = JobError::new(ErrorKind::SimulationFault, panic_message(e));
            Ok(Transition::fail(Utc::now(), error))
        }
    }
}

/// Drive `work` to completion while writing heartbeats
///
/// A heartbeat answer relays cancellation requests into the engine, and a
/// job that is no longer Running (reconciled as lost) stops it.
async fn supervise<F: Future>(
    shared: &Shared,
    job_id: JobId,
    control: &RunControl,
    work: F,
) -> F::Output {
    tokio::pin!(work);
    let mut ticker = tokio::time::interval(shared.config.heartbeat_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            output = &mut work => return output,
            _ = ticker.tick() => {
                let bars = control.bars_processed();
                let heartbeat = retry(&shared.config.retry, "heartbeat", || {
                    shared.store.record_progress(job_id, bars, Utc::now())
                })
                .await;
                match heartbeat {
                    Ok(Some(false)) => {}
                    Ok(Some(true)) => {
                        if !control.is_cancelled() {
                            tracing::info!(%job_id, bars, "Cancellation requested, stopping run");
                            control.cancel();
                        }
                    }
                    Ok(None) => {
                        tracing::warn!(%job_id, "Job no longer running, stopping run");
                        control.cancel();
                    }
                    Err(e) => tracing::warn!(%job_id, error = %e, "Heartbeat failed"),
                }
            }
        }
    }
}

fn report_transition(report: SimulationReport) -> Transition {
    let at = Utc::now();
    let SimulationReport {
        outcome,
        metrics,
        final_equity,
        bars_processed,
        warnings,
        ..
    } = report;
    match outcome {
        RunOutcome::Completed => Transition::Complete {
            at,
            final_equity,
            metrics: metrics.unwrap_or_default(),
            bars_processed,
            warnings,
        },
        RunOutcome::Failed(error) => Transition::Fail {
            at,
            error,
            final_equity: Some(final_equity),
            bars_processed,
            warnings,
        },
        RunOutcome::Cancelled => Transition::Cancel {
            at,
            final_equity: Some(final_equity),
            bars_processed,
            warnings,
        },
    }
}

/// Write a terminal transition and announce it
async fn finish(
    shared: &Shared,
    job_id: JobId,
    expected: JobStatus,
    transition: Transition,
) -> Result<(), StoreError> {
    let status = transition.target();
    let finished = retry(&shared.config.retry, "finalize", || {
        shared.store.transition(job_id, expected, transition.clone())
    })
    .await?;

    let Some(result) = finished else {
        tracing::warn!(%job_id, %status, "Job already finalized, result discarded");
        return Ok(());
    };

    record_job_finished(status);
    increment(CounterMetric::BarsProcessed, result.bars_processed as u64);
    increment(CounterMetric::RiskWarnings, result.warnings.len() as u64);

    let duration_ms = result.run_duration().map(|d| d.num_milliseconds());
    match &result.error {
        None => tracing::info!(
            %job_id,
            request_id = %result.request_id,
            %status,
            bars = result.bars_processed,
            final_equity = ?result.final_equity,
            warnings = result.warnings.len(),
            duration_ms,
            "Job finished"
        ),
        Some(error) => tracing::warn!(
            %job_id,
            request_id = %result.request_id,
            %status,
            kind = %error.kind,
            error = %error.message,
            bars = result.bars_processed,
            "Job failed"
        ),
    }
    shared.publish(&result);
    Ok(())
}

fn panic_message(error: JoinError) -> String {
    if !error.is_panic() {
        return "engine task cancelled".to_string();
    }
    let payload = error.into_panic();
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("engine panicked: {detail}")
}
