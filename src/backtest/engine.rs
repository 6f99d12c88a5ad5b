//! Bar-by-bar simulation engine

use super::{BacktestRequest, EquityPoint, SummaryMetrics};
use crate::error::{ErrorKind, JobError};
use crate::market_data::{BarSeries, PriceBar, Timeframe};
use crate::portfolio::{CostModel, PortfolioLedger, PortfolioState, Trade, TradeEvent};
use crate::risk::RiskWarning;
use crate::strategy::{
    build_evaluator, Action, HistoryWindow, StrategyConfig, StrategyError, StrategyEvaluator,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::{debug, warn};

/// Engine lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Initialized,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// Shared between the engine and whoever supervises the run
#[derive(Debug, Default)]
pub struct RunControl {
    cancel: AtomicBool,
    bars_processed: AtomicUsize,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the engine to stop before the next bar
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    pub fn bars_processed(&self) -> usize {
        self.bars_processed.load(Ordering::Relaxed)
    }

    fn record(&self, bars: usize) {
        self.bars_processed.store(bars, Ordering::Relaxed);
    }
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Failed(JobError),
    Cancelled,
}

/// Everything a run produced, including partial output of failed runs
#[derive(Debug, Clone)]
pub struct SimulationReport {
    pub outcome: RunOutcome,
    pub equity_curve: Vec<EquityPoint>,
    /// Closed trades only
    pub trades: Vec<Trade>,
    pub warnings: Vec<RiskWarning>,
    /// Present for completed runs
    pub metrics: Option<SummaryMetrics>,
    pub final_equity: Decimal,
    pub bars_processed: usize,
    pub ledger_applications: u64,
    pub final_state: PortfolioState,
}

/// Replays one bar series through a strategy and ledger
///
/// The loop is strictly sequential: each decision sees only the bars up to
/// and including the current one, and the portfolio produced by the previous
/// bar.
pub struct SimulationEngine {
    strategy: StrategyConfig,
    evaluator: Box<dyn StrategyEvaluator>,
    initial_capital: Decimal,
    costs: CostModel,
    timeframe: Timeframe,
    state: EngineState,
}

impl SimulationEngine {
    pub fn new(
        strategy: StrategyConfig,
        initial_capital: Decimal,
        costs: CostModel,
        timeframe: Timeframe,
    ) -> Result<Self, StrategyError> {
        if initial_capital <= Decimal::ZERO {
            return Err(StrategyError::invalid(
                "initial_capital",
                format!("must be positive, got {initial_capital}"),
            ));
        }
        costs
            .validate()
            .map_err(|reason| StrategyError::invalid("costs", reason))?;
        let evaluator = build_evaluator(&strategy)?;
        Ok(Self {
            strategy,
            evaluator,
            initial_capital,
            costs,
            timeframe,
            state: EngineState::Initialized,
        })
    }

    /// Validate a request and build its engine
    pub fn from_request(request: &BacktestRequest) -> Result<Self, StrategyError> {
        Self::new(
            request.strategy.clone(),
            request.initial_capital,
            request.costs,
            request.timeframe,
        )
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Run over every bar of `series`
    pub fn run(&mut self, series: &BarSeries, control: &RunControl) -> SimulationReport {
        let bars = series.as_slice();
        let mut run = RunState::new(self.initial_capital, &self.strategy, self.costs, bars.len());

        if bars.is_empty() {
            self.state = EngineState::Failed;
            let error = JobError::new(ErrorKind::DataUnavailable, "empty bar series");
            return run.finish(RunOutcome::Failed(error), None, self.initial_capital);
        }

        self.state = EngineState::Running;
        debug!(
            strategy = %self.evaluator.kind(),
            bars = bars.len(),
            warmup = self.evaluator.warmup(),
            "simulation started"
        );

        let mut outcome = RunOutcome::Completed;
        for index in 0..bars.len() {
            if control.is_cancelled() {
                outcome = RunOutcome::Cancelled;
                break;
            }
            // a panicking bar ends the run; earlier bars are kept
            let stepped = panic::catch_unwind(AssertUnwindSafe(|| {
                self.step(bars, index, &mut run)
            }))
            .unwrap_or_else(|payload| {
                Err(JobError::new(ErrorKind::SimulationFault, panic_detail(payload)))
            });
            if let Err(error) = stepped {
                warn!(index, %error, "simulation failed");
                outcome = RunOutcome::Failed(error);
                break;
            }
            control.record(index + 1);
        }

        self.state = match outcome {
            RunOutcome::Completed => EngineState::Completed,
            RunOutcome::Failed(_) => EngineState::Failed,
            RunOutcome::Cancelled => EngineState::Cancelled,
        };

        let mut metrics = None;
        if outcome == RunOutcome::Completed {
            let computed = panic::catch_unwind(AssertUnwindSafe(|| {
                SummaryMetrics::compute(
                    &run.curve,
                    &run.trades,
                    self.initial_capital,
                    self.timeframe,
                )
            }));
            match computed {
                Ok(summary) => metrics = Some(summary),
                Err(payload) => {
                    let error = JobError::new(ErrorKind::SimulationFault, panic_detail(payload));
                    warn!(%error, "metrics failed");
                    self.state = EngineState::Failed;
                    outcome = RunOutcome::Failed(error);
                }
            }
        }
        debug!(
            state = ?self.state,
            bars = run.curve.len(),
            trades = run.trades.len(),
            "simulation finished"
        );
        run.finish(outcome, metrics, self.initial_capital)
    }

    fn step(&self, bars: &[PriceBar], index: usize, run: &mut RunState) -> Result<(), JobError> {
        let bar = &bars[index];
        let last = index + 1 == bars.len();
        let window = HistoryWindow::up_to(bars, index)
            .ok_or_else(|| JobError::new(ErrorKind::SimulationFault, "bar index out of range"))?;

        let mut action = self
            .evaluator
            .decide(&window, &run.portfolio, &self.strategy)
            .map_err(|e| JobError::new(e.kind(), e.to_string()))?;
        // nothing may open on the final bar: it is liquidated below
        if last && action.adds_exposure() {
            action = Action::Hold;
        }

        let outcome = run
            .ledger
            .apply(action, bar, &run.portfolio)
            .map_err(|e| JobError::new(e.kind(), e.to_string()))?;
        run.absorb(outcome.state, outcome.events, outcome.warnings);

        if last {
            let outcome = run
                .ledger
                .liquidate(bar, &run.portfolio)
                .map_err(|e| JobError::new(e.kind(), e.to_string()))?;
            run.absorb(outcome.state, outcome.events, outcome.warnings);
        }

        let equity = run.portfolio.equity_at(bar.close).ok_or_else(|| {
            JobError::new(ErrorKind::SimulationFault, "equity overflowed the decimal range")
        })?;
        run.curve.push(EquityPoint {
            timestamp: bar.timestamp,
            equity,
        });
        Ok(())
    }
}

fn panic_detail(payload: Box<dyn Any + Send>) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("simulation panicked: {detail}")
}

/// Mutable state of one run
struct RunState {
    ledger: PortfolioLedger,
    portfolio: PortfolioState,
    curve: Vec<EquityPoint>,
    trades: Vec<Trade>,
    warnings: Vec<RiskWarning>,
}

impl RunState {
    fn new(capital: Decimal, strategy: &StrategyConfig, costs: CostModel, bars: usize) -> Self {
        Self {
            ledger: PortfolioLedger::new(capital, strategy.risk.clone(), costs),
            portfolio: PortfolioState::new(capital),
            curve: Vec::with_capacity(bars),
            trades: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn absorb(
        &mut self,
        state: PortfolioState,
        events: Vec<TradeEvent>,
        warnings: Vec<RiskWarning>,
    ) {
        self.portfolio = state;
        self.trades.extend(events.into_iter().filter_map(|event| match event {
            TradeEvent::Closed(trade) => Some(trade),
            _ => None,
        }));
        self.warnings.extend(warnings);
    }

    fn finish(
        self,
        outcome: RunOutcome,
        metrics: Option<SummaryMetrics>,
        initial_capital: Decimal,
    ) -> SimulationReport {
        SimulationReport {
            outcome,
            final_equity: self.curve.last().map(|p| p.equity).unwrap_or(initial_capital),
            bars_processed: self.curve.len(),
            ledger_applications: self.ledger.applications(),
            equity_curve: self.curve,
            trades: self.trades,
            warnings: self.warnings,
            metrics,
            final_state: self.portfolio,
        }
    }
}
