//! Bounded-concurrency batch runner. Each task is claimed in the store
//! before any work happens, so concurrent batches (or a re-run of the
//! same batch) never duplicate a simulation.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::backtest::report::{BatchReport, TaskStatus};
use crate::backtest::simulation::{SignalSuite, Simulation, SimulationLimits};
use crate::config::{BatchConfig, StrategyConfig};
use crate::data::PriceHistoryProvider;
use crate::error::TaskError;
use crate::models::{AnalysisResult, AnalysisStatus, AnalysisTask, CandleSeries, TradeMetrics};
use crate::store::ResultStore;

pub struct Orchestrator {
    config: BatchConfig,
    strategies: Vec<StrategyConfig>,
    history: Arc<dyn PriceHistoryProvider>,
    signals: SignalSuite,
    store: Arc<ResultStore>,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(
        config: BatchConfig,
        strategies: Vec<StrategyConfig>,
        history: Arc<dyn PriceHistoryProvider>,
        signals: SignalSuite,
        store: Arc<ResultStore>,
    ) -> Self {
        Self {
            config,
            strategies,
            history,
            signals,
            store,
            cancel: CancellationToken::new(),
        }
    }

    /// Token callers can use to stop the batch early. In-flight tasks
    /// release their claims; nothing half-finished is persisted.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run every task to a terminal state. One task failing never stops
    /// its siblings; the report carries the per-task outcomes.
    pub async fn run_batch(&self, tasks: Vec<AnalysisTask>) -> BatchReport {
        let started = Instant::now();
        let mut report = BatchReport::default();
        let semaphore = Arc::new(Semaphore::new(self.config.workers.max(1)));
        let mut join_set: JoinSet<(AnalysisTask, TaskStatus)> = JoinSet::new();

        info!(
            "starting batch: {} tasks, {} workers",
            tasks.len(),
            self.config.workers
        );

        for task in tasks {
            let permit_source = Arc::clone(&semaphore);
            let runner = TaskRunner {
                config: self.config.clone(),
                strategies: self.strategies.clone(),
                history: Arc::clone(&self.history),
                signals: self.signals.clone(),
                store: Arc::clone(&self.store),
                cancel: self.cancel.clone(),
            };
            join_set.spawn(async move {
                let _permit = match permit_source.acquire().await {
                    Ok(p) => p,
                    Err(_) => return (task, TaskStatus::Cancelled),
                };
                let status = runner.run_one(&task).await;
                (task, status)
            });
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((task, status)) => {
                    match &status {
                        TaskStatus::Completed { trades, .. } => {
                            info!("{}: completed with {} trades", task, trades)
                        }
                        TaskStatus::SkippedCached => debug!("{}: cached", task),
                        TaskStatus::SkippedDuplicate => debug!("{}: duplicate claim", task),
                        TaskStatus::Failed(reason) => warn!("{}: failed: {}", task, reason),
                        TaskStatus::Cancelled => debug!("{}: cancelled", task),
                    }
                    report.record(task, status);
                }
                Err(e) => error!("worker panicked: {}", e),
            }
        }

        report.elapsed = started.elapsed();
        info!(
            "batch done: {} completed, {} skipped, {} failed, {} cancelled in {:.1}s",
            report.completed(),
            report.skipped(),
            report.failed(),
            report.cancelled(),
            report.elapsed.as_secs_f64(),
        );
        report
    }
}

/// Everything one worker needs, cloned per task so the spawned future is
/// 'static.
struct TaskRunner {
    config: BatchConfig,
    strategies: Vec<StrategyConfig>,
    history: Arc<dyn PriceHistoryProvider>,
    signals: SignalSuite,
    store: Arc<ResultStore>,
    cancel: CancellationToken,
}

impl TaskRunner {
    async fn run_one(&self, task: &AnalysisTask) -> TaskStatus {
        if self.cancel.is_cancelled() {
            return TaskStatus::Cancelled;
        }

        let fingerprint = task.fingerprint();

        match self.store.exists(&fingerprint).await {
            Ok(true) => return TaskStatus::SkippedCached,
            Ok(false) => {}
            Err(e) => return TaskStatus::Failed(format!("store lookup: {e}")),
        }

        match self.store.claim(task).await {
            Ok(true) => {}
            Ok(false) => return TaskStatus::SkippedDuplicate,
            Err(e) => return TaskStatus::Failed(format!("store claim: {e}")),
        }

        // Claim held from here on: every exit path below must settle it.
        tokio::select! {
            _ = self.cancel.cancelled() => {
                if let Err(e) = self.store.release(&fingerprint).await {
                    warn!("{}: releasing claim failed: {}", task, e);
                }
                TaskStatus::Cancelled
            }
            result = self.simulate(task) => match result {
                Ok((metrics, result)) => {
                    let trades = result.trades.len();
                    match self.store.save(&result).await {
                        Ok(()) => TaskStatus::Completed { metrics, trades },
                        Err(e) => {
                            let reason = format!("store save: {e}");
                            if let Err(e) = self.store.mark_failed(&fingerprint, &reason).await {
                                warn!("{}: recording failure failed: {}", task, e);
                            }
                            TaskStatus::Failed(reason)
                        }
                    }
                }
                Err(e) => {
                    let reason = e.to_string();
                    if let Err(e) = self.store.mark_failed(&fingerprint, &reason).await {
                        warn!("{}: recording failure failed: {}", task, e);
                    }
                    TaskStatus::Failed(reason)
                }
            }
        }
    }

    async fn simulate(
        &self,
        task: &AnalysisTask,
    ) -> Result<(TradeMetrics, AnalysisResult), TaskError> {
        let strategy = self
            .strategies
            .iter()
            .find(|s| s.name == task.strategy)
            .ok_or_else(|| {
                TaskError::Signal(anyhow::anyhow!("unknown strategy '{}'", task.strategy))
            })?;
        let thresholds = strategy.thresholds_for(task.timeframe);

        let series = self.fetch_with_retries(task).await?;
        let limits = SimulationLimits {
            max_evaluations: self.config.max_evaluations,
            max_trades: self.config.max_trades,
            warmup_candles: self.config.warmup_candles,
            window_candles: self.config.window_candles,
        };
        let sim = Simulation::new(thresholds, limits, self.signals.clone());
        let outcome = sim.run(&series).await?;

        let metrics = TradeMetrics::from_trades(&outcome.trades);
        let result = AnalysisResult {
            fingerprint: task.fingerprint(),
            instrument: task.instrument.clone(),
            timeframe: task.timeframe.to_string(),
            strategy: task.strategy.clone(),
            metrics,
            trades: outcome.trades,
            status: AnalysisStatus::Success,
            generated_at: chrono::Utc::now(),
            error: None,
        };
        Ok((metrics, result))
    }

    /// Retry budget applies only to transient fetch failures; anything
    /// else fails the task on the first attempt.
    async fn fetch_with_retries(&self, task: &AnalysisTask) -> Result<CandleSeries, TaskError> {
        let min_candles = self.config.warmup_candles + 2;
        let mut attempt = 0;
        loop {
            match self
                .history
                .fetch(&task.instrument, task.timeframe, min_candles)
                .await
            {
                Ok(series) => return Ok(series),
                Err(e) if e.is_retryable() && attempt < self.config.fetch_retries => {
                    attempt += 1;
                    warn!("{}: fetch attempt {} failed: {}", task, attempt, e);
                }
                Err(e) => return Err(TaskError::Data(e)),
            }
        }
    }
}
