use std::time::Duration;

use crate::models::{AnalysisTask, TradeMetrics};

/// Terminal state of one task inside a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskStatus {
    /// Simulation finished and the result was persisted.
    Completed { metrics: TradeMetrics, trades: usize },
    /// A successful result for this fingerprint already existed.
    SkippedCached,
    /// Another worker (or process) holds the claim.
    SkippedDuplicate,
    Failed(String),
    Cancelled,
}

/// Aggregate outcome of one batch run.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub entries: Vec<(AnalysisTask, TaskStatus)>,
    pub elapsed: Duration,
}

impl BatchReport {
    pub fn record(&mut self, task: AnalysisTask, status: TaskStatus) {
        self.entries.push((task, status));
    }

    pub fn completed(&self) -> usize {
        self.count(|s| matches!(s, TaskStatus::Completed { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| {
            matches!(s, TaskStatus::SkippedCached | TaskStatus::SkippedDuplicate)
        })
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, TaskStatus::Failed(_)))
    }

    pub fn cancelled(&self) -> usize {
        self.count(|s| matches!(s, TaskStatus::Cancelled))
    }

    pub fn total_trades(&self) -> usize {
        self.entries
            .iter()
            .map(|(_, s)| match s {
                TaskStatus::Completed { trades, .. } => *trades,
                _ => 0,
            })
            .sum()
    }

    fn count(&self, pred: impl Fn(&TaskStatus) -> bool) -> usize {
        self.entries.iter().filter(|(_, s)| pred(s)).count()
    }

    pub fn print_summary(&self) {
        println!("\n{}", "=".repeat(70));
        println!("  BATCH ANALYSIS REPORT");
        println!("{}", "=".repeat(70));
        println!("  Tasks:       {}", self.entries.len());
        println!("  Completed:   {}", self.completed());
        println!("  Skipped:     {}", self.skipped());
        println!("  Failed:      {}", self.failed());
        println!("  Cancelled:   {}", self.cancelled());
        println!("  Trades:      {}", self.total_trades());
        println!("  Elapsed:     {:.1}s", self.elapsed.as_secs_f64());
        println!();
        println!("  PER TASK");
        println!("  ───────────────────────────────────");
        for (task, status) in &self.entries {
            match status {
                TaskStatus::Completed { metrics, trades } => println!(
                    "  {:<30} {:>3} trades  sharpe {:+.2}  return {:+.1}%  dd {:.1}%",
                    task.to_string(),
                    trades,
                    metrics.sharpe_ratio,
                    metrics.total_return,
                    metrics.max_drawdown,
                ),
                TaskStatus::SkippedCached => {
                    println!("  {:<30} cached", task.to_string())
                }
                TaskStatus::SkippedDuplicate => {
                    println!("  {:<30} duplicate", task.to_string())
                }
                TaskStatus::Failed(reason) => {
                    println!("  {:<30} FAILED: {}", task.to_string(), reason)
                }
                TaskStatus::Cancelled => {
                    println!("  {:<30} cancelled", task.to_string())
                }
            }
        }
        println!("{}", "=".repeat(70));
    }
}
