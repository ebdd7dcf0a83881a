use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single simulated long trade, closed by stop-loss, take-profit, or
/// the end of the simulation window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub entry_time: DateTime<Utc>,
    pub entry_price: f64,
    pub exit_time: DateTime<Utc>,
    pub exit_price: f64,
    pub stop_loss_price: f64,
    pub take_profit_price: f64,
    pub leverage: f64,
    /// Leveraged return on the position, in percent.
    pub pnl_pct: f64,
}

impl Trade {
    pub fn duration_minutes(&self) -> f64 {
        (self.exit_time - self.entry_time).num_seconds() as f64 / 60.0
    }

    pub fn is_win(&self) -> bool {
        self.pnl_pct > 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    Pending,
    Running,
    Success,
    Failed,
}

impl AnalysisStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisStatus::Pending => "pending",
            AnalysisStatus::Running => "running",
            AnalysisStatus::Success => "success",
            AnalysisStatus::Failed => "failed",
        }
    }

    pub fn from_str_loose(s: &str) -> Option<AnalysisStatus> {
        match s {
            "pending" => Some(AnalysisStatus::Pending),
            "running" => Some(AnalysisStatus::Running),
            "success" => Some(AnalysisStatus::Success),
            "failed" => Some(AnalysisStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Aggregated metrics over the surviving trades of one task.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TradeMetrics {
    pub sharpe_ratio: f64,
    pub win_rate: f64,
    pub total_return: f64,
    pub max_drawdown: f64,
}

impl TradeMetrics {
    /// Compute metrics from the ordered trade sequence.
    ///
    /// `total_return` compounds per-trade leveraged returns;
    /// `max_drawdown` is the largest peak-to-trough loss of that
    /// compounded equity, in percent.
    pub fn from_trades(trades: &[Trade]) -> TradeMetrics {
        if trades.is_empty() {
            return TradeMetrics::default();
        }

        let returns: Vec<f64> = trades.iter().map(|t| t.pnl_pct / 100.0).collect();
        let wins = trades.iter().filter(|t| t.is_win()).count();
        let win_rate = wins as f64 / trades.len() as f64 * 100.0;

        let mut equity = 1.0f64;
        let mut peak = 1.0f64;
        let mut max_drawdown = 0.0f64;
        for r in &returns {
            equity *= 1.0 + r;
            if equity > peak {
                peak = equity;
            }
            let dd = (peak - equity) / peak * 100.0;
            if dd > max_drawdown {
                max_drawdown = dd;
            }
        }
        let total_return = (equity - 1.0) * 100.0;

        let n = returns.len() as f64;
        let mean = returns.iter().sum::<f64>() / n;
        let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
        let std_dev = variance.sqrt();
        let sharpe_ratio = if std_dev > 0.0 { mean / std_dev } else { 0.0 };

        TradeMetrics {
            sharpe_ratio,
            win_rate,
            total_return,
            max_drawdown,
        }
    }
}

/// Completed analysis for one (instrument, timeframe, strategy) task.
/// Owned exclusively by the result store; the orchestrator only appends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub fingerprint: String,
    pub instrument: String,
    pub timeframe: String,
    pub strategy: String,
    pub metrics: TradeMetrics,
    pub trades: Vec<Trade>,
    pub status: AnalysisStatus,
    pub generated_at: DateTime<Utc>,
    pub error: Option<String>,
}
