use crate::models::Timeframe;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Entry/risk thresholds for one timeframe.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrategyThresholds {
    /// Minimum engine confidence to open a trade.
    pub min_confidence: f64,
    /// Minimum risk-reward ratio to open a trade. Also the engine's
    /// risk-reward constraint knee.
    pub min_risk_reward: f64,
    /// Hard leverage cap for this timeframe.
    pub leverage_cap: f64,
}

/// Named, immutable bundle of thresholds keyed by timeframe. Loaded once
/// at batch start and passed into every task; never mutated during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub name: String,
    pub thresholds: HashMap<Timeframe, StrategyThresholds>,
    pub default_thresholds: StrategyThresholds,
}

impl StrategyConfig {
    pub fn thresholds_for(&self, tf: Timeframe) -> StrategyThresholds {
        self.thresholds
            .get(&tf)
            .copied()
            .unwrap_or(self.default_thresholds)
    }

    /// Built-in presets. Shorter timeframes demand more confidence and
    /// tolerate less leverage.
    pub fn presets() -> Vec<StrategyConfig> {
        let conservative = StrategyConfig {
            name: "conservative".to_string(),
            thresholds: HashMap::from([
                (
                    Timeframe::M15,
                    StrategyThresholds {
                        min_confidence: 0.70,
                        min_risk_reward: 2.0,
                        leverage_cap: 5.0,
                    },
                ),
                (
                    Timeframe::H1,
                    StrategyThresholds {
                        min_confidence: 0.65,
                        min_risk_reward: 2.0,
                        leverage_cap: 8.0,
                    },
                ),
            ]),
            default_thresholds: StrategyThresholds {
                min_confidence: 0.65,
                min_risk_reward: 2.0,
                leverage_cap: 10.0,
            },
        };

        let balanced = StrategyConfig {
            name: "balanced".to_string(),
            thresholds: HashMap::from([
                (
                    Timeframe::M15,
                    StrategyThresholds {
                        min_confidence: 0.60,
                        min_risk_reward: 1.5,
                        leverage_cap: 10.0,
                    },
                ),
                (
                    Timeframe::H1,
                    StrategyThresholds {
                        min_confidence: 0.55,
                        min_risk_reward: 1.5,
                        leverage_cap: 15.0,
                    },
                ),
            ]),
            default_thresholds: StrategyThresholds {
                min_confidence: 0.55,
                min_risk_reward: 1.5,
                leverage_cap: 15.0,
            },
        };

        let aggressive = StrategyConfig {
            name: "aggressive".to_string(),
            thresholds: HashMap::new(),
            default_thresholds: StrategyThresholds {
                min_confidence: 0.45,
                min_risk_reward: 1.2,
                leverage_cap: 25.0,
            },
        };

        vec![conservative, balanced, aggressive]
    }

    pub fn preset(name: &str) -> Option<StrategyConfig> {
        Self::presets().into_iter().find(|s| s.name == name)
    }
}

/// Batch-level settings for the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Parallel task workers.
    pub workers: usize,
    /// Hard cap on simulation steps per task.
    pub max_evaluations: usize,
    /// Hard cap on opened trades per task.
    pub max_trades: usize,
    /// Candles required before the first evaluation.
    pub warmup_candles: usize,
    /// Visible-history window handed to signal providers at each step.
    pub window_candles: usize,
    /// Retries for transient history-fetch failures, applied at the task
    /// boundary only.
    pub fetch_retries: usize,
    /// Sqlite metadata path; blobs live next to it.
    pub store_path: String,
    /// Directory of cached candle JSON files.
    pub data_dir: String,
    pub log_level: String,
}

impl BatchConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let env = |key: &str, default: &str| -> String {
            std::env::var(key).unwrap_or_else(|_| default.to_string())
        };

        let default_workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);

        BatchConfig {
            workers: env("WORKERS", "").parse().unwrap_or(default_workers),
            max_evaluations: env("MAX_EVALUATIONS", "5000").parse().unwrap_or(5000),
            max_trades: env("MAX_TRADES", "200").parse().unwrap_or(200),
            warmup_candles: env("WARMUP_CANDLES", "50").parse().unwrap_or(50),
            window_candles: env("WINDOW_CANDLES", "200").parse().unwrap_or(200),
            fetch_retries: env("FETCH_RETRIES", "2").parse().unwrap_or(2),
            store_path: env("STORE_PATH", "data/analysis.db"),
            data_dir: env("DATA_DIR", "data"),
            log_level: env("LOG_LEVEL", "info"),
        }
    }
}
