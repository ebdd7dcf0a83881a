//! Candle-by-candle forward walk for one task. The simulation owns the
//! position state machine; every leverage decision comes from the
//! engine, every plausibility verdict from the validator.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::StrategyThresholds;
use crate::engine::{price_consistency, validate_trade, DecisionEngine, EngineParams, Severity};
use crate::error::{EngineError, TaskError};
use crate::models::{
    CandleSeries, LeverageRecommendation, LevelKind, PriceLevel, Trade,
};
use crate::signals::{
    BreakoutPredictor, CorrelationRiskProvider, LevelProvider, MarketContextProvider,
};

/// The full set of signal providers one simulation consumes. The
/// breakout predictor is optional; the engine degrades gracefully
/// without it.
#[derive(Clone)]
pub struct SignalSuite {
    pub levels: Arc<dyn LevelProvider>,
    pub breakout: Option<Arc<dyn BreakoutPredictor>>,
    pub correlation: Arc<dyn CorrelationRiskProvider>,
    pub context: Arc<dyn MarketContextProvider>,
}

/// Hard resource caps for one simulation run.
#[derive(Debug, Clone, Copy)]
pub struct SimulationLimits {
    pub max_evaluations: usize,
    pub max_trades: usize,
    pub warmup_candles: usize,
    pub window_candles: usize,
}

/// Counters and trades from one completed run. Zero trades is a valid
/// outcome, not an error.
#[derive(Debug, Default)]
pub struct SimulationOutcome {
    pub trades: Vec<Trade>,
    pub evaluations: usize,
    /// Signals discarded because the price moved too far before entry.
    pub discarded_signals: usize,
    /// Closed trades rejected by the plausibility validator.
    pub dropped_trades: usize,
}

enum PositionState {
    Scanning,
    /// Decision made at the close of one candle; entry happens at the
    /// open of the next, re-checked against the analysis price.
    SignalPending {
        rec: LeverageRecommendation,
        analysis_price: f64,
    },
    InPosition {
        entry_time: chrono::DateTime<chrono::Utc>,
        entry_price: f64,
        rec: LeverageRecommendation,
    },
}

pub struct Simulation {
    engine: DecisionEngine,
    thresholds: StrategyThresholds,
    limits: SimulationLimits,
    signals: SignalSuite,
}

impl Simulation {
    pub fn new(
        thresholds: StrategyThresholds,
        limits: SimulationLimits,
        signals: SignalSuite,
    ) -> Self {
        let engine = DecisionEngine::new(EngineParams {
            max_leverage: thresholds.leverage_cap,
            min_risk_reward: thresholds.min_risk_reward,
        });
        Self {
            engine,
            thresholds,
            limits,
            signals,
        }
    }

    /// Walk the series candle by candle. Fails only on invalid input
    /// data or a broken signal provider; absent signal at any step just
    /// means no trade there.
    pub async fn run(&self, series: &CandleSeries) -> Result<SimulationOutcome, TaskError> {
        let mut outcome = SimulationOutcome::default();
        let mut state = PositionState::Scanning;
        // Last candle the walk actually evaluated; a forced close must
        // not use prices from beyond it.
        let mut last_seen: Option<&crate::models::Candle> = None;

        let start = self.limits.warmup_candles.min(series.len());
        for i in start..series.len() {
            if outcome.evaluations >= self.limits.max_evaluations {
                debug!("evaluation cap {} reached", self.limits.max_evaluations);
                break;
            }
            outcome.evaluations += 1;
            let candle = &series[i];
            last_seen = Some(candle);
            let mut done = false;

            state = match state {
                PositionState::InPosition {
                    entry_time,
                    entry_price,
                    rec,
                } => {
                    // Stop-loss is checked before take-profit: when a
                    // candle spans both, the pessimistic exit wins.
                    let exit_price = if candle.low <= rec.stop_loss_price {
                        Some(rec.stop_loss_price)
                    } else if candle.high >= rec.take_profit_price {
                        Some(rec.take_profit_price)
                    } else {
                        None
                    };

                    match exit_price {
                        Some(exit) => {
                            self.close_trade(
                                &mut outcome,
                                entry_time,
                                entry_price,
                                candle.timestamp,
                                exit,
                                &rec,
                            );
                            if outcome.trades.len() >= self.limits.max_trades {
                                debug!("trade cap {} reached", self.limits.max_trades);
                                done = true;
                            }
                            PositionState::Scanning
                        }
                        None => PositionState::InPosition {
                            entry_time,
                            entry_price,
                            rec,
                        },
                    }
                }

                PositionState::SignalPending {
                    rec,
                    analysis_price,
                } => {
                    let entry = candle.open;
                    if price_consistency(analysis_price, entry) == Severity::Critical {
                        outcome.discarded_signals += 1;
                        debug!(
                            "signal discarded: price moved {:.4} -> {:.4} before entry",
                            analysis_price, entry
                        );
                        PositionState::Scanning
                    } else {
                        PositionState::InPosition {
                            entry_time: candle.timestamp,
                            entry_price: entry,
                            rec,
                        }
                    }
                }

                PositionState::Scanning => {
                    if outcome.trades.len() >= self.limits.max_trades {
                        done = true;
                        PositionState::Scanning
                    } else {
                        let window_start = (i + 1).saturating_sub(self.limits.window_candles);
                        let visible = series.slice(window_start, i + 1);
                        match self.evaluate(&visible).await? {
                            Some(rec) => PositionState::SignalPending {
                                rec,
                                analysis_price: candle.close,
                            },
                            None => PositionState::Scanning,
                        }
                    }
                }
            };

            if done {
                break;
            }
        }

        // Walk end: force-close an open position at the close of the
        // last evaluated candle.
        if let PositionState::InPosition {
            entry_time,
            entry_price,
            rec,
        } = state
        {
            if let Some(last) = last_seen {
                self.close_trade(
                    &mut outcome,
                    entry_time,
                    entry_price,
                    last.timestamp,
                    last.close,
                    &rec,
                );
            }
        }

        Ok(outcome)
    }

    /// One decision attempt over the visible window. `None` means no
    /// actionable signal here; the walk continues.
    async fn evaluate(
        &self,
        visible: &CandleSeries,
    ) -> Result<Option<LeverageRecommendation>, TaskError> {
        let levels = self.signals.levels.levels(visible).await?;
        if levels.is_empty() {
            return Ok(None);
        }
        let context = self.signals.context.context(visible).await?;
        let correlation = self.signals.correlation.assess(visible).await?;

        let breakout = match (&self.signals.breakout, nearest_resistance(&levels, context.current_price)) {
            (Some(predictor), Some(resistance)) => {
                Some(predictor.predict(visible, resistance).await?)
            }
            _ => None,
        };

        let rec = match self
            .engine
            .decide(&levels, breakout.as_ref(), &correlation, &context)
        {
            Ok(rec) => rec,
            Err(EngineError::InsufficientSignal(reason)) => {
                debug!("no entry: {}", reason);
                return Ok(None);
            }
            Err(EngineError::Validation(e)) => return Err(TaskError::Engine(e)),
        };

        if rec.confidence < self.thresholds.min_confidence
            || rec.risk_reward_ratio < self.thresholds.min_risk_reward
        {
            return Ok(None);
        }
        Ok(Some(rec))
    }

    fn close_trade(
        &self,
        outcome: &mut SimulationOutcome,
        entry_time: chrono::DateTime<chrono::Utc>,
        entry_price: f64,
        exit_time: chrono::DateTime<chrono::Utc>,
        exit_price: f64,
        rec: &LeverageRecommendation,
    ) {
        let trade = Trade {
            entry_time,
            entry_price,
            exit_time,
            exit_price,
            stop_loss_price: rec.stop_loss_price,
            take_profit_price: rec.take_profit_price,
            leverage: rec.recommended_leverage,
            pnl_pct: (exit_price / entry_price - 1.0) * rec.recommended_leverage * 100.0,
        };

        let verdict = validate_trade(&trade);
        if verdict.is_valid() {
            outcome.trades.push(trade);
        } else {
            outcome.dropped_trades += 1;
            warn!(
                "dropping implausible trade ({}): {}",
                verdict.severity,
                verdict.issues.join("; ")
            );
        }
    }
}

fn nearest_resistance(levels: &[PriceLevel], price: f64) -> Option<&PriceLevel> {
    levels
        .iter()
        .filter(|l| l.kind == LevelKind::Resistance && l.price > price)
        .min_by(|a, b| a.price.total_cmp(&b.price))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone, Utc};

    use crate::models::{
        BreakoutPrediction, Candle, CorrelationRisk, MarketContext, Trend,
    };
    use crate::test_helpers::{make_breakout, make_level};

    /// Fixed-output providers so tests control exactly what the engine
    /// sees at every step.
    struct FixedLevels(Vec<PriceLevel>);
    #[async_trait]
    impl LevelProvider for FixedLevels {
        async fn levels(&self, _series: &CandleSeries) -> anyhow::Result<Vec<PriceLevel>> {
            Ok(self.0.clone())
        }
    }

    struct FixedBreakout(BreakoutPrediction);
    #[async_trait]
    impl BreakoutPredictor for FixedBreakout {
        async fn predict(
            &self,
            _series: &CandleSeries,
            _level: &PriceLevel,
        ) -> anyhow::Result<BreakoutPrediction> {
            Ok(self.0.clone())
        }
    }

    struct FixedCorrelation(CorrelationRisk);
    #[async_trait]
    impl CorrelationRiskProvider for FixedCorrelation {
        async fn assess(&self, _series: &CandleSeries) -> anyhow::Result<CorrelationRisk> {
            Ok(self.0.clone())
        }
    }

    /// Context pinned to the latest close so levels stay on the right
    /// side of the price.
    struct CloseContext;
    #[async_trait]
    impl MarketContextProvider for CloseContext {
        async fn context(&self, series: &CandleSeries) -> anyhow::Result<MarketContext> {
            let close = series.last().map(|c| c.close).unwrap_or(100.0);
            Ok(MarketContext {
                current_price: close,
                trend: Trend::Sideways,
                volatility: 0.2,
                volume_24h: 1000.0,
                anomaly_detected: false,
            })
        }
    }

    fn suite_with_signal() -> SignalSuite {
        let resistance = make_level(108.0, 0.7, LevelKind::Resistance);
        SignalSuite {
            levels: Arc::new(FixedLevels(vec![
                make_level(95.0, 0.8, LevelKind::Support),
                resistance.clone(),
            ])),
            breakout: Some(Arc::new(FixedBreakout(make_breakout(resistance, 0.7, 0.8)))),
            correlation: Arc::new(FixedCorrelation(CorrelationRisk {
                correlation_factor: 0.2,
                expected_drop_pct: 2.0,
                risk_level: crate::models::RiskLevel::Low,
            })),
            context: Arc::new(CloseContext),
        }
    }

    fn thresholds() -> StrategyThresholds {
        StrategyThresholds {
            min_confidence: 0.5,
            min_risk_reward: 1.5,
            leverage_cap: 25.0,
        }
    }

    fn limits() -> SimulationLimits {
        SimulationLimits {
            max_evaluations: 5000,
            max_trades: 200,
            warmup_candles: 1,
            window_candles: 50,
        }
    }

    fn flat_candle(i: i64, open: f64, high: f64, low: f64, close: f64) -> Candle {
        let base = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();
        Candle {
            timestamp: base + Duration::minutes(i * 60),
            open,
            high,
            low,
            close,
            volume: 100.0,
        }
    }

    #[tokio::test]
    async fn take_profit_exit_produces_winning_trade() {
        // Scan at candle 1, enter at candle 2's open, hit the 108.8
        // take-profit at candle 3.
        let series = CandleSeries::new(vec![
            flat_candle(0, 100.0, 101.0, 99.5, 100.0),
            flat_candle(1, 100.0, 101.0, 99.5, 100.0),
            flat_candle(2, 100.2, 101.0, 99.8, 100.5),
            flat_candle(3, 100.5, 110.0, 100.0, 109.0),
        ]);
        let sim = Simulation::new(thresholds(), limits(), suite_with_signal());
        let outcome = sim.run(&series).await.unwrap();

        assert_eq!(outcome.trades.len(), 1);
        let trade = &outcome.trades[0];
        assert!((trade.entry_price - 100.2).abs() < 1e-9);
        assert!((trade.exit_price - trade.take_profit_price).abs() < 1e-9);
        assert!(trade.is_win());
    }

    #[tokio::test]
    async fn stop_loss_checked_before_take_profit() {
        // Candle 3 spans both the stop and the target; the stop wins.
        let series = CandleSeries::new(vec![
            flat_candle(0, 100.0, 101.0, 99.5, 100.0),
            flat_candle(1, 100.0, 101.0, 99.5, 100.0),
            flat_candle(2, 100.2, 101.0, 99.8, 100.5),
            flat_candle(3, 100.5, 115.0, 95.0, 110.0),
        ]);
        let sim = Simulation::new(thresholds(), limits(), suite_with_signal());
        let outcome = sim.run(&series).await.unwrap();

        assert_eq!(outcome.trades.len(), 1);
        let trade = &outcome.trades[0];
        assert!((trade.exit_price - trade.stop_loss_price).abs() < 1e-9);
        assert!(!trade.is_win());
    }

    #[tokio::test]
    async fn pending_signal_discarded_on_price_gap() {
        // Signal forms at close 100, but the next candle gaps open to
        // 115: >10% divergence, the recommendation no longer applies.
        let series = CandleSeries::new(vec![
            flat_candle(0, 100.0, 101.0, 99.5, 100.0),
            flat_candle(1, 100.0, 101.0, 99.5, 100.0),
            flat_candle(2, 115.0, 116.0, 114.0, 115.0),
        ]);
        let sim = Simulation::new(thresholds(), limits(), suite_with_signal());
        let outcome = sim.run(&series).await.unwrap();

        assert!(outcome.trades.is_empty());
        assert_eq!(outcome.discarded_signals, 1);
    }

    #[tokio::test]
    async fn open_position_closes_at_window_end() {
        let series = CandleSeries::new(vec![
            flat_candle(0, 100.0, 101.0, 99.5, 100.0),
            flat_candle(1, 100.0, 101.0, 99.5, 100.0),
            flat_candle(2, 100.2, 101.0, 99.8, 100.5),
            flat_candle(3, 100.5, 101.5, 100.0, 101.0),
        ]);
        let sim = Simulation::new(thresholds(), limits(), suite_with_signal());
        let outcome = sim.run(&series).await.unwrap();

        assert_eq!(outcome.trades.len(), 1);
        assert!((outcome.trades[0].exit_price - 101.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn no_signal_means_zero_trades_and_success() {
        // Only a resistance: the engine reports insufficient signal at
        // every step, which is a no-entry, not a failure.
        let suite = SignalSuite {
            levels: Arc::new(FixedLevels(vec![make_level(
                108.0,
                0.7,
                LevelKind::Resistance,
            )])),
            breakout: None,
            correlation: Arc::new(FixedCorrelation(CorrelationRisk {
                correlation_factor: 0.2,
                expected_drop_pct: 2.0,
                risk_level: crate::models::RiskLevel::Low,
            })),
            context: Arc::new(CloseContext),
        };
        let series = CandleSeries::new(
            (0..20)
                .map(|i| flat_candle(i, 100.0, 101.0, 99.5, 100.0))
                .collect(),
        );
        let sim = Simulation::new(thresholds(), limits(), suite);
        let outcome = sim.run(&series).await.unwrap();
        assert!(outcome.trades.is_empty());
        assert!(outcome.evaluations > 0);
    }

    #[tokio::test]
    async fn cap_break_closes_at_last_evaluated_candle() {
        // The cap stops the walk after candle 3; the spike at candle 4
        // was never evaluated and must not price the forced close.
        let series = CandleSeries::new(vec![
            flat_candle(0, 100.0, 101.0, 99.5, 100.0),
            flat_candle(1, 100.0, 101.0, 99.5, 100.0),
            flat_candle(2, 100.2, 101.0, 99.8, 100.5),
            flat_candle(3, 100.5, 101.0, 100.0, 100.8),
            flat_candle(4, 101.0, 120.0, 100.5, 119.0),
        ]);
        let mut lim = limits();
        lim.max_evaluations = 3;
        let sim = Simulation::new(thresholds(), lim, suite_with_signal());
        let outcome = sim.run(&series).await.unwrap();

        assert_eq!(outcome.trades.len(), 1);
        let trade = &outcome.trades[0];
        assert!((trade.exit_price - 100.8).abs() < 1e-9);
        assert_eq!(trade.exit_time, series[3].timestamp);
    }

    #[tokio::test]
    async fn evaluation_cap_bounds_the_walk() {
        let series = CandleSeries::new(
            (0..100)
                .map(|i| flat_candle(i, 100.0, 100.4, 99.8, 100.0))
                .collect(),
        );
        let mut lim = limits();
        lim.max_evaluations = 10;
        let sim = Simulation::new(thresholds(), lim, suite_with_signal());
        let outcome = sim.run(&series).await.unwrap();
        assert!(outcome.evaluations <= 10);
    }

    #[tokio::test]
    async fn trade_cap_stops_new_entries() {
        // Alternating signal/touch candles generate many trades; the cap
        // keeps only the first.
        let mut candles = Vec::new();
        for i in 0..40 {
            if i % 2 == 0 {
                candles.push(flat_candle(i, 100.0, 100.4, 99.8, 100.0));
            } else {
                // wide candle that trips the stop-loss
                candles.push(flat_candle(i, 100.0, 100.4, 98.0, 100.0));
            }
        }
        let series = CandleSeries::new(candles);
        let mut lim = limits();
        lim.max_trades = 1;
        let sim = Simulation::new(thresholds(), lim, suite_with_signal());
        let outcome = sim.run(&series).await.unwrap();
        assert_eq!(outcome.trades.len(), 1);
    }
}
