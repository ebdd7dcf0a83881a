use anyhow::bail;
use async_trait::async_trait;

use crate::models::{BreakoutPrediction, CandleSeries, PriceLevel};
use crate::signals::BreakoutPredictor;

const MOMENTUM_WINDOW: usize = 10;
/// Fraction of the level price counted as an approach.
const APPROACH_TOLERANCE: f64 = 0.01;
const MOMENTUM_SCALE: f64 = 4.0;
const APPROACH_WEIGHT: f64 = 0.05;
const PROB_FLOOR: f64 = 0.05;
const PROB_CEIL: f64 = 0.95;

/// Breakout estimate from recent momentum toward the level plus how
/// often price has already probed it. More probes without a break lean
/// toward a breakout; momentum away from the level leans toward a
/// bounce.
pub struct MomentumBreakoutPredictor {
    pub momentum_window: usize,
}

impl MomentumBreakoutPredictor {
    pub fn new() -> Self {
        Self {
            momentum_window: MOMENTUM_WINDOW,
        }
    }
}

impl Default for MomentumBreakoutPredictor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BreakoutPredictor for MomentumBreakoutPredictor {
    async fn predict(
        &self,
        series: &CandleSeries,
        level: &PriceLevel,
    ) -> anyhow::Result<BreakoutPrediction> {
        if series.len() < self.momentum_window + 1 {
            bail!(
                "need at least {} candles for momentum, got {}",
                self.momentum_window + 1,
                series.len()
            );
        }

        let recent = series.tail(self.momentum_window + 1);
        let first = recent[0].close;
        let last = recent[recent.len() - 1].close;
        let momentum = (last - first) / first;

        // Momentum toward the level raises breakout odds regardless of
        // which side the level sits on.
        let toward = if level.price >= last { momentum } else { -momentum };

        let approaches = series
            .iter()
            .filter(|c| {
                (c.high - level.price).abs() / level.price <= APPROACH_TOLERANCE
                    || (c.low - level.price).abs() / level.price <= APPROACH_TOLERANCE
            })
            .count();

        let breakout_probability = (0.5 + toward * MOMENTUM_SCALE
            + APPROACH_WEIGHT * approaches.min(5) as f64)
            .clamp(PROB_FLOOR, PROB_CEIL);
        // Strong levels reject more of what reaches them.
        let bounce_probability =
            ((1.0 - breakout_probability) * (0.6 + 0.4 * level.strength)).clamp(PROB_FLOOR, PROB_CEIL);

        // Confidence grows with how much history backs the estimate.
        let sample = (series.len() as f64 / 100.0).min(1.0);
        let confidence = (0.3 + 0.5 * sample + 0.1 * level.strength).clamp(0.0, 1.0);

        Ok(BreakoutPrediction {
            level: level.clone(),
            breakout_probability,
            bounce_probability,
            confidence,
        })
    }
}
