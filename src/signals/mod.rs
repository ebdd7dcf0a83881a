//! Signal provider seams. The decision engine consumes plain data
//! structs; these traits are where that data comes from. Implementations
//! range from the pure-history baselines in this module to anything
//! externally sourced.

pub mod breakout;
pub mod context;
pub mod correlation;
pub mod swing_levels;

use async_trait::async_trait;

use crate::models::{BreakoutPrediction, CandleSeries, CorrelationRisk, MarketContext, PriceLevel};

pub use breakout::MomentumBreakoutPredictor;
pub use context::WindowContextProvider;
pub use correlation::DrawdownCorrelationProvider;
pub use swing_levels::SwingLevelProvider;

/// Supplies support/resistance levels for the visible history window.
#[async_trait]
pub trait LevelProvider: Send + Sync {
    async fn levels(&self, series: &CandleSeries) -> anyhow::Result<Vec<PriceLevel>>;
}

/// Estimates breakout behaviour at a specific level. Optional in the
/// pipeline: when absent, the engine degrades confidence instead of
/// inventing a prediction.
#[async_trait]
pub trait BreakoutPredictor: Send + Sync {
    async fn predict(
        &self,
        series: &CandleSeries,
        level: &PriceLevel,
    ) -> anyhow::Result<BreakoutPrediction>;
}

/// Estimates correlated crash risk for the instrument.
#[async_trait]
pub trait CorrelationRiskProvider: Send + Sync {
    async fn assess(&self, series: &CandleSeries) -> anyhow::Result<CorrelationRisk>;
}

/// Summarises the market state at the end of the visible window.
#[async_trait]
pub trait MarketContextProvider: Send + Sync {
    async fn context(&self, series: &CandleSeries) -> anyhow::Result<MarketContext>;
}
