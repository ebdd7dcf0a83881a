pub mod candle;
pub mod recommendation;
pub mod signal;
pub mod task;
pub mod timeframe;
pub mod trade;

pub use candle::{Candle, CandleSeries};
pub use recommendation::LeverageRecommendation;
pub use signal::{
    BreakoutPrediction, CorrelationRisk, LevelKind, MarketContext, PriceLevel, RiskLevel, Trend,
};
pub use task::AnalysisTask;
pub use timeframe::Timeframe;
pub use trade::{AnalysisResult, AnalysisStatus, Trade, TradeMetrics};
