use anyhow::bail;
use async_trait::async_trait;

use crate::models::{CandleSeries, CorrelationRisk};
use crate::signals::CorrelationRiskProvider;

const DRAWDOWN_WINDOW: usize = 100;
const MIN_CANDLES: usize = 10;

/// Crash-risk estimate from the instrument's own recent drawdown
/// behaviour: the deeper the recent peak-to-trough losses, the larger
/// the correlated drop assumed possible and the higher the correlation
/// factor.
pub struct DrawdownCorrelationProvider {
    pub window: usize,
}

impl DrawdownCorrelationProvider {
    pub fn new() -> Self {
        Self {
            window: DRAWDOWN_WINDOW,
        }
    }
}

impl Default for DrawdownCorrelationProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CorrelationRiskProvider for DrawdownCorrelationProvider {
    async fn assess(&self, series: &CandleSeries) -> anyhow::Result<CorrelationRisk> {
        if series.len() < MIN_CANDLES {
            bail!(
                "need at least {} candles for drawdown risk, got {}",
                MIN_CANDLES,
                series.len()
            );
        }

        let recent = series.tail(self.window);
        let mut peak = f64::NEG_INFINITY;
        let mut max_drawdown = 0.0f64;
        for candle in &recent {
            peak = peak.max(candle.high);
            let dd = (peak - candle.low) / peak;
            max_drawdown = max_drawdown.max(dd);
        }

        // A repeat of the worst recent drawdown with some headroom.
        let expected_drop_pct = max_drawdown * 100.0 * 1.25;
        let correlation_factor = (max_drawdown * 3.0).clamp(0.0, 1.0);

        CorrelationRisk::new(correlation_factor, expected_drop_pct).map_err(Into::into)
    }
}
