use anyhow::bail;
use async_trait::async_trait;

use crate::models::{CandleSeries, MarketContext, Trend};
use crate::signals::MarketContextProvider;

const SHORT_WINDOW: usize = 10;
const LONG_WINDOW: usize = 30;
/// Mean divergence below this band is sideways, not a trend.
const TREND_BAND: f64 = 0.01;
/// Maps per-candle return stddev onto the [0, 1] volatility scale.
const VOLATILITY_SCALE: f64 = 50.0;
/// Returns beyond this many standard deviations flag an anomaly.
const ANOMALY_SIGMA: f64 = 4.0;
/// Candles whose volume counts toward the 24h figure.
const VOLUME_WINDOW: usize = 24;

/// Market context from the visible window alone: mean-crossover trend,
/// return-dispersion volatility, and a sigma test on the latest move.
pub struct WindowContextProvider {
    pub short_window: usize,
    pub long_window: usize,
}

impl WindowContextProvider {
    pub fn new() -> Self {
        Self {
            short_window: SHORT_WINDOW,
            long_window: LONG_WINDOW,
        }
    }
}

impl Default for WindowContextProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

#[async_trait]
impl MarketContextProvider for WindowContextProvider {
    async fn context(&self, series: &CandleSeries) -> anyhow::Result<MarketContext> {
        if series.len() < self.long_window {
            bail!(
                "need at least {} candles for market context, got {}",
                self.long_window,
                series.len()
            );
        }

        let closes = series.closes();
        let current_price = closes[closes.len() - 1];

        let short_mean = mean(&closes[closes.len() - self.short_window..]);
        let long_mean = mean(&closes[closes.len() - self.long_window..]);
        let divergence = (short_mean - long_mean) / long_mean;
        let trend = if divergence > TREND_BAND {
            Trend::Bullish
        } else if divergence < -TREND_BAND {
            Trend::Bearish
        } else {
            Trend::Sideways
        };

        let returns: Vec<f64> = closes.windows(2).map(|w| (w[1] - w[0]) / w[0]).collect();
        let ret_mean = mean(&returns);
        let variance =
            returns.iter().map(|r| (r - ret_mean).powi(2)).sum::<f64>() / returns.len() as f64;
        let std_dev = variance.sqrt();
        let volatility = (std_dev * VOLATILITY_SCALE).clamp(0.0, 1.0);

        let last_return = returns[returns.len() - 1];
        let anomaly_detected =
            std_dev > 0.0 && (last_return - ret_mean).abs() > ANOMALY_SIGMA * std_dev;

        let volume_24h = series
            .tail(VOLUME_WINDOW)
            .iter()
            .map(|c| c.volume)
            .sum::<f64>();

        MarketContext::new(current_price, trend, volatility, volume_24h, anomaly_detected)
            .map_err(Into::into)
    }
}
