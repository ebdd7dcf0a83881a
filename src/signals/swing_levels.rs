use anyhow::bail;
use async_trait::async_trait;

use crate::models::{CandleSeries, LevelKind, PriceLevel};
use crate::signals::LevelProvider;

/// Levels within this fraction of each other merge into one cluster.
const CLUSTER_TOLERANCE: f64 = 0.005;
/// Levels closer to the current price than this are noise, not levels.
const MIN_DISTANCE_PCT: f64 = 0.005;
const BASE_STRENGTH: f64 = 0.3;
const STRENGTH_PER_TOUCH: f64 = 0.15;

/// Swing-extreme support/resistance detection. A candle whose low (high)
/// is the extreme of its neighbourhood marks a swing; swings clustering
/// at the same price form a level, and each extra touch strengthens it.
pub struct SwingLevelProvider {
    pub swing_lookback: usize,
}

impl SwingLevelProvider {
    pub fn new() -> Self {
        Self::with_lookback(3)
    }

    pub fn with_lookback(lookback: usize) -> Self {
        Self {
            swing_lookback: lookback.max(1),
        }
    }

    fn raw_swings(&self, series: &CandleSeries) -> (Vec<f64>, Vec<f64>) {
        let candles = series.as_slice();
        let k = self.swing_lookback;
        let mut swing_lows = Vec::new();
        let mut swing_highs = Vec::new();

        for i in k..candles.len().saturating_sub(k) {
            let window = &candles[i - k..=i + k];
            let c = &candles[i];

            if window.iter().all(|w| c.low <= w.low) {
                swing_lows.push(c.low);
            }
            if window.iter().all(|w| c.high >= w.high) {
                swing_highs.push(c.high);
            }
        }

        (swing_highs, swing_lows)
    }

    fn cluster(&self, mut prices: Vec<f64>, kind: LevelKind) -> Vec<PriceLevel> {
        prices.sort_by(|a, b| a.total_cmp(b));

        let mut levels: Vec<PriceLevel> = Vec::new();
        for price in prices {
            match levels.last_mut() {
                Some(last) if (price - last.price).abs() / last.price <= CLUSTER_TOLERANCE => {
                    // Fold into the cluster: average the price, count the touch.
                    let n = last.touch_count as f64;
                    last.price = (last.price * n + price) / (n + 1.0);
                    last.touch_count += 1;
                    last.strength =
                        (BASE_STRENGTH + STRENGTH_PER_TOUCH * last.touch_count as f64).min(1.0);
                }
                _ => {
                    levels.push(PriceLevel {
                        price,
                        strength: (BASE_STRENGTH + STRENGTH_PER_TOUCH).min(1.0),
                        touch_count: 1,
                        kind,
                    });
                }
            }
        }
        levels
    }
}

impl Default for SwingLevelProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LevelProvider for SwingLevelProvider {
    async fn levels(&self, series: &CandleSeries) -> anyhow::Result<Vec<PriceLevel>> {
        let min_len = self.swing_lookback * 2 + 1;
        if series.len() < min_len {
            bail!(
                "need at least {} candles for swing detection, got {}",
                min_len,
                series.len()
            );
        }
        // Non-empty by the check above.
        let current = match series.last() {
            Some(c) => c.close,
            None => bail!("empty candle series"),
        };

        let (swing_highs, swing_lows) = self.raw_swings(series);

        let mut levels = Vec::new();
        for level in self.cluster(swing_lows, LevelKind::Support) {
            if level.price < current {
                levels.push(level);
            }
        }
        for level in self.cluster(swing_highs, LevelKind::Resistance) {
            if level.price > current {
                levels.push(level);
            }
        }

        // Drop levels hugging the current price.
        levels.retain(|l| (l.price - current).abs() / current >= MIN_DISTANCE_PCT);
        levels.sort_by(|a, b| a.price.total_cmp(&b.price));

        Ok(levels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::make_closes;

    fn vee_series() -> CandleSeries {
        // Descend 110 -> 95, then recover to 105: one clear swing low
        // around 95 and swing highs at the start.
        make_closes(&[
            110.0, 108.0, 106.0, 104.0, 102.0, 100.0, 98.0, 96.0, 95.0, 96.0, 98.0, 100.0, 102.0,
            104.0, 105.0,
        ])
    }

    #[tokio::test]
    async fn finds_support_below_and_resistance_above() {
        let series = vee_series();
        let levels = SwingLevelProvider::new().levels(&series).await.unwrap();

        assert!(!levels.is_empty());
        let current = series.last().unwrap().close;
        assert!(levels
            .iter()
            .any(|l| l.kind == LevelKind::Support && l.price < current));
        for l in &levels {
            match l.kind {
                LevelKind::Support => assert!(l.price < current),
                LevelKind::Resistance => assert!(l.price > current),
            }
            assert!((0.0..=1.0).contains(&l.strength));
            assert!((l.price - current).abs() / current >= MIN_DISTANCE_PCT);
        }
    }

    #[tokio::test]
    async fn repeated_touches_strengthen_a_level() {
        // Price bounces off ~95 three times.
        let series = make_closes(&[
            100.0, 97.0, 95.0, 97.0, 100.0, 98.0, 95.1, 98.0, 100.0, 97.0, 94.9, 97.0, 100.0,
            101.0, 102.0,
        ]);

        let levels = SwingLevelProvider::with_lookback(2)
            .levels(&series)
            .await
            .unwrap();
        let support = levels
            .iter()
            .filter(|l| l.kind == LevelKind::Support)
            .max_by(|a, b| a.touch_count.cmp(&b.touch_count))
            .unwrap();
        assert!(support.touch_count >= 2);
        assert!(support.strength > BASE_STRENGTH + STRENGTH_PER_TOUCH);
    }

    #[tokio::test]
    async fn too_short_series_errors() {
        let series = make_closes(&[100.0, 101.0]);
        assert!(SwingLevelProvider::new().levels(&series).await.is_err());
    }
}
