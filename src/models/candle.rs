use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Wraps Vec<Candle> with the slicing/extrema helpers the signal
/// providers need.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CandleSeries {
    candles: Vec<Candle>,
}

impl CandleSeries {
    pub fn new(candles: Vec<Candle>) -> Self {
        Self { candles }
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Candle> {
        self.candles.get(index)
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    pub fn tail(&self, n: usize) -> CandleSeries {
        let start = self.candles.len().saturating_sub(n);
        CandleSeries::new(self.candles[start..].to_vec())
    }

    pub fn slice(&self, start: usize, end: usize) -> CandleSeries {
        let s = start.min(self.candles.len());
        let e = end.min(self.candles.len());
        CandleSeries::new(self.candles[s..e].to_vec())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Candle> {
        self.candles.iter()
    }

    pub fn as_slice(&self) -> &[Candle] {
        &self.candles
    }

    pub fn highs_max(&self) -> f64 {
        self.candles
            .iter()
            .map(|c| c.high)
            .fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn lows_min(&self) -> f64 {
        self.candles
            .iter()
            .map(|c| c.low)
            .fold(f64::INFINITY, f64::min)
    }

    pub fn closes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.close).collect()
    }

    /// Candles within [start, end], inclusive.
    pub fn between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> CandleSeries {
        let from = self.candles.partition_point(|c| c.timestamp < start);
        let to = self.candles.partition_point(|c| c.timestamp <= end);
        CandleSeries::new(self.candles[from..to].to_vec())
    }

    /// Candles with timestamp <= `ts` (the visible history at a simulated
    /// point in time).
    pub fn up_to(&self, ts: DateTime<Utc>) -> CandleSeries {
        let end = self.candles.partition_point(|c| c.timestamp <= ts);
        CandleSeries::new(self.candles[..end].to_vec())
    }

    /// Resample to a larger timeframe bucket.
    pub fn resample(&self, bucket: Duration) -> CandleSeries {
        if self.candles.is_empty() {
            return CandleSeries::default();
        }
        let bucket_secs = bucket.as_secs() as i64;
        let mut result: Vec<Candle> = Vec::new();

        for candle in &self.candles {
            let ts = candle.timestamp.timestamp();
            let bucket_start = ts - (ts % bucket_secs);
            let bucket_ts = DateTime::from_timestamp(bucket_start, 0).unwrap_or(candle.timestamp);

            if let Some(last) = result.last_mut() {
                if last.timestamp == bucket_ts {
                    last.high = last.high.max(candle.high);
                    last.low = last.low.min(candle.low);
                    last.close = candle.close;
                    last.volume += candle.volume;
                    continue;
                }
            }

            result.push(Candle {
                timestamp: bucket_ts,
                open: candle.open,
                high: candle.high,
                low: candle.low,
                close: candle.close,
                volume: candle.volume,
            });
        }

        CandleSeries::new(result)
    }
}

impl std::ops::Index<usize> for CandleSeries {
    type Output = Candle;
    fn index(&self, index: usize) -> &Self::Output {
        &self.candles[index]
    }
}

impl IntoIterator for CandleSeries {
    type Item = Candle;
    type IntoIter = std::vec::IntoIter<Candle>;
    fn into_iter(self) -> Self::IntoIter {
        self.candles.into_iter()
    }
}

impl<'a> IntoIterator for &'a CandleSeries {
    type Item = &'a Candle;
    type IntoIter = std::slice::Iter<'a, Candle>;
    fn into_iter(self) -> Self::IntoIter {
        self.candles.iter()
    }
}
