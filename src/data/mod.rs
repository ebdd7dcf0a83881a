//! Historical price data access. The orchestrator only ever sees the
//! [`PriceHistoryProvider`] trait; the in-memory replay provider backs
//! both tests and cached-file runs.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::DataProviderError;
use crate::models::{Candle, CandleSeries, Timeframe};

/// Source of immutable historical candles for a simulation window.
/// Implementations must return candles sorted oldest-first.
#[async_trait]
pub trait PriceHistoryProvider: Send + Sync {
    async fn fetch(
        &self,
        instrument: &str,
        timeframe: Timeframe,
        min_candles: usize,
    ) -> Result<CandleSeries, DataProviderError>;
}

/// Replays pre-loaded candles keyed by (instrument, timeframe). No
/// clock, no I/O after construction; the simulation walks the returned
/// series itself.
#[derive(Default)]
pub struct ReplayHistoryProvider {
    data: HashMap<(String, Timeframe), Vec<Candle>>,
}

impl ReplayHistoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load candles for one instrument/timeframe pair.
    /// Candles must be sorted oldest-first.
    pub fn load(&mut self, instrument: &str, tf: Timeframe, candles: Vec<Candle>) {
        self.data.insert((instrument.to_string(), tf), candles);
    }

    /// Populate from cached JSON files named
    /// `<instrument>_<timeframe>.json` under `data_dir`, each holding a
    /// serialized `Vec<Candle>`.
    pub fn load_cached_dir(
        &mut self,
        data_dir: &str,
        instruments: &[String],
        timeframes: &[Timeframe],
    ) -> anyhow::Result<()> {
        for instrument in instruments {
            for &tf in timeframes {
                let cache_file = format!("{}/{}_{}.json", data_dir, instrument, tf);
                if !Path::new(&cache_file).exists() {
                    debug!("no cache file {}", cache_file);
                    continue;
                }
                let content = std::fs::read_to_string(&cache_file)?;
                let candles: Vec<Candle> = serde_json::from_str(&content)?;
                info!(
                    "loaded {} cached {} {} candles",
                    candles.len(),
                    instrument,
                    tf
                );
                self.load(instrument, tf, candles);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl PriceHistoryProvider for ReplayHistoryProvider {
    async fn fetch(
        &self,
        instrument: &str,
        timeframe: Timeframe,
        min_candles: usize,
    ) -> Result<CandleSeries, DataProviderError> {
        let candles = self
            .data
            .get(&(instrument.to_string(), timeframe))
            .ok_or_else(|| DataProviderError::UnsupportedInstrument(instrument.to_string()))?;

        if candles.len() < min_candles {
            return Err(DataProviderError::InsufficientHistory {
                instrument: instrument.to_string(),
                timeframe: timeframe.to_string(),
                available: candles.len(),
                required: min_candles,
            });
        }

        Ok(CandleSeries::new(candles.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::make_closes;

    #[tokio::test]
    async fn replay_serves_loaded_candles() {
        let mut provider = ReplayHistoryProvider::new();
        let series = make_closes(&[100.0, 101.0, 102.0]);
        provider.load("BTC-USD", Timeframe::H1, series.as_slice().to_vec());

        let fetched = provider.fetch("BTC-USD", Timeframe::H1, 3).await.unwrap();
        assert_eq!(fetched.len(), 3);
        assert!((fetched[2].close - 102.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn unknown_instrument_is_unsupported() {
        let provider = ReplayHistoryProvider::new();
        let err = provider.fetch("DOGE-USD", Timeframe::H1, 1).await.unwrap_err();
        assert!(matches!(err, DataProviderError::UnsupportedInstrument(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn short_history_is_reported_with_counts() {
        let mut provider = ReplayHistoryProvider::new();
        let series = make_closes(&[100.0, 101.0]);
        provider.load("BTC-USD", Timeframe::M15, series.as_slice().to_vec());

        let err = provider.fetch("BTC-USD", Timeframe::M15, 50).await.unwrap_err();
        match err {
            DataProviderError::InsufficientHistory {
                available, required, ..
            } => {
                assert_eq!(available, 2);
                assert_eq!(required, 50);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn cached_dir_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let series = make_closes(&[100.0, 101.0, 102.0, 103.0]);
        let path = dir.path().join("ETH-USD_1h.json");
        std::fs::write(
            &path,
            serde_json::to_string(series.as_slice()).unwrap(),
        )
        .unwrap();

        let mut provider = ReplayHistoryProvider::new();
        provider
            .load_cached_dir(
                dir.path().to_str().unwrap(),
                &["ETH-USD".to_string()],
                &[Timeframe::H1],
            )
            .unwrap();

        let fetched = provider.fetch("ETH-USD", Timeframe::H1, 4).await.unwrap();
        assert_eq!(fetched.len(), 4);
    }
}
