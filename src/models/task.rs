use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::Timeframe;

/// One unit of backtest work: an (instrument, timeframe, strategy)
/// triple. The fingerprint is the dedup/cache key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisTask {
    pub instrument: String,
    pub timeframe: Timeframe,
    pub strategy: String,
}

impl AnalysisTask {
    pub fn new(instrument: impl Into<String>, timeframe: Timeframe, strategy: impl Into<String>) -> Self {
        Self {
            instrument: instrument.into(),
            timeframe,
            strategy: strategy.into(),
        }
    }

    /// Deterministic identity of this task. Canonical form is the
    /// `instrument|timeframe|strategy` string so the hash is stable
    /// across runs and processes.
    pub fn fingerprint(&self) -> String {
        let canonical = format!("{}|{}|{}", self.instrument, self.timeframe, self.strategy);
        blake3::hash(canonical.as_bytes()).to_hex().to_string()
    }
}

impl fmt::Display for AnalysisTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.instrument, self.timeframe, self.strategy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_deterministic() {
        let a = AnalysisTask::new("BTC-USD", Timeframe::H1, "balanced");
        let b = AnalysisTask::new("BTC-USD", Timeframe::H1, "balanced");
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn fingerprint_differs_per_component() {
        let base = AnalysisTask::new("BTC-USD", Timeframe::H1, "balanced");
        let other_instrument = AnalysisTask::new("ETH-USD", Timeframe::H1, "balanced");
        let other_tf = AnalysisTask::new("BTC-USD", Timeframe::M15, "balanced");
        let other_strategy = AnalysisTask::new("BTC-USD", Timeframe::H1, "aggressive");

        assert_ne!(base.fingerprint(), other_instrument.fingerprint());
        assert_ne!(base.fingerprint(), other_tf.fingerprint());
        assert_ne!(base.fingerprint(), other_strategy.fingerprint());
    }

    #[test]
    fn fingerprint_is_hex() {
        let fp = AnalysisTask::new("BTC-USD", Timeframe::H1, "balanced").fingerprint();
        assert_eq!(fp.len(), 64);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
