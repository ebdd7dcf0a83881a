use thiserror::Error;

/// A field value outside its documented range. Raised by the model
/// constructors and re-checked at the engine boundary; values are never
/// clamped silently.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{field} out of range: {value} (expected {expected})")]
pub struct ValidationError {
    pub field: &'static str,
    pub value: f64,
    pub expected: &'static str,
}

impl ValidationError {
    pub fn new(field: &'static str, value: f64, expected: &'static str) -> Self {
        Self {
            field,
            value,
            expected,
        }
    }
}

/// Errors from the leverage decision engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// No usable support/resistance signal. Always fatal to that decision;
    /// the engine never substitutes a default level.
    #[error("insufficient signal: {0}")]
    InsufficientSignal(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Errors from a [`crate::data::PriceHistoryProvider`].
#[derive(Debug, Error)]
pub enum DataProviderError {
    #[error("instrument not supported: {0}")]
    UnsupportedInstrument(String),

    #[error("insufficient history for {instrument} {timeframe}: {available} candles, need {required}")]
    InsufficientHistory {
        instrument: String,
        timeframe: String,
        available: usize,
        required: usize,
    },

    /// Retryable by the caller with an explicit budget, never inside the
    /// simulation loop.
    #[error("transient fetch failure: {0}")]
    Transient(String),
}

impl DataProviderError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, DataProviderError::Transient(_))
    }
}

/// Errors from the analysis result store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("blob io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("blob encode/decode error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("no result found for fingerprint {0}")]
    NotFound(String),

    #[error("refusing to delete fingerprint {0}: task is running")]
    DeleteWhileRunning(String),
}

/// Wraps any failure inside one task's simulation. Isolated to that task;
/// sibling tasks keep running.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("data provider failed: {0}")]
    Data(#[from] DataProviderError),

    #[error("decision engine rejected input: {0}")]
    Engine(#[from] ValidationError),

    #[error("result store failed: {0}")]
    Store(#[from] StoreError),

    #[error("signal provider failed: {0}")]
    Signal(#[from] anyhow::Error),
}
