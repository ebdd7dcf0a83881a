pub mod decision;
pub mod validator;

pub use decision::{DecisionEngine, EngineParams};
pub use validator::{price_consistency, validate_trade, Severity, TradeValidation};
