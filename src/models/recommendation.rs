use serde::{Deserialize, Serialize};

/// Output of the leverage decision engine for a long position.
///
/// Invariants (checked by tests, guaranteed by construction in the
/// engine): `stop_loss_price < current price < take_profit_price` and
/// `recommended_leverage <= max_safe_leverage`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeverageRecommendation {
    pub recommended_leverage: f64,
    pub max_safe_leverage: f64,
    pub confidence: f64,
    pub risk_reward_ratio: f64,
    pub stop_loss_price: f64,
    pub take_profit_price: f64,
    /// Ordered factor explanations, one per intermediate value, for
    /// auditability.
    pub reasoning: Vec<String>,
}
