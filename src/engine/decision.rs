use crate::error::{EngineError, ValidationError};
use crate::models::{
    BreakoutPrediction, CorrelationRisk, LeverageRecommendation, MarketContext, PriceLevel,
    RiskLevel, Trend,
};
use crate::models::signal::LevelKind;

const MIN_LEVERAGE: f64 = 1.0;
/// Scales the support-distance constraint: a support 1/15 of max-loss
/// room away saturates the ceiling.
const SUPPORT_DISTANCE_SCALE: f64 = 15.0;
/// How sharply the ceiling drops when risk-reward misses the minimum.
const RR_PENALTY: f64 = 0.4;
/// Confidence used for the ceiling when no breakout predictor is wired.
const NEUTRAL_CONFIDENCE: f64 = 0.5;
const TREND_BULLISH_MULT: f64 = 1.15;
const TREND_BEARISH_MULT: f64 = 0.7;

/// Tunables for one decision, derived from the strategy thresholds.
#[derive(Debug, Clone, Copy)]
pub struct EngineParams {
    /// Absolute leverage ceiling (the strategy's cap for the timeframe).
    pub max_leverage: f64,
    /// Risk-reward knee below which the ceiling drops sharply.
    pub min_risk_reward: f64,
}

impl Default for EngineParams {
    fn default() -> Self {
        Self {
            max_leverage: 25.0,
            min_risk_reward: 1.5,
        }
    }
}

/// Multi-factor leverage scoring. Pure and deterministic: no I/O, no
/// shared state, identical inputs always yield identical output.
#[derive(Debug, Clone)]
pub struct DecisionEngine {
    params: EngineParams,
}

impl DecisionEngine {
    pub fn new(params: EngineParams) -> Self {
        Self { params }
    }

    /// Fuse price levels, an optional breakout estimate, crash-risk and
    /// market context into one long-position leverage recommendation.
    ///
    /// Fails with [`EngineError::InsufficientSignal`] when no support
    /// below or no resistance above the current price exists — absence
    /// of real signal is a hard failure, never a degraded estimate.
    pub fn decide(
        &self,
        levels: &[PriceLevel],
        breakout: Option<&BreakoutPrediction>,
        correlation: &CorrelationRisk,
        context: &MarketContext,
    ) -> Result<LeverageRecommendation, EngineError> {
        validate_inputs(levels, breakout, correlation, context)?;

        let price = context.current_price;
        let max_lev = self.params.max_leverage;
        let mut reasoning = Vec::new();

        // 1. Downside: nearest support below current price.
        let support = nearest_support(levels, price).ok_or_else(|| {
            EngineError::InsufficientSignal("no support level below current price".to_string())
        })?;
        let downside_risk = (price - support.price) / price;
        reasoning.push(format!(
            "support {:.4} ({:.2}% below, strength {:.2})",
            support.price,
            downside_risk * 100.0,
            support.strength,
        ));

        // 2. Upside: nearest resistance above current price.
        let resistance = nearest_resistance(levels, price).ok_or_else(|| {
            EngineError::InsufficientSignal("no resistance level above current price".to_string())
        })?;
        let profit_potential = (resistance.price - price) / price;
        reasoning.push(format!(
            "resistance {:.4} ({:.2}% above)",
            resistance.price,
            profit_potential * 100.0,
        ));

        // The breakout probability adjusts the risk-reward estimate, not
        // the raw resistance distance used for the take-profit price.
        let breakout_adjust = match breakout {
            Some(b) => 0.75 + 0.5 * b.breakout_probability,
            None => 1.0,
        };
        let risk_reward_ratio = (profit_potential * breakout_adjust) / downside_risk;
        reasoning.push(format!(
            "risk-reward {:.2} (breakout adjust x{:.2})",
            risk_reward_ratio, breakout_adjust,
        ));

        // 3. Per-factor ceilings; the most restrictive factor wins.
        let support_cap =
            (max_lev * downside_risk * SUPPORT_DISTANCE_SCALE).clamp(MIN_LEVERAGE, max_lev);
        reasoning.push(format!("support distance caps at {:.1}x", support_cap));

        let rr_cap = if risk_reward_ratio >= self.params.min_risk_reward {
            max_lev
        } else {
            (max_lev * (risk_reward_ratio / self.params.min_risk_reward) * RR_PENALTY)
                .max(MIN_LEVERAGE)
        };
        reasoning.push(format!(
            "risk-reward vs min {:.2} caps at {:.1}x",
            self.params.min_risk_reward, rr_cap,
        ));

        let signal_confidence = breakout.map_or(NEUTRAL_CONFIDENCE, |b| b.confidence);
        let confidence_cap = max_lev * (0.5 + 0.5 * signal_confidence);
        reasoning.push(format!(
            "signal confidence {:.2} caps at {:.1}x",
            signal_confidence, confidence_cap,
        ));

        let correlation_cap = match correlation.risk_level {
            RiskLevel::Critical => 2.0f64.min(max_lev),
            RiskLevel::High => 5.0f64.min(max_lev),
            RiskLevel::Medium => max_lev * 0.5 * (1.0 - 0.4 * correlation.correlation_factor),
            RiskLevel::Low => max_lev * (1.0 - 0.2 * correlation.correlation_factor),
        }
        .max(MIN_LEVERAGE);
        reasoning.push(format!(
            "correlation risk {} caps at {:.1}x",
            correlation.risk_level, correlation_cap,
        ));

        let volatility_cap = (max_lev * (1.0 - 0.6 * context.volatility)).max(MIN_LEVERAGE);
        reasoning.push(format!(
            "volatility {:.2} caps at {:.1}x",
            context.volatility, volatility_cap,
        ));

        let base = support_cap
            .min(rr_cap)
            .min(confidence_cap)
            .min(correlation_cap)
            .min(volatility_cap);

        // Trend is a final scalar on the composite ceiling, applied after
        // the minimum of the other five constraints.
        let trend_mult = match context.trend {
            Trend::Bullish => TREND_BULLISH_MULT,
            Trend::Bearish => TREND_BEARISH_MULT,
            Trend::Sideways => 1.0,
        };
        let max_safe_leverage = (base * trend_mult).clamp(MIN_LEVERAGE, max_lev);
        reasoning.push(format!(
            "{} trend x{:.2} -> max safe {:.1}x",
            context.trend, trend_mult, max_safe_leverage,
        ));

        // 4. Final recommendation, damped by market conservatism.
        let market_conservatism = (0.5 + context.volatility * 0.3).clamp(0.5, 0.8);
        let recommended_leverage =
            (max_safe_leverage * market_conservatism).clamp(MIN_LEVERAGE, max_safe_leverage);
        reasoning.push(format!(
            "conservatism {:.2} -> recommended {:.1}x",
            market_conservatism, recommended_leverage,
        ));

        // 5. Stop-loss below entry; wider for weak supports, tighter for
        // high leverage, bounded to [1%, 15%].
        let buffer = 0.02 * (1.2 - support.strength);
        let max_loss_pct = 0.10 / recommended_leverage;
        let stop_distance = buffer.max(max_loss_pct).clamp(0.01, 0.15);
        let stop_loss_price = price * (1.0 - stop_distance);
        reasoning.push(format!(
            "stop {:.2}% below entry at {:.4}",
            stop_distance * 100.0,
            stop_loss_price,
        ));

        // 6. Take-profit beyond resistance when a breakout is likely,
        // short of it otherwise.
        let tp_mult = match breakout {
            Some(b) if b.breakout_probability > 0.6 => 1.1,
            _ => 0.9,
        };
        let tp_distance = profit_potential * tp_mult;
        let take_profit_price = price * (1.0 + tp_distance);
        reasoning.push(format!(
            "take-profit {:.2}% above entry at {:.4}",
            tp_distance * 100.0,
            take_profit_price,
        ));

        // 7. Confidence: breakout signal, inverse crash correlation, and
        // data completeness. Reduced, not fabricated, when the predictor
        // is unavailable.
        let (confidence_term, completeness) = match breakout {
            Some(b) => (b.confidence, 1.0),
            None => (0.35, 0.5),
        };
        let confidence = (0.45 * confidence_term
            + 0.35 * (1.0 - correlation.correlation_factor)
            + 0.2 * completeness)
            .clamp(0.0, 1.0);
        reasoning.push(format!("confidence {:.2}", confidence));

        Ok(LeverageRecommendation {
            recommended_leverage,
            max_safe_leverage,
            confidence,
            risk_reward_ratio,
            stop_loss_price,
            take_profit_price,
            reasoning,
        })
    }
}

fn nearest_support(levels: &[PriceLevel], price: f64) -> Option<&PriceLevel> {
    levels
        .iter()
        .filter(|l| l.kind == LevelKind::Support && l.price < price)
        .max_by(|a, b| a.price.total_cmp(&b.price))
}

fn nearest_resistance(levels: &[PriceLevel], price: f64) -> Option<&PriceLevel> {
    levels
        .iter()
        .filter(|l| l.kind == LevelKind::Resistance && l.price > price)
        .min_by(|a, b| a.price.total_cmp(&b.price))
}

/// Re-check field ranges at the engine boundary. Structs arriving from
/// deserialization may bypass the validating constructors; bad values
/// are rejected, never clamped.
fn validate_inputs(
    levels: &[PriceLevel],
    breakout: Option<&BreakoutPrediction>,
    correlation: &CorrelationRisk,
    context: &MarketContext,
) -> Result<(), ValidationError> {
    for level in levels {
        PriceLevel::new(level.price, level.strength, level.touch_count, level.kind)?;
    }
    if let Some(b) = breakout {
        BreakoutPrediction::new(
            b.level.clone(),
            b.breakout_probability,
            b.bounce_probability,
            b.confidence,
        )?;
    }
    CorrelationRisk::new(correlation.correlation_factor, correlation.expected_drop_pct)?;
    MarketContext::new(
        context.current_price,
        context.trend,
        context.volatility,
        context.volume_24h,
        context.anomaly_detected,
    )?;
    Ok(())
}
