use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ValidationError;

fn check_unit(field: &'static str, value: f64) -> Result<f64, ValidationError> {
    if !(0.0..=1.0).contains(&value) || value.is_nan() {
        return Err(ValidationError::new(field, value, "[0, 1]"));
    }
    Ok(value)
}

fn check_positive(field: &'static str, value: f64) -> Result<f64, ValidationError> {
    if value <= 0.0 || !value.is_finite() {
        return Err(ValidationError::new(field, value, "> 0"));
    }
    Ok(value)
}

fn check_non_negative(field: &'static str, value: f64) -> Result<f64, ValidationError> {
    if value < 0.0 || !value.is_finite() {
        return Err(ValidationError::new(field, value, ">= 0"));
    }
    Ok(value)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LevelKind {
    Support,
    Resistance,
}

impl fmt::Display for LevelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LevelKind::Support => write!(f, "support"),
            LevelKind::Resistance => write!(f, "resistance"),
        }
    }
}

/// A historical price at which reversals have repeatedly occurred.
///
/// Levels too close to the current price are excluded by the provider,
/// not by the decision engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: f64,
    pub strength: f64,
    pub touch_count: u32,
    pub kind: LevelKind,
}

impl PriceLevel {
    pub fn new(
        price: f64,
        strength: f64,
        touch_count: u32,
        kind: LevelKind,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            price: check_positive("price", price)?,
            strength: check_unit("strength", strength)?,
            touch_count,
            kind,
        })
    }
}

/// Predicted behaviour of price at a specific level. Probabilities need
/// not sum to 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakoutPrediction {
    pub level: PriceLevel,
    pub breakout_probability: f64,
    pub bounce_probability: f64,
    pub confidence: f64,
}

impl BreakoutPrediction {
    pub fn new(
        level: PriceLevel,
        breakout_probability: f64,
        bounce_probability: f64,
        confidence: f64,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            level,
            breakout_probability: check_unit("breakout_probability", breakout_probability)?,
            bounce_probability: check_unit("bounce_probability", bounce_probability)?,
            confidence: check_unit("confidence", confidence)?,
        })
    }
}

/// Ordinal crash-risk grade, derived from `expected_drop_pct`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Thresholds on the expected correlated drop (percent of price).
    pub fn from_expected_drop(expected_drop_pct: f64) -> RiskLevel {
        if expected_drop_pct < 5.0 {
            RiskLevel::Low
        } else if expected_drop_pct < 10.0 {
            RiskLevel::Medium
        } else if expected_drop_pct < 20.0 {
            RiskLevel::High
        } else {
            RiskLevel::Critical
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "LOW"),
            RiskLevel::Medium => write!(f, "MEDIUM"),
            RiskLevel::High => write!(f, "HIGH"),
            RiskLevel::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Correlation-driven market crash risk estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationRisk {
    pub correlation_factor: f64,
    pub expected_drop_pct: f64,
    pub risk_level: RiskLevel,
}

impl CorrelationRisk {
    pub fn new(correlation_factor: f64, expected_drop_pct: f64) -> Result<Self, ValidationError> {
        let expected_drop_pct = check_non_negative("expected_drop_pct", expected_drop_pct)?;
        Ok(Self {
            correlation_factor: check_unit("correlation_factor", correlation_factor)?,
            expected_drop_pct,
            risk_level: RiskLevel::from_expected_drop(expected_drop_pct),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Trend {
    Bullish,
    Bearish,
    Sideways,
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trend::Bullish => write!(f, "BULLISH"),
            Trend::Bearish => write!(f, "BEARISH"),
            Trend::Sideways => write!(f, "SIDEWAYS"),
        }
    }
}

/// Local market context at decision time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketContext {
    pub current_price: f64,
    pub trend: Trend,
    pub volatility: f64,
    pub volume_24h: f64,
    pub anomaly_detected: bool,
}

impl MarketContext {
    pub fn new(
        current_price: f64,
        trend: Trend,
        volatility: f64,
        volume_24h: f64,
        anomaly_detected: bool,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            current_price: check_positive("current_price", current_price)?,
            trend,
            volatility: check_unit("volatility", volatility)?,
            volume_24h: check_non_negative("volume_24h", volume_24h)?,
            anomaly_detected,
        })
    }
}
