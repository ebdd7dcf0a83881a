use chrono::{DateTime, Duration, Utc};

use crate::models::{
    BreakoutPrediction, Candle, CandleSeries, CorrelationRisk, LevelKind, MarketContext,
    PriceLevel, RiskLevel, Trade, Trend,
};

fn base_time() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-01-15T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

/// Create candles from (open, high, low, close) tuples with
/// auto-incrementing 1m timestamps.
pub fn make_candles(data: &[(f64, f64, f64, f64)]) -> CandleSeries {
    let base = base_time();
    let candles: Vec<Candle> = data
        .iter()
        .enumerate()
        .map(|(i, &(o, h, l, c))| Candle {
            timestamp: base + Duration::minutes(i as i64),
            open: o,
            high: h,
            low: l,
            close: c,
            volume: 100.0,
        })
        .collect();
    CandleSeries::new(candles)
}

/// Create candles from closes alone: open a touch above, a one-point
/// wick on each side.
pub fn make_closes(closes: &[f64]) -> CandleSeries {
    let base = base_time();
    let candles: Vec<Candle> = closes
        .iter()
        .enumerate()
        .map(|(i, &close)| Candle {
            timestamp: base + Duration::minutes(i as i64),
            open: close + 0.5,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 100.0,
        })
        .collect();
    CandleSeries::new(candles)
}

pub fn make_level(price: f64, strength: f64, kind: LevelKind) -> PriceLevel {
    PriceLevel {
        price,
        strength,
        touch_count: 3,
        kind,
    }
}

pub fn make_breakout(
    level: PriceLevel,
    breakout_probability: f64,
    confidence: f64,
) -> BreakoutPrediction {
    BreakoutPrediction {
        level,
        breakout_probability,
        bounce_probability: (1.0 - breakout_probability).clamp(0.0, 1.0),
        confidence,
    }
}

pub fn make_risk(correlation_factor: f64, expected_drop_pct: f64) -> CorrelationRisk {
    CorrelationRisk {
        correlation_factor,
        expected_drop_pct,
        risk_level: RiskLevel::from_expected_drop(expected_drop_pct),
    }
}

pub fn make_context(current_price: f64, trend: Trend, volatility: f64) -> MarketContext {
    MarketContext {
        current_price,
        trend,
        volatility,
        volume_24h: 1000.0,
        anomaly_detected: false,
    }
}

/// A 4-hour trade closed at `exit`, with a plausible stop/target frame
/// around the entry.
pub fn make_trade(entry: f64, exit: f64, leverage: f64) -> Trade {
    let entry_time = base_time();
    Trade {
        entry_time,
        entry_price: entry,
        exit_time: entry_time + Duration::hours(4),
        exit_price: exit,
        stop_loss_price: entry * 0.99,
        take_profit_price: entry * 1.10,
        leverage,
        pnl_pct: (exit / entry - 1.0) * leverage * 100.0,
    }
}
