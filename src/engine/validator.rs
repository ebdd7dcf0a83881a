//! Post-hoc sanity checks on simulated trades and on the price gap
//! between analysis time and execution time. Catches results that are
//! arithmetically possible but market-implausible before they reach the
//! store.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::Trade;

/// Price move above this fraction of entry within a sub-hour trade is
/// implausible for a liquid instrument.
const SHORT_HORIZON_MINUTES: f64 = 60.0;
const SHORT_HORIZON_MOVE: f64 = 0.20;
/// Annualized-return ceiling: 10.0 = 1000% per year.
const MAX_ANNUALIZED_RETURN: f64 = 10.0;
const MINUTES_PER_YEAR: f64 = 525_600.0;

/// Graded plausibility verdict. Ordinal: each variant is strictly worse
/// than the one before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Normal,
    Warning,
    Error,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Normal => write!(f, "normal"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// Outcome of [`validate_trade`]: the worst severity found plus one
/// human-readable line per issue.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeValidation {
    pub severity: Severity,
    pub issues: Vec<String>,
}

impl TradeValidation {
    /// Trades at `Critical` severity must be discarded, everything else
    /// is kept (with its issues recorded).
    pub fn is_valid(&self) -> bool {
        self.severity != Severity::Critical
    }
}

/// Check one closed long trade for internal consistency and market
/// plausibility. Pure; the caller decides what to do with the verdict.
pub fn validate_trade(trade: &Trade) -> TradeValidation {
    let mut issues = Vec::new();
    let mut severity = Severity::Normal;
    let mut error_count = 0usize;

    // Price ordering for a long position. A violated ordering means the
    // trade could never have been placed as described.
    if !(trade.stop_loss_price < trade.entry_price
        && trade.entry_price < trade.take_profit_price)
    {
        issues.push(format!(
            "price ordering violated: stop {:.4} / entry {:.4} / take-profit {:.4}",
            trade.stop_loss_price, trade.entry_price, trade.take_profit_price,
        ));
        severity = Severity::Critical;
    }

    let duration = trade.duration_minutes();
    let move_pct = (trade.exit_price - trade.entry_price).abs() / trade.entry_price;

    // Large move compressed into a sub-hour window.
    if duration < SHORT_HORIZON_MINUTES && move_pct > SHORT_HORIZON_MOVE {
        issues.push(format!(
            "{:.1}% move in {:.0} minutes exceeds the short-horizon bound",
            move_pct * 100.0,
            duration,
        ));
        error_count += 1;
        severity = severity.max(Severity::Error);
    }

    // Return rate extrapolated to a year.
    if duration > 0.0 {
        let annualized = move_pct * (MINUTES_PER_YEAR / duration);
        if annualized > MAX_ANNUALIZED_RETURN {
            issues.push(format!(
                "annualized return {:.0}% exceeds {:.0}%",
                annualized * 100.0,
                MAX_ANNUALIZED_RETURN * 100.0,
            ));
            error_count += 1;
            severity = severity.max(Severity::Error);
        }
    }

    // Several independent plausibility failures on one trade are as
    // damning as a single hard inconsistency.
    if error_count >= 2 {
        severity = Severity::Critical;
    }

    TradeValidation { severity, issues }
}

/// Grade the gap between the price a recommendation was computed at and
/// the price execution would actually happen at. `Critical` gaps mean
/// the recommendation no longer applies.
pub fn price_consistency(analysis_price: f64, execution_price: f64) -> Severity {
    let divergence = (execution_price - analysis_price).abs() / analysis_price;
    if divergence < 0.01 {
        Severity::Normal
    } else if divergence < 0.05 {
        Severity::Warning
    } else if divergence < 0.10 {
        Severity::Error
    } else {
        Severity::Critical
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    use crate::models::Trade;

    fn trade_over_minutes(entry: f64, exit: f64, minutes: i64) -> Trade {
        let entry_time = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();
        Trade {
            entry_time,
            entry_price: entry,
            exit_time: entry_time + Duration::minutes(minutes),
            exit_price: exit,
            stop_loss_price: entry * 0.98,
            take_profit_price: entry * 1.60,
            leverage: 3.0,
            pnl_pct: (exit / entry - 1.0) * 3.0 * 100.0,
        }
    }

    #[test]
    fn plausible_trade_is_normal() {
        let trade = trade_over_minutes(100.0, 102.0, 240);
        let v = validate_trade(&trade);
        assert_eq!(v.severity, Severity::Normal);
        assert!(v.issues.is_empty());
        assert!(v.is_valid());
    }

    #[test]
    fn ordering_violation_is_critical() {
        let mut trade = trade_over_minutes(100.0, 102.0, 240);
        trade.stop_loss_price = 101.0; // above entry
        let v = validate_trade(&trade);
        assert_eq!(v.severity, Severity::Critical);
        assert!(!v.is_valid());
    }

    #[test]
    fn fast_45_pct_move_is_critical() {
        // 1932 -> 2812 in 50 minutes: a ~45% spot move. Trips both the
        // short-horizon and the annualized-return checks; two
        // independent errors escalate.
        let trade = trade_over_minutes(1932.0, 2812.0, 50);
        let v = validate_trade(&trade);
        assert_eq!(v.severity, Severity::Critical);
        assert_eq!(v.issues.len(), 2);
        assert!(!v.is_valid());
    }

    #[test]
    fn single_error_does_not_escalate() {
        // 15% in 50 minutes: under the 20% short-horizon bound, over
        // the annualized ceiling. One error, no escalation.
        let trade = trade_over_minutes(100.0, 115.0, 50);
        let v = validate_trade(&trade);
        assert_eq!(v.severity, Severity::Error);
        assert_eq!(v.issues.len(), 1);
        assert!(v.is_valid());
    }

    #[test]
    fn price_consistency_buckets() {
        assert_eq!(price_consistency(100.0, 100.5), Severity::Normal);
        assert_eq!(price_consistency(100.0, 103.0), Severity::Warning);
        assert_eq!(price_consistency(100.0, 107.0), Severity::Error);
        assert_eq!(price_consistency(100.0, 115.0), Severity::Critical);
        assert_eq!(price_consistency(100.0, 85.0), Severity::Critical);
    }
}
