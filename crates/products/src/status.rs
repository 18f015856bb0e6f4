//! Three-tier stock status classification.
//!
//! Pure functions, no side effects: callers pass the current stock level and
//! the baseline (the reference quantity reset on every seller restock) and get
//! back a percentage and a display/alerting tier.

use serde::{Deserialize, Serialize};

/// Percentage below which a product counts as running low.
pub const LOW_THRESHOLD_PCT: f64 = 40.0;

/// Percentage at or above which a product counts as well stocked.
pub const HIGH_THRESHOLD_PCT: f64 = 70.0;

/// Stock tier derived from the stock/baseline ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StockStatus {
    Low,
    Moderate,
    High,
}

impl core::fmt::Display for StockStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            StockStatus::Low => "low",
            StockStatus::Moderate => "moderate",
            StockStatus::High => "high",
        };
        f.write_str(s)
    }
}

/// Percentage of baseline currently in stock.
///
/// A zero baseline yields 0.0 rather than dividing by zero. A stale baseline
/// (stock above baseline) yields more than 100.0, which classifies as `High`.
pub fn stock_percentage(stock_level: i64, baseline_stock: i64) -> f64 {
    if baseline_stock == 0 {
        return 0.0;
    }
    (stock_level as f64 / baseline_stock as f64) * 100.0
}

/// Classify a stock percentage into a tier.
///
/// Boundaries are inclusive on the upper side: exactly 40% is `Moderate`,
/// exactly 70% is `High`. Negative stock never reaches this function; the
/// ledger guards that invariant.
pub fn classify(percentage: f64) -> StockStatus {
    if percentage < LOW_THRESHOLD_PCT {
        StockStatus::Low
    } else if percentage < HIGH_THRESHOLD_PCT {
        StockStatus::Moderate
    } else {
        StockStatus::High
    }
}

/// Classify directly from stock level and baseline.
pub fn classify_stock(stock_level: i64, baseline_stock: i64) -> StockStatus {
    classify(stock_percentage(stock_level, baseline_stock))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn boundary_just_below_low_threshold_is_low() {
        assert_eq!(classify(39.999), StockStatus::Low);
    }

    #[test]
    fn boundary_exactly_forty_is_moderate() {
        assert_eq!(classify(40.0), StockStatus::Moderate);
    }

    #[test]
    fn boundary_just_below_high_threshold_is_moderate() {
        assert_eq!(classify(69.999), StockStatus::Moderate);
    }

    #[test]
    fn boundary_exactly_seventy_is_high() {
        assert_eq!(classify(70.0), StockStatus::High);
    }

    #[test]
    fn zero_baseline_yields_zero_percent_low() {
        assert_eq!(stock_percentage(25, 0), 0.0);
        assert_eq!(classify_stock(25, 0), StockStatus::Low);
    }

    #[test]
    fn stale_baseline_classifies_high() {
        // Stock above baseline can happen while the baseline is stale.
        let pct = stock_percentage(120, 100);
        assert!(pct > 100.0);
        assert_eq!(classify(pct), StockStatus::High);
    }

    #[test]
    fn scenario_sixty_percent_is_moderate() {
        assert_eq!(stock_percentage(30, 50), 60.0);
        assert_eq!(classify_stock(30, 50), StockStatus::Moderate);
    }

    fn rank(status: StockStatus) -> u8 {
        match status {
            StockStatus::Low => 0,
            StockStatus::Moderate => 1,
            StockStatus::High => 2,
        }
    }

    proptest! {
        /// Property: every finite percentage classifies into exactly one tier.
        #[test]
        fn classification_is_total(pct in -1000.0f64..1000.0) {
            let _ = classify(pct);
        }

        /// Property: classification is monotone in the percentage.
        #[test]
        fn classification_is_monotone(a in 0.0f64..500.0, b in 0.0f64..500.0) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(rank(classify(lo)) <= rank(classify(hi)));
        }

        /// Property: percentage scales linearly with stock for a fixed baseline.
        #[test]
        fn percentage_matches_ratio(stock in 0i64..10_000, baseline in 1i64..10_000) {
            let pct = stock_percentage(stock, baseline);
            let expected = stock as f64 * 100.0 / baseline as f64;
            prop_assert!((pct - expected).abs() < 1e-9);
        }
    }
}
