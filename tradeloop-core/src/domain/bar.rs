//! PriceBar — the fundamental market data unit.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Daily OHLCV bar for a single symbol on a single trading day.
///
/// Produced by the external ingestion pipeline. `change_pct` is the
/// exchange-reported percent change (e.g. `1.5` for +1.5%), when available.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub symbol: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub change_pct: Option<f64>,
}

impl PriceBar {
    /// A bar is usable for feature extraction when its close is positive and finite.
    pub fn is_usable(&self) -> bool {
        is_usable_price(self.close)
    }

    /// Basic OHLC sanity check: high >= low, high >= open/close, low <= open/close.
    pub fn is_sane(&self) -> bool {
        if !self.is_usable() || self.high.is_nan() || self.low.is_nan() || self.open.is_nan() {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
    }
}

/// True if `price` can act as an entry or exit price (positive and finite).
pub fn is_usable_price(price: f64) -> bool {
    price.is_finite() && price > 0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bar() -> PriceBar {
        PriceBar {
            symbol: "2330".into(),
            date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            open: 100.0,
            high: 105.0,
            low: 98.0,
            close: 103.0,
            volume: 50_000.0,
            change_pct: Some(3.0),
        }
    }

    #[test]
    fn bar_is_sane() {
        assert!(sample_bar().is_sane());
        assert!(sample_bar().is_usable());
    }

    #[test]
    fn non_positive_close_is_unusable() {
        let mut bar = sample_bar();
        bar.close = 0.0;
        assert!(!bar.is_usable());
        bar.close = f64::NAN;
        assert!(!bar.is_usable());
        assert!(!bar.is_sane());
    }

    #[test]
    fn bar_detects_insane_high_low() {
        let mut bar = sample_bar();
        bar.high = 97.0;
        assert!(!bar.is_sane());
    }
}
