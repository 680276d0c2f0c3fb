//! Upstream rows joined onto a price bar.
//!
//! Every numeric column is optional: the ingestion layer may not have
//! computed it for a given day, and feature extraction substitutes a
//! neutral value instead of failing.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::bar::PriceBar;

/// Precomputed technical indicators, aligned 1:1 with a `PriceBar` by (symbol, date).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndicatorRow {
    pub ma5: Option<f64>,
    pub ma20: Option<f64>,
    pub ma60: Option<f64>,
    /// RSI on the 0..100 scale.
    pub rsi: Option<f64>,
    pub macd_diff: Option<f64>,
    pub macd_dea: Option<f64>,
    /// Stochastic K on the 0..100 scale.
    pub k: Option<f64>,
    /// Stochastic D on the 0..100 scale.
    pub d: Option<f64>,
    pub atr: Option<f64>,
}

/// Institutional net flows for a symbol on a day (shares).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChipRow {
    pub foreign_net: Option<f64>,
    pub trust_net: Option<f64>,
    pub dealer_net: Option<f64>,
}

/// Margin and short-sale balance changes for a symbol on a day.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarginRow {
    pub margin_net: Option<f64>,
    pub short_net: Option<f64>,
}

/// Market breadth moving averages for a date, on the 0..100 scale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BreadthRow {
    pub breadth_ma_short: Option<f64>,
    pub breadth_ma_long: Option<f64>,
}

/// Slow-moving fundamentals snapshot for a symbol, valid from `as_of`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticFundamental {
    pub symbol: String,
    pub as_of: NaiveDate,
    pub pe: Option<f64>,
    pub pb: Option<f64>,
    pub dividend_yield: Option<f64>,
    pub revenue_yoy: Option<f64>,
    pub gross_margin: Option<f64>,
    pub debt_ratio: Option<f64>,
}

/// One trading day for one symbol with every upstream row joined on.
///
/// Produced by a `MarketDataSource`; missing joins are `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyRecord {
    pub bar: PriceBar,
    pub indicators: Option<IndicatorRow>,
    pub chips: Option<ChipRow>,
    pub margin: Option<MarginRow>,
    pub market_close: Option<f64>,
    pub breadth: Option<BreadthRow>,
}

impl DailyRecord {
    /// A record carrying only the price bar.
    pub fn bare(bar: PriceBar) -> Self {
        Self {
            bar,
            indicators: None,
            chips: None,
            margin: None,
            market_close: None,
            breadth: None,
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.bar.date
    }
}
