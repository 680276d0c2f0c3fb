//! Feature layout and per-day feature construction.
//!
//! A feature row is a fixed-order vector: 19 causal time-varying dimensions
//! followed by 6 static fundamentals dimensions. The order is part of the
//! trainer/scorer contract and of the frozen `NormStats`, so it must never
//! be reshuffled without registering a new model.

pub mod extractor;
pub mod fundamentals;

pub use extractor::{FeatureExtractor, TimeSeriesFeatures};
pub use fundamentals::StaticFeatureExtractor;

use std::collections::BTreeMap;

/// Time-varying dimensions per day.
pub const TIME_FEATURE_DIM: usize = 19;

/// Static fundamentals dimensions per day.
pub const STATIC_FEATURE_DIM: usize = 6;

/// Total dimensions per feature row.
pub const FEATURE_DIM: usize = TIME_FEATURE_DIM + STATIC_FEATURE_DIM;

/// One day's complete feature vector.
pub type FeatureRow = [f64; FEATURE_DIM];

/// Column names in contract order.
pub const FEATURE_NAMES: [&str; FEATURE_DIM] = [
    "ret",
    "close_ma5",
    "close_ma20",
    "close_ma60",
    "rsi",
    "macd_diff",
    "macd_dea",
    "k",
    "d",
    "atr_ratio",
    "volume_ratio",
    "foreign_flow",
    "trust_flow",
    "dealer_flow",
    "margin_net",
    "short_net",
    "market_ret",
    "breadth_short",
    "breadth_long",
    "pe",
    "pb",
    "dividend_yield",
    "revenue_yoy",
    "gross_margin",
    "debt_ratio",
];

/// Position of a named feature in a `FeatureRow`.
pub fn feature_index(name: &str) -> Option<usize> {
    FEATURE_NAMES.iter().position(|n| *n == name)
}

/// Append static dimensions to each time-varying row.
///
/// `time` and `statics` must be the same length (one static vector per day).
pub fn combine(
    time: &[[f64; TIME_FEATURE_DIM]],
    statics: &[[f64; STATIC_FEATURE_DIM]],
) -> Vec<FeatureRow> {
    debug_assert_eq!(time.len(), statics.len());
    time.iter()
        .zip(statics)
        .map(|(t, s)| {
            let mut row = [0.0; FEATURE_DIM];
            row[..TIME_FEATURE_DIM].copy_from_slice(t);
            row[TIME_FEATURE_DIM..].copy_from_slice(s);
            row
        })
        .collect()
}

/// Named view of a raw (un-normalized) feature row, as recorded in journal
/// feature snapshots.
pub fn snapshot(row: &FeatureRow) -> BTreeMap<String, f64> {
    FEATURE_NAMES
        .iter()
        .zip(row.iter())
        .map(|(name, value)| (name.to_string(), *value))
        .collect()
}
