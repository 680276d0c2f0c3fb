//! Causal per-day feature extraction.
//!
//! Invariant: no feature value at day t may depend on data from day t+1 or
//! later. Every rolling quantity (trailing volume mean, previous close,
//! previous index level) is updated only after the current row is emitted.

use chrono::NaiveDate;
use std::collections::VecDeque;
use tracing::debug;

use super::TIME_FEATURE_DIM;
use crate::config::DatasetConfig;
use crate::domain::DailyRecord;

/// Trailing window for the volume ratio, current day included.
const VOLUME_WINDOW: usize = 20;

/// Neutral oscillator reading (RSI, K, D, breadth) on the 0..100 scale.
const NEUTRAL_OSCILLATOR: f64 = 50.0;

/// Time-varying features for one symbol, ascending by date.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesFeatures {
    pub symbol: String,
    pub dates: Vec<NaiveDate>,
    pub closes: Vec<f64>,
    pub features: Vec<[f64; TIME_FEATURE_DIM]>,
}

impl TimeSeriesFeatures {
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }
}

/// Builds the 19 time-varying dimensions from joined daily records.
#[derive(Debug, Clone, Copy)]
pub struct FeatureExtractor {
    min_history: usize,
}

impl FeatureExtractor {
    /// `min_history` is the usable-row count below which extraction yields `None`.
    pub fn new(min_history: usize) -> Self {
        Self { min_history }
    }

    pub fn from_config(config: &DatasetConfig) -> Self {
        Self::new(config.min_history())
    }

    pub fn min_history(&self) -> usize {
        self.min_history
    }

    /// Extract features from records sorted ascending by date.
    ///
    /// Rows with a non-positive or non-finite close are skipped. Returns
    /// `None` when fewer than `min_history` usable rows remain.
    pub fn extract(&self, symbol: &str, records: &[DailyRecord]) -> Option<TimeSeriesFeatures> {
        debug_assert!(records.windows(2).all(|w| w[0].bar.date <= w[1].bar.date));

        let usable: Vec<&DailyRecord> = records.iter().filter(|r| r.bar.is_usable()).collect();
        if usable.len() < self.min_history {
            debug!(
                symbol,
                usable = usable.len(),
                required = self.min_history,
                "insufficient history, skipping symbol"
            );
            return None;
        }

        let mut dates = Vec::with_capacity(usable.len());
        let mut closes = Vec::with_capacity(usable.len());
        let mut features = Vec::with_capacity(usable.len());

        let mut volumes: VecDeque<f64> = VecDeque::with_capacity(VOLUME_WINDOW);
        let mut prev_close: Option<f64> = None;
        let mut prev_market: Option<f64> = None;

        for record in usable {
            let bar = &record.bar;
            let close = bar.close;
            let volume = if bar.volume.is_finite() && bar.volume > 0.0 {
                bar.volume
            } else {
                0.0
            };

            if volumes.len() == VOLUME_WINDOW {
                volumes.pop_front();
            }
            volumes.push_back(volume);
            let avg_volume = volumes.iter().sum::<f64>() / volumes.len() as f64;

            let ret = match prev_close {
                Some(prev) => close / prev - 1.0,
                None => bar
                    .change_pct
                    .filter(|p| p.is_finite())
                    .map_or(0.0, |p| p / 100.0),
            };

            let ind = record.indicators.clone().unwrap_or_default();
            let chips = record.chips.clone().unwrap_or_default();
            let margin = record.margin.clone().unwrap_or_default();
            let breadth = record.breadth.unwrap_or_default();

            let market_close = record.market_close.filter(|c| c.is_finite() && *c > 0.0);
            let market_ret = match (market_close, prev_market) {
                (Some(now), Some(prev)) => now / prev - 1.0,
                _ => 0.0,
            };

            let row = [
                finite_or(ret, 0.0),
                ratio(Some(close), ind.ma5, 1.0),
                ratio(Some(close), ind.ma20, 1.0),
                ratio(Some(close), ind.ma60, 1.0),
                oscillator(ind.rsi),
                value_or(ind.macd_diff, 0.0),
                value_or(ind.macd_dea, 0.0),
                oscillator(ind.k),
                oscillator(ind.d),
                ratio(ind.atr, Some(close), 0.0),
                ratio(Some(volume), Some(avg_volume), 1.0),
                ratio(chips.foreign_net, Some(volume), 0.0),
                ratio(chips.trust_net, Some(volume), 0.0),
                ratio(chips.dealer_net, Some(volume), 0.0),
                value_or(margin.margin_net, 0.0),
                value_or(margin.short_net, 0.0),
                finite_or(market_ret, 0.0),
                oscillator(breadth.breadth_ma_short),
                oscillator(breadth.breadth_ma_long),
            ];

            dates.push(bar.date);
            closes.push(close);
            features.push(row);

            prev_close = Some(close);
            if market_close.is_some() {
                prev_market = market_close;
            }
        }

        Some(TimeSeriesFeatures {
            symbol: symbol.to_string(),
            dates,
            closes,
            features,
        })
    }
}

fn finite_or(value: f64, default: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        default
    }
}

fn value_or(value: Option<f64>, default: f64) -> f64 {
    value.map_or(default, |v| finite_or(v, default))
}

/// `num / den`, or `default` when either side is missing or the denominator is not positive.
fn ratio(num: Option<f64>, den: Option<f64>, default: f64) -> f64 {
    match (num, den) {
        (Some(n), Some(d)) if d.is_finite() && d > 0.0 => finite_or(n / d, default),
        _ => default,
    }
}

/// Scale a 0..100 oscillator to 0..1, neutral when missing.
fn oscillator(value: Option<f64>) -> f64 {
    value_or(value, NEUTRAL_OSCILLATOR) / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChipRow, IndicatorRow, PriceBar};

    fn record(day: i64, close: f64, volume: f64) -> DailyRecord {
        let base = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        DailyRecord::bare(PriceBar {
            symbol: "AAA".into(),
            date: base + chrono::Duration::days(day),
            open: close,
            high: close,
            low: close,
            close,
            volume,
            change_pct: None,
        })
    }

    fn series(n: usize) -> Vec<DailyRecord> {
        (0..n)
            .map(|i| record(i as i64, 100.0 + i as f64, 1000.0 + 10.0 * i as f64))
            .collect()
    }

    #[test]
    fn missing_inputs_default_to_neutral() {
        let extracted = FeatureExtractor::new(1).extract("AAA", &series(3)).unwrap();
        let row = extracted.features[0];
        assert_eq!(row[0], 0.0); // no previous close
        assert_eq!(row[1], 1.0);
        assert_eq!(row[3], 1.0);
        assert_eq!(row[4], 0.5);
        assert_eq!(row[7], 0.5);
        assert_eq!(row[9], 0.0);
        assert_eq!(row[10], 1.0); // single-bar volume window
        assert_eq!(row[11], 0.0);
        assert_eq!(row[16], 0.0);
        assert_eq!(row[18], 0.5);
    }

    #[test]
    fn skips_non_positive_closes() {
        let mut records = series(5);
        records[2].bar.close = 0.0;
        records[3].bar.close = -1.0;
        let extracted = FeatureExtractor::new(1).extract("AAA", &records).unwrap();
        assert_eq!(extracted.len(), 3);
        assert_eq!(extracted.closes, vec![100.0, 101.0, 104.0]);
        // return bridges the skipped rows
        assert!((extracted.features[2][0] - (104.0 / 101.0 - 1.0)).abs() < 1e-12);
    }

    #[test]
    fn insufficient_history_yields_none() {
        let extractor = FeatureExtractor::new(10);
        assert!(extractor.extract("AAA", &series(9)).is_none());
        assert!(extractor.extract("AAA", &series(10)).is_some());
    }

    #[test]
    fn min_history_from_config() {
        let config = DatasetConfig {
            seq_len: 3,
            forward_days: 2,
            ..DatasetConfig::default()
        };
        assert_eq!(FeatureExtractor::from_config(&config).min_history(), 15);
    }

    #[test]
    fn scales_indicators_and_flows() {
        let mut records = series(2);
        records[1].indicators = Some(IndicatorRow {
            ma5: Some(50.5),
            rsi: Some(70.0),
            atr: Some(2.02),
            ..IndicatorRow::default()
        });
        records[1].chips = Some(ChipRow {
            foreign_net: Some(505.0),
            ..ChipRow::default()
        });
        records[1].market_close = Some(110.0);
        records[0].market_close = Some(100.0);

        let extracted = FeatureExtractor::new(1).extract("AAA", &records).unwrap();
        let row = extracted.features[1];
        assert!((row[1] - 2.0).abs() < 1e-12);
        assert!((row[4] - 0.7).abs() < 1e-12);
        assert!((row[9] - 0.02).abs() < 1e-12);
        assert!((row[11] - 0.5).abs() < 1e-12);
        assert!((row[16] - 0.1).abs() < 1e-12);
    }

    #[test]
    fn volume_ratio_uses_trailing_window_only() {
        let records = series(40);
        let full = FeatureExtractor::new(1).extract("AAA", &records).unwrap();
        let truncated = FeatureExtractor::new(1).extract("AAA", &records[..25]).unwrap();
        for i in 0..25 {
            assert_eq!(full.features[i], truncated.features[i], "lookahead at row {i}");
        }
        let expected_avg: f64 = (5..=24).map(|i| 1000.0 + 10.0 * i as f64).sum::<f64>() / 20.0;
        assert!((full.features[24][10] - 1240.0 / expected_avg).abs() < 1e-12);
    }
}
