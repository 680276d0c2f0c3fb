//! Fixed-length windowing and forward-return labeling.
//!
//! Invariants:
//! - every window holds exactly `seq_len` consecutive rows of one symbol;
//! - a window's label comes from the close `forward_days` after its last row,
//!   never from a close inside the window;
//! - a window whose entry or future close is unusable is dropped, never
//!   given a synthetic label.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::DatasetConfig;
use crate::domain::{is_usable_price, Label};
use crate::features::FeatureRow;

/// `seq_len` consecutive feature rows of one symbol.
pub type Window = Vec<FeatureRow>;

/// Parallel outputs of the windower.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabeledWindows {
    pub windows: Vec<Window>,
    pub labels: Vec<Label>,
    /// Decision day: the date of each window's last row.
    pub window_dates: Vec<NaiveDate>,
    pub forward_returns: Vec<f64>,
}

impl LabeledWindows {
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Windower {
    pub seq_len: usize,
    pub forward_days: usize,
    pub buy_threshold: f64,
    pub sell_threshold: f64,
}

impl Windower {
    pub fn from_config(config: &DatasetConfig) -> Self {
        Self {
            seq_len: config.seq_len,
            forward_days: config.forward_days,
            buy_threshold: config.buy_threshold,
            sell_threshold: config.sell_threshold,
        }
    }

    /// Number of start positions for a series of length `n`.
    pub fn window_count(&self, n: usize) -> usize {
        (n + 1).saturating_sub(self.seq_len + self.forward_days)
    }

    /// Slice `rows` into labeled windows. `rows`, `closes` and `dates` are parallel.
    pub fn label(&self, rows: &[FeatureRow], closes: &[f64], dates: &[NaiveDate]) -> LabeledWindows {
        debug_assert_eq!(rows.len(), closes.len());
        debug_assert_eq!(rows.len(), dates.len());

        let count = self.window_count(rows.len());
        let mut out = LabeledWindows {
            windows: Vec::with_capacity(count),
            labels: Vec::with_capacity(count),
            window_dates: Vec::with_capacity(count),
            forward_returns: Vec::with_capacity(count),
        };
        if self.seq_len == 0 {
            return out;
        }

        for start in 0..count {
            let last = start + self.seq_len - 1;
            let entry = closes[last];
            let future = closes[last + self.forward_days];
            if !is_usable_price(entry) || !is_usable_price(future) {
                continue;
            }

            let forward_return = (future - entry) / entry;
            out.windows.push(rows[start..=last].to_vec());
            out.labels.push(Label::from_forward_return(
                forward_return,
                self.buy_threshold,
                self.sell_threshold,
            ));
            out.window_dates.push(dates[last]);
            out.forward_returns.push(forward_return);
        }
        out
    }

    /// The most recent `seq_len` rows and their last date, for live scoring.
    pub fn latest(&self, rows: &[FeatureRow], dates: &[NaiveDate]) -> Option<(Window, NaiveDate)> {
        if self.seq_len == 0 || rows.len() < self.seq_len {
            return None;
        }
        let start = rows.len() - self.seq_len;
        Some((rows[start..].to_vec(), *dates.last()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FEATURE_DIM;

    fn windower(seq_len: usize, forward_days: usize) -> Windower {
        Windower {
            seq_len,
            forward_days,
            buy_threshold: 0.02,
            sell_threshold: -0.02,
        }
    }

    fn fixture(closes: &[f64]) -> (Vec<FeatureRow>, Vec<NaiveDate>) {
        let base = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let rows = (0..closes.len())
            .map(|i| [i as f64; FEATURE_DIM])
            .collect();
        let dates = (0..closes.len())
            .map(|i| base + chrono::Duration::days(i as i64))
            .collect();
        (rows, dates)
    }

    #[test]
    fn three_percent_forward_return_is_buy() {
        let closes = [100.0, 100.0, 100.0, 103.0];
        let (rows, dates) = fixture(&closes);
        let out = windower(3, 1).label(&rows, &closes, &dates);
        assert_eq!(out.len(), 1);
        assert_eq!(out.labels[0], Label::Buy);
        assert_eq!(out.labels[0].as_index(), 2);
        assert!((out.forward_returns[0] - 0.03).abs() < 1e-12);
    }

    #[test]
    fn exactly_two_percent_is_hold() {
        let closes = [100.0, 100.0, 100.0, 102.0];
        let (rows, dates) = fixture(&closes);
        let out = windower(3, 1).label(&rows, &closes, &dates);
        assert_eq!(out.labels, vec![Label::Hold]);
    }

    #[test]
    fn window_date_is_decision_day() {
        let closes = [100.0, 100.0, 100.0, 97.0];
        let (rows, dates) = fixture(&closes);
        let out = windower(3, 1).label(&rows, &closes, &dates);
        assert_eq!(out.window_dates[0], dates[2]);
        assert_eq!(out.labels[0], Label::Sell);
        // window rows are 0..3, never the future row
        assert_eq!(out.windows[0].last().unwrap()[0], 2.0);
    }

    #[test]
    fn unusable_future_close_drops_window() {
        let closes = [100.0, 100.0, 100.0, 100.0, 0.0];
        let (rows, dates) = fixture(&closes);
        let out = windower(3, 1).label(&rows, &closes, &dates);
        assert_eq!(windower(3, 1).window_count(5), 2);
        assert_eq!(out.len(), 1);
        assert_eq!(out.window_dates[0], dates[2]);
    }

    #[test]
    fn too_short_series_has_no_windows() {
        let closes = [100.0, 101.0, 102.0];
        let (rows, dates) = fixture(&closes);
        assert!(windower(3, 1).label(&rows, &closes, &dates).is_empty());
        assert_eq!(windower(3, 1).window_count(0), 0);
    }

    #[test]
    fn latest_window_is_the_tail() {
        let closes = [1.0, 2.0, 3.0, 4.0, 5.0];
        let (rows, dates) = fixture(&closes);
        let (window, date) = windower(3, 1).latest(&rows, &dates).unwrap();
        assert_eq!(window.len(), 3);
        assert_eq!(window[0][0], 2.0);
        assert_eq!(date, dates[4]);
        assert!(windower(6, 1).latest(&rows, &dates).is_none());
    }
}
