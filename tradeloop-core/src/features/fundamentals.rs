//! Static fundamentals features.
//!
//! `FundamentalsMode::PointInTime` attaches, to each day, the latest snapshot
//! published on or before that day. `FundamentalsMode::Latest` broadcasts the
//! newest snapshot to every day, which leaks present-day fundamentals into
//! historical windows.

use chrono::NaiveDate;

use super::STATIC_FEATURE_DIM;
use crate::config::FundamentalsMode;
use crate::domain::StaticFundamental;

#[derive(Debug, Clone, Copy, Default)]
pub struct StaticFeatureExtractor {
    mode: FundamentalsMode,
}

impl StaticFeatureExtractor {
    pub fn new(mode: FundamentalsMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> FundamentalsMode {
        self.mode
    }

    /// `[pe, pb, dividend_yield, revenue_yoy, gross_margin, debt_ratio]` of the
    /// newest snapshot, or all zeros when there is none.
    pub fn latest(&self, snapshots: &[StaticFundamental]) -> [f64; STATIC_FEATURE_DIM] {
        vectorize(snapshots.iter().max_by_key(|s| s.as_of))
    }

    /// One static vector per date, according to the configured mode.
    ///
    /// `snapshots` must be ascending by `as_of`; `dates` ascending.
    pub fn per_timestep(
        &self,
        snapshots: &[StaticFundamental],
        dates: &[NaiveDate],
    ) -> Vec<[f64; STATIC_FEATURE_DIM]> {
        match self.mode {
            FundamentalsMode::Latest => vec![self.latest(snapshots); dates.len()],
            FundamentalsMode::PointInTime => {
                debug_assert!(snapshots.windows(2).all(|w| w[0].as_of <= w[1].as_of));
                let mut cursor = 0;
                let mut current: Option<&StaticFundamental> = None;
                dates
                    .iter()
                    .map(|date| {
                        while cursor < snapshots.len() && snapshots[cursor].as_of <= *date {
                            current = Some(&snapshots[cursor]);
                            cursor += 1;
                        }
                        vectorize(current)
                    })
                    .collect()
            }
        }
    }
}

fn vectorize(snapshot: Option<&StaticFundamental>) -> [f64; STATIC_FEATURE_DIM] {
    let Some(s) = snapshot else {
        return [0.0; STATIC_FEATURE_DIM];
    };
    [
        s.pe,
        s.pb,
        s.dividend_yield,
        s.revenue_yoy,
        s.gross_margin,
        s.debt_ratio,
    ]
    .map(|v| v.filter(|x| x.is_finite()).unwrap_or(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn snapshot(as_of: NaiveDate, pe: f64) -> StaticFundamental {
        StaticFundamental {
            symbol: "AAA".into(),
            as_of,
            pe: Some(pe),
            pb: Some(1.5),
            dividend_yield: None,
            revenue_yoy: Some(f64::NAN),
            gross_margin: Some(40.0),
            debt_ratio: Some(30.0),
        }
    }

    #[test]
    fn absent_snapshot_is_all_zero() {
        let extractor = StaticFeatureExtractor::default();
        assert_eq!(extractor.latest(&[]), [0.0; STATIC_FEATURE_DIM]);
    }

    #[test]
    fn latest_picks_newest_and_zeroes_missing_fields() {
        let snaps = vec![snapshot(date(1), 10.0), snapshot(date(10), 12.0)];
        let v = StaticFeatureExtractor::new(FundamentalsMode::Latest).latest(&snaps);
        assert_eq!(v, [12.0, 1.5, 0.0, 0.0, 40.0, 30.0]);
    }

    #[test]
    fn latest_mode_broadcasts() {
        let snaps = vec![snapshot(date(1), 10.0), snapshot(date(10), 12.0)];
        let dates = [date(2), date(5), date(20)];
        let rows = StaticFeatureExtractor::new(FundamentalsMode::Latest).per_timestep(&snaps, &dates);
        assert!(rows.iter().all(|r| r[0] == 12.0));
    }

    #[test]
    fn point_in_time_never_sees_future_snapshots() {
        let snaps = vec![snapshot(date(3), 10.0), snapshot(date(10), 12.0)];
        let dates = [date(1), date(3), date(9), date(10), date(20)];
        let rows =
            StaticFeatureExtractor::new(FundamentalsMode::PointInTime).per_timestep(&snaps, &dates);
        let pes: Vec<f64> = rows.iter().map(|r| r[0]).collect();
        assert_eq!(pes, vec![0.0, 10.0, 10.0, 12.0, 12.0]);
    }
}
