//! In-memory market data source for tests, benches and synthetic runs.

use chrono::NaiveDate;
use std::collections::BTreeMap;

use super::provider::{MarketDataSource, SourceError};
use crate::domain::{DailyRecord, StaticFundamental};

#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    records: BTreeMap<String, Vec<DailyRecord>>,
    fundamentals: BTreeMap<String, Vec<StaticFundamental>>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert (or replace) a symbol's records. They are sorted by date on insert.
    pub fn insert_records(&mut self, symbol: impl Into<String>, mut records: Vec<DailyRecord>) {
        records.sort_by_key(|r| r.bar.date);
        self.records.insert(symbol.into(), records);
    }

    pub fn insert_fundamental(&mut self, snapshot: StaticFundamental) {
        let list = self.fundamentals.entry(snapshot.symbol.clone()).or_default();
        list.push(snapshot);
        list.sort_by_key(|s| s.as_of);
    }

    pub fn symbol_count(&self) -> usize {
        self.records.len()
    }

    /// Symbols in ascending order.
    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(|s| s.as_str())
    }

    pub fn records(&self, symbol: &str) -> Option<&[DailyRecord]> {
        self.records.get(symbol).map(|v| v.as_slice())
    }
}

impl MarketDataSource for InMemorySource {
    fn name(&self) -> &str {
        "in-memory"
    }

    fn eligible_symbols(
        &self,
        start: Option<NaiveDate>,
        end: NaiveDate,
        min_days: usize,
    ) -> Result<Vec<String>, SourceError> {
        Ok(self
            .records
            .iter()
            .filter(|(_, records)| {
                records
                    .iter()
                    .filter(|r| start.map_or(true, |s| r.bar.date >= s) && r.bar.date <= end)
                    .count()
                    >= min_days
            })
            .map(|(symbol, _)| symbol.clone())
            .collect())
    }

    fn daily_records(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyRecord>, SourceError> {
        Ok(self
            .records
            .get(symbol)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| r.bar.date >= start && r.bar.date <= end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn recent_records(
        &self,
        symbol: &str,
        as_of: NaiveDate,
        limit: usize,
    ) -> Result<Vec<DailyRecord>, SourceError> {
        let Some(records) = self.records.get(symbol) else {
            return Ok(Vec::new());
        };
        let upto: Vec<&DailyRecord> = records.iter().filter(|r| r.bar.date <= as_of).collect();
        let skip = upto.len().saturating_sub(limit);
        Ok(upto.into_iter().skip(skip).cloned().collect())
    }

    fn fundamentals(&self, symbol: &str) -> Result<Vec<StaticFundamental>, SourceError> {
        Ok(self.fundamentals.get(symbol).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PriceBar;

    fn record(symbol: &str, day: u32, close: f64) -> DailyRecord {
        DailyRecord::bare(PriceBar {
            symbol: symbol.into(),
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1000.0,
            change_pct: None,
        })
    }

    #[test]
    fn eligibility_counts_bars_in_range() {
        let mut source = InMemorySource::new();
        source.insert_records("AAA", (1..=10).map(|d| record("AAA", d, 10.0)).collect());
        source.insert_records("BBB", (1..=3).map(|d| record("BBB", d, 10.0)).collect());

        let end = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        assert_eq!(source.eligible_symbols(None, end, 5).unwrap(), vec!["AAA"]);
        let start = NaiveDate::from_ymd_opt(2024, 1, 8).unwrap();
        assert!(source.eligible_symbols(Some(start), end, 5).unwrap().is_empty());
    }

    #[test]
    fn recent_records_keeps_tail_in_order() {
        let mut source = InMemorySource::new();
        source.insert_records("AAA", (1..=10).rev().map(|d| record("AAA", d, d as f64)).collect());

        let as_of = NaiveDate::from_ymd_opt(2024, 1, 8).unwrap();
        let tail = source.recent_records("AAA", as_of, 3).unwrap();
        let closes: Vec<f64> = tail.iter().map(|r| r.bar.close).collect();
        assert_eq!(closes, vec![6.0, 7.0, 8.0]);
    }
}
