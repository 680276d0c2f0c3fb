//! Market data source trait and structured error types.
//!
//! The `MarketDataSource` trait abstracts over the relational store owned by
//! the ingestion pipeline so dataset building can run against SQLite in
//! production and an in-memory map in tests.

use chrono::NaiveDate;
use thiserror::Error;

use crate::domain::{DailyRecord, StaticFundamental};

/// Structured error types for market data reads.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("data source backend error: {0}")]
    Backend(String),

    #[error("malformed upstream row for '{symbol}': {reason}")]
    MalformedRow { symbol: String, reason: String },
}

/// Read-only access to joined per-symbol market data.
///
/// Implementations must return records ascending by date with every
/// per-date join (indicators, chips, margin, market index, breadth) applied.
pub trait MarketDataSource {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    /// Symbols with at least `min_days` price bars in `[start, end]`,
    /// sorted ascending. `start = None` means unbounded.
    fn eligible_symbols(
        &self,
        start: Option<NaiveDate>,
        end: NaiveDate,
        min_days: usize,
    ) -> Result<Vec<String>, SourceError>;

    /// Joined daily records for `symbol` in `[start, end]`, ascending by date.
    fn daily_records(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyRecord>, SourceError>;

    /// The most recent `limit` joined records on or before `as_of`, ascending by date.
    fn recent_records(
        &self,
        symbol: &str,
        as_of: NaiveDate,
        limit: usize,
    ) -> Result<Vec<DailyRecord>, SourceError>;

    /// Every fundamentals snapshot for `symbol`, ascending by `as_of`.
    fn fundamentals(&self, symbol: &str) -> Result<Vec<StaticFundamental>, SourceError>;
}
