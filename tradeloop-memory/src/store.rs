//! SQLite store: market data tables plus the memory tiers.
//!
//! One `Store` owns one connection. Handles are constructed explicitly and
//! passed to each tier; nothing here is global. The market tables are written
//! by ingestion (or `seed-synthetic`) and read through `MarketDataSource`.

use chrono::NaiveDate;
use rusqlite::{params, Connection, Row};
use std::path::Path;
use tracing::debug;

use tradeloop_core::data::{MarketDataSource, SourceError};
use tradeloop_core::domain::{
    BreadthRow, ChipRow, DailyRecord, IndicatorRow, MarginRow, PriceBar, StaticFundamental,
};

use crate::error::{Result, StoreError};

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS price_bars (
    symbol      TEXT NOT NULL,
    date        TEXT NOT NULL,
    open        REAL NOT NULL,
    high        REAL NOT NULL,
    low         REAL NOT NULL,
    close       REAL NOT NULL,
    volume      REAL NOT NULL,
    change_pct  REAL,
    PRIMARY KEY (symbol, date)
);

CREATE TABLE IF NOT EXISTS indicators (
    symbol      TEXT NOT NULL,
    date        TEXT NOT NULL,
    ma5         REAL,
    ma20        REAL,
    ma60        REAL,
    rsi         REAL,
    macd_diff   REAL,
    macd_dea    REAL,
    k           REAL,
    d           REAL,
    atr         REAL,
    PRIMARY KEY (symbol, date)
);

CREATE TABLE IF NOT EXISTS chip_flows (
    symbol      TEXT NOT NULL,
    date        TEXT NOT NULL,
    foreign_net REAL,
    trust_net   REAL,
    dealer_net  REAL,
    PRIMARY KEY (symbol, date)
);

CREATE TABLE IF NOT EXISTS margin_flows (
    symbol      TEXT NOT NULL,
    date        TEXT NOT NULL,
    margin_net  REAL,
    short_net   REAL,
    PRIMARY KEY (symbol, date)
);

CREATE TABLE IF NOT EXISTS market_index (
    date        TEXT PRIMARY KEY,
    index_close REAL NOT NULL
);

CREATE TABLE IF NOT EXISTS breadth (
    date             TEXT PRIMARY KEY,
    breadth_ma_short REAL,
    breadth_ma_long  REAL
);

CREATE TABLE IF NOT EXISTS fundamentals (
    symbol          TEXT NOT NULL,
    as_of           TEXT NOT NULL,
    pe              REAL,
    pb              REAL,
    dividend_yield  REAL,
    revenue_yoy     REAL,
    gross_margin    REAL,
    debt_ratio      REAL,
    PRIMARY KEY (symbol, as_of)
);

CREATE TABLE IF NOT EXISTS journal (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    model_id         TEXT NOT NULL,
    symbol           TEXT NOT NULL,
    signal_date      TEXT NOT NULL,
    signal           TEXT NOT NULL CHECK (signal IN ('BUY', 'HOLD', 'SELL')),
    confidence       REAL NOT NULL,
    feature_snapshot TEXT NOT NULL,
    reasoning        TEXT,
    outcome_return   REAL,
    outcome_date     TEXT,
    is_correct       INTEGER,
    created_at       TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_journal_pending ON journal (signal_date) WHERE outcome_return IS NULL;
CREATE INDEX IF NOT EXISTS idx_journal_resolved ON journal (signal_date) WHERE outcome_return IS NOT NULL;

CREATE TABLE IF NOT EXISTS patterns (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    name          TEXT NOT NULL UNIQUE,
    condition     TEXT NOT NULL,
    signal_type   TEXT,
    win_rate      REAL NOT NULL,
    avg_return    REAL NOT NULL,
    sample_count  INTEGER NOT NULL,
    status        TEXT NOT NULL DEFAULT 'active' CHECK (status IN ('active', 'deprecated')),
    discovered_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS pattern_history (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    pattern_name TEXT NOT NULL,
    win_rate     REAL NOT NULL,
    avg_return   REAL NOT NULL,
    sample_count INTEGER NOT NULL,
    recorded_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS adjustments (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    pattern_id      INTEGER NOT NULL REFERENCES patterns (id),
    adjustment_type TEXT NOT NULL CHECK (adjustment_type IN ('confidence_scale', 'signal_suppress')),
    payload         TEXT NOT NULL,
    reason          TEXT NOT NULL,
    status          TEXT NOT NULL DEFAULT 'proposed'
                    CHECK (status IN ('proposed', 'approved', 'applied', 'rejected')),
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS model_registry (
    model_id            TEXT PRIMARY KEY,
    version             INTEGER NOT NULL,
    config              TEXT NOT NULL,
    metrics             TEXT NOT NULL,
    norm_stats          TEXT NOT NULL,
    weights_path        TEXT NOT NULL,
    dataset_fingerprint TEXT,
    created_at          TEXT NOT NULL,
    last_registered_at  TEXT NOT NULL
);
"#;

/// Joined daily record columns; indices are fixed for `record_from_row`.
const RECORD_SELECT: &str = r#"
SELECT p.date, p.open, p.high, p.low, p.close, p.volume, p.change_pct,
       i.symbol IS NOT NULL, i.ma5, i.ma20, i.ma60, i.rsi, i.macd_diff, i.macd_dea, i.k, i.d, i.atr,
       c.symbol IS NOT NULL, c.foreign_net, c.trust_net, c.dealer_net,
       m.symbol IS NOT NULL, m.margin_net, m.short_net,
       x.index_close,
       b.date IS NOT NULL, b.breadth_ma_short, b.breadth_ma_long
FROM price_bars p
LEFT JOIN indicators i ON i.symbol = p.symbol AND i.date = p.date
LEFT JOIN chip_flows c ON c.symbol = p.symbol AND c.date = p.date
LEFT JOIN margin_flows m ON m.symbol = p.symbol AND m.date = p.date
LEFT JOIN market_index x ON x.date = p.date
LEFT JOIN breadth b ON b.date = p.date
"#;

/// SQLite-backed storage for market data and the trade memory.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open or create a database file and make sure the schema exists.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path.as_ref())?;
        let store = Self { conn };
        store.init_schema()?;
        debug!(path = %path.as_ref().display(), "store opened");
        Ok(store)
    }

    /// In-memory database (tests, dry runs).
    pub fn open_in_memory() -> Result<Self> {
        let store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        self.conn.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    /// Close the connection, surfacing any error from the final flush.
    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, e)| StoreError::Sqlite(e))
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    pub(crate) fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    // ── Market data writes ───────────────────────────────────────────

    /// Upsert joined daily records in one transaction. Returns rows written.
    pub fn insert_records(&mut self, records: &[DailyRecord]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        {
            let mut bars = tx.prepare(
                "INSERT OR REPLACE INTO price_bars
                 (symbol, date, open, high, low, close, volume, change_pct)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            let mut indicators = tx.prepare(
                "INSERT OR REPLACE INTO indicators
                 (symbol, date, ma5, ma20, ma60, rsi, macd_diff, macd_dea, k, d, atr)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            )?;
            let mut chips = tx.prepare(
                "INSERT OR REPLACE INTO chip_flows (symbol, date, foreign_net, trust_net, dealer_net)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            let mut margin = tx.prepare(
                "INSERT OR REPLACE INTO margin_flows (symbol, date, margin_net, short_net)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            let mut market = tx.prepare(
                "INSERT OR REPLACE INTO market_index (date, index_close) VALUES (?1, ?2)",
            )?;
            let mut breadth = tx.prepare(
                "INSERT OR REPLACE INTO breadth (date, breadth_ma_short, breadth_ma_long)
                 VALUES (?1, ?2, ?3)",
            )?;

            for record in records {
                let bar = &record.bar;
                bars.execute(params![
                    bar.symbol,
                    bar.date,
                    bar.open,
                    bar.high,
                    bar.low,
                    bar.close,
                    bar.volume,
                    bar.change_pct
                ])?;
                if let Some(i) = &record.indicators {
                    indicators.execute(params![
                        bar.symbol, bar.date, i.ma5, i.ma20, i.ma60, i.rsi, i.macd_diff, i.macd_dea,
                        i.k, i.d, i.atr
                    ])?;
                }
                if let Some(c) = &record.chips {
                    chips.execute(params![
                        bar.symbol,
                        bar.date,
                        c.foreign_net,
                        c.trust_net,
                        c.dealer_net
                    ])?;
                }
                if let Some(m) = &record.margin {
                    margin.execute(params![bar.symbol, bar.date, m.margin_net, m.short_net])?;
                }
                if let Some(close) = record.market_close {
                    market.execute(params![bar.date, close])?;
                }
                if let Some(b) = &record.breadth {
                    breadth.execute(params![bar.date, b.breadth_ma_short, b.breadth_ma_long])?;
                }
            }
        }
        tx.commit()?;
        Ok(records.len())
    }

    pub fn insert_fundamental(&self, f: &StaticFundamental) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO fundamentals
             (symbol, as_of, pe, pb, dividend_yield, revenue_yoy, gross_margin, debt_ratio)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                f.symbol,
                f.as_of,
                f.pe,
                f.pb,
                f.dividend_yield,
                f.revenue_yoy,
                f.gross_margin,
                f.debt_ratio
            ],
        )?;
        Ok(())
    }

    /// Closes of one symbol on or after `from`, ascending, at most `limit` rows.
    pub(crate) fn closes_from(
        conn: &Connection,
        symbol: &str,
        from: NaiveDate,
        until: NaiveDate,
        limit: usize,
    ) -> Result<Vec<(NaiveDate, f64)>> {
        let mut stmt = conn.prepare_cached(
            "SELECT date, close FROM price_bars
             WHERE symbol = ?1 AND date >= ?2 AND date <= ?3
             ORDER BY date ASC LIMIT ?4",
        )?;
        let rows = stmt
            .query_map(params![symbol, from, until, limit as i64], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

fn record_from_row(symbol: &str, row: &Row<'_>) -> rusqlite::Result<DailyRecord> {
    let has_indicators: bool = row.get(7)?;
    let has_chips: bool = row.get(17)?;
    let has_margin: bool = row.get(21)?;
    let has_breadth: bool = row.get(25)?;

    Ok(DailyRecord {
        bar: PriceBar {
            symbol: symbol.to_string(),
            date: row.get(0)?,
            open: row.get(1)?,
            high: row.get(2)?,
            low: row.get(3)?,
            close: row.get(4)?,
            volume: row.get(5)?,
            change_pct: row.get(6)?,
        },
        indicators: if has_indicators {
            Some(IndicatorRow {
                ma5: row.get(8)?,
                ma20: row.get(9)?,
                ma60: row.get(10)?,
                rsi: row.get(11)?,
                macd_diff: row.get(12)?,
                macd_dea: row.get(13)?,
                k: row.get(14)?,
                d: row.get(15)?,
                atr: row.get(16)?,
            })
        } else {
            None
        },
        chips: if has_chips {
            Some(ChipRow {
                foreign_net: row.get(18)?,
                trust_net: row.get(19)?,
                dealer_net: row.get(20)?,
            })
        } else {
            None
        },
        margin: if has_margin {
            Some(MarginRow {
                margin_net: row.get(22)?,
                short_net: row.get(23)?,
            })
        } else {
            None
        },
        market_close: row.get(24)?,
        breadth: if has_breadth {
            Some(BreadthRow {
                breadth_ma_short: row.get(26)?,
                breadth_ma_long: row.get(27)?,
            })
        } else {
            None
        },
    })
}

fn backend(e: rusqlite::Error) -> SourceError {
    SourceError::Backend(e.to_string())
}

impl MarketDataSource for Store {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn eligible_symbols(
        &self,
        start: Option<NaiveDate>,
        end: NaiveDate,
        min_days: usize,
    ) -> std::result::Result<Vec<String>, SourceError> {
        let mut stmt = self
            .conn
            .prepare_cached(
                "SELECT symbol FROM price_bars
                 WHERE (?1 IS NULL OR date >= ?1) AND date <= ?2
                 GROUP BY symbol HAVING COUNT(*) >= ?3
                 ORDER BY symbol",
            )
            .map_err(backend)?;
        let symbols = stmt
            .query_map(params![start, end, min_days as i64], |row| row.get(0))
            .map_err(backend)?
            .collect::<rusqlite::Result<Vec<String>>>()
            .map_err(backend)?;
        Ok(symbols)
    }

    fn daily_records(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> std::result::Result<Vec<DailyRecord>, SourceError> {
        let sql = format!(
            "{RECORD_SELECT} WHERE p.symbol = ?1 AND p.date >= ?2 AND p.date <= ?3 ORDER BY p.date ASC"
        );
        let mut stmt = self.conn.prepare_cached(&sql).map_err(backend)?;
        let records = stmt
            .query_map(params![symbol, start, end], |row| record_from_row(symbol, row))
            .map_err(backend)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(backend)?;
        Ok(records)
    }

    fn recent_records(
        &self,
        symbol: &str,
        as_of: NaiveDate,
        limit: usize,
    ) -> std::result::Result<Vec<DailyRecord>, SourceError> {
        let sql = format!(
            "{RECORD_SELECT} WHERE p.symbol = ?1 AND p.date <= ?2 ORDER BY p.date DESC LIMIT ?3"
        );
        let mut stmt = self.conn.prepare_cached(&sql).map_err(backend)?;
        let mut records = stmt
            .query_map(params![symbol, as_of, limit as i64], |row| {
                record_from_row(symbol, row)
            })
            .map_err(backend)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(backend)?;
        records.reverse();
        Ok(records)
    }

    fn fundamentals(&self, symbol: &str) -> std::result::Result<Vec<StaticFundamental>, SourceError> {
        let mut stmt = self
            .conn
            .prepare_cached(
                "SELECT as_of, pe, pb, dividend_yield, revenue_yoy, gross_margin, debt_ratio
                 FROM fundamentals WHERE symbol = ?1 ORDER BY as_of ASC",
            )
            .map_err(backend)?;
        let snapshots = stmt
            .query_map(params![symbol], |row| {
                Ok(StaticFundamental {
                    symbol: symbol.to_string(),
                    as_of: row.get(0)?,
                    pe: row.get(1)?,
                    pb: row.get(2)?,
                    dividend_yield: row.get(3)?,
                    revenue_yoy: row.get(4)?,
                    gross_margin: row.get(5)?,
                    debt_ratio: row.get(6)?,
                })
            })
            .map_err(backend)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(backend)?;
        Ok(snapshots)
    }
}
