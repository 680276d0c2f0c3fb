//! L1 trade journal: every emitted signal, resolved later against prices.
//!
//! Rows are append-only. The outcome fields are written exactly once by
//! `fill_outcomes`; the `outcome_return IS NULL` guard on the update keeps
//! reruns and overlapping jobs from resolving a row twice.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rusqlite::{params, Row};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use tradeloop_core::domain::{is_usable_price, Signal};

use crate::config::JournalConfig;
use crate::error::{Result, StoreError};
use crate::store::Store;

/// A signal about to be recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDecision {
    pub model_id: String,
    pub symbol: String,
    pub signal_date: NaiveDate,
    pub signal: Signal,
    pub confidence: f64,
    /// Raw (un-normalized) feature values at decision time, by name.
    pub feature_snapshot: BTreeMap<String, f64>,
    pub reasoning: Option<String>,
}

/// Realized result of a journaled signal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub outcome_return: f64,
    pub outcome_date: NaiveDate,
    pub is_correct: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: i64,
    pub model_id: String,
    pub symbol: String,
    pub signal_date: NaiveDate,
    pub signal: Signal,
    pub confidence: f64,
    pub feature_snapshot: BTreeMap<String, f64>,
    pub reasoning: Option<String>,
    pub outcome: Option<Outcome>,
    pub created_at: DateTime<Utc>,
}

impl JournalEntry {
    /// Return earned in the signal's direction: SELL profits from a falling price.
    pub fn signal_return(&self) -> Option<f64> {
        let r = self.outcome?.outcome_return;
        Some(match self.signal {
            Signal::Sell => -r,
            _ => r,
        })
    }
}

/// Counts from one `fill_outcomes` run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillSummary {
    /// Unresolved rows old enough to be considered.
    pub examined: usize,
    pub resolved: usize,
    /// Rows left unresolved for lack of usable bars.
    pub pending: usize,
}

/// Whether a realized return vindicates `signal`.
pub fn is_correct(signal: Signal, r: f64, hold_band: f64) -> bool {
    match signal {
        Signal::Buy => r > 0.0,
        Signal::Sell => r < 0.0,
        Signal::Hold => r.abs() < hold_band,
    }
}

const ENTRY_COLUMNS: &str = "id, model_id, symbol, signal_date, signal, confidence, \
     feature_snapshot, reasoning, outcome_return, outcome_date, is_correct, created_at";

/// Raw row, decoded before the JSON and enum columns are parsed.
struct EntryRow {
    id: i64,
    model_id: String,
    symbol: String,
    signal_date: NaiveDate,
    signal: String,
    confidence: f64,
    feature_snapshot: String,
    reasoning: Option<String>,
    outcome_return: Option<f64>,
    outcome_date: Option<NaiveDate>,
    is_correct: Option<bool>,
    created_at: DateTime<Utc>,
}

impl EntryRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            model_id: row.get(1)?,
            symbol: row.get(2)?,
            signal_date: row.get(3)?,
            signal: row.get(4)?,
            confidence: row.get(5)?,
            feature_snapshot: row.get(6)?,
            reasoning: row.get(7)?,
            outcome_return: row.get(8)?,
            outcome_date: row.get(9)?,
            is_correct: row.get(10)?,
            created_at: row.get(11)?,
        })
    }

    fn into_entry(self) -> Result<JournalEntry> {
        let corrupt = |reason: String| StoreError::Corrupt {
            table: "journal",
            id: self.id.to_string(),
            reason,
        };
        let signal: Signal = self.signal.parse().map_err(|e| corrupt(format!("{e}")))?;
        let feature_snapshot: BTreeMap<String, f64> = serde_json::from_str(&self.feature_snapshot)
            .map_err(|e| corrupt(format!("feature_snapshot: {e}")))?;
        let outcome = match (self.outcome_return, self.outcome_date, self.is_correct) {
            (Some(outcome_return), Some(outcome_date), Some(is_correct)) => Some(Outcome {
                outcome_return,
                outcome_date,
                is_correct,
            }),
            (None, _, _) => None,
            _ => return Err(corrupt("partially resolved outcome".into())),
        };
        Ok(JournalEntry {
            id: self.id,
            model_id: self.model_id,
            symbol: self.symbol,
            signal_date: self.signal_date,
            signal,
            confidence: self.confidence,
            feature_snapshot,
            reasoning: self.reasoning,
            outcome,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, Clone)]
pub struct TradeJournal {
    hold_band: f64,
}

impl Default for TradeJournal {
    fn default() -> Self {
        Self::new(&JournalConfig::default())
    }
}

impl TradeJournal {
    pub fn new(config: &JournalConfig) -> Self {
        Self {
            hold_band: config.hold_band,
        }
    }

    /// Append one decision. No uniqueness is enforced; returns the new row id.
    pub fn record_decision(&self, store: &mut Store, decision: &NewDecision) -> Result<i64> {
        let ids = self.record_decisions(store, std::slice::from_ref(decision))?;
        ids.first()
            .copied()
            .ok_or_else(|| StoreError::InvalidArgument("journal insert produced no row".into()))
    }

    /// Append a batch of decisions in a single transaction.
    pub fn record_decisions(&self, store: &mut Store, batch: &[NewDecision]) -> Result<Vec<i64>> {
        let now = Utc::now();
        let tx = store.conn_mut().transaction()?;
        let mut ids = Vec::with_capacity(batch.len());
        {
            let mut stmt = tx.prepare(
                "INSERT INTO journal
                 (model_id, symbol, signal_date, signal, confidence, feature_snapshot, reasoning, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for d in batch {
                if !d.confidence.is_finite() {
                    return Err(StoreError::InvalidArgument(format!(
                        "confidence for {} on {} is not finite",
                        d.symbol, d.signal_date
                    )));
                }
                let snapshot = serde_json::to_string(&d.feature_snapshot)?;
                stmt.execute(params![
                    d.model_id,
                    d.symbol,
                    d.signal_date,
                    d.signal.as_str(),
                    d.confidence,
                    snapshot,
                    d.reasoning,
                    now
                ])?;
                ids.push(tx.last_insert_rowid());
            }
        }
        tx.commit()?;
        debug!(rows = ids.len(), "journal decisions recorded");
        Ok(ids)
    }

    /// Resolve every unresolved row old enough to have a `forward_days` horizon.
    ///
    /// Entry is the first bar on or after the signal date; exit is the bar
    /// `forward_days - 1` positions later. Only bars dated `<= as_of` are used,
    /// and rows without enough usable bars are left for a later run.
    pub fn fill_outcomes(
        &self,
        store: &mut Store,
        forward_days: usize,
        as_of: NaiveDate,
    ) -> Result<FillSummary> {
        if forward_days == 0 {
            return Err(StoreError::InvalidArgument("forward_days must be >= 1".into()));
        }
        let cutoff = as_of - Duration::days(forward_days as i64);
        let tx = store.conn_mut().transaction()?;
        let mut summary = FillSummary::default();
        {
            let pending: Vec<(i64, String, NaiveDate, String)> = {
                let mut stmt = tx.prepare(
                    "SELECT id, symbol, signal_date, signal FROM journal
                     WHERE outcome_return IS NULL AND signal_date <= ?1
                     ORDER BY id ASC",
                )?;
                let rows = stmt
                    .query_map(params![cutoff], |row| {
                        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            };
            summary.examined = pending.len();

            let mut update = tx.prepare(
                "UPDATE journal SET outcome_return = ?1, outcome_date = ?2, is_correct = ?3
                 WHERE id = ?4 AND outcome_return IS NULL",
            )?;
            for (id, symbol, signal_date, signal) in pending {
                let signal: Signal = match signal.parse() {
                    Ok(s) => s,
                    Err(e) => {
                        warn!(id, error = %e, "skipping journal row with unknown signal");
                        summary.pending += 1;
                        continue;
                    }
                };
                let bars = Store::closes_from(&tx, &symbol, signal_date, as_of, forward_days)?;
                if bars.len() < forward_days {
                    summary.pending += 1;
                    continue;
                }
                let (_, entry) = bars[0];
                let (exit_date, exit) = bars[forward_days - 1];
                if !is_usable_price(entry) || !is_usable_price(exit) {
                    warn!(id, symbol = %symbol, "unusable entry or exit close; outcome left pending");
                    summary.pending += 1;
                    continue;
                }
                let r = (exit - entry) / entry;
                let correct = is_correct(signal, r, self.hold_band);
                summary.resolved += update.execute(params![r, exit_date, correct, id])?;
            }
        }
        tx.commit()?;
        info!(
            examined = summary.examined,
            resolved = summary.resolved,
            pending = summary.pending,
            %as_of,
            "journal outcomes filled"
        );
        Ok(summary)
    }

    /// Rows still waiting for an outcome, oldest first.
    pub fn unresolved(&self, store: &Store) -> Result<Vec<JournalEntry>> {
        query_entries(
            store,
            &format!(
                "SELECT {ENTRY_COLUMNS} FROM journal WHERE outcome_return IS NULL ORDER BY signal_date ASC, id ASC"
            ),
            None,
        )
    }

    /// The `limit` most recent resolved rows, newest first.
    pub fn recent_resolved(&self, store: &Store, limit: usize) -> Result<Vec<JournalEntry>> {
        query_entries(
            store,
            &format!(
                "SELECT {ENTRY_COLUMNS} FROM journal WHERE outcome_return IS NOT NULL
                 ORDER BY signal_date DESC, id DESC LIMIT ?1"
            ),
            Some(limit),
        )
    }

    /// Every row, in insertion order.
    pub fn all(&self, store: &Store) -> Result<Vec<JournalEntry>> {
        query_entries(
            store,
            &format!("SELECT {ENTRY_COLUMNS} FROM journal ORDER BY id ASC"),
            None,
        )
    }
}

fn query_entries(store: &Store, sql: &str, limit: Option<usize>) -> Result<Vec<JournalEntry>> {
    let mut stmt = store.conn().prepare(sql)?;
    let rows = match limit {
        Some(limit) => stmt
            .query_map(params![limit as i64], EntryRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?,
        None => stmt
            .query_map([], EntryRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?,
    };
    rows.into_iter().map(EntryRow::into_entry).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tradeloop_core::domain::{DailyRecord, PriceBar};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn bars(symbol: &str, start: NaiveDate, closes: &[f64]) -> Vec<DailyRecord> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| {
                DailyRecord::bare(PriceBar {
                    symbol: symbol.into(),
                    date: start + Duration::days(i as i64),
                    open: close,
                    high: close,
                    low: close,
                    close,
                    volume: 1000.0,
                    change_pct: None,
                })
            })
            .collect()
    }

    fn decision(symbol: &str, signal_date: NaiveDate, signal: Signal) -> NewDecision {
        NewDecision {
            model_id: "m1".into(),
            symbol: symbol.into(),
            signal_date,
            signal,
            confidence: 0.8,
            feature_snapshot: BTreeMap::from([("rsi".to_string(), 0.55)]),
            reasoning: Some("test".into()),
        }
    }

    #[test]
    fn buy_resolves_on_the_fifth_bar() {
        let mut store = Store::open_in_memory().unwrap();
        let d = date(2024, 3, 1);
        store
            .insert_records(&bars("AAA", d, &[100.0, 101.0, 99.0, 104.0, 110.0, 50.0, 50.0]))
            .unwrap();
        let journal = TradeJournal::default();
        let id = journal
            .record_decision(&mut store, &decision("AAA", d, Signal::Buy))
            .unwrap();

        let summary = journal.fill_outcomes(&mut store, 5, date(2024, 3, 10)).unwrap();
        assert_eq!(summary, FillSummary { examined: 1, resolved: 1, pending: 0 });

        let entry = journal.all(&store).unwrap().into_iter().find(|e| e.id == id).unwrap();
        let outcome = entry.outcome.unwrap();
        assert!((outcome.outcome_return - 0.10).abs() < 1e-12);
        assert_eq!(outcome.outcome_date, d + Duration::days(4));
        assert!(outcome.is_correct);
    }

    #[test]
    fn second_run_changes_nothing() {
        let mut store = Store::open_in_memory().unwrap();
        let d = date(2024, 3, 1);
        store.insert_records(&bars("AAA", d, &[100.0; 10])).unwrap();
        let journal = TradeJournal::default();
        journal.record_decision(&mut store, &decision("AAA", d, Signal::Hold)).unwrap();

        let first = journal.fill_outcomes(&mut store, 5, date(2024, 3, 20)).unwrap();
        let before = journal.all(&store).unwrap();
        let second = journal.fill_outcomes(&mut store, 5, date(2024, 3, 20)).unwrap();
        assert_eq!(first.resolved, 1);
        assert_eq!(second, FillSummary::default());
        assert_eq!(journal.all(&store).unwrap(), before);
        assert!(before[0].outcome.unwrap().is_correct);
    }

    #[test]
    fn too_recent_or_missing_bars_stay_unresolved() {
        let mut store = Store::open_in_memory().unwrap();
        let d = date(2024, 3, 1);
        store.insert_records(&bars("AAA", d, &[100.0, 100.0, 100.0])).unwrap();
        let journal = TradeJournal::default();
        journal.record_decision(&mut store, &decision("AAA", d, Signal::Sell)).unwrap();
        journal
            .record_decision(&mut store, &decision("AAA", date(2024, 3, 9), Signal::Buy))
            .unwrap();

        let summary = journal.fill_outcomes(&mut store, 5, date(2024, 3, 10)).unwrap();
        // the 3/9 row is inside the horizon; the 3/1 row lacks a fifth bar
        assert_eq!(summary, FillSummary { examined: 1, resolved: 0, pending: 1 });
        assert_eq!(journal.unresolved(&store).unwrap().len(), 2);
    }

    #[test]
    fn correctness_rules() {
        assert!(is_correct(Signal::Buy, 0.01, 0.03));
        assert!(!is_correct(Signal::Buy, 0.0, 0.03));
        assert!(is_correct(Signal::Sell, -0.01, 0.03));
        assert!(!is_correct(Signal::Sell, 0.02, 0.03));
        assert!(is_correct(Signal::Hold, -0.029, 0.03));
        assert!(!is_correct(Signal::Hold, 0.03, 0.03));
    }

    #[test]
    fn batch_insert_is_append_only() {
        let mut store = Store::open_in_memory().unwrap();
        let journal = TradeJournal::default();
        let d = date(2024, 3, 1);
        let batch = vec![decision("AAA", d, Signal::Buy), decision("AAA", d, Signal::Buy)];
        let ids = journal.record_decisions(&mut store, &batch).unwrap();
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);
        let rows = journal.all(&store).unwrap();
        assert_eq!(rows[0].feature_snapshot["rsi"], 0.55);
        assert!(rows.iter().all(|r| r.outcome.is_none()));
    }

    #[test]
    fn non_finite_confidence_rolls_back_the_batch() {
        let mut store = Store::open_in_memory().unwrap();
        let journal = TradeJournal::default();
        let d = date(2024, 3, 1);
        let mut bad = decision("AAA", d, Signal::Buy);
        bad.confidence = f64::NAN;
        let batch = vec![decision("AAA", d, Signal::Buy), bad];
        assert!(journal.record_decisions(&mut store, &batch).is_err());
        assert!(journal.all(&store).unwrap().is_empty());
    }

    #[test]
    fn sell_signal_return_is_inverted() {
        let mut store = Store::open_in_memory().unwrap();
        let d = date(2024, 3, 1);
        store.insert_records(&bars("AAA", d, &[100.0, 95.0, 90.0])).unwrap();
        let journal = TradeJournal::default();
        journal.record_decision(&mut store, &decision("AAA", d, Signal::Sell)).unwrap();
        journal.fill_outcomes(&mut store, 3, date(2024, 3, 5)).unwrap();
        let entry = &journal.recent_resolved(&store, 10).unwrap()[0];
        assert!(entry.outcome.unwrap().is_correct);
        assert!((entry.signal_return().unwrap() - 0.10).abs() < 1e-12);
    }
}
