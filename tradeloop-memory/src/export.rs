//! Journal export to CSV for offline analysis.

use std::io::Write;
use std::path::Path;

use crate::error::Result;
use crate::journal::JournalEntry;

/// Columns: id, model_id, symbol, signal_date, signal, confidence, reasoning,
/// outcome_return, outcome_date, is_correct, created_at, feature_snapshot.
pub fn write_journal_csv<W: Write>(writer: W, entries: &[JournalEntry]) -> Result<usize> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record([
        "id",
        "model_id",
        "symbol",
        "signal_date",
        "signal",
        "confidence",
        "reasoning",
        "outcome_return",
        "outcome_date",
        "is_correct",
        "created_at",
        "feature_snapshot",
    ])?;

    for e in entries {
        let (ret, date, correct) = match e.outcome {
            Some(o) => (
                format!("{:.6}", o.outcome_return),
                o.outcome_date.to_string(),
                o.is_correct.to_string(),
            ),
            None => (String::new(), String::new(), String::new()),
        };
        let id = e.id.to_string();
        let signal_date = e.signal_date.to_string();
        let confidence = format!("{:.4}", e.confidence);
        let created_at = e.created_at.to_rfc3339();
        let snapshot = serde_json::to_string(&e.feature_snapshot)?;
        wtr.write_record([
            id.as_str(),
            e.model_id.as_str(),
            e.symbol.as_str(),
            signal_date.as_str(),
            e.signal.as_str(),
            confidence.as_str(),
            e.reasoning.as_deref().unwrap_or(""),
            ret.as_str(),
            date.as_str(),
            correct.as_str(),
            created_at.as_str(),
            snapshot.as_str(),
        ])?;
    }
    wtr.flush()?;
    Ok(entries.len())
}

/// Write the journal CSV to a file, creating parent directories.
pub fn export_journal_csv(path: &Path, entries: &[JournalEntry]) -> Result<usize> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let file = std::fs::File::create(path)?;
    write_journal_csv(file, entries)
}
