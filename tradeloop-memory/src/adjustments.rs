//! L3 adjustments: proposed inference-time corrections and their governance.
//!
//! Generation only ever inserts `proposed` rows. A reviewer moves them
//! through `approved` to `applied` (or `rejected`); only `applied` rows
//! reach the applier. Rejecting an applied row withdraws it from scoring.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::config::{AdjustmentConfig, ReflectionConfig};
use crate::error::{Result, StoreError};
use crate::reflector::{list_patterns, Pattern, PatternStatus};
use crate::store::Store;

/// Typed `adjustments.payload` column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AdjustmentPayload {
    ConfidenceScale { scale: f64 },
    SignalSuppress { suppress: bool },
}

impl AdjustmentPayload {
    /// Value of the `adjustment_type` column.
    pub fn adjustment_type(&self) -> &'static str {
        match self {
            Self::ConfidenceScale { .. } => "confidence_scale",
            Self::SignalSuppress { .. } => "signal_suppress",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentStatus {
    Proposed,
    Approved,
    Applied,
    Rejected,
}

impl AdjustmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Proposed => "proposed",
            Self::Approved => "approved",
            Self::Applied => "applied",
            Self::Rejected => "rejected",
        }
    }

    /// proposed → approved | rejected; approved → applied | rejected;
    /// applied → rejected. `rejected` is final.
    pub fn can_transition_to(&self, next: AdjustmentStatus) -> bool {
        matches!(
            (self, next),
            (Self::Proposed, Self::Approved)
                | (Self::Proposed, Self::Rejected)
                | (Self::Approved, Self::Applied)
                | (Self::Approved, Self::Rejected)
                | (Self::Applied, Self::Rejected)
        )
    }
}

impl fmt::Display for AdjustmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for AdjustmentStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "proposed" => Ok(Self::Proposed),
            "approved" => Ok(Self::Approved),
            "applied" => Ok(Self::Applied),
            "rejected" => Ok(Self::Rejected),
            other => Err(format!("unknown adjustment status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Adjustment {
    pub id: i64,
    pub pattern_id: i64,
    pub payload: AdjustmentPayload,
    pub reason: String,
    pub status: AdjustmentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[derive(Debug, Clone)]
pub struct AdjustmentGenerator {
    config: AdjustmentConfig,
    min_samples: usize,
}

impl AdjustmentGenerator {
    pub fn new(config: &AdjustmentConfig, reflection: &ReflectionConfig) -> Self {
        Self {
            config: config.clone(),
            min_samples: reflection.min_samples,
        }
    }

    /// Corrections warranted by one pattern, with their human-readable reasons.
    pub fn propose(&self, pattern: &Pattern) -> Vec<(AdjustmentPayload, String)> {
        let mut out = Vec::new();
        let c = &self.config;
        if pattern.win_rate < c.win_rate_threshold && pattern.sample_count >= self.min_samples {
            let scale = round2(c.scale_floor.max(pattern.win_rate / c.win_rate_threshold));
            out.push((
                AdjustmentPayload::ConfidenceScale { scale },
                format!(
                    "{}: win rate {:.2} over {} samples is below {:.2}; scale confidence by {:.2}",
                    pattern.name, pattern.win_rate, pattern.sample_count, c.win_rate_threshold, scale
                ),
            ));
        }
        if pattern.avg_return < c.suppress_return
            && pattern.sample_count >= self.min_samples * c.suppress_sample_multiplier
        {
            out.push((
                AdjustmentPayload::SignalSuppress { suppress: true },
                format!(
                    "{}: average return {:.4} over {} samples is below {:.4}; suppress signal",
                    pattern.name, pattern.avg_return, pattern.sample_count, c.suppress_return
                ),
            ));
        }
        out
    }

    /// Insert `proposed` adjustments for every active pattern that warrants one.
    ///
    /// A pattern that already has a proposed, approved or applied row of the
    /// same type is skipped. Once that row is rejected the pattern can be
    /// proposed again.
    pub fn generate_adjustments(&self, store: &mut Store) -> Result<Vec<Adjustment>> {
        let patterns = list_patterns(store, Some(PatternStatus::Active))?;
        let now = Utc::now();
        let tx = store.conn_mut().transaction()?;
        let mut created = Vec::new();
        let mut skipped = 0usize;
        {
            let mut open = tx.prepare(
                "SELECT EXISTS(
                     SELECT 1 FROM adjustments
                     WHERE pattern_id = ?1 AND adjustment_type = ?2
                       AND status IN ('proposed', 'approved', 'applied'))",
            )?;
            let mut insert = tx.prepare(
                "INSERT INTO adjustments
                 (pattern_id, adjustment_type, payload, reason, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, 'proposed', ?5, ?5)",
            )?;
            for pattern in &patterns {
                for (payload, reason) in self.propose(pattern) {
                    let pending: bool = open.query_row(
                        params![pattern.id, payload.adjustment_type()],
                        |row| row.get(0),
                    )?;
                    if pending {
                        debug!(
                            pattern = %pattern.name,
                            kind = payload.adjustment_type(),
                            "already under review or applied"
                        );
                        skipped += 1;
                        continue;
                    }
                    let json = serde_json::to_string(&payload)?;
                    insert.execute(params![
                        pattern.id,
                        payload.adjustment_type(),
                        json,
                        reason,
                        now
                    ])?;
                    created.push(Adjustment {
                        id: tx.last_insert_rowid(),
                        pattern_id: pattern.id,
                        payload,
                        reason,
                        status: AdjustmentStatus::Proposed,
                        created_at: now,
                        updated_at: now,
                    });
                }
            }
        }
        tx.commit()?;
        info!(
            patterns = patterns.len(),
            proposed = created.len(),
            skipped,
            "adjustments generated"
        );
        Ok(created)
    }
}

// ── Governance ───────────────────────────────────────────────────────

pub fn approve(store: &mut Store, id: i64) -> Result<Adjustment> {
    transition(store, id, AdjustmentStatus::Approved)
}

pub fn apply(store: &mut Store, id: i64) -> Result<Adjustment> {
    transition(store, id, AdjustmentStatus::Applied)
}

/// Reject a pending adjustment, or withdraw an applied one.
pub fn reject(store: &mut Store, id: i64) -> Result<Adjustment> {
    transition(store, id, AdjustmentStatus::Rejected)
}

fn transition(store: &mut Store, id: i64, next: AdjustmentStatus) -> Result<Adjustment> {
    let tx = store.conn_mut().transaction()?;
    let current: Option<String> = tx
        .query_row(
            "SELECT status FROM adjustments WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )
        .optional()?;
    let current = current.ok_or_else(|| StoreError::NotFound {
        kind: "adjustment",
        id: id.to_string(),
    })?;
    let current: AdjustmentStatus = current.parse().map_err(|reason| StoreError::Corrupt {
        table: "adjustments",
        id: id.to_string(),
        reason,
    })?;
    if !current.can_transition_to(next) {
        return Err(StoreError::InvalidTransition {
            id,
            from: current,
            to: next,
        });
    }
    tx.execute(
        "UPDATE adjustments SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4",
        params![next.as_str(), Utc::now(), id, current.as_str()],
    )?;
    tx.commit()?;
    info!(id, from = %current, to = %next, "adjustment status changed");
    get_adjustment(store, id)?.ok_or_else(|| StoreError::NotFound {
        kind: "adjustment",
        id: id.to_string(),
    })
}

type AdjustmentRow = (i64, i64, String, String, String, DateTime<Utc>, DateTime<Utc>);

fn parse_adjustment(row: AdjustmentRow) -> Result<Adjustment> {
    let (id, pattern_id, payload, reason, status, created_at, updated_at) = row;
    let payload: AdjustmentPayload = serde_json::from_str(&payload)?;
    let status: AdjustmentStatus = status.parse().map_err(|reason| StoreError::Corrupt {
        table: "adjustments",
        id: id.to_string(),
        reason,
    })?;
    Ok(Adjustment {
        id,
        pattern_id,
        payload,
        reason,
        status,
        created_at,
        updated_at,
    })
}

const ADJUSTMENT_COLUMNS: &str = "id, pattern_id, payload, reason, status, created_at, updated_at";

fn adjustment_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AdjustmentRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

pub fn get_adjustment(store: &Store, id: i64) -> Result<Option<Adjustment>> {
    let row = store
        .conn()
        .query_row(
            &format!("SELECT {ADJUSTMENT_COLUMNS} FROM adjustments WHERE id = ?1"),
            params![id],
            adjustment_row,
        )
        .optional()?;
    row.map(parse_adjustment).transpose()
}

/// Adjustments, optionally filtered by status. Malformed rows are skipped with a warning.
pub fn list_adjustments(store: &Store, status: Option<AdjustmentStatus>) -> Result<Vec<Adjustment>> {
    let mut stmt = store.conn().prepare(&format!(
        "SELECT {ADJUSTMENT_COLUMNS} FROM adjustments WHERE (?1 IS NULL OR status = ?1) ORDER BY id ASC"
    ))?;
    let rows = stmt
        .query_map(params![status.map(|s| s.as_str())], adjustment_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let id = row.0;
        match parse_adjustment(row) {
            Ok(a) => out.push(a),
            Err(e) => warn!(id, error = %e, "skipping malformed adjustment row"),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reflector::PatternCondition;
    use tradeloop_core::domain::Signal;

    fn pattern(win_rate: f64, avg_return: f64, sample_count: usize) -> Pattern {
        Pattern {
            id: 1,
            name: "BUY_baseline".into(),
            condition: PatternCondition::for_signal(Signal::Buy),
            signal_type: Some(Signal::Buy),
            win_rate,
            avg_return,
            sample_count,
            status: PatternStatus::Active,
            discovered_at: Utc::now(),
        }
    }

    fn generator() -> AdjustmentGenerator {
        AdjustmentGenerator::new(&AdjustmentConfig::default(), &ReflectionConfig::default())
    }

    #[test]
    fn low_win_rate_scales_confidence() {
        let proposals = generator().propose(&pattern(0.3, 0.01, 50));
        assert_eq!(proposals.len(), 1);
        assert_eq!(proposals[0].0, AdjustmentPayload::ConfidenceScale { scale: 0.6 });
        assert!(proposals[0].1.contains("BUY_baseline"));
    }

    #[test]
    fn scale_is_floored() {
        let proposals = generator().propose(&pattern(0.01, 0.01, 50));
        assert_eq!(proposals[0].0, AdjustmentPayload::ConfidenceScale { scale: 0.1 });
    }

    #[test]
    fn suppression_needs_twice_the_samples() {
        assert!(generator().propose(&pattern(0.6, -0.05, 19)).is_empty());
        let proposals = generator().propose(&pattern(0.6, -0.05, 20));
        assert_eq!(proposals.len(), 1);
        assert_eq!(proposals[0].0, AdjustmentPayload::SignalSuppress { suppress: true });
    }

    #[test]
    fn reliable_pattern_needs_nothing() {
        assert!(generator().propose(&pattern(0.7, 0.03, 100)).is_empty());
    }

    #[test]
    fn payload_json_is_tagged() {
        let json = serde_json::to_string(&AdjustmentPayload::ConfidenceScale { scale: 0.6 }).unwrap();
        assert_eq!(json, r#"{"type":"confidence_scale","scale":0.6}"#);
    }

    #[test]
    fn transitions() {
        use AdjustmentStatus::*;
        assert!(Proposed.can_transition_to(Approved));
        assert!(Proposed.can_transition_to(Rejected));
        assert!(Approved.can_transition_to(Applied));
        assert!(!Proposed.can_transition_to(Applied));
        assert!(Applied.can_transition_to(Rejected));
        assert!(!Applied.can_transition_to(Approved));
        assert!(!Rejected.can_transition_to(Approved));
        assert!(!Rejected.can_transition_to(Applied));
    }
}
