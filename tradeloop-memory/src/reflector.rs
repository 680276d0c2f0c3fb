//! L2 pattern reflection: statistical reliability of signal subsets.
//!
//! Each run mines the most recent resolved journal rows against a list of
//! `PatternRule`s. A rule that matches at least `min_samples` rows becomes a
//! pattern snapshot, upserted by name. Every upsert is also appended to
//! `pattern_history` so earlier snapshots remain auditable.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

use tradeloop_core::domain::Signal;

use crate::config::ReflectionConfig;
use crate::error::{Result, StoreError};
use crate::journal::{JournalEntry, TradeJournal};
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    Gt,
    Lt,
}

/// Threshold on one named feature of the decision-time snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureBound {
    pub feature: String,
    pub op: Comparison,
    pub value: f64,
}

impl FeatureBound {
    pub fn gt(feature: &str, value: f64) -> Self {
        Self {
            feature: feature.to_string(),
            op: Comparison::Gt,
            value,
        }
    }

    pub fn lt(feature: &str, value: f64) -> Self {
        Self {
            feature: feature.to_string(),
            op: Comparison::Lt,
            value,
        }
    }
}

/// Predicate over journal rows, stored as JSON in `patterns.condition`.
///
/// Empty conditions match every row. A feature bound on a feature absent
/// from the snapshot never matches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatternCondition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal: Option<Signal>,
    /// Inclusive lower confidence bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_confidence: Option<f64>,
    /// Exclusive upper confidence bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature: Option<FeatureBound>,
}

impl PatternCondition {
    pub fn for_signal(signal: Signal) -> Self {
        Self {
            signal: Some(signal),
            ..Self::default()
        }
    }

    pub fn matches(&self, entry: &JournalEntry) -> bool {
        if self.signal.is_some_and(|s| s != entry.signal) {
            return false;
        }
        if self.min_confidence.is_some_and(|min| entry.confidence < min) {
            return false;
        }
        if self.max_confidence.is_some_and(|max| entry.confidence >= max) {
            return false;
        }
        if let Some(bound) = &self.feature {
            let Some(&value) = entry.feature_snapshot.get(&bound.feature) else {
                return false;
            };
            let hit = match bound.op {
                Comparison::Gt => value > bound.value,
                Comparison::Lt => value < bound.value,
            };
            if !hit {
                return false;
            }
        }
        true
    }
}

/// A named condition to evaluate on every reflection run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternRule {
    pub name: String,
    pub condition: PatternCondition,
}

impl PatternRule {
    pub fn new(name: impl Into<String>, condition: PatternCondition) -> Self {
        Self {
            name: name.into(),
            condition,
        }
    }
}

/// Standard rule set: per BUY and SELL, a baseline, confidence strata and
/// feature-conditioned subsets.
pub fn default_rules(config: &ReflectionConfig) -> Vec<PatternRule> {
    let mut rules = Vec::new();
    for signal in [Signal::Buy, Signal::Sell] {
        let base = PatternCondition::for_signal(signal);
        rules.push(PatternRule::new(format!("{signal}_baseline"), base.clone()));
        rules.push(PatternRule::new(
            format!("{signal}_high_confidence"),
            PatternCondition {
                min_confidence: Some(config.high_confidence),
                ..base.clone()
            },
        ));
        rules.push(PatternRule::new(
            format!("{signal}_low_confidence"),
            PatternCondition {
                max_confidence: Some(config.low_confidence),
                ..base.clone()
            },
        ));
        rules.push(PatternRule::new(
            format!("{signal}_volume_spike"),
            PatternCondition {
                feature: Some(FeatureBound::gt("volume_ratio", 2.0)),
                ..base
            },
        ));
    }
    rules.push(PatternRule::new(
        "BUY_rsi_overbought",
        PatternCondition {
            feature: Some(FeatureBound::gt("rsi", 0.7)),
            ..PatternCondition::for_signal(Signal::Buy)
        },
    ));
    rules.push(PatternRule::new(
        "SELL_rsi_oversold",
        PatternCondition {
            feature: Some(FeatureBound::lt("rsi", 0.3)),
            ..PatternCondition::for_signal(Signal::Sell)
        },
    ));
    rules
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternStatus {
    Active,
    Deprecated,
}

impl PatternStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Deprecated => "deprecated",
        }
    }
}

impl fmt::Display for PatternStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for PatternStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "deprecated" => Ok(Self::Deprecated),
            other => Err(format!("unknown pattern status '{other}'")),
        }
    }
}

/// Statistics of one rule over one set of rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternStats {
    pub name: String,
    pub condition: PatternCondition,
    pub win_rate: f64,
    /// Mean return earned in the signal's direction.
    pub avg_return: f64,
    pub sample_count: usize,
}

/// Stored pattern snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub id: i64,
    pub name: String,
    pub condition: PatternCondition,
    pub signal_type: Option<Signal>,
    pub win_rate: f64,
    pub avg_return: f64,
    pub sample_count: usize,
    pub status: PatternStatus,
    pub discovered_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct PatternReflector {
    config: ReflectionConfig,
    rules: Vec<PatternRule>,
}

impl PatternReflector {
    pub fn new(config: &ReflectionConfig) -> Self {
        Self {
            rules: default_rules(config),
            config: config.clone(),
        }
    }

    /// Replace the rule set.
    pub fn with_rules(mut self, rules: Vec<PatternRule>) -> Self {
        self.rules = rules;
        self
    }

    pub fn rules(&self) -> &[PatternRule] {
        &self.rules
    }

    /// Evaluate every rule against resolved rows, keeping rules with enough samples.
    pub fn evaluate(&self, rows: &[JournalEntry]) -> Vec<PatternStats> {
        self.rules
            .iter()
            .filter_map(|rule| {
                let mut n = 0usize;
                let mut wins = 0usize;
                let mut total_return = 0.0;
                for row in rows.iter().filter(|r| rule.condition.matches(r)) {
                    let (Some(outcome), Some(r)) = (row.outcome, row.signal_return()) else {
                        continue;
                    };
                    n += 1;
                    wins += usize::from(outcome.is_correct);
                    total_return += r;
                }
                if n < self.config.min_samples {
                    debug!(rule = %rule.name, samples = n, "pattern below min_samples");
                    return None;
                }
                Some(PatternStats {
                    name: rule.name.clone(),
                    condition: rule.condition.clone(),
                    win_rate: wins as f64 / n as f64,
                    avg_return: total_return / n as f64,
                    sample_count: n,
                })
            })
            .collect()
    }

    /// Mine recent resolved rows and upsert the resulting patterns.
    ///
    /// Returns the upserted patterns; empty when there are fewer resolved
    /// rows than `min_samples`.
    pub fn run_reflection(&self, store: &mut Store) -> Result<Vec<Pattern>> {
        let rows = TradeJournal::default().recent_resolved(store, self.config.lookback_rows)?;
        if rows.len() < self.config.min_samples {
            info!(
                resolved = rows.len(),
                min_samples = self.config.min_samples,
                "not enough resolved journal rows to reflect"
            );
            return Ok(Vec::new());
        }

        let stats = self.evaluate(&rows);
        let now = Utc::now();
        let tx = store.conn_mut().transaction()?;
        let mut patterns = Vec::with_capacity(stats.len());
        {
            let mut upsert = tx.prepare(
                "INSERT INTO patterns
                 (name, condition, signal_type, win_rate, avg_return, sample_count, status, discovered_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'active', ?7)
                 ON CONFLICT (name) DO UPDATE SET
                    condition = excluded.condition,
                    signal_type = excluded.signal_type,
                    win_rate = excluded.win_rate,
                    avg_return = excluded.avg_return,
                    sample_count = excluded.sample_count,
                    status = 'active',
                    discovered_at = excluded.discovered_at
                 RETURNING id",
            )?;
            let mut history = tx.prepare(
                "INSERT INTO pattern_history (pattern_name, win_rate, avg_return, sample_count, recorded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for s in stats {
                let condition = serde_json::to_string(&s.condition)?;
                let signal_type = s.condition.signal.map(|sig| sig.as_str());
                let id: i64 = upsert.query_row(
                    params![
                        s.name,
                        condition,
                        signal_type,
                        s.win_rate,
                        s.avg_return,
                        s.sample_count as i64,
                        now
                    ],
                    |row| row.get(0),
                )?;
                history.execute(params![
                    s.name,
                    s.win_rate,
                    s.avg_return,
                    s.sample_count as i64,
                    now
                ])?;
                patterns.push(Pattern {
                    id,
                    signal_type: s.condition.signal,
                    name: s.name,
                    condition: s.condition,
                    win_rate: s.win_rate,
                    avg_return: s.avg_return,
                    sample_count: s.sample_count,
                    status: PatternStatus::Active,
                    discovered_at: now,
                });
            }
        }
        tx.commit()?;
        info!(resolved = rows.len(), patterns = patterns.len(), "reflection complete");
        Ok(patterns)
    }

    /// Mark active patterns not rediscovered since `before` as deprecated.
    pub fn deprecate_stale(&self, store: &Store, before: DateTime<Utc>) -> Result<usize> {
        let changed = store.conn().execute(
            "UPDATE patterns SET status = 'deprecated' WHERE status = 'active' AND discovered_at < ?1",
            params![before],
        )?;
        if changed > 0 {
            info!(deprecated = changed, "stale patterns deprecated");
        }
        Ok(changed)
    }
}

/// Raw `patterns` row before its JSON and enum columns are parsed.
type PatternRow = (i64, String, String, Option<String>, f64, f64, i64, String, DateTime<Utc>);

fn parse_pattern(row: PatternRow) -> Result<Pattern> {
    let (id, name, condition, signal_type, win_rate, avg_return, sample_count, status, discovered_at) =
        row;
    let corrupt = |reason: String| StoreError::Corrupt {
        table: "patterns",
        id: name.clone(),
        reason,
    };
    let condition: PatternCondition =
        serde_json::from_str(&condition).map_err(|e| corrupt(format!("condition: {e}")))?;
    let signal_type = signal_type
        .map(|s| s.parse::<Signal>())
        .transpose()
        .map_err(|e| corrupt(e.to_string()))?;
    let status: PatternStatus = status.parse().map_err(corrupt)?;
    Ok(Pattern {
        id,
        name,
        condition,
        signal_type,
        win_rate,
        avg_return,
        sample_count: usize::try_from(sample_count).unwrap_or(0),
        status,
        discovered_at,
    })
}

const PATTERN_COLUMNS: &str =
    "id, name, condition, signal_type, win_rate, avg_return, sample_count, status, discovered_at";

/// Patterns, optionally filtered by status. Malformed rows are skipped with a warning.
pub fn list_patterns(store: &Store, status: Option<PatternStatus>) -> Result<Vec<Pattern>> {
    let mut stmt = store.conn().prepare(&format!(
        "SELECT {PATTERN_COLUMNS} FROM patterns WHERE (?1 IS NULL OR status = ?1) ORDER BY id ASC"
    ))?;
    let rows = stmt
        .query_map(params![status.map(|s| s.as_str())], |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
                row.get(6)?,
                row.get(7)?,
                row.get(8)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<PatternRow>>>()?;

    let mut patterns = Vec::with_capacity(rows.len());
    for row in rows {
        match parse_pattern(row) {
            Ok(p) => patterns.push(p),
            Err(e) => warn!(error = %e, "skipping malformed pattern row"),
        }
    }
    Ok(patterns)
}

pub fn get_pattern(store: &Store, name: &str) -> Result<Option<Pattern>> {
    let row: Option<PatternRow> = store
        .conn()
        .query_row(
            &format!("SELECT {PATTERN_COLUMNS} FROM patterns WHERE name = ?1"),
            params![name],
            |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                    row.get(7)?,
                    row.get(8)?,
                ))
            },
        )
        .optional()?;
    row.map(parse_pattern).transpose()
}

/// Number of snapshots recorded for a pattern name.
pub fn history_len(store: &Store, name: &str) -> Result<usize> {
    let n: i64 = store.conn().query_row(
        "SELECT COUNT(*) FROM pattern_history WHERE pattern_name = ?1",
        params![name],
        |row| row.get(0),
    )?;
    Ok(usize::try_from(n).unwrap_or(0))
}
