//! Composition of applied adjustments for the live scorer.
//!
//! Adjustments are keyed by the signal type of their pattern's condition
//! (`"BUY"`, `"SELL"`, ...) or `"all"` when the condition names no signal.
//! Per key the smallest confidence scale wins and any suppression suppresses.

use rusqlite::params;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use tradeloop_core::domain::Signal;

use crate::adjustments::AdjustmentPayload;
use crate::error::Result;
use crate::reflector::PatternCondition;
use crate::store::Store;

/// Key for adjustments whose pattern applies to every signal.
pub const ALL_SIGNALS: &str = "all";

/// Composed correction for one key.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalAdjustment {
    pub confidence_scale: f64,
    pub suppress: bool,
}

impl Default for SignalAdjustment {
    fn default() -> Self {
        Self {
            confidence_scale: 1.0,
            suppress: false,
        }
    }
}

impl SignalAdjustment {
    /// Min of scales, OR of suppressions.
    pub fn compose(self, other: SignalAdjustment) -> SignalAdjustment {
        SignalAdjustment {
            confidence_scale: self.confidence_scale.min(other.confidence_scale),
            suppress: self.suppress || other.suppress,
        }
    }

    fn absorb(&mut self, payload: AdjustmentPayload) {
        match payload {
            AdjustmentPayload::ConfidenceScale { scale } => {
                self.confidence_scale = self.confidence_scale.min(scale);
            }
            AdjustmentPayload::SignalSuppress { suppress } => {
                self.suppress |= suppress;
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActiveAdjustments {
    pub by_key: BTreeMap<String, SignalAdjustment>,
    /// Applied rows skipped because their payload or condition did not parse.
    pub skipped: usize,
}

impl ActiveAdjustments {
    pub fn get(&self, key: &str) -> SignalAdjustment {
        self.by_key.get(key).copied().unwrap_or_default()
    }

    /// Signal-specific adjustment composed with the `"all"` adjustment.
    pub fn for_signal(&self, signal: Signal) -> SignalAdjustment {
        self.get(signal.as_str()).compose(self.get(ALL_SIGNALS))
    }

    /// Adjusted confidence, or `None` if the signal is suppressed.
    pub fn apply(&self, signal: Signal, confidence: f64) -> Option<f64> {
        let adj = self.for_signal(signal);
        if adj.suppress {
            None
        } else {
            Some(confidence * adj.confidence_scale)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

/// Compose every `applied` adjustment into per-key corrections.
pub fn get_active_adjustments(store: &Store) -> Result<ActiveAdjustments> {
    let mut stmt = store.conn().prepare(
        "SELECT a.id, a.payload, p.condition
         FROM adjustments a
         JOIN patterns p ON p.id = a.pattern_id
         WHERE a.status = ?1
         ORDER BY a.id ASC",
    )?;
    let rows = stmt
        .query_map(params!["applied"], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut active = ActiveAdjustments::default();
    for (id, payload, condition) in rows {
        let payload: AdjustmentPayload = match serde_json::from_str(&payload) {
            Ok(p) => p,
            Err(e) => {
                warn!(id, error = %e, "skipping adjustment with malformed payload");
                active.skipped += 1;
                continue;
            }
        };
        let condition: PatternCondition = match serde_json::from_str(&condition) {
            Ok(c) => c,
            Err(e) => {
                warn!(id, error = %e, "skipping adjustment with malformed pattern condition");
                active.skipped += 1;
                continue;
            }
        };
        let key = condition
            .signal
            .map(|s| s.as_str())
            .unwrap_or(ALL_SIGNALS)
            .to_string();
        active.by_key.entry(key).or_default().absorb(payload);
    }
    debug!(keys = active.by_key.len(), skipped = active.skipped, "active adjustments loaded");
    Ok(active)
}
