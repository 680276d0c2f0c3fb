//! Store-layer errors.

use thiserror::Error;
use tradeloop_core::NormError;

use crate::adjustments::AdjustmentStatus;

/// Errors from the SQLite store and the memory tiers built on it.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("json column: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv: {0}")]
    Csv(#[from] csv::Error),

    #[error("norm stats: {0}")]
    Norm(#[from] NormError),

    #[error("adjustment {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: i64,
        from: AdjustmentStatus,
        to: AdjustmentStatus,
    },

    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    #[error("corrupt {table} row '{id}': {reason}")]
    Corrupt {
        table: &'static str,
        id: String,
        reason: String,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
