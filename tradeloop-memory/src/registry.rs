//! Model registry: versioned metadata and frozen norm stats per model.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::info;

use tradeloop_core::NormStats;

use crate::error::{Result, StoreError};
use crate::store::Store;

/// Input to `register_model`.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRegistration<'a> {
    pub model_id: &'a str,
    pub config: serde_json::Value,
    pub metrics: serde_json::Value,
    pub norm_stats: &'a NormStats,
    pub weights_path: &'a str,
    pub dataset_fingerprint: Option<&'a str>,
}

/// What a scorer needs to load a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelHandle {
    pub norm_stats: NormStats,
    pub weights_path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMeta {
    pub model_id: String,
    pub version: u32,
    pub config: serde_json::Value,
    pub metrics: serde_json::Value,
    pub norm_stats: NormStats,
    pub weights_path: String,
    pub dataset_fingerprint: Option<String>,
    /// First registration; never changes.
    pub created_at: DateTime<Utc>,
    pub last_registered_at: DateTime<Utc>,
}

/// Upsert a model. The first registration is version 0; each later one bumps it.
pub fn register_model(store: &mut Store, reg: &ModelRegistration<'_>) -> Result<ModelMeta> {
    reg.norm_stats.validate()?;
    let config = serde_json::to_string(&reg.config)?;
    let metrics = serde_json::to_string(&reg.metrics)?;
    let stats = serde_json::to_string(reg.norm_stats)?;
    let now = Utc::now();

    let tx = store.conn_mut().transaction()?;
    let previous: Option<i64> = tx
        .query_row(
            "SELECT version FROM model_registry WHERE model_id = ?1",
            params![reg.model_id],
            |row| row.get(0),
        )
        .optional()?;
    let version = previous.map_or(0, |v| v + 1);
    tx.execute(
        "INSERT INTO model_registry
         (model_id, version, config, metrics, norm_stats, weights_path, dataset_fingerprint,
          created_at, last_registered_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
         ON CONFLICT (model_id) DO UPDATE SET
            version = excluded.version,
            config = excluded.config,
            metrics = excluded.metrics,
            norm_stats = excluded.norm_stats,
            weights_path = excluded.weights_path,
            dataset_fingerprint = excluded.dataset_fingerprint,
            last_registered_at = excluded.last_registered_at",
        params![
            reg.model_id,
            version,
            config,
            metrics,
            stats,
            reg.weights_path,
            reg.dataset_fingerprint,
            now
        ],
    )?;
    tx.commit()?;
    info!(model_id = reg.model_id, version, "model registered");

    get_model(store, reg.model_id)?.ok_or_else(|| StoreError::NotFound {
        kind: "model",
        id: reg.model_id.to_string(),
    })
}

/// Norm stats and weights path, or `None` if the model is unknown.
///
/// Stored stats that fail to parse or validate are an error, never a default.
pub fn get_model_meta(store: &Store, model_id: &str) -> Result<Option<ModelHandle>> {
    Ok(get_model(store, model_id)?.map(|m| ModelHandle {
        norm_stats: m.norm_stats,
        weights_path: m.weights_path,
    }))
}

type ModelRow = (
    String,
    i64,
    String,
    String,
    String,
    String,
    Option<String>,
    DateTime<Utc>,
    DateTime<Utc>,
);

const MODEL_COLUMNS: &str = "model_id, version, config, metrics, norm_stats, weights_path, \
     dataset_fingerprint, created_at, last_registered_at";

fn model_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ModelRow> {
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
}

fn parse_model(row: ModelRow) -> Result<ModelMeta> {
    let (model_id, version, config, metrics, stats, weights_path, dataset_fingerprint, created_at, last) =
        row;
    let corrupt = |reason: String| StoreError::Corrupt {
        table: "model_registry",
        id: model_id.clone(),
        reason,
    };
    let norm_stats: NormStats =
        serde_json::from_str(&stats).map_err(|e| corrupt(format!("norm_stats: {e}")))?;
    norm_stats
        .validate()
        .map_err(|e| corrupt(format!("norm_stats: {e}")))?;
    let config = serde_json::from_str(&config).map_err(|e| corrupt(format!("config: {e}")))?;
    let metrics = serde_json::from_str(&metrics).map_err(|e| corrupt(format!("metrics: {e}")))?;
    let version = u32::try_from(version).map_err(|e| corrupt(format!("version: {e}")))?;
    Ok(ModelMeta {
        model_id,
        version,
        config,
        metrics,
        norm_stats,
        weights_path,
        dataset_fingerprint,
        created_at,
        last_registered_at: last,
    })
}

pub fn get_model(store: &Store, model_id: &str) -> Result<Option<ModelMeta>> {
    let row = store
        .conn()
        .query_row(
            &format!("SELECT {MODEL_COLUMNS} FROM model_registry WHERE model_id = ?1"),
            params![model_id],
            model_row,
        )
        .optional()?;
    row.map(parse_model).transpose()
}

/// Every registered model, most recently registered first.
pub fn list_models(store: &Store) -> Result<Vec<ModelMeta>> {
    let mut stmt = store.conn().prepare(&format!(
        "SELECT {MODEL_COLUMNS} FROM model_registry ORDER BY last_registered_at DESC, model_id ASC"
    ))?;
    let rows = stmt
        .query_map([], model_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    rows.into_iter().map(parse_model).collect()
}
