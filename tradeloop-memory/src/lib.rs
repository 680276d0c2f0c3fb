//! Tradeloop Memory — SQLite-backed adaptive trade memory.
//!
//! This crate builds on `tradeloop-core` to provide:
//! - `Store`: one SQLite handle for market data and memory tables,
//!   implementing `MarketDataSource`
//! - L1 `TradeJournal`: append-only signal log with once-only outcome resolution
//! - L2 `PatternReflector`: gated reliability statistics over resolved signals
//! - L3 `AdjustmentGenerator`: proposed corrections plus review transitions
//! - `get_active_adjustments`: composed corrections for the live scorer
//! - Model registry with frozen norm stats and dataset fingerprints
//! - Journal CSV export

pub mod adjustments;
pub mod applier;
pub mod config;
pub mod error;
pub mod export;
pub mod journal;
pub mod reflector;
pub mod registry;
pub mod store;

pub use adjustments::{Adjustment, AdjustmentGenerator, AdjustmentPayload, AdjustmentStatus};
pub use applier::{get_active_adjustments, ActiveAdjustments, SignalAdjustment, ALL_SIGNALS};
pub use config::{AdjustmentConfig, JournalConfig, MemoryConfig, ReflectionConfig};
pub use error::{Result, StoreError};
pub use journal::{FillSummary, JournalEntry, NewDecision, Outcome, TradeJournal};
pub use reflector::{Pattern, PatternCondition, PatternReflector, PatternRule, PatternStatus};
pub use registry::{
    get_model, get_model_meta, list_models, register_model, ModelHandle, ModelMeta,
    ModelRegistration,
};
pub use store::Store;
