//! Memory-tier configuration (`[journal]`, `[reflection]`, `[adjustments]`).
//!
//! Lives in the same job TOML as the pipeline's `[dataset]` section; each
//! side ignores the other's tables.

use serde::{Deserialize, Serialize};
use std::path::Path;

pub use tradeloop_core::ConfigError;

/// Outcome resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    /// A HOLD is correct when the absolute return stays under this band.
    pub hold_band: f64,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self { hold_band: 0.03 }
    }
}

/// Pattern mining over resolved journal rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReflectionConfig {
    /// Most recent resolved rows considered per run.
    pub lookback_rows: usize,
    /// Minimum matching rows for a pattern to be recorded.
    pub min_samples: usize,
    /// Confidence at or above this is the high-confidence stratum.
    pub high_confidence: f64,
    /// Confidence strictly below this is the low-confidence stratum.
    pub low_confidence: f64,
}

impl Default for ReflectionConfig {
    fn default() -> Self {
        Self {
            lookback_rows: 2000,
            min_samples: 10,
            high_confidence: 0.7,
            low_confidence: 0.5,
        }
    }
}

/// Converting unreliable patterns into proposed adjustments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdjustmentConfig {
    /// Patterns winning less often than this get a confidence scale.
    pub win_rate_threshold: f64,
    /// Lower bound on a proposed confidence scale.
    pub scale_floor: f64,
    /// Patterns averaging a signal return below this may be suppressed.
    pub suppress_return: f64,
    /// Suppression needs `min_samples * suppress_sample_multiplier` rows.
    pub suppress_sample_multiplier: usize,
}

impl Default for AdjustmentConfig {
    fn default() -> Self {
        Self {
            win_rate_threshold: 0.5,
            scale_floor: 0.1,
            suppress_return: -0.02,
            suppress_sample_multiplier: 2,
        }
    }
}

/// Top-level memory configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub journal: JournalConfig,
    pub reflection: ReflectionConfig,
    pub adjustments: AdjustmentConfig,
}

impl MemoryConfig {
    /// Load and validate from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate from a TOML string. Unknown sections are ignored.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.journal.hold_band.is_finite() && self.journal.hold_band > 0.0) {
            return Err(ConfigError::Invalid("journal.hold_band must be > 0".into()));
        }
        let r = &self.reflection;
        if r.min_samples == 0 {
            return Err(ConfigError::Invalid("reflection.min_samples must be >= 1".into()));
        }
        if r.lookback_rows < r.min_samples {
            return Err(ConfigError::Invalid(format!(
                "reflection.lookback_rows ({}) is below min_samples ({})",
                r.lookback_rows, r.min_samples
            )));
        }
        if !(0.0..=1.0).contains(&r.high_confidence) || !(0.0..=1.0).contains(&r.low_confidence) {
            return Err(ConfigError::Invalid(
                "reflection confidence bounds must lie in [0, 1]".into(),
            ));
        }
        let a = &self.adjustments;
        if !(a.win_rate_threshold > 0.0 && a.win_rate_threshold <= 1.0) {
            return Err(ConfigError::Invalid(
                "adjustments.win_rate_threshold must lie in (0, 1]".into(),
            ));
        }
        if !(a.scale_floor > 0.0 && a.scale_floor <= 1.0) {
            return Err(ConfigError::Invalid("adjustments.scale_floor must lie in (0, 1]".into()));
        }
        if !a.suppress_return.is_finite() {
            return Err(ConfigError::Invalid("adjustments.suppress_return must be finite".into()));
        }
        Ok(())
    }
}
