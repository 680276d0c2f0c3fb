//! Pipeline configuration (`[dataset]` section of the job TOML).

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// How static fundamentals are attached to historical timesteps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FundamentalsMode {
    /// Each timestep sees the latest snapshot published on or before its date.
    #[default]
    PointInTime,
    /// The most recent snapshot is broadcast to every timestep.
    ///
    /// Leaks present-day fundamentals into historical windows. Kept only to
    /// reproduce datasets built before point-in-time snapshots existed.
    Latest,
}

/// Windowing, labeling and universe-eligibility parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// Timesteps per window.
    pub seq_len: usize,
    /// Trading days between the decision day and the labeling close.
    pub forward_days: usize,
    /// Forward return strictly above this is BUY.
    pub buy_threshold: f64,
    /// Forward return strictly below this is SELL.
    pub sell_threshold: f64,
    /// Minimum trading days in range for a symbol to enter the universe.
    pub min_trading_days: usize,
    pub fundamentals: FundamentalsMode,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            seq_len: 20,
            forward_days: 5,
            buy_threshold: 0.02,
            sell_threshold: -0.02,
            min_trading_days: 120,
            fundamentals: FundamentalsMode::PointInTime,
        }
    }
}

impl DatasetConfig {
    /// Bars required before a symbol is considered to have usable history.
    pub fn min_history(&self) -> usize {
        self.seq_len + self.forward_days + 10
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.seq_len == 0 {
            return Err(ConfigError::Invalid("seq_len must be >= 1".into()));
        }
        if self.forward_days == 0 {
            return Err(ConfigError::Invalid("forward_days must be >= 1".into()));
        }
        if !(self.buy_threshold.is_finite() && self.sell_threshold.is_finite()) {
            return Err(ConfigError::Invalid("label thresholds must be finite".into()));
        }
        if self.sell_threshold > self.buy_threshold {
            return Err(ConfigError::Invalid(format!(
                "sell_threshold ({}) must not exceed buy_threshold ({})",
                self.sell_threshold, self.buy_threshold
            )));
        }
        Ok(())
    }
}

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub dataset: DatasetConfig,
}

impl PipelineConfig {
    /// Load and validate from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate from a TOML string. Unknown sections are ignored.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.dataset.validate()?;
        Ok(config)
    }
}
