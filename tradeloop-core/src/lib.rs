//! Tradeloop Core — causal feature pipeline for daily trading signals.
//!
//! This crate turns per-symbol daily market data into model-ready tensors:
//! - Domain types (price bars, indicator/flow rows, fundamentals, signals)
//! - `MarketDataSource` trait with in-memory and synthetic sources
//! - Causal feature extraction (19 time-varying + 6 static dimensions)
//! - Fixed-length windowing with forward-return labels
//! - Frozen z-score normalization shared between training and inference
//! - Dataset assembly and BLAKE3 dataset fingerprints

pub mod config;
pub mod data;
pub mod dataset;
pub mod domain;
pub mod features;
pub mod fingerprint;
pub mod normalize;
pub mod window;

pub use config::{ConfigError, DatasetConfig, FundamentalsMode, PipelineConfig};
pub use dataset::{ClassCounts, DatasetBuilder, DatasetError, PredictionInput, TrainingDataset};
pub use normalize::{NormError, NormStats, StatsHandle};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: types handed across threads are Send + Sync.
    ///
    /// Feature extraction runs on rayon workers and the stats handle is
    /// shared by every scoring consumer, so a regression here breaks the build.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        // Domain types
        require_send::<domain::PriceBar>();
        require_sync::<domain::PriceBar>();
        require_send::<domain::DailyRecord>();
        require_sync::<domain::DailyRecord>();
        require_send::<domain::StaticFundamental>();
        require_sync::<domain::StaticFundamental>();
        require_send::<domain::Signal>();
        require_sync::<domain::Signal>();

        // Pipeline stages
        require_send::<features::FeatureExtractor>();
        require_sync::<features::FeatureExtractor>();
        require_send::<features::StaticFeatureExtractor>();
        require_sync::<features::StaticFeatureExtractor>();
        require_send::<window::Windower>();
        require_sync::<window::Windower>();

        // Outputs
        require_send::<TrainingDataset>();
        require_sync::<TrainingDataset>();
        require_send::<PredictionInput>();
        require_sync::<PredictionInput>();
        require_send::<NormStats>();
        require_sync::<NormStats>();
        require_send::<StatsHandle>();
        require_sync::<StatsHandle>();
        require_send::<data::InMemorySource>();
        require_sync::<data::InMemorySource>();
    }
}
