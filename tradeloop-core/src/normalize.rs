//! Frozen z-score normalization.
//!
//! `NormStats` are fit once over every (sample, timestep) row of the training
//! windows, persisted with the model, and reused verbatim for all later
//! normalization including live inference. Never refit per batch.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use thiserror::Error;

use crate::features::{FeatureRow, FEATURE_DIM};
use crate::window::Window;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum NormError {
    #[error("norm stats have {means} means and {stds} stds, expected {expected}")]
    DimensionMismatch {
        expected: usize,
        means: usize,
        stds: usize,
    },

    #[error("norm stats contain a non-finite or non-positive std at dimension {0}")]
    InvalidStd(usize),
}

/// Per-dimension mean and population standard deviation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormStats {
    pub means: Vec<f64>,
    pub stds: Vec<f64>,
}

impl NormStats {
    /// Identity stats (mean 0, std 1).
    pub fn identity() -> Self {
        Self {
            means: vec![0.0; FEATURE_DIM],
            stds: vec![1.0; FEATURE_DIM],
        }
    }

    /// Fit over every row of every window.
    ///
    /// Variance is clamped to be non-negative before the square root and a
    /// zero std is floored to 1 so constant dimensions pass through centered.
    pub fn compute(windows: &[Window]) -> Self {
        let mut count = 0usize;
        let mut sums = [0.0f64; FEATURE_DIM];
        for row in windows.iter().flatten() {
            for (sum, x) in sums.iter_mut().zip(row) {
                *sum += x;
            }
            count += 1;
        }
        if count == 0 {
            return Self::identity();
        }

        let n = count as f64;
        let means: Vec<f64> = sums.iter().map(|s| s / n).collect();

        let mut sq = [0.0f64; FEATURE_DIM];
        for row in windows.iter().flatten() {
            for ((acc, x), mean) in sq.iter_mut().zip(row).zip(&means) {
                let d = x - mean;
                *acc += d * d;
            }
        }
        let stds = sq
            .iter()
            .map(|s| {
                let std = (s / n).max(0.0).sqrt();
                if std == 0.0 {
                    1.0
                } else {
                    std
                }
            })
            .collect();

        Self { means, stds }
    }

    /// Check that loaded stats match the feature layout.
    pub fn validate(&self) -> Result<(), NormError> {
        if self.means.len() != FEATURE_DIM || self.stds.len() != FEATURE_DIM {
            return Err(NormError::DimensionMismatch {
                expected: FEATURE_DIM,
                means: self.means.len(),
                stds: self.stds.len(),
            });
        }
        if let Some(i) = self.stds.iter().position(|s| !s.is_finite() || *s <= 0.0) {
            return Err(NormError::InvalidStd(i));
        }
        Ok(())
    }

    pub fn normalize_row(&self, row: &FeatureRow) -> FeatureRow {
        let mut out = [0.0; FEATURE_DIM];
        for i in 0..FEATURE_DIM {
            out[i] = (row[i] - self.means[i]) / self.stds[i];
        }
        out
    }

    /// Elementwise `(x - mean) / std`.
    pub fn normalize_window(&self, window: &[FeatureRow]) -> Window {
        window.iter().map(|row| self.normalize_row(row)).collect()
    }

    /// Elementwise `x * std + mean`.
    pub fn denormalize_window(&self, window: &[FeatureRow]) -> Window {
        window
            .iter()
            .map(|row| {
                let mut out = [0.0; FEATURE_DIM];
                for i in 0..FEATURE_DIM {
                    out[i] = row[i] * self.stds[i] + self.means[i];
                }
                out
            })
            .collect()
    }
}

/// Shared, atomically replaceable handle to the stats every consumer uses.
///
/// Readers take one `Arc<NormStats>` snapshot per batch; `publish` swaps the
/// whole instance at once so no batch ever mixes two sets of stats.
#[derive(Debug, Clone)]
pub struct StatsHandle {
    inner: Arc<RwLock<Arc<NormStats>>>,
}

impl StatsHandle {
    pub fn new(stats: NormStats) -> Result<Self, NormError> {
        stats.validate()?;
        Ok(Self {
            inner: Arc::new(RwLock::new(Arc::new(stats))),
        })
    }

    /// The stats currently in force.
    pub fn snapshot(&self) -> Arc<NormStats> {
        match self.inner.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Replace the stats for every consumer of this handle.
    pub fn publish(&self, stats: NormStats) -> Result<(), NormError> {
        stats.validate()?;
        let next = Arc::new(stats);
        match self.inner.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(value: f64) -> FeatureRow {
        let mut r = [value; FEATURE_DIM];
        r[0] = 7.0; // constant dimension
        r
    }

    #[test]
    fn population_std_over_all_rows() {
        let windows = vec![vec![row(1.0), row(3.0)], vec![row(5.0), row(7.0)]];
        let stats = NormStats::compute(&windows);
        assert!((stats.means[1] - 4.0).abs() < 1e-12);
        // population variance of 1,3,5,7 = 5
        assert!((stats.stds[1] - 5.0_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn constant_dimension_gets_unit_std() {
        let windows = vec![vec![row(1.0), row(2.0)]];
        let stats = NormStats::compute(&windows);
        assert_eq!(stats.means[0], 7.0);
        assert_eq!(stats.stds[0], 1.0);
        let normalized = stats.normalize_window(&windows[0]);
        assert_eq!(normalized[0][0], 0.0);
    }

    #[test]
    fn empty_input_is_identity() {
        assert_eq!(NormStats::compute(&[]), NormStats::identity());
    }

    #[test]
    fn normalize_then_denormalize_reconstructs() {
        let windows = vec![vec![row(1.5), row(-2.0), row(10.0)]];
        let stats = NormStats::compute(&windows);
        let back = stats.denormalize_window(&stats.normalize_window(&windows[0]));
        for (a, b) in back.iter().flatten().zip(windows[0].iter().flatten()) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn validate_rejects_wrong_dimension() {
        let stats = NormStats {
            means: vec![0.0; 3],
            stds: vec![1.0; 3],
        };
        assert!(matches!(
            stats.validate(),
            Err(NormError::DimensionMismatch { expected: FEATURE_DIM, .. })
        ));
        let mut bad = NormStats::identity();
        bad.stds[4] = 0.0;
        assert_eq!(bad.validate(), Err(NormError::InvalidStd(4)));
    }

    #[test]
    fn handle_publishes_whole_instance() {
        let handle = StatsHandle::new(NormStats::identity()).unwrap();
        let before = handle.snapshot();
        let mut next = NormStats::identity();
        next.means[0] = 3.0;
        handle.publish(next).unwrap();
        assert_eq!(before.means[0], 0.0);
        assert_eq!(handle.snapshot().means[0], 3.0);
        assert!(handle.publish(NormStats { means: vec![], stds: vec![] }).is_err());
        assert_eq!(handle.snapshot().means[0], 3.0);
    }
}
