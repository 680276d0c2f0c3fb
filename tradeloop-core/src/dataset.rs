//! Training-set and live-input construction across a symbol universe.
//!
//! Two phases:
//! 1. Fetch — sequential reads from the `MarketDataSource` (store handles are
//!    not required to be `Sync`).
//! 2. Compute — per-symbol extraction, fundamentals and windowing run in
//!    parallel with rayon. Symbols share no mutable state; results are
//!    collected in symbol order so output is deterministic.
//!
//! Normalization happens once, after every symbol's windows are collected.

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{ConfigError, DatasetConfig, FundamentalsMode};
use crate::data::{MarketDataSource, SourceError};
use crate::domain::{DailyRecord, Label, StaticFundamental};
use crate::features::{combine, FeatureExtractor, FeatureRow, StaticFeatureExtractor};
use crate::fingerprint::dataset_fingerprint;
use crate::normalize::{NormError, NormStats, StatsHandle};
use crate::window::{LabeledWindows, Window, Windower};

/// Extra bars fetched before the live window so trailing features are warm.
const LIVE_WARMUP_BARS: usize = 20;

/// Errors from the dataset layer.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("data source error: {0}")]
    Source(#[from] SourceError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("norm stats error: {0}")]
    Norm(#[from] NormError),

    #[error("no labeled samples between {start} and {end}")]
    NoSamples { start: NaiveDate, end: NaiveDate },
}

/// Label distribution of a dataset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassCounts {
    pub buy: usize,
    pub hold: usize,
    pub sell: usize,
}

impl ClassCounts {
    pub fn from_labels(labels: &[Label]) -> Self {
        labels.iter().fold(Self::default(), |mut acc, label| {
            match label {
                Label::Buy => acc.buy += 1,
                Label::Hold => acc.hold += 1,
                Label::Sell => acc.sell += 1,
            }
            acc
        })
    }

    pub fn total(&self) -> usize {
        self.buy + self.hold + self.sell
    }

    /// Largest class over smallest class; infinite if a class is empty.
    pub fn imbalance_ratio(&self) -> f64 {
        let counts = [self.buy, self.hold, self.sell];
        let max = counts.iter().copied().max().unwrap_or(0) as f64;
        let min = counts.iter().copied().min().unwrap_or(0) as f64;
        if min == 0.0 {
            f64::INFINITY
        } else {
            max / min
        }
    }
}

/// Trainer contract: `{X, y, symbols, dates, stats}` plus build metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingDataset {
    #[serde(rename = "X")]
    pub x: Vec<Window>,
    pub y: Vec<u8>,
    pub symbols: Vec<String>,
    pub dates: Vec<NaiveDate>,
    pub stats: NormStats,
    pub class_counts: ClassCounts,
    pub fingerprint: String,
}

impl TrainingDataset {
    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }
}

/// Live scoring contract: one normalized window per symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionInput {
    pub symbols: Vec<String>,
    #[serde(rename = "X")]
    pub x: Vec<Window>,
    /// Last date of each symbol's window.
    pub dates: Vec<NaiveDate>,
}

struct SymbolInput {
    symbol: String,
    records: Vec<DailyRecord>,
    fundamentals: Vec<StaticFundamental>,
}

/// The pure per-symbol stages. Shared across rayon workers; the source is not.
#[derive(Debug, Clone, Copy)]
struct Stages {
    extractor: FeatureExtractor,
    statics: StaticFeatureExtractor,
    windower: Windower,
}

impl Stages {
    /// Combined 25-dim rows with their dates and closes, or `None` on short history.
    fn rows(&self, input: &SymbolInput) -> Option<(Vec<FeatureRow>, Vec<NaiveDate>, Vec<f64>)> {
        let series = self.extractor.extract(&input.symbol, &input.records)?;
        let statics = self.statics.per_timestep(&input.fundamentals, &series.dates);
        let rows = combine(&series.features, &statics);
        Some((rows, series.dates, series.closes))
    }

    fn samples(&self, input: &SymbolInput) -> Option<LabeledWindows> {
        let (rows, dates, closes) = self.rows(input)?;
        Some(self.windower.label(&rows, &closes, &dates))
    }
}

pub struct DatasetBuilder<'a, S: MarketDataSource + ?Sized> {
    source: &'a S,
    config: DatasetConfig,
    stages: Stages,
}

impl<'a, S: MarketDataSource + ?Sized> DatasetBuilder<'a, S> {
    pub fn new(source: &'a S, config: DatasetConfig) -> Result<Self, DatasetError> {
        config.validate()?;
        Ok(Self {
            source,
            stages: Stages {
                extractor: FeatureExtractor::from_config(&config),
                statics: StaticFeatureExtractor::new(config.fundamentals),
                windower: Windower::from_config(&config),
            },
            config,
        })
    }

    pub fn config(&self) -> &DatasetConfig {
        &self.config
    }

    /// Build the full normalized training set for `[start, end]`.
    pub fn build_training_dataset(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<TrainingDataset, DatasetError> {
        if self.config.fundamentals == FundamentalsMode::Latest {
            warn!("fundamentals mode 'latest' broadcasts present-day fundamentals into historical windows");
        }

        let symbols =
            self.source
                .eligible_symbols(Some(start), end, self.config.min_trading_days)?;
        info!(source = self.source.name(), symbols = symbols.len(), %start, %end, "building training dataset");

        let mut inputs = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            let records = self.source.daily_records(&symbol, start, end)?;
            let fundamentals = self.source.fundamentals(&symbol)?;
            inputs.push(SymbolInput {
                symbol,
                records,
                fundamentals,
            });
        }

        let stages = self.stages;
        let per_symbol: Vec<(String, LabeledWindows)> = inputs
            .par_iter()
            .filter_map(|input| {
                stages
                    .samples(input)
                    .map(|samples| (input.symbol.clone(), samples))
            })
            .collect();

        let total: usize = per_symbol.iter().map(|(_, s)| s.len()).sum();
        let mut raw: Vec<Window> = Vec::with_capacity(total);
        let mut labels: Vec<Label> = Vec::with_capacity(total);
        let mut tags: Vec<String> = Vec::with_capacity(total);
        let mut dates: Vec<NaiveDate> = Vec::with_capacity(total);
        for (symbol, samples) in per_symbol {
            debug!(symbol = %symbol, windows = samples.len(), "symbol windows");
            tags.extend(std::iter::repeat(symbol).take(samples.len()));
            raw.extend(samples.windows);
            labels.extend(samples.labels);
            dates.extend(samples.window_dates);
        }

        if raw.is_empty() {
            return Err(DatasetError::NoSamples { start, end });
        }

        let fingerprint = dataset_fingerprint(&self.config, &raw, &labels, &tags, &dates);
        let stats = NormStats::compute(&raw);
        let x: Vec<Window> = raw.par_iter().map(|w| stats.normalize_window(w)).collect();
        let class_counts = ClassCounts::from_labels(&labels);

        info!(
            samples = x.len(),
            buy = class_counts.buy,
            hold = class_counts.hold,
            sell = class_counts.sell,
            imbalance = class_counts.imbalance_ratio(),
            "training dataset built"
        );

        Ok(TrainingDataset {
            x,
            y: labels.iter().map(|l| l.as_index()).collect(),
            symbols: tags,
            dates,
            stats,
            class_counts,
            fingerprint,
        })
    }

    /// Latest window per eligible symbol, normalized with the stats in `stats`.
    ///
    /// One snapshot is taken up front, so every window in the batch uses the
    /// same frozen stats even if a new set is published mid-build.
    pub fn build_prediction_input(
        &self,
        stats: &StatsHandle,
        as_of: NaiveDate,
    ) -> Result<PredictionInput, DatasetError> {
        let stats = stats.snapshot();

        let min_history = self.stages.extractor.min_history();
        let symbols = self.source.eligible_symbols(None, as_of, min_history)?;
        let mut inputs = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            let records =
                self.source
                    .recent_records(&symbol, as_of, min_history + LIVE_WARMUP_BARS)?;
            let fundamentals = self.source.fundamentals(&symbol)?;
            inputs.push(SymbolInput {
                symbol,
                records,
                fundamentals,
            });
        }

        let stages = self.stages;
        let latest: Vec<(String, Window, NaiveDate)> = inputs
            .par_iter()
            .filter_map(|input| {
                let (rows, dates, _) = stages.rows(input)?;
                let (window, date) = stages.windower.latest(&rows, &dates)?;
                Some((input.symbol.clone(), stats.normalize_window(&window), date))
            })
            .collect();

        info!(symbols = latest.len(), %as_of, "prediction input built");

        let mut out = PredictionInput {
            symbols: Vec::with_capacity(latest.len()),
            x: Vec::with_capacity(latest.len()),
            dates: Vec::with_capacity(latest.len()),
        };
        for (symbol, window, date) in latest {
            out.symbols.push(symbol);
            out.x.push(window);
            out.dates.push(date);
        }
        Ok(out)
    }
}
