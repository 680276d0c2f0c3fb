//! Tradeloop CLI — batch jobs over the pipeline and the trade memory.
//!
//! Commands:
//! - `seed-synthetic` — write a deterministic synthetic universe into the store
//! - `build-dataset` — export the normalized training set as JSON
//! - `register-model` — record a trained model with its frozen norm stats
//! - `predict-input` — export live scoring windows normalized with a model's stats
//! - `fill-outcomes` — resolve journal rows whose horizon has passed
//! - `reflect` — mine reliability patterns from resolved rows
//! - `generate-adjustments` — propose corrections for unreliable patterns
//! - `review` — approve, apply or reject an adjustment (rejecting an applied one withdraws it)
//! - `adjustments` — list adjustments and the composed active set
//! - `export-journal` — dump the journal as CSV

use anyhow::{bail, Context, Result};
use chrono::{Duration, NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

use tradeloop_core::data::{synthetic_universe, MarketDataSource};
use tradeloop_core::{DatasetBuilder, PipelineConfig, StatsHandle, TrainingDataset};
use tradeloop_memory::adjustments::{self, list_adjustments, AdjustmentStatus};
use tradeloop_memory::export::export_journal_csv;
use tradeloop_memory::{
    get_active_adjustments, get_model_meta, register_model, AdjustmentGenerator, MemoryConfig,
    ModelRegistration, PatternReflector, Store, TradeJournal,
};

#[derive(Parser)]
#[command(
    name = "tradeloop",
    about = "Tradeloop CLI — dataset construction and adaptive trade memory jobs"
)]
struct Cli {
    /// SQLite database path.
    #[arg(long, global = true, default_value = "tradeloop.sqlite")]
    db: PathBuf,

    /// Job TOML holding [dataset], [journal], [reflection] and [adjustments].
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level.
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a deterministic synthetic universe into the store.
    SeedSynthetic {
        /// Symbols to generate.
        #[arg(required = true)]
        symbols: Vec<String>,

        /// Start date (YYYY-MM-DD).
        #[arg(long)]
        start: String,

        /// End date (YYYY-MM-DD).
        #[arg(long)]
        end: String,
    },
    /// Build the normalized training dataset and write it as JSON.
    BuildDataset {
        /// Start date (YYYY-MM-DD).
        #[arg(long)]
        start: String,

        /// End date (YYYY-MM-DD).
        #[arg(long)]
        end: String,

        /// Output JSON path.
        #[arg(long, default_value = "dataset.json")]
        output: PathBuf,
    },
    /// Register a trained model using the stats of a dataset JSON.
    RegisterModel {
        #[arg(long)]
        model_id: String,

        /// Dataset JSON produced by `build-dataset`.
        #[arg(long)]
        dataset: PathBuf,

        /// Path to the trained weights.
        #[arg(long)]
        weights: String,

        /// Optional metrics JSON file.
        #[arg(long)]
        metrics: Option<PathBuf>,
    },
    /// Build live scoring windows normalized with a registered model's stats.
    PredictInput {
        #[arg(long)]
        model_id: String,

        /// Decision date (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        as_of: Option<String>,

        /// Output JSON path.
        #[arg(long, default_value = "predict_input.json")]
        output: PathBuf,
    },
    /// Resolve journal outcomes whose horizon has passed.
    FillOutcomes {
        /// Horizon in trading days. Defaults to [dataset].forward_days.
        #[arg(long)]
        forward_days: Option<usize>,

        /// Resolve as of this date (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        as_of: Option<String>,
    },
    /// Mine reliability patterns from resolved journal rows.
    Reflect {
        /// Deprecate patterns not rediscovered in this many days.
        #[arg(long)]
        deprecate_after_days: Option<i64>,
    },
    /// Propose adjustments for unreliable active patterns.
    GenerateAdjustments,
    /// Move an adjustment through review.
    Review {
        #[arg(value_enum)]
        action: ReviewAction,

        /// Adjustment id.
        id: i64,
    },
    /// List adjustments and the active composition.
    Adjustments {
        /// Only list adjustments with this status.
        #[arg(long)]
        status: Option<String>,
    },
    /// Export the journal as CSV.
    ExportJournal {
        #[arg(long, default_value = "journal.csv")]
        output: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ReviewAction {
    Approve,
    Apply,
    Reject,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let (pipeline, memory) = load_config(cli.config.as_deref())?;
    let mut store =
        Store::open(&cli.db).with_context(|| format!("open store {}", cli.db.display()))?;

    match cli.command {
        Commands::SeedSynthetic { symbols, start, end } => {
            run_seed(&mut store, &symbols, parse_date(&start)?, parse_date(&end)?)
        }
        Commands::BuildDataset { start, end, output } => {
            let builder = DatasetBuilder::new(&store, pipeline.dataset)?;
            let dataset = builder.build_training_dataset(parse_date(&start)?, parse_date(&end)?)?;
            write_json(&output, &dataset)?;
            println!(
                "{} samples (BUY {} / HOLD {} / SELL {}), fingerprint {}",
                dataset.len(),
                dataset.class_counts.buy,
                dataset.class_counts.hold,
                dataset.class_counts.sell,
                dataset.fingerprint
            );
            println!("Dataset written to: {}", output.display());
            Ok(())
        }
        Commands::RegisterModel {
            model_id,
            dataset,
            weights,
            metrics,
        } => run_register(&mut store, &pipeline, &model_id, &dataset, &weights, metrics.as_deref()),
        Commands::PredictInput {
            model_id,
            as_of,
            output,
        } => {
            let Some(handle) = get_model_meta(&store, &model_id)? else {
                bail!("model '{model_id}' is not registered");
            };
            let as_of = parse_date_or_today(as_of.as_deref())?;
            let stats = StatsHandle::new(handle.norm_stats)
                .with_context(|| format!("stored norm stats for '{model_id}'"))?;
            let builder = DatasetBuilder::new(&store, pipeline.dataset)?;
            let input = builder.build_prediction_input(&stats, as_of)?;
            write_json(&output, &input)?;
            println!("{} symbols as of {as_of} written to: {}", input.symbols.len(), output.display());
            Ok(())
        }
        Commands::FillOutcomes {
            forward_days,
            as_of,
        } => {
            let forward_days = forward_days.unwrap_or(pipeline.dataset.forward_days);
            let as_of = parse_date_or_today(as_of.as_deref())?;
            let summary =
                TradeJournal::new(&memory.journal).fill_outcomes(&mut store, forward_days, as_of)?;
            println!(
                "examined {}, resolved {}, pending {}",
                summary.examined, summary.resolved, summary.pending
            );
            Ok(())
        }
        Commands::Reflect {
            deprecate_after_days,
        } => {
            let reflector = PatternReflector::new(&memory.reflection);
            let patterns = reflector.run_reflection(&mut store)?;
            for p in &patterns {
                println!(
                    "{:<24} win {:>5.1}%  avg {:>+7.4}  n {}",
                    p.name,
                    p.win_rate * 100.0,
                    p.avg_return,
                    p.sample_count
                );
            }
            if let Some(days) = deprecate_after_days {
                let n = reflector.deprecate_stale(&store, Utc::now() - Duration::days(days))?;
                println!("{n} stale patterns deprecated");
            }
            Ok(())
        }
        Commands::GenerateAdjustments => {
            let generator = AdjustmentGenerator::new(&memory.adjustments, &memory.reflection);
            for a in generator.generate_adjustments(&mut store)? {
                println!("#{} pattern {}: {}", a.id, a.pattern_id, a.reason);
            }
            Ok(())
        }
        Commands::Review { action, id } => {
            let adjustment = match action {
                ReviewAction::Approve => adjustments::approve(&mut store, id)?,
                ReviewAction::Apply => adjustments::apply(&mut store, id)?,
                ReviewAction::Reject => adjustments::reject(&mut store, id)?,
            };
            println!("#{} is now {}", adjustment.id, adjustment.status);
            Ok(())
        }
        Commands::Adjustments { status } => {
            let status = status
                .as_deref()
                .map(|s| s.parse::<AdjustmentStatus>())
                .transpose()
                .map_err(anyhow::Error::msg)?;
            for a in list_adjustments(&store, status)? {
                println!("#{:<5} {:<9} pattern {:<4} {}", a.id, a.status, a.pattern_id, a.reason);
            }
            let active = get_active_adjustments(&store)?;
            for (key, adj) in &active.by_key {
                println!(
                    "active {key}: scale {:.2}{}",
                    adj.confidence_scale,
                    if adj.suppress { ", suppressed" } else { "" }
                );
            }
            if active.skipped > 0 {
                println!("{} malformed applied rows skipped", active.skipped);
            }
            Ok(())
        }
        Commands::ExportJournal { output } => {
            let entries = TradeJournal::new(&memory.journal).all(&store)?;
            let n = export_journal_csv(&output, &entries)?;
            println!("{n} journal rows written to: {}", output.display());
            Ok(())
        }
    }?;

    store.close()?;
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<(PipelineConfig, MemoryConfig)> {
    match path {
        Some(path) => Ok((
            PipelineConfig::from_file(path)
                .with_context(|| format!("load [dataset] from {}", path.display()))?,
            MemoryConfig::from_file(path)
                .with_context(|| format!("load memory config from {}", path.display()))?,
        )),
        None => Ok((PipelineConfig::default(), MemoryConfig::default())),
    }
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| format!("invalid date '{s}'"))
}

fn parse_date_or_today(s: Option<&str>) -> Result<NaiveDate> {
    match s {
        Some(s) => parse_date(s),
        None => Ok(chrono::Local::now().date_naive()),
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string(value)?;
    std::fs::write(path, json).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

fn run_seed(store: &mut Store, symbols: &[String], start: NaiveDate, end: NaiveDate) -> Result<()> {
    if end < start {
        bail!("--end must not be before --start");
    }
    let refs: Vec<&str> = symbols.iter().map(|s| s.as_str()).collect();
    let source = synthetic_universe(&refs, start, end);
    let mut rows = 0;
    for symbol in source.symbols() {
        if let Some(records) = source.records(symbol) {
            rows += store.insert_records(records)?;
        }
        for snapshot in source.fundamentals(symbol)? {
            store.insert_fundamental(&snapshot)?;
        }
    }
    info!(symbols = symbols.len(), rows, "synthetic universe seeded");
    println!("{rows} daily records seeded for {} symbols", symbols.len());
    Ok(())
}

fn run_register(
    store: &mut Store,
    pipeline: &PipelineConfig,
    model_id: &str,
    dataset_path: &Path,
    weights: &str,
    metrics_path: Option<&Path>,
) -> Result<()> {
    let raw = std::fs::read_to_string(dataset_path)
        .with_context(|| format!("read {}", dataset_path.display()))?;
    let dataset: TrainingDataset = serde_json::from_str(&raw).context("parse dataset JSON")?;
    let metrics = match metrics_path {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)
            .with_context(|| format!("parse metrics {}", path.display()))?,
        None => serde_json::json!({}),
    };

    let meta = register_model(
        store,
        &ModelRegistration {
            model_id,
            config: serde_json::to_value(&pipeline.dataset)?,
            metrics,
            norm_stats: &dataset.stats,
            weights_path: weights,
            dataset_fingerprint: Some(dataset.fingerprint.as_str()),
        },
    )?;
    println!("{} registered as version {}", meta.model_id, meta.version);
    Ok(())
}
