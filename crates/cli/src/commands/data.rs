//! Local training commands: merging record exports and training a bundle

use anyhow::{Context, Result};
use colored::Colorize;
use ensemble_lib::{
    bundle::BundleStore,
    observability::StructuredLogger,
    training::{bump_version, union_records, RawTable, INITIAL_VERSION},
    ModelTrainer, TrainingConfig, TrainingMetrics,
};
use serde::Serialize;
use std::path::Path;
use tracing::info;

use crate::output::{format_metric, print_info, print_json, print_success, print_warning, OutputFormat};

/// Load the training config, falling back to defaults when no file is given
pub fn load_training_config(path: Option<&Path>) -> Result<TrainingConfig> {
    match path {
        Some(path) => TrainingConfig::load(path)
            .with_context(|| format!("Failed to load training config {}", path.display())),
        None => Ok(TrainingConfig::default()),
    }
}

#[derive(Serialize)]
struct MergeReport<'a> {
    output: &'a Path,
    historical_rows: usize,
    signal_rows: usize,
    skipped_signals: usize,
    total_rows: usize,
}

/// Union historical outcomes with resolved live signals into one CSV
pub fn merge(
    historical: &Path,
    signals: &Path,
    output: &Path,
    config: Option<&Path>,
    format: OutputFormat,
) -> Result<()> {
    let config = load_training_config(config)?;
    let historical_table = RawTable::from_path(historical)
        .with_context(|| format!("Failed to read historical records {}", historical.display()))?;
    let signal_table = RawTable::from_path(signals)
        .with_context(|| format!("Failed to read signal records {}", signals.display()))?;

    let (merged, summary) = union_records(&historical_table, &signal_table, &config.outcome_column)?;
    merged
        .write_path(output)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    info!(
        historical = summary.historical_rows,
        signals = summary.signal_rows,
        skipped = summary.skipped_signals,
        "Merged record sets"
    );

    match format {
        OutputFormat::Json => print_json(&MergeReport {
            output,
            historical_rows: summary.historical_rows,
            signal_rows: summary.signal_rows,
            skipped_signals: summary.skipped_signals,
            total_rows: summary.total(),
        })?,
        OutputFormat::Table => {
            println!("Historical rows:  {}", summary.historical_rows);
            println!("Signal rows:      {}", summary.signal_rows);
            if summary.skipped_signals > 0 {
                print_warning(&format!(
                    "{} signals skipped (unresolved or without a feature snapshot)",
                    summary.skipped_signals
                ));
            }
            print_success(&format!(
                "Wrote {} rows to {}",
                summary.total(),
                output.display()
            ));
        }
    }

    Ok(())
}

/// Prepare, train, evaluate and publish a new bundle version
pub fn train(
    data: &Path,
    models_dir: &Path,
    version: Option<String>,
    config: Option<&Path>,
    format: OutputFormat,
) -> Result<()> {
    let config = load_training_config(config)?;
    let trainer = ModelTrainer::new(config)?;
    let store = BundleStore::new(models_dir);
    let logger = StructuredLogger::new("ensemble-cli");

    let version = match version {
        Some(v) => v,
        None => store
            .current_version()?
            .map_or_else(|| INITIAL_VERSION.to_string(), |current| bump_version(&current)),
    };

    let table = RawTable::from_path(data)
        .with_context(|| format!("Failed to read training data {}", data.display()))?;
    let prepared = trainer.prepare(&table)?;
    if format == OutputFormat::Table {
        print_info(&format!(
            "{} trainable rows, {} features ({} train / {} test)",
            prepared.len(),
            prepared.feature_names.len(),
            prepared.train_size(),
            prepared.test_size()
        ));
        if !prepared.dropped.free_text.is_empty() {
            print_warning(&format!(
                "Dropped free-text columns: {}",
                prepared.dropped.free_text.join(", ")
            ));
        }
    }

    let trained = trainer.train(&prepared, &version)?;
    let metrics = trained.metrics.clone();
    logger.log_training_completed(
        &version,
        metrics.training_size,
        metrics.n_features,
        metrics.v1_auc,
        metrics.v2_accuracy,
        metrics.v3_mae,
    );

    let manifest = store.publish(&trained)?;
    let path = store.version_dir(&manifest.version);
    logger.log_bundle_published(&manifest.version, &path.display().to_string());

    match format {
        OutputFormat::Json => print_json(&manifest)?,
        OutputFormat::Table => {
            print_metrics(&metrics);
            print_success(&format!(
                "Published {} to {}",
                manifest.version.cyan(),
                path.display()
            ));
        }
    }

    Ok(())
}

/// Print held-out evaluation results
pub fn print_metrics(metrics: &TrainingMetrics) {
    println!("{}", "Evaluation".bold());
    println!("{}", "-".repeat(50));
    println!("Win AUC:             {}", format_metric(metrics.v1_auc));
    println!("Win accuracy:        {}", format_metric(Some(metrics.v1_accuracy)));
    println!("Bucket accuracy:     {}", format_metric(Some(metrics.v2_accuracy)));
    println!("MFE R2:              {}", format_metric(Some(metrics.v3_r2)));
    println!("MFE MAE:             {}", format_metric(Some(metrics.v3_mae)));
    println!(
        "Class balance:       {} win / {} loss (scale_pos_weight {:.3})",
        metrics.class_balance.win, metrics.class_balance.loss, metrics.scale_pos_weight
    );
}
