//! Commands that read the local bundle store

use anyhow::{Context, Result};
use colored::Colorize;
use ensemble_lib::bundle::{BundleStore, Manifest};
use serde::Serialize;
use std::path::Path;
use tabled::Tabled;
use tracing::warn;

use super::data::print_metrics;
use crate::output::{color_status, format_metric, print_json, print_rows, OutputFormat};

/// Row for the bucket scheme table
#[derive(Tabled)]
struct BucketRow {
    #[tabled(rename = "Class")]
    class: usize,
    #[tabled(rename = "Label")]
    label: String,
    #[tabled(rename = "MFE range")]
    range: String,
}

/// Row for the versions table
#[derive(Tabled, Serialize)]
struct VersionRow {
    #[tabled(rename = "Version")]
    version: String,
    #[tabled(rename = "Trained at")]
    trained_at: String,
    #[tabled(rename = "Rows")]
    training_size: usize,
    #[tabled(rename = "Win AUC")]
    v1_auc: String,
    #[tabled(rename = "Status")]
    status: String,
}

#[derive(Serialize)]
struct InspectReport<'a> {
    version: &'a str,
    feature_names: &'a [String],
    bucket_edges: &'a [f64],
    bucket_labels: &'a [String],
    manifest: &'a Manifest,
}

/// Show the schema, bucket scheme and metrics of a published version
pub fn inspect(models_dir: &Path, version: Option<String>, format: OutputFormat) -> Result<()> {
    let store = BundleStore::new(models_dir);
    let version = match version {
        Some(v) => v,
        None => store
            .current_version()?
            .context("No bundle has been published yet")?,
    };

    let bundle = store.load_version(&version)?;
    let manifest = store.read_manifest(&version)?;
    let schema = bundle.schema();

    match format {
        OutputFormat::Json => print_json(&InspectReport {
            version: &version,
            feature_names: &schema.feature_names,
            bucket_edges: &schema.buckets.edges,
            bucket_labels: &schema.buckets.labels,
            manifest: &manifest,
        })?,
        OutputFormat::Table => {
            println!("{}", "Model Bundle".bold());
            println!("{}", "=".repeat(50));
            println!("Version:             {}", version.cyan());
            println!(
                "Trained at:          {}",
                manifest.trained_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
            println!("Training rows:       {}", manifest.metrics.training_size);
            println!("Features:            {}", schema.n_features());
            println!();

            let edges = &schema.buckets.edges;
            let rows: Vec<BucketRow> = schema
                .buckets
                .labels
                .iter()
                .enumerate()
                .map(|(i, label)| BucketRow {
                    class: i,
                    label: label.clone(),
                    range: match edges.get(i + 1) {
                        Some(upper) => format!("[{}, {})", edges[i], upper),
                        None => format!("[{}, +inf)", edges[i]),
                    },
                })
                .collect();
            print_rows(rows);
            println!();

            print_metrics(&manifest.metrics);
            println!();
            println!("{}", "Features (in model order)".bold());
            for (i, name) in schema.feature_names.iter().enumerate() {
                println!("  {:>3}  {}", i, name);
            }
        }
    }

    Ok(())
}

/// List published versions, marking the one `CURRENT` points at
pub fn versions(models_dir: &Path, format: OutputFormat) -> Result<()> {
    let store = BundleStore::new(models_dir);
    let current = store.current_version()?;

    let mut rows = Vec::new();
    for version in store.list_versions()? {
        let status = if current.as_deref() == Some(version.as_str()) { "current" } else { "" };
        let row = match store.read_manifest(&version) {
            Ok(manifest) => VersionRow {
                trained_at: manifest.trained_at.format("%Y-%m-%d %H:%M").to_string(),
                training_size: manifest.metrics.training_size,
                v1_auc: format_metric(manifest.metrics.v1_auc),
                status: status.to_string(),
                version,
            },
            Err(e) => {
                warn!(version = %version, error = %e, "Skipping version with unreadable manifest");
                continue;
            }
        };
        rows.push(row);
    }

    match format {
        OutputFormat::Json => print_json(&rows)?,
        OutputFormat::Table => {
            let rows: Vec<VersionRow> = rows
                .into_iter()
                .map(|r| VersionRow {
                    status: color_status(&r.status),
                    ..r
                })
                .collect();
            print_rows(rows);
        }
    }

    Ok(())
}
