//! Commands that call a running prediction server

use anyhow::{Context, Result};
use colored::Colorize;
use ensemble_lib::PredictionResult;
use serde_json::Value;
use std::io::Read;
use std::path::Path;
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{
    color_probability, color_status, format_probability, print_json, print_rows, print_success,
    OutputFormat,
};

/// Row for the batch predictions table
#[derive(Tabled)]
struct PredictionRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Win")]
    win_probability: String,
    #[tabled(rename = "Bucket")]
    bucket: String,
    #[tabled(rename = "MFE est.")]
    mfe_estimate: String,
}

/// Read a JSON document from a file, or stdin when the path is `-`
fn read_json(path: &Path) -> Result<Value> {
    let content = if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read stdin")?;
        buf
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?
    };
    serde_json::from_str(&content).context("Input is not valid JSON")
}

/// Score a feature map (JSON object) or a batch (JSON array of objects)
pub async fn predict(client: &ApiClient, input: &Path, format: OutputFormat) -> Result<()> {
    match read_json(input)? {
        Value::Array(items) => {
            let batch = client.predict_batch(items).await?;
            match format {
                OutputFormat::Json => print_json(&batch)?,
                OutputFormat::Table => {
                    println!("Model version: {}", batch.version.cyan());
                    let rows: Vec<PredictionRow> = batch
                        .predictions
                        .iter()
                        .enumerate()
                        .map(|(index, p)| PredictionRow {
                            index,
                            win_probability: color_probability(p.win_probability),
                            bucket: p.predicted_bucket.clone(),
                            mfe_estimate: format!("{:.2}R", p.mfe_estimate),
                        })
                        .collect();
                    print_rows(rows);
                }
            }
        }
        features => {
            let result = client.predict(features).await?;
            match format {
                OutputFormat::Json => print_json(&result)?,
                OutputFormat::Table => print_prediction(&result),
            }
        }
    }

    Ok(())
}

fn print_prediction(result: &PredictionResult) {
    println!("{}", "Prediction".bold());
    println!("{}", "=".repeat(40));
    println!("Win probability:  {}", color_probability(result.win_probability));
    println!("Predicted bucket: {}", result.predicted_bucket.cyan());
    println!("MFE estimate:     {:.2}R", result.mfe_estimate);
    println!();
    for (label, p) in &result.bucket_probabilities {
        let marker = if *label == result.predicted_bucket { "*" } else { " " };
        println!("  {} {:<10} {:>7}", marker, label, format_probability(*p));
    }
}

/// Show server health
pub async fn health(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let health = client.health().await?;

    match format {
        OutputFormat::Json => print_json(&health)?,
        OutputFormat::Table => {
            println!("Status:    {}", color_status(&health.status));
            println!("Version:   {}", health.version.as_deref().unwrap_or("-"));
            println!("Models:    {}", health.models_loaded);
            println!("Features:  {}", health.n_features);
        }
    }

    Ok(())
}

/// Ask the server to load the currently published bundle
pub async fn reload(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let health = client.reload().await?;

    match format {
        OutputFormat::Json => print_json(&health)?,
        OutputFormat::Table => print_success(&format!(
            "Server now serving {}",
            health.version.as_deref().unwrap_or("-").cyan()
        )),
    }

    Ok(())
}
