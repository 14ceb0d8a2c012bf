//! Trade Ensemble CLI
//!
//! Merges exported record sets, trains and publishes model bundles, inspects
//! published bundles and queries a running prediction server.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{bundle, data, server};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Trade Ensemble CLI
#[derive(Parser)]
#[command(name = "ensemble")]
#[command(author, version, about = "CLI for the Trade Ensemble predictor", long_about = None)]
pub struct Cli {
    /// Prediction server URL (can also be set via ENSEMBLE_API_URL env var)
    #[arg(long, env = "ENSEMBLE_API_URL")]
    pub api_url: Option<String>,

    /// Bundle store root (can also be set via ENSEMBLE_MODELS_DIR env var)
    #[arg(long, env = "ENSEMBLE_MODELS_DIR")]
    pub models_dir: Option<PathBuf>,

    /// Output format
    #[arg(long, short)]
    pub format: Option<output::OutputFormat>,

    /// Enable verbose output
    #[arg(long, short)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Union historical outcomes with resolved live signals into one CSV
    Merge {
        /// Historical outcome records (CSV)
        #[arg(long)]
        historical: PathBuf,

        /// Resolved live signals with a feature_vector column (CSV)
        #[arg(long)]
        signals: PathBuf,

        /// Output CSV path
        #[arg(long, short)]
        output: PathBuf,

        /// Training config (JSON) naming the outcome column
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Train the three models and publish them as a new bundle version
    Train {
        /// Labeled training records (CSV)
        #[arg(long)]
        data: PathBuf,

        /// Version label (defaults to the next version after CURRENT)
        #[arg(long)]
        version: Option<String>,

        /// Training config (JSON)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Show schema, bucket scheme and metrics of a published bundle
    Inspect {
        /// Version to inspect (defaults to CURRENT)
        #[arg(long)]
        version: Option<String>,
    },

    /// List published bundle versions
    Versions,

    /// Score a feature map or a batch against the running server
    Predict {
        /// JSON file holding an object (single) or array (batch); `-` reads stdin
        #[arg(long)]
        features: PathBuf,
    },

    /// Show prediction server health
    Health,

    /// Ask the server to reload the published bundle
    Reload,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .compact()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let config = config::Config::load()?;
    let format = cli
        .format
        .or_else(|| config.default_format.as_deref().and_then(output::OutputFormat::from_name))
        .unwrap_or_default();
    let models_dir = config.models_dir(cli.models_dir);

    match cli.command {
        Commands::Merge {
            historical,
            signals,
            output,
            config,
        } => {
            data::merge(&historical, &signals, &output, config.as_deref(), format)?;
        }
        Commands::Train {
            data: data_path,
            version,
            config,
        } => {
            data::train(&data_path, &models_dir, version, config.as_deref(), format)?;
        }
        Commands::Inspect { version } => {
            bundle::inspect(&models_dir, version, format)?;
        }
        Commands::Versions => {
            bundle::versions(&models_dir, format)?;
        }
        Commands::Predict { features } => {
            let client = client::ApiClient::new(&config.api_url(cli.api_url))?;
            server::predict(&client, &features, format).await?;
        }
        Commands::Health => {
            let client = client::ApiClient::new(&config.api_url(cli.api_url))?;
            server::health(&client, format).await?;
        }
        Commands::Reload => {
            let client = client::ApiClient::new(&config.api_url(cli.api_url))?;
            server::reload(&client, format).await?;
        }
    }

    Ok(())
}
