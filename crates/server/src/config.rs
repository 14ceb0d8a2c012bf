//! Server configuration

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;

/// Environment variable naming an optional config file
pub const CONFIG_FILE_ENV: &str = "PREDICTOR_CONFIG_FILE";

/// Prediction server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Instance name attached to structured log events
    #[serde(default = "default_instance_name")]
    pub instance_name: String,

    /// HTTP port for prediction, health and metrics
    #[serde(default = "default_port")]
    pub port: u16,

    /// Bundle store root holding `CURRENT` and `versions/`
    #[serde(default = "default_models_dir")]
    pub models_dir: PathBuf,

    /// Reload automatically when a new bundle is published
    #[serde(default)]
    pub watch_models: bool,

    /// Upper bound on items in one batch request
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
}

fn default_instance_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "prediction-server".to_string())
}

fn default_port() -> u16 {
    8000
}

fn default_models_dir() -> PathBuf {
    PathBuf::from("models")
}

fn default_max_batch_size() -> usize {
    1000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            instance_name: default_instance_name(),
            port: default_port(),
            models_dir: default_models_dir(),
            watch_models: false,
            max_batch_size: default_max_batch_size(),
        }
    }
}

impl ServerConfig {
    /// Load from the optional config file, overlaid by `PREDICTOR_*`
    /// environment variables
    pub fn load() -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
            builder = builder.add_source(config::File::with_name(&path).required(true));
        }
        let config = builder
            .add_source(config::Environment::with_prefix("PREDICTOR").try_parsing(true))
            .build()
            .context("Failed to read server configuration")?;

        config
            .try_deserialize()
            .context("Invalid server configuration")
    }
}
