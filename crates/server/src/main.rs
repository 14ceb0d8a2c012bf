//! Prediction server - serves win probability, MFE bucket and MFE estimate
//! from the currently published model bundle.

use anyhow::Result;
use ensemble_lib::{
    bundle::{BundleStore, BundleWatcher, ModelRegistry},
    error::EnsembleError,
    health::{components, HealthRegistry},
    observability::StructuredLogger,
};
use prediction_server::{api, config::ServerConfig};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting prediction-server");

    let config = ServerConfig::load()?;
    info!(instance = %config.instance_name, models_dir = %config.models_dir.display(), "Server configured");

    let health_registry = HealthRegistry::new();
    health_registry.register(components::BUNDLE).await;
    if config.watch_models {
        health_registry.register(components::WATCHER).await;
    }

    let logger = StructuredLogger::new(&config.instance_name);
    logger.log_startup(SERVER_VERSION, config.port, &config.models_dir.display().to_string());

    let registry = Arc::new(ModelRegistry::new(
        BundleStore::new(&config.models_dir),
        logger.clone(),
    ));

    // A missing bundle is a normal cold start; a broken one is fatal
    match BundleWatcher::reload(&registry, &health_registry).await {
        Ok(bundle) => info!(version = %bundle.version(), "Model bundle loaded"),
        Err(EnsembleError::NotReady) => {
            warn!("No model bundle published yet, serving as not ready")
        }
        Err(e) => {
            logger.log_shutdown("bundle failed to load at startup");
            return Err(e.into());
        }
    }

    let _watcher = if config.watch_models {
        let handle = BundleWatcher::new(Arc::clone(&registry), health_registry.clone())
            .start()
            .await?;
        Some(handle)
    } else {
        None
    };

    let app_state = Arc::new(api::AppState::new(
        registry,
        health_registry,
        logger.clone(),
        config.max_batch_size,
    ));

    api::serve(config.port, app_state, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for shutdown signal");
        }
    })
    .await?;

    logger.log_shutdown("SIGINT received");
    info!("Shutting down");

    Ok(())
}
