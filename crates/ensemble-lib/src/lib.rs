//! Trade-outcome ensemble library
//!
//! This crate provides the core functionality for:
//! - Preparing labeled trade records into a model-ready matrix
//! - Training the win classifier, MFE bucket classifier and MFE regressor
//! - Publishing and loading versioned model bundles
//! - Serving combined predictions from the loaded bundle
//! - Health checks and observability

pub mod bundle;
pub mod error;
pub mod forest;
pub mod health;
pub mod models;
pub mod observability;
pub mod predictor;
pub mod schema;
pub mod training;

pub use bundle::{BundleStore, BundleWatcher, ModelBundle, ModelRegistry};
pub use error::{EnsembleError, Result};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
    ServiceHealth, ServiceStatus,
};
pub use models::*;
pub use observability::{ServingMetrics, StructuredLogger};
pub use predictor::{EnsemblePredictor, FeatureVector, FeatureVectorBuilder};
pub use schema::{BucketScheme, FeatureSchema};
pub use training::{ModelTrainer, TrainingConfig};
