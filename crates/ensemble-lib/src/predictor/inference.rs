//! Ensemble inference over a loaded bundle
//!
//! Each call scores one feature vector with all three models of a single
//! bundle. Registry-facing calls take one bundle snapshot up front, so a
//! batch never straddles a reload.

use super::features::{FeatureVector, FeatureVectorBuilder};
use super::output::OutputFormatter;
use crate::bundle::{ModelBundle, ModelRegistry};
use crate::error::{EnsembleError, Result};
use crate::models::{NamedValues, PredictionResult};
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, warn};

/// Per-vector latency above which a warning is logged
const SLOW_INFERENCE_MS: u128 = 5;

/// Largest batch accepted unless configured otherwise
pub const DEFAULT_MAX_BATCH_SIZE: usize = 1000;

/// Scores feature vectors against a bundle
#[derive(Debug, Clone)]
pub struct EnsemblePredictor {
    max_batch_size: usize,
}

/// Batch results and the bundle version that produced them
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchPrediction {
    pub version: String,
    pub predictions: Vec<PredictionResult>,
}

impl Default for EnsemblePredictor {
    fn default() -> Self {
        Self::new()
    }
}

impl EnsemblePredictor {
    pub fn new() -> Self {
        Self::with_max_batch_size(DEFAULT_MAX_BATCH_SIZE)
    }

    pub fn with_max_batch_size(max_batch_size: usize) -> Self {
        Self { max_batch_size }
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    fn check_width(vector: &FeatureVector, bundle: &ModelBundle) -> Result<()> {
        let expected = bundle.schema().n_features();
        if vector.len() != expected {
            return Err(EnsembleError::MalformedInput(format!(
                "feature vector has {} values, bundle {} expects {}",
                vector.len(),
                bundle.version(),
                expected
            )));
        }
        Ok(())
    }

    /// Score one vector. The MFE estimate is the raw regression output.
    pub fn predict(&self, vector: &FeatureVector, bundle: &ModelBundle) -> Result<PredictionResult> {
        Self::check_width(vector, bundle)?;
        let start = Instant::now();

        let row = vector.view();
        let binary = bundle.win_model().predict_proba(row)?;
        let buckets = bundle.bucket_model().predict_proba(row)?;
        let mfe = bundle.mfe_model().predict(row)?;
        let result = OutputFormatter::new(bundle.schema().bucket_labels()).format(&binary, &buckets, mfe);

        let elapsed = start.elapsed();
        if elapsed.as_millis() > SLOW_INFERENCE_MS {
            warn!(elapsed_ms = elapsed.as_millis() as u64, "Inference exceeded {}ms target", SLOW_INFERENCE_MS);
        } else {
            debug!(elapsed_us = elapsed.as_micros() as u64, missing = vector.missing_count(), "Inference completed");
        }

        Ok(result)
    }

    /// Score vectors in order. Every width is checked before any scoring;
    /// the first bad item fails the whole batch.
    pub fn predict_many(&self, vectors: &[FeatureVector], bundle: &ModelBundle) -> Result<Vec<PredictionResult>> {
        for (i, vector) in vectors.iter().enumerate() {
            Self::check_width(vector, bundle).map_err(|e| match e {
                EnsembleError::MalformedInput(detail) => {
                    EnsembleError::MalformedInput(format!("item {}: {}", i, detail))
                }
                other => other,
            })?;
        }
        vectors.iter().map(|v| self.predict(v, bundle)).collect()
    }

    /// Align named values to the served schema and score them. Returns the
    /// version of the bundle that produced the result.
    pub fn predict_named(&self, registry: &ModelRegistry, values: &NamedValues) -> Result<(String, PredictionResult)> {
        let bundle = registry.bundle()?;
        let vector = FeatureVectorBuilder::new(bundle.schema()).build(values);
        let result = self.predict(&vector, &bundle)?;
        Ok((bundle.version().to_string(), result))
    }

    /// Batch form of `predict_named`, scored against one bundle snapshot.
    /// Batches above the size limit are rejected before any scoring.
    pub fn predict_batch(&self, registry: &ModelRegistry, items: &[NamedValues]) -> Result<BatchPrediction> {
        if items.len() > self.max_batch_size {
            return Err(EnsembleError::MalformedInput(format!(
                "batch of {} items exceeds the limit of {}",
                items.len(),
                self.max_batch_size
            )));
        }
        let bundle = registry.bundle()?;
        let builder = FeatureVectorBuilder::new(bundle.schema());
        let vectors: Vec<FeatureVector> = items.iter().map(|values| builder.build(values)).collect();
        let predictions = self.predict_many(&vectors, &bundle)?;
        Ok(BatchPrediction {
            version: bundle.version().to_string(),
            predictions,
        })
    }
}
