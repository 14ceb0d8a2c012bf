//! Model bundle: the matched triple of models plus their shared schema
//!
//! A bundle is built once from persisted artifacts and never mutated. The
//! registry replaces whole bundles; there is no way to swap one model while
//! keeping the others.

mod artifacts;
mod registry;
mod watcher;

pub use artifacts::{
    compute_checksum, BucketModelMeta, BundleStore, Manifest, WinModelMeta, BUCKET_META_FILE,
    BUCKET_MODEL_FILE, CURRENT_FILE, MANIFEST_FILE, MFE_MODEL_FILE, VERSIONS_DIR, WIN_META_FILE,
    WIN_MODEL_FILE,
};
pub use registry::ModelRegistry;
pub use watcher::{BundleWatcher, WatcherHandle};

use crate::error::{EnsembleError, Result};
use crate::forest::{Classifier, Regressor};
use crate::models::TrainingMetrics;
use crate::schema::FeatureSchema;

/// Number of models in every bundle
pub const MODELS_PER_BUNDLE: usize = 3;

/// Loaded, validated set of models sharing one feature schema
pub struct ModelBundle {
    schema: FeatureSchema,
    win_model: Box<dyn Classifier>,
    bucket_model: Box<dyn Classifier>,
    mfe_model: Box<dyn Regressor>,
    metrics: Option<TrainingMetrics>,
}

impl std::fmt::Debug for ModelBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelBundle")
            .field("version", &self.schema.version)
            .field("n_features", &self.schema.n_features())
            .field("bucket_labels", &self.schema.buckets.labels)
            .finish()
    }
}

impl ModelBundle {
    /// Assemble a bundle, rejecting models whose shapes disagree with the schema
    pub fn new(
        schema: FeatureSchema,
        win_model: Box<dyn Classifier>,
        bucket_model: Box<dyn Classifier>,
        mfe_model: Box<dyn Regressor>,
        metrics: Option<TrainingMetrics>,
    ) -> Result<Self> {
        schema.validate()?;
        let n_features = schema.n_features();

        let widths = [
            ("win classifier", win_model.num_features()),
            ("bucket classifier", bucket_model.num_features()),
            ("mfe regressor", mfe_model.num_features()),
        ];
        for (name, width) in widths {
            if width != n_features {
                return Err(EnsembleError::ArtifactMismatch(format!(
                    "{} expects {} features but schema {} lists {}",
                    name, width, schema.version, n_features
                )));
            }
        }

        if bucket_model.num_classes() != schema.buckets.len() {
            return Err(EnsembleError::ArtifactMismatch(format!(
                "bucket classifier has {} classes but schema has {} bucket labels",
                bucket_model.num_classes(),
                schema.buckets.len()
            )));
        }

        Ok(Self {
            schema,
            win_model,
            bucket_model,
            mfe_model,
            metrics,
        })
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn version(&self) -> &str {
        &self.schema.version
    }

    pub fn win_model(&self) -> &dyn Classifier {
        self.win_model.as_ref()
    }

    pub fn bucket_model(&self) -> &dyn Classifier {
        self.bucket_model.as_ref()
    }

    pub fn mfe_model(&self) -> &dyn Regressor {
        self.mfe_model.as_ref()
    }

    pub fn metrics(&self) -> Option<&TrainingMetrics> {
        self.metrics.as_ref()
    }
}
