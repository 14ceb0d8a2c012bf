//! Process-wide holder of the served bundle
//!
//! Readers clone an `Arc` under a short read lock and score against that
//! snapshot; a reload builds the complete replacement first and swaps the
//! pointer, so no request sees a partially loaded bundle.

use super::{BundleStore, ModelBundle, MODELS_PER_BUNDLE};
use crate::error::{EnsembleError, Result};
use crate::health::{ServiceHealth, ServiceStatus};
use crate::observability::{ServingMetrics, StructuredLogger};
use std::sync::{Arc, RwLock};

pub struct ModelRegistry {
    store: BundleStore,
    current: RwLock<Option<Arc<ModelBundle>>>,
    metrics: ServingMetrics,
    logger: StructuredLogger,
}

impl ModelRegistry {
    /// Create an empty registry; nothing is served until `reload` or `install`
    pub fn new(store: BundleStore, logger: StructuredLogger) -> Self {
        Self {
            store,
            current: RwLock::new(None),
            metrics: ServingMetrics::new(),
            logger,
        }
    }

    pub fn store(&self) -> &BundleStore {
        &self.store
    }

    /// Load the published bundle and swap it in. On failure the previously
    /// served bundle, if any, stays in place.
    pub fn reload(&self) -> Result<Arc<ModelBundle>> {
        match self.store.load_current() {
            Ok(bundle) => Ok(self.install(bundle)),
            Err(e) => {
                let serving = self.snapshot().map(|b| b.version().to_string());
                self.logger.log_bundle_load_failed(&e.to_string(), serving.as_deref());
                self.metrics.record_reload(false);
                Err(e)
            }
        }
    }

    /// Serve an already-validated bundle
    pub fn install(&self, bundle: ModelBundle) -> Arc<ModelBundle> {
        let bundle = Arc::new(bundle);
        let previous = {
            let mut current = self.current.write().unwrap_or_else(|p| p.into_inner());
            current.replace(Arc::clone(&bundle))
        };

        let n_features = bundle.schema().n_features();
        self.metrics.record_reload(true);
        self.metrics.set_bundle(bundle.version(), n_features);
        self.logger
            .log_bundle_loaded(bundle.version(), n_features, previous.as_ref().map(|b| b.version()));
        bundle
    }

    fn snapshot(&self) -> Option<Arc<ModelBundle>> {
        self.current.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Current bundle, or `NotReady` when none has been loaded
    pub fn bundle(&self) -> Result<Arc<ModelBundle>> {
        self.snapshot().ok_or(EnsembleError::NotReady)
    }

    pub fn is_loaded(&self) -> bool {
        self.snapshot().is_some()
    }

    pub fn health(&self) -> ServiceHealth {
        match self.snapshot() {
            Some(bundle) => ServiceHealth {
                status: ServiceStatus::Ok,
                models_loaded: MODELS_PER_BUNDLE,
                n_features: bundle.schema().n_features(),
                version: Some(bundle.version().to_string()),
            },
            None => ServiceHealth::not_ready(),
        }
    }
}
