//! Observability for the prediction service
//!
//! Provides:
//! - Prometheus metrics (prediction latency, served/failed/rejected counts, bundle version)
//! - Structured JSON logging with tracing

use prometheus::{
    register_gauge_vec, register_histogram, register_int_counter, register_int_counter_vec,
    register_int_gauge, GaugeVec, Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{error, info, warn};

/// Histogram buckets for per-request latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.00005, 0.0001, 0.00025, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1,
];

static GLOBAL_METRICS: OnceLock<ServingMetricsInner> = OnceLock::new();

struct ServingMetricsInner {
    prediction_latency_seconds: Histogram,
    predictions_served: IntCounter,
    prediction_errors: IntCounter,
    not_ready_rejections: IntCounter,
    bundle_reloads: IntCounterVec,
    bundle_version_info: GaugeVec,
    feature_count: IntGauge,
}

impl ServingMetricsInner {
    fn new() -> Self {
        Self {
            prediction_latency_seconds: register_histogram!(
                "trade_ensemble_prediction_latency_seconds",
                "Time spent scoring one request against the loaded bundle",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register prediction_latency_seconds"),

            predictions_served: register_int_counter!(
                "trade_ensemble_predictions_served_total",
                "Total number of feature vectors scored"
            )
            .expect("Failed to register predictions_served"),

            prediction_errors: register_int_counter!(
                "trade_ensemble_prediction_errors_total",
                "Total number of prediction requests rejected as malformed or failed"
            )
            .expect("Failed to register prediction_errors"),

            not_ready_rejections: register_int_counter!(
                "trade_ensemble_not_ready_rejections_total",
                "Total number of requests rejected because no bundle was loaded"
            )
            .expect("Failed to register not_ready_rejections"),

            bundle_reloads: register_int_counter_vec!(
                "trade_ensemble_bundle_reloads_total",
                "Bundle load attempts by outcome",
                &["outcome"]
            )
            .expect("Failed to register bundle_reloads"),

            bundle_version_info: register_gauge_vec!(
                "trade_ensemble_bundle_version_info",
                "Version of the currently served model bundle",
                &["version"]
            )
            .expect("Failed to register bundle_version_info"),

            feature_count: register_int_gauge!(
                "trade_ensemble_feature_count",
                "Number of features in the loaded schema"
            )
            .expect("Failed to register feature_count"),
        }
    }
}

/// Handle to the process-wide serving metrics
///
/// Clones share the same underlying Prometheus collectors.
#[derive(Clone)]
pub struct ServingMetrics {
    _private: (),
}

impl Default for ServingMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ServingMetrics {
    /// Create a handle, registering the collectors on first use
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ServingMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ServingMetricsInner {
        GLOBAL_METRICS.get_or_init(ServingMetricsInner::new)
    }

    pub fn observe_prediction_latency(&self, duration_secs: f64) {
        self.inner().prediction_latency_seconds.observe(duration_secs);
    }

    pub fn inc_predictions_served(&self, count: u64) {
        self.inner().predictions_served.inc_by(count);
    }

    pub fn inc_prediction_errors(&self) {
        self.inner().prediction_errors.inc();
    }

    pub fn inc_not_ready(&self) {
        self.inner().not_ready_rejections.inc();
    }

    pub fn record_reload(&self, success: bool) {
        let outcome = if success { "success" } else { "failure" };
        self.inner().bundle_reloads.with_label_values(&[outcome]).inc();
    }

    /// Point the version gauge at the newly served bundle
    pub fn set_bundle(&self, version: &str, n_features: usize) {
        self.inner().bundle_version_info.reset();
        self.inner()
            .bundle_version_info
            .with_label_values(&[version])
            .set(1.0);
        self.inner().feature_count.set(n_features as i64);
    }
}

/// Structured logger for service events
///
/// Emits one named `event` field per call so log pipelines can filter on it.
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    pub fn log_startup(&self, service_version: &str, port: u16, models_dir: &str) {
        info!(
            event = "server_started",
            instance = %self.instance,
            service_version = %service_version,
            port = port,
            models_dir = %models_dir,
            "Prediction server started"
        );
    }

    pub fn log_bundle_loaded(&self, version: &str, n_features: usize, previous: Option<&str>) {
        info!(
            event = "bundle_loaded",
            instance = %self.instance,
            version = %version,
            n_features = n_features,
            previous_version = ?previous,
            "Model bundle loaded"
        );
    }

    pub fn log_bundle_load_failed(&self, error: &str, serving: Option<&str>) {
        match serving {
            Some(version) => warn!(
                event = "bundle_load_failed",
                instance = %self.instance,
                error = %error,
                serving_version = %version,
                "Bundle load failed, keeping previous bundle"
            ),
            None => error!(
                event = "bundle_load_failed",
                instance = %self.instance,
                error = %error,
                "Bundle load failed, no bundle is being served"
            ),
        }
    }

    pub fn log_prediction(&self, version: &str, items: usize, elapsed_us: u128) {
        info!(
            event = "prediction_served",
            instance = %self.instance,
            version = %version,
            items = items,
            elapsed_us = elapsed_us as u64,
            "Served prediction"
        );
    }

    pub fn log_training_completed(
        &self,
        version: &str,
        training_size: usize,
        n_features: usize,
        v1_auc: Option<f64>,
        v2_accuracy: f64,
        v3_mae: f64,
    ) {
        info!(
            event = "training_completed",
            instance = %self.instance,
            version = %version,
            training_size = training_size,
            n_features = n_features,
            v1_auc = ?v1_auc,
            v2_accuracy = v2_accuracy,
            v3_mae = v3_mae,
            "Training run completed"
        );
    }

    pub fn log_bundle_published(&self, version: &str, path: &str) {
        info!(
            event = "bundle_published",
            instance = %self.instance,
            version = %version,
            path = %path,
            "Bundle published"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "server_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Prediction server shutting down"
        );
    }
}
