//! HTTP API: predictions, bundle reload, health and Prometheus metrics

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use ensemble_lib::{
    bundle::BundleWatcher,
    error::EnsembleError,
    health::{ComponentStatus, HealthRegistry},
    observability::{ServingMetrics, StructuredLogger},
    predictor::{parse_feature_batch, parse_feature_map, EnsemblePredictor},
    ModelRegistry,
};
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

/// Response header carrying the bundle version that produced a prediction
pub const MODEL_VERSION_HEADER: &str = "x-model-version";

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ModelRegistry>,
    pub predictor: Arc<EnsemblePredictor>,
    pub health_registry: HealthRegistry,
    pub metrics: ServingMetrics,
    pub logger: StructuredLogger,
}

impl AppState {
    pub fn new(
        registry: Arc<ModelRegistry>,
        health_registry: HealthRegistry,
        logger: StructuredLogger,
        max_batch_size: usize,
    ) -> Self {
        Self {
            registry,
            predictor: Arc::new(EnsemblePredictor::with_max_batch_size(max_batch_size)),
            health_registry,
            metrics: ServingMetrics::new(),
            logger,
        }
    }
}

/// Library error rendered as an HTTP response
pub struct ApiError(EnsembleError);

impl From<EnsembleError> for ApiError {
    fn from(e: EnsembleError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = match &self.0 {
            EnsembleError::NotReady => (StatusCode::SERVICE_UNAVAILABLE, "not_ready"),
            EnsembleError::MalformedInput(_) => (StatusCode::UNPROCESSABLE_ENTITY, "malformed_input"),
            EnsembleError::ArtifactMismatch(_) => (StatusCode::INTERNAL_SERVER_ERROR, "artifact_mismatch"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %self.0, "Request failed");
        }
        (status, Json(json!({"error": kind, "detail": self.0.to_string()}))).into_response()
    }
}

/// Reject early when nothing is loaded, before looking at the payload
fn require_ready(state: &AppState) -> Result<(), ApiError> {
    if state.registry.is_loaded() {
        Ok(())
    } else {
        state.metrics.inc_not_ready();
        Err(EnsembleError::NotReady.into())
    }
}

fn body_field<'a>(payload: &'a Value, field: &str) -> Result<&'a Value, ApiError> {
    payload.get(field).ok_or_else(|| {
        EnsembleError::MalformedInput(format!("request body must contain '{}'", field)).into()
    })
}

fn payload(body: Result<Json<Value>, JsonRejection>) -> Result<Value, ApiError> {
    body.map(|Json(v)| v)
        .map_err(|e| EnsembleError::MalformedInput(e.body_text()).into())
}

fn with_version<T: Serialize>(version: &str, body: T) -> Response {
    let mut response = Json(body).into_response();
    if let Ok(value) = HeaderValue::from_str(version) {
        response.headers_mut().insert(MODEL_VERSION_HEADER, value);
    }
    response
}

/// Score one feature map: `{"features": {...}}`
async fn predict(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    require_ready(&state)?;
    let start = Instant::now();

    let result = payload(body).and_then(|p| {
        let values = parse_feature_map(body_field(&p, "features")?)?;
        Ok(state.predictor.predict_named(&state.registry, &values)?)
    });
    let (version, prediction) = result.map_err(|e| {
        state.metrics.inc_prediction_errors();
        e
    })?;

    let elapsed = start.elapsed();
    state.metrics.observe_prediction_latency(elapsed.as_secs_f64());
    state.metrics.inc_predictions_served(1);
    state.logger.log_prediction(&version, 1, elapsed.as_micros());
    Ok(with_version(&version, prediction))
}

/// Score a batch: `{"items": [{...}, ...]}`. One malformed item rejects the
/// whole batch; results keep input order.
async fn predict_batch(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    require_ready(&state)?;
    let start = Instant::now();

    let result = payload(body).and_then(|p| {
        let items = body_field(&p, "items")?.as_array().ok_or_else(|| {
            ApiError::from(EnsembleError::MalformedInput("'items' must be an array".to_string()))
        })?;
        let parsed = parse_feature_batch(items)?;
        Ok(state.predictor.predict_batch(&state.registry, &parsed)?)
    });
    let response = result.map_err(|e| {
        state.metrics.inc_prediction_errors();
        e
    })?;

    let elapsed = start.elapsed();
    let count = response.predictions.len();
    state.metrics.observe_prediction_latency(elapsed.as_secs_f64());
    state.metrics.inc_predictions_served(count as u64);
    state.logger.log_prediction(&response.version, count, elapsed.as_micros());
    let version = response.version.clone();
    Ok(with_version(&version, response))
}

/// Reload the published bundle; the previous one keeps serving on failure
async fn reload(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let bundle = BundleWatcher::reload(&state.registry, &state.health_registry).await?;
    info!(version = %bundle.version(), "Bundle reloaded on request");
    Ok(Json(state.registry.health()).into_response())
}

/// Bundle summary; always 200 so callers can read `status`
async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.registry.health())
}

/// Component health - returns 200 if healthy or degraded, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness - 200 once a bundle is serving, 503 otherwise
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready && state.registry.is_loaded() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/predict", post(predict))
        .route("/predict/batch", post(predict_batch))
        .route("/admin/reload", post(reload))
        .route("/health", get(health))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Start the API server, stopping when `shutdown` resolves
pub async fn serve(
    port: u16,
    state: Arc<AppState>,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
