//! Integration tests for the prediction API endpoints

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use ensemble_lib::{
    bundle::{BundleStore, ModelRegistry},
    forest::ForestParams,
    health::{components, HealthRegistry},
    observability::StructuredLogger,
    training::{RawTable, RawValue},
    ModelTrainer, TrainingConfig,
};
use prediction_server::api::{create_router, AppState, MODEL_VERSION_HEADER};
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

fn fast_params() -> ForestParams {
    ForestParams {
        n_trees: 10,
        max_depth: 6,
        ..Default::default()
    }
}

/// 50 labeled rows where a high rsi tends to win
fn training_table() -> RawTable {
    let columns = ["id", "rsi", "atr", "trend_state", "outcome", "max_favorable_excursion"];
    let mut table = RawTable::new(columns.iter().map(|c| c.to_string()).collect());
    for i in 0..50 {
        let rsi = (i * 2) as f64;
        let win = i % 5 != 0 && rsi > 40.0;
        table
            .push_row(vec![
                RawValue::Number(i as f64),
                RawValue::Number(rsi),
                RawValue::Number(0.001 * i as f64),
                RawValue::Text(if i % 2 == 0 { "up" } else { "down" }.to_string()),
                RawValue::Text(if win { "win" } else { "loss" }.to_string()),
                RawValue::Number(rsi / 40.0),
            ])
            .unwrap();
    }
    table
}

fn publish(store: &BundleStore, version: &str) {
    let config = TrainingConfig {
        win_params: fast_params(),
        bucket_params: fast_params(),
        mfe_params: fast_params(),
        ..Default::default()
    };
    ModelTrainer::new(config)
        .unwrap()
        .train_and_publish(&training_table(), store, Some(version))
        .unwrap();
}

struct TestApp {
    _dir: TempDir,
    router: Router,
    state: Arc<AppState>,
}

async fn setup(published: Option<&str>, max_batch_size: usize) -> TestApp {
    let dir = TempDir::new().unwrap();
    let store = BundleStore::new(dir.path());
    if let Some(version) = published {
        publish(&store, version);
    }

    let health_registry = HealthRegistry::new();
    health_registry.register(components::BUNDLE).await;
    let registry = Arc::new(ModelRegistry::new(store, StructuredLogger::new("test")));
    if published.is_some() {
        registry.reload().unwrap();
        health_registry.set_ready(true).await;
    }

    let state = Arc::new(AppState::new(
        registry,
        health_registry,
        StructuredLogger::new("test"),
        max_batch_size,
    ));
    TestApp {
        _dir: dir,
        router: create_router(Arc::clone(&state)),
        state,
    }
}

async fn post_json(router: &Router, uri: &str, body: &str) -> (StatusCode, Option<String>, Value) {
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let version = response
        .headers()
        .get(MODEL_VERSION_HEADER)
        .map(|v| v.to_str().unwrap().to_string());
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, version, value)
}

async fn get(router: &Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = router
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, bytes.to_vec())
}

#[tokio::test]
async fn test_predict_returns_all_three_outputs() {
    let app = setup(Some("v1.0"), 100).await;

    let (status, version, body) =
        post_json(&app.router, "/predict", r#"{"features": {"rsi": 80.0, "atr": 0.02}}"#).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(version.as_deref(), Some("v1.0"));
    let p = body["win_probability"].as_f64().unwrap();
    assert!((0.0..=1.0).contains(&p));
    let buckets = body["bucket_probabilities"].as_object().unwrap();
    assert_eq!(buckets.len(), 5);
    let total: f64 = buckets.values().map(|v| v.as_f64().unwrap()).sum();
    assert!((total - 1.0).abs() < 1e-3);
    assert!(buckets.contains_key(body["predicted_bucket"].as_str().unwrap()));
    assert!(body["mfe_estimate"].is_number());
}

#[tokio::test]
async fn test_unknown_and_null_features_are_tolerated() {
    let app = setup(Some("v1.0"), 100).await;

    let (status, _, _) = post_json(
        &app.router,
        "/predict",
        r#"{"features": {"rsi": null, "not_a_feature": 3.0}}"#,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, _) = post_json(&app.router, "/predict", r#"{"features": {}}"#).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_malformed_features_are_rejected() {
    let app = setup(Some("v1.0"), 100).await;

    let (status, _, body) =
        post_json(&app.router, "/predict", r#"{"features": {"rsi": "high"}}"#).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "malformed_input");

    let (status, _, _) = post_json(&app.router, "/predict", r#"{"features": [1, 2]}"#).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _, _) = post_json(&app.router, "/predict", r#"{"rsi": 1.0}"#).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _, _) = post_json(&app.router, "/predict", "not json").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_not_ready_without_bundle() {
    let app = setup(None, 100).await;

    let (status, _, body) =
        post_json(&app.router, "/predict", r#"{"features": {"rsi": 80.0}}"#).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "not_ready");

    let (status, _, _) = post_json(&app.router, "/predict/batch", r#"{"items": []}"#).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (status, bytes) = get(&app.router, "/health").await;
    assert_eq!(status, StatusCode::OK);
    let health: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(health["status"], "not_ready");
    assert_eq!(health["models_loaded"], 0);

    let (status, _) = get(&app.router, "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_batch_preserves_order_and_matches_single() {
    let app = setup(Some("v1.0"), 100).await;

    let (_, _, low) = post_json(&app.router, "/predict", r#"{"features": {"rsi": 4.0}}"#).await;
    let (_, _, high) = post_json(&app.router, "/predict", r#"{"features": {"rsi": 96.0}}"#).await;

    let (status, _, body) = post_json(
        &app.router,
        "/predict/batch",
        r#"{"items": [{"rsi": 4.0}, {"rsi": 96.0}]}"#,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["version"], "v1.0");
    let predictions = body["predictions"].as_array().unwrap();
    assert_eq!(predictions.len(), 2);
    assert_eq!(predictions[0], low);
    assert_eq!(predictions[1], high);
}

#[tokio::test]
async fn test_batch_fails_fast_with_item_index() {
    let app = setup(Some("v1.0"), 100).await;

    let (status, _, body) = post_json(
        &app.router,
        "/predict/batch",
        r#"{"items": [{"rsi": 4.0}, {"rsi": "x"}]}"#,
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["detail"].as_str().unwrap().contains("item 1"));
}

#[tokio::test]
async fn test_batch_size_limit() {
    let app = setup(Some("v1.0"), 2).await;

    let (status, _, body) = post_json(
        &app.router,
        "/predict/batch",
        r#"{"items": [{"rsi": 1.0}, {"rsi": 2.0}, {"rsi": 3.0}]}"#,
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["detail"].as_str().unwrap().contains("limit of 2"));
}

#[tokio::test]
async fn test_health_reports_loaded_bundle() {
    let app = setup(Some("v1.3"), 100).await;

    let (status, bytes) = get(&app.router, "/health").await;
    assert_eq!(status, StatusCode::OK);
    let health: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["models_loaded"], 3);
    assert_eq!(health["version"], "v1.3");
    assert_eq!(
        health["n_features"].as_u64().unwrap() as usize,
        app.state.registry.bundle().unwrap().schema().n_features()
    );

    let (status, _) = get(&app.router, "/readyz").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_admin_reload_switches_version() {
    let app = setup(Some("v1.0"), 100).await;
    publish(app.state.registry.store(), "v1.1");

    let (status, _, body) = post_json(&app.router, "/admin/reload", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["version"], "v1.1");

    let (_, version, _) =
        post_json(&app.router, "/predict", r#"{"features": {"rsi": 50.0}}"#).await;
    assert_eq!(version.as_deref(), Some("v1.1"));
}

#[tokio::test]
async fn test_admin_reload_without_bundle_is_not_ready() {
    let app = setup(None, 100).await;

    let (status, _, body) = post_json(&app.router, "/admin/reload", "").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "not_ready");
}

#[tokio::test]
async fn test_metrics_endpoint_exposes_prediction_counters() {
    let app = setup(Some("v1.0"), 100).await;
    post_json(&app.router, "/predict", r#"{"features": {"rsi": 10.0}}"#).await;

    let (status, bytes) = get(&app.router, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(bytes).unwrap();
    assert!(text.contains("trade_ensemble_predictions_served_total"));
}
