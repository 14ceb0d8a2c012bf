//! API client for communicating with a running prediction server

use anyhow::{Context, Result};
use ensemble_lib::PredictionResult;
use reqwest::{Client, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use url::Url;

/// API client for the prediction server
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        Self::decode(response).await
    }

    /// Make a POST request with JSON body
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .context("Failed to send request")?;

        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            match serde_json::from_str::<ErrorResponse>(&body) {
                Ok(err) => match err.detail {
                    Some(detail) => anyhow::bail!("API error ({}): {}: {}", status, err.error, detail),
                    None => anyhow::bail!("API error ({}): {}", status, err.error),
                },
                Err(_) => anyhow::bail!("API error ({}): {}", status, body),
            }
        }

        response.json().await.context("Failed to parse response")
    }

    pub async fn health(&self) -> Result<ServiceHealth> {
        self.get("health").await
    }

    pub async fn predict(&self, features: Value) -> Result<PredictionResult> {
        self.post("predict", &PredictRequest { features }).await
    }

    pub async fn predict_batch(&self, items: Vec<Value>) -> Result<BatchPrediction> {
        self.post("predict/batch", &BatchRequest { items }).await
    }

    pub async fn reload(&self) -> Result<ServiceHealth> {
        self.post("admin/reload", &Value::Null).await
    }
}

// API request/response types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictRequest {
    pub features: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequest {
    pub items: Vec<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchPrediction {
    pub version: String,
    pub predictions: Vec<PredictionResult>,
}

/// Body of `GET /health`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub status: String,
    pub models_loaded: usize,
    pub n_features: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_health_parses_response() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/health")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"status":"ok","models_loaded":3,"n_features":12,"version":"v1.4"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let health = client.health().await.unwrap();

        mock.assert_async().await;
        assert_eq!(health.models_loaded, 3);
        assert_eq!(health.n_features, 12);
        assert_eq!(health.version.as_deref(), Some("v1.4"));
    }

    #[tokio::test]
    async fn test_predict_sends_feature_map() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/predict")
            .match_body(mockito::Matcher::Json(json!({"features": {"rsi": 55.0}})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"win_probability":0.61,"predicted_bucket":"1-2R",
                    "bucket_probabilities":{"1-2R":0.5,"<0.5R":0.5},"mfe_estimate":1.3}"#,
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let result = client.predict(json!({"rsi": 55.0})).await.unwrap();

        mock.assert_async().await;
        assert_eq!(result.predicted_bucket, "1-2R");
        assert!((result.win_probability - 0.61).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_error_body_is_surfaced() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/predict")
            .with_status(503)
            .with_body(r#"{"error":"not_ready","detail":"no model bundle is loaded"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let err = client.predict(json!({})).await.unwrap_err().to_string();

        assert!(err.contains("503"));
        assert!(err.contains("not_ready"));
        assert!(err.contains("no model bundle is loaded"));
    }
}
