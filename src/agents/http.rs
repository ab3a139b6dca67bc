//! Shared JSON-over-HTTP plumbing for agent services
//!
//! Uses a long-lived reqwest::Client per capability for connection pooling.

use crate::error::AgentError;
use crate::models::AgentHealth;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

#[derive(Clone)]
pub struct AgentHttpClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl AgentHttpClient {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, AgentError> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .timeout(timeout)
            .build()
            .map_err(|e| AgentError::InvalidRequest(format!("HTTP client setup failed: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, AgentError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let request = self.client.post(url).json(body);
        self.send(path, request).await
    }

    pub async fn get_json<T>(&self, path: &str) -> Result<T, AgentError>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let request = self.client.get(url);
        self.send(path, request).await
    }

    /// `GET /health`; any 2xx with `status` of "ok"/"healthy" counts as healthy.
    pub async fn probe(&self) -> AgentHealth {
        match self.get_json::<serde_json::Value>("/health").await {
            Ok(body) => match body.get("status").and_then(|v| v.as_str()) {
                Some("ok") | Some("healthy") => AgentHealth::Ok,
                Some("degraded") => AgentHealth::Degraded,
                _ => AgentHealth::Unknown,
            },
            Err(_) => AgentHealth::Offline,
        }
    }

    async fn send<T>(&self, path: &str, mut request: RequestBuilder) -> Result<T, AgentError>
    where
        T: DeserializeOwned,
    {
        if let Some(key) = &self.api_key {
            request = request.header("X-Api-Key", key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                AgentError::Timeout(self.timeout.as_millis() as u64)
            } else {
                AgentError::from(e)
            }
        })?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::Upstream {
                status: status.as_u16(),
                body: format!("{}: {}", path, truncate(&body, 200)),
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| AgentError::Malformed(format!("{}: {}", path, e)))
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        format!("{}...", s.chars().take(max).collect::<String>())
    } else {
        s.to_string()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::get, Json, Router};
    use serde_json::{json, Value};

    #[tokio::test]
    async fn test_status_codes_map_to_failure_classes() {
        let router = Router::new()
            .route("/health", get(|| async { Json(json!({"status": "healthy"})) }))
            .route("/busy", get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "try later") }))
            .route("/denied", get(|| async { (StatusCode::UNAUTHORIZED, "bad key") }))
            .route("/garbage", get(|| async { "not json" }));
        let base = test_upstream::spawn(router).await;
        let client = AgentHttpClient::new(&base, None, Duration::from_secs(5)).unwrap();

        assert_eq!(client.probe().await, AgentHealth::Ok);

        let err = client.get_json::<Value>("/busy").await.unwrap_err();
        assert!(err.class().is_retryable());

        let err = client.get_json::<Value>("/denied").await.unwrap_err();
        assert!(matches!(err, AgentError::Upstream { status: 401, .. }));
        assert!(!err.class().is_retryable());

        let err = client.get_json::<Value>("/garbage").await.unwrap_err();
        assert!(matches!(err, AgentError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_unreachable_service_is_offline() {
        let client =
            AgentHttpClient::new("http://127.0.0.1:9", None, Duration::from_millis(500)).unwrap();
        assert_eq!(client.probe().await, AgentHealth::Offline);

        let err = client.get_json::<Value>("/anything").await.unwrap_err();
        assert!(err.class().is_retryable());
    }
}
