//! Where benchmark invocations are sent.

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_sagemakerruntime::error::DisplayErrorContext;
use aws_sdk_sagemakerruntime::primitives::Blob;
use aws_sdk_sagemakerruntime::Client;
use serde_json::Value;
use std::time::Duration;

use crate::constants::http::{INVOCATIONS_ROUTE, JSON_CONTENT_TYPE};
use crate::error::BenchError;

/// Something that answers inference requests.
#[async_trait]
pub trait InvocationTarget: Send + Sync {
    /// Human readable name for reports.
    fn describe(&self) -> String;

    /// Send one JSON request and return the JSON response body.
    async fn invoke(&self, payload: &Value) -> Result<Value, BenchError>;
}

fn parse_body(bytes: &[u8]) -> Result<Value, BenchError> {
    let value: Value = serde_json::from_slice(bytes).map_err(|e| {
        BenchError::InvalidResponse(format!(
            "{} ({})",
            e,
            String::from_utf8_lossy(&bytes[..bytes.len().min(200)])
        ))
    })?;
    if value.is_object() {
        Ok(value)
    } else {
        Err(BenchError::InvalidResponse(format!("expected an object, got {}", value)))
    }
}

/// A hosted endpoint reached through the SageMaker runtime API.
pub struct SageMakerRuntimeTarget {
    client: Client,
    endpoint_name: String,
}

impl SageMakerRuntimeTarget {
    pub async fn new(region: &str, endpoint_name: impl Into<String>) -> Self {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;
        Self {
            client: Client::new(&sdk_config),
            endpoint_name: endpoint_name.into(),
        }
    }
}

#[async_trait]
impl InvocationTarget for SageMakerRuntimeTarget {
    fn describe(&self) -> String {
        format!("endpoint {}", self.endpoint_name)
    }

    async fn invoke(&self, payload: &Value) -> Result<Value, BenchError> {
        let body = serde_json::to_vec(payload)
            .map_err(|e| BenchError::Invoke(format!("could not encode payload: {}", e)))?;

        let output = self
            .client
            .invoke_endpoint()
            .endpoint_name(&self.endpoint_name)
            .content_type(JSON_CONTENT_TYPE)
            .body(Blob::new(body))
            .send()
            .await
            .map_err(|e| BenchError::Invoke(DisplayErrorContext(e).to_string()))?;

        let body: Option<&Blob> = output.body().into();
        match body {
            Some(blob) => parse_body(blob.as_ref()),
            None => Err(BenchError::InvalidResponse("empty response body".to_string())),
        }
    }
}

/// The inference service reached directly over HTTP, e.g. a local container.
pub struct HttpTarget {
    client: reqwest::Client,
    invocations_url: String,
}

impl HttpTarget {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, BenchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BenchError::Invoke(e.to_string()))?;
        Ok(Self {
            client,
            invocations_url: format!("{}{}", base_url.trim_end_matches('/'), INVOCATIONS_ROUTE),
        })
    }
}

#[async_trait]
impl InvocationTarget for HttpTarget {
    fn describe(&self) -> String {
        self.invocations_url.clone()
    }

    /// Error statuses are not transport failures: their `{"error": ...}` body is returned.
    async fn invoke(&self, payload: &Value) -> Result<Value, BenchError> {
        let response = self
            .client
            .post(&self.invocations_url)
            .json(payload)
            .send()
            .await
            .map_err(|e| BenchError::Invoke(e.to_string()))?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| BenchError::Invoke(e.to_string()))?;
        parse_body(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::post, Json, Router};
    use serde_json::json;

    #[tokio::test]
    async fn test_http_target_posts_json() {
        async fn echo(Json(body): Json<Value>) -> Json<Value> {
            Json(json!({"text": "ok", "processing_time": 0.01, "echo": body}))
        }

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().route(INVOCATIONS_ROUTE, post(echo));
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let target = HttpTarget::new(&format!("http://{}/", addr), Duration::from_secs(5)).unwrap();
        assert!(target.describe().ends_with("/invocations"));

        let response = target.invoke(&json!({"audio": "AAAA"})).await.unwrap();
        assert_eq!(response["text"], "ok");
        assert_eq!(response["echo"]["audio"], "AAAA");
    }

    #[test]
    fn test_non_object_body_rejected() {
        assert!(parse_body(b"[1, 2]").is_err());
        assert!(parse_body(b"<html>").is_err());
        assert!(parse_body(br#"{"error": "boom"}"#).is_ok());
    }
}
