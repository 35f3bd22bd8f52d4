use async_trait::async_trait;
use std::time::Duration;
use tracing::trace;
use unity_types::{UnityError, UnityResult};

const QUOTA_KEYS: [&str; 3] = ["remaining_quota", "tokens_remaining", "remaining"];

/// Reports how much quota the remote dependency has left.
#[async_trait]
pub trait QuotaSource: Send + Sync {
    async fn remaining(&self) -> UnityResult<u64>;
}

/// Reads the remaining quota from a JSON usage endpoint.
pub struct HttpQuotaSource {
    url: String,
    client: reqwest::Client,
}

impl HttpQuotaSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> UnityResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| UnityError::Network(format!("Failed to build usage client: {}", e)))?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl QuotaSource for HttpQuotaSource {
    async fn remaining(&self) -> UnityResult<u64> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| UnityError::Network(format!("Usage request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UnityError::Network(format!("Usage endpoint answered {}", status)));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| UnityError::Network(format!("Invalid usage response: {}", e)))?;
        trace!("Usage response from {}: {}", self.url, json);

        parse_remaining(&json)
    }
}

pub fn parse_remaining(json: &serde_json::Value) -> UnityResult<u64> {
    QUOTA_KEYS
        .iter()
        .find_map(|key| json.get(key))
        .and_then(|value| {
            value
                .as_u64()
                // any fraction left is still quota left
                .or_else(|| value.as_f64().map(|f| f.max(0.0).ceil() as u64))
        })
        .ok_or_else(|| UnityError::Network("Usage response has no remaining quota".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;

    #[test]
    fn test_parse_remaining_keys() {
        assert_eq!(parse_remaining(&json!({ "remaining_quota": 42 })), Ok(42));
        assert_eq!(parse_remaining(&json!({ "tokens_remaining": 0 })), Ok(0));
        assert_eq!(parse_remaining(&json!({ "remaining": 12.7 })), Ok(13));
        assert_eq!(parse_remaining(&json!({ "remaining": -3.0 })), Ok(0));
        assert_eq!(parse_remaining(&json!({ "remaining": 0.0 })), Ok(0));
        assert!(parse_remaining(&json!({ "used": 5 })).is_err());
    }

    #[test]
    fn test_fractional_quota_is_not_exhausted() {
        let remaining = parse_remaining(&json!({ "remaining_quota": 0.5 })).unwrap();
        assert_eq!(remaining, 1);
        let signal = unity_types::WatchdogSignal::new(
            "remote-llm",
            unity_types::QuotaReading::Remaining(remaining),
        );
        assert!(!signal.is_bad());
    }

    #[tokio::test]
    async fn test_http_source_against_live_server() {
        let router = Router::new()
            .route("/usage", get(|| async { Json(json!({ "remaining_quota": 17 })) }))
            .route("/empty", get(|| async { Json(json!({})) }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let source = HttpQuotaSource::new(format!("http://{}/usage", addr), Duration::from_secs(2)).unwrap();
        assert_eq!(source.remaining().await, Ok(17));

        let source = HttpQuotaSource::new(format!("http://{}/empty", addr), Duration::from_secs(2)).unwrap();
        assert!(matches!(source.remaining().await, Err(UnityError::Network(_))));

        let source = HttpQuotaSource::new(format!("http://{}/missing", addr), Duration::from_secs(2)).unwrap();
        assert!(matches!(source.remaining().await, Err(UnityError::Network(_))));
    }
}
