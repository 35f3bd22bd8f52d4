use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::trace;
use unity_types::{UnityError, UnityResult};

use super::probe::{ProbeOutcome, Prober};
use crate::process::ProbeDescriptor;

const OK_STATUSES: [&str; 5] = ["ok", "healthy", "ready", "up", "pass"];

/// Probes Http and Tcp descriptors over the network.
#[derive(Clone)]
pub struct HttpProber {
    client: Client,
}

impl HttpProber {
    pub fn new(request_timeout: Duration) -> UnityResult<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| UnityError::Network(format!("Failed to build probe client: {}", e)))?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    async fn probe_http(&self, url: &str, marker: Option<&str>) -> ProbeOutcome {
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => return ProbeOutcome::NotYet(format!("request failed: {}", e)),
        };

        let status = response.status();
        if status.is_server_error() {
            return ProbeOutcome::NotYet(format!("server answered {}", status));
        }
        if status.is_client_error() {
            return ProbeOutcome::Fatal(format!("{} answered {}", url, status));
        }
        if !status.is_success() {
            return ProbeOutcome::NotYet(format!("unexpected status {}", status));
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return ProbeOutcome::NotYet(format!("body read failed: {}", e)),
        };
        trace!("Probe {} answered {}: {}", url, status, body);

        classify_body(status, &body, marker)
    }

    async fn probe_tcp(&self, addr: &str) -> ProbeOutcome {
        match tokio::net::TcpStream::connect(addr).await {
            Ok(_) => ProbeOutcome::Ready,
            Err(e) => ProbeOutcome::NotYet(format!("connect to {} failed: {}", addr, e)),
        }
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, descriptor: &ProbeDescriptor) -> ProbeOutcome {
        match descriptor {
            ProbeDescriptor::Http { url, marker } => self.probe_http(url, marker.as_deref()).await,
            ProbeDescriptor::Tcp { addr } => self.probe_tcp(addr).await,
            ProbeDescriptor::Liveness { .. } | ProbeDescriptor::None => ProbeOutcome::Ready,
        }
    }
}

/// Classifies a 2xx body. A configured marker replaces the built-in ok markers.
pub fn classify_body(status: StatusCode, body: &str, marker: Option<&str>) -> ProbeOutcome {
    if let Some(marker) = marker {
        return if body.contains(marker) {
            ProbeOutcome::Ready
        } else {
            ProbeOutcome::Fatal(format!("{} body lacks marker '{}'", status, marker))
        };
    }

    let trimmed = body.trim();
    if trimmed.eq_ignore_ascii_case("ok") || trimmed.eq_ignore_ascii_case("\"ok\"") {
        return ProbeOutcome::Ready;
    }

    let json: serde_json::Value = match serde_json::from_str(trimmed) {
        Ok(json) => json,
        Err(_) => return ProbeOutcome::Fatal(format!("{} with unrecognized body", status)),
    };

    if json.get("ok").and_then(|v| v.as_bool()) == Some(true)
        || json.get("healthy").and_then(|v| v.as_bool()) == Some(true)
    {
        return ProbeOutcome::Ready;
    }

    match json.get("status").and_then(|v| v.as_str()) {
        Some(s) if OK_STATUSES.contains(&s.to_lowercase().as_str()) => ProbeOutcome::Ready,
        Some(s) => ProbeOutcome::NotYet(format!("service reports status '{}'", s)),
        None if json.get("ok").is_some() || json.get("healthy").is_some() => {
            ProbeOutcome::NotYet("service reports not healthy".into())
        }
        None => ProbeOutcome::Fatal(format!("{} JSON without a health marker", status)),
    }
}
