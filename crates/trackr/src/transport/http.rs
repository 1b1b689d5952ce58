//! 📡 The HTTP transport. POSTs a payload, reads the status, goes home.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, trace};

use super::{Transport, TransportResponse};
use crate::error::{DeliveryError, Error, Result};

/// 🔧 HTTP knobs shared by every sink that talks to a real endpoint.
///
/// ⚠️ `request_timeout_ms` defaults to none at all. A hung endpoint stalls whoever is
/// sending, the batch worker included, until the socket gives up. Set it if that matters.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct TransportConfig {
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: None,
        }
    }
}

/// 📡 POSTs JSON payloads to one URL.
///
/// `Clone` is cheap: `reqwest::Client` is an `Arc` around a connection pool.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    url: reqwest::Url,
    /// 🧪 Adds `Dry-Run: true`, asking a debug endpoint to validate without persisting.
    dry_run: bool,
}

impl HttpTransport {
    pub fn new(url: reqwest::Url, config: &TransportConfig, dry_run: bool) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms));
        if let Some(timeout_ms) = config.request_timeout_ms {
            builder = builder.timeout(Duration::from_millis(timeout_ms));
        }
        let client = builder.build().map_err(|e| {
            Error::InvalidConfig(format!(
                "💀 The HTTP client refused to be born. Probably a TLS stack having a bad day: {e}"
            ))
        })?;
        Ok(Self { client, url, dry_run })
    }

    /// 🚀 Convenience for the common case: parse the URL, default knobs, no dry run.
    pub fn from_url(url: &str) -> Result<Self> {
        let url = reqwest::Url::parse(url)
            .map_err(|e| Error::InvalidConfig(format!("server url [{url}] is not a URL: {e}")))?;
        Self::new(url, &TransportConfig::default(), false)
    }

    pub fn url(&self) -> &reqwest::Url {
        &self.url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&mut self, payload: String) -> std::result::Result<TransportResponse, DeliveryError> {
        debug!(bytes = payload.len(), url = %self.url, "📡 Sending payload");
        let mut request = self
            .client
            .post(self.url.clone())
            .header("Content-Type", "application/json; charset=utf-8");
        if self.dry_run {
            request = request.header("Dry-Run", "true");
        }

        let response = request
            .body(payload)
            .send()
            .await
            .map_err(|e| DeliveryError::Connection(e.to_string()))?;

        let status = response.status();
        // -- the body is context either way; an unreadable one is just an empty story
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(DeliveryError::Status {
                status: status.as_u16(),
                body,
            });
        }

        trace!(status = status.as_u16(), "🚀 Payload landed");
        Ok(TransportResponse {
            status: status.as_u16(),
            body,
        })
    }
}
