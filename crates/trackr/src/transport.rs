//! 📡 Transports: the last mile. Pure I/O, zero logic.
//!
//! 🚰 A transport receives a fully composed payload string and gets it to the endpoint.
//! It does not buffer. It does not encode. It does not retry. It sends, and it tells you
//! what the endpoint said. Like a postal worker who delivers the mail without reading it.
//!
//! 🧠 Knowledge graph:
//! - Pattern: trait → concrete impls (HttpTransport, InMemoryTransport) → TransportBackend enum
//! - Sinks do: encode → buffer → compose → `transport.send(payload)`
//! - Transports do: HTTP POST or Vec push. Nothing else.
//! - Ancient proverb: "He who puts batching in the transport, debugs the worker twice."

use async_trait::async_trait;

use crate::error::{DeliveryError, Error, Result};

pub mod http;
pub mod in_mem;

pub use http::{HttpTransport, TransportConfig};
pub use in_mem::InMemoryTransport;

/// ✅ What a successful (2xx) attempt looked like.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

/// 📡 Sends one composed payload to one destination.
///
/// # Contract 📜
/// - 2xx is success and comes back as `Ok(TransportResponse)`.
/// - Any other status is `DeliveryError::Status`; no answer at all is `DeliveryError::Connection`.
/// - No retries, no buffering. One call, one attempt.
#[async_trait]
pub trait Transport: std::fmt::Debug + Send {
    async fn send(&mut self, payload: String) -> std::result::Result<TransportResponse, DeliveryError>;
}

/// 🎭 The many faces of a transport, dispatched without a vtable.
///
/// `Clone` so the batching engine can hand a fresh copy to every worker it starts.
/// Both variants share their guts (a pooled HTTP client, an `Arc`'d vec) across clones.
#[derive(Debug, Clone)]
pub enum TransportBackend {
    Http(HttpTransport),
    InMemory(InMemoryTransport),
}

#[async_trait]
impl Transport for TransportBackend {
    async fn send(&mut self, payload: String) -> std::result::Result<TransportResponse, DeliveryError> {
        match self {
            TransportBackend::Http(transport) => transport.send(payload).await,
            TransportBackend::InMemory(transport) => transport.send(payload).await,
        }
    }
}

impl From<HttpTransport> for TransportBackend {
    fn from(transport: HttpTransport) -> Self {
        TransportBackend::Http(transport)
    }
}

impl From<InMemoryTransport> for TransportBackend {
    fn from(transport: InMemoryTransport) -> Self {
        TransportBackend::InMemory(transport)
    }
}

/// 🔍 The debug endpoint lives next to the ingestion endpoint: same host, same query,
/// last path segment swapped for `debug`. `/sa?project=x` becomes `/debug?project=x`.
pub fn debug_url(server_url: &str) -> Result<reqwest::Url> {
    let mut url = reqwest::Url::parse(server_url)
        .map_err(|e| Error::InvalidConfig(format!("server url [{server_url}] is not a URL: {e}")))?;
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| Error::InvalidConfig(format!("server url [{server_url}] cannot carry a path")))?;
        segments.pop_if_empty().pop().push("debug");
    }
    Ok(url)
}
