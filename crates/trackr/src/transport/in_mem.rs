//! 🧠 The in-memory transport: a transport that never forgets.
//!
//! Every attempted payload is hoarded in a shared Vec wrapped in a Mutex wrapped in an Arc.
//! It's types all the way down. Tests clone it, hand one copy to a sink, and keep the other
//! to peek at what went "over the wire". It can also be told to fail, for when a test needs
//! the endpoint to have a bad day on command.
//!
//! ⚠️ This is NOT for production. This is for tests and local poking around.

use std::sync::Arc;
use std::sync::atomic::{AtomicU16, Ordering};

use async_trait::async_trait;
use serde_json::Value;

use super::{Transport, TransportResponse};
use crate::codec::decode_payload;
use crate::error::{DeliveryError, Result};

/// 📦 Stores payloads instead of sending them.
#[derive(Debug, Default, Clone)]
pub struct InMemoryTransport {
    /// 🔒 Every attempt lands here, successful or not. Shared across clones.
    received: Arc<tokio::sync::Mutex<Vec<String>>>,
    /// 🎭 0 = answer 200; anything else = answer with that status.
    failure_status: Arc<AtomicU16>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// 💀 A transport that answers every attempt with `status`.
    pub fn failing(status: u16) -> Self {
        let transport = Self::new();
        transport.set_failure(Some(status));
        transport
    }

    pub fn set_failure(&self, status: Option<u16>) {
        self.failure_status.store(status.unwrap_or(0), Ordering::SeqCst);
    }

    /// Every payload attempted so far, oldest first.
    pub async fn payloads(&self) -> Vec<String> {
        self.received.lock().await.clone()
    }

    /// Every record from every payload, decoded, in transmission order.
    pub async fn records(&self) -> Result<Vec<Value>> {
        let payloads = self.payloads().await;
        let mut records = Vec::new();
        for payload in &payloads {
            records.extend(decode_payload(payload)?);
        }
        Ok(records)
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn send(&mut self, payload: String) -> std::result::Result<TransportResponse, DeliveryError> {
        // 🔒 The Mutex is load-bearing. Worker and test poke at the same Vec.
        self.received.lock().await.push(payload);
        match self.failure_status.load(Ordering::SeqCst) {
            0 => Ok(TransportResponse {
                status: 200,
                body: String::new(),
            }),
            status => Err(DeliveryError::Status {
                status,
                body: "in-memory transport told to fail".into(),
            }),
        }
    }
}
