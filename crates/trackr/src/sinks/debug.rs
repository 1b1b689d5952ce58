//! 🔍 The debug sink: one record at a time, straight to the debug endpoint, and you
//! get to see exactly what it said back. Nothing buffered. Nothing mutated.

use async_trait::async_trait;
use tracing::info;

use super::Sink;
use crate::codec::RecordEncoder;
use crate::error::Result;
use crate::record::Record;
use crate::transport::{Transport, TransportBackend, TransportResponse};

#[derive(Debug)]
pub struct DebugSink {
    transport: TransportBackend,
    encoder: RecordEncoder,
}

impl DebugSink {
    pub fn new(transport: TransportBackend, encoder: RecordEncoder) -> Self {
        Self { transport, encoder }
    }

    /// The endpoint this sink reports to, when it talks HTTP at all.
    pub fn url(&self) -> Option<&reqwest::Url> {
        match &self.transport {
            TransportBackend::Http(http) => Some(http.url()),
            TransportBackend::InMemory(_) => None,
        }
    }

    /// 🔍 Sends one record and hands back the endpoint's verdict.
    pub async fn send_with_report(&mut self, record: &Record) -> Result<TransportResponse> {
        let encoded = self.encoder.encode(record)?;
        let payload = self.encoder.compose_single(&encoded);
        Ok(self.transport.send(payload).await?)
    }
}

#[async_trait]
impl Sink for DebugSink {
    async fn send(&mut self, record: Record) -> Result<()> {
        let report = self.send_with_report(&record).await?;
        info!(
            kind = %record.kind,
            distinct_id = %record.distinct_id,
            status = report.status,
            body = %report.body,
            "🔍 Debug endpoint accepted the record"
        );
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
