//! 🚀 The immediate sink: one record, one request, right now, on your time.

use async_trait::async_trait;
use tracing::trace;

use super::Sink;
use crate::codec::RecordEncoder;
use crate::error::Result;
use crate::record::Record;
use crate::transport::{Transport, TransportBackend};

/// 📡 Sends every record the moment it arrives. Nothing buffered, so nothing to flush.
#[derive(Debug)]
pub struct ImmediateSink {
    transport: TransportBackend,
    encoder: RecordEncoder,
}

impl ImmediateSink {
    pub fn new(transport: TransportBackend, encoder: RecordEncoder) -> Self {
        Self { transport, encoder }
    }
}

#[async_trait]
impl Sink for ImmediateSink {
    async fn send(&mut self, record: Record) -> Result<()> {
        let encoded = self.encoder.encode(&record)?;
        let payload = self.encoder.compose_single(&encoded);
        trace!(kind = %record.kind, "📡 Sending record immediately");
        self.transport.send(payload).await?;
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
