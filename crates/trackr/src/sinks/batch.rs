//! 📦 The local batch sink: a bucket on the caller's desk.
//!
//! Records pile up until the bucket is full, then the whole bucket goes out in one
//! request, on the caller's time, and the caller hears how it went. A failed flush
//! empties the bucket anyway. No retry, no second chances.

use async_trait::async_trait;
use serde::Deserialize;

use super::{DEFAULT_BATCH_SIZE, Sink, sanitize_batch_size};
use crate::accumulator::Accumulator;
use crate::codec::RecordEncoder;
use crate::error::Result;
use crate::record::Record;
use crate::transport::TransportBackend;

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct BatchSinkConfig {
    /// 📏 Records per request, `1..=50`. Out of range falls back to 20.
    #[serde(default = "default_batch_size", alias = "buffer_size")]
    pub batch_size: usize,
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

impl Default for BatchSinkConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

#[derive(Debug)]
pub struct BatchSink {
    transport: TransportBackend,
    encoder: RecordEncoder,
    accumulator: Accumulator,
}

impl BatchSink {
    pub fn new(transport: TransportBackend, encoder: RecordEncoder, batch_size: usize) -> Self {
        Self {
            transport,
            encoder,
            accumulator: Accumulator::new(sanitize_batch_size(batch_size)),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.accumulator.max_batch_size()
    }

    pub fn pending(&self) -> usize {
        self.accumulator.len()
    }
}

#[async_trait]
impl Sink for BatchSink {
    async fn send(&mut self, record: Record) -> Result<()> {
        let encoded = self.encoder.encode(&record)?;
        self.accumulator.push(encoded);
        if self.accumulator.is_full() {
            self.flush().await?;
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        self.accumulator.flush_to(&self.encoder, &mut self.transport).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.flush().await
    }
}
