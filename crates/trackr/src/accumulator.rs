//! 🪣 The accumulator: a Vec of encoded records with a size limit and a flush button.
//!
//! Shared by the local batch sink and the async batch worker. Neither of them wants to
//! re-learn the rule that matters most here: a flush empties the buffer no matter what
//! the endpoint said. Records from a failed flush are gone. Nobody retries. The error
//! goes back to whoever asked, and life continues.

use tracing::debug;

use crate::codec::RecordEncoder;
use crate::error::Result;
use crate::transport::Transport;

#[derive(Debug)]
pub(crate) struct Accumulator {
    max_batch_size: usize,
    pending: Vec<String>,
}

impl Accumulator {
    pub(crate) fn new(max_batch_size: usize) -> Self {
        Self {
            max_batch_size,
            pending: Vec::with_capacity(max_batch_size),
        }
    }

    pub(crate) fn push(&mut self, encoded: String) {
        self.pending.push(encoded);
    }

    pub(crate) fn is_full(&self) -> bool {
        self.pending.len() >= self.max_batch_size
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }

    pub(crate) fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    /// 🚽 Takes everything pending, sends it as one batch payload, and returns how many
    /// records went out. Empty buffer means no request at all.
    ///
    /// The buffer is cleared before the request goes out, so a failure discards the batch.
    pub(crate) async fn flush_to<T: Transport>(&mut self, encoder: &RecordEncoder, transport: &mut T) -> Result<usize> {
        if self.is_empty() {
            return Ok(0);
        }
        let batch = std::mem::replace(&mut self.pending, Vec::with_capacity(self.max_batch_size));
        let count = batch.len();
        let payload = encoder.compose_batch(&batch);
        debug!(records = count, bytes = payload.len(), "🚽 Flushing batch");
        transport.send(payload).await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::InMemoryTransport;

    #[tokio::test]
    async fn the_one_where_full_means_full() -> Result<()> {
        let mut accumulator = Accumulator::new(2);
        assert!(accumulator.is_empty());
        accumulator.push("a".into());
        assert!(!accumulator.is_full());
        accumulator.push("b".into());
        assert!(accumulator.is_full());

        let observer = InMemoryTransport::new();
        let sent = accumulator.flush_to(&RecordEncoder::default(), &mut observer.clone()).await?;
        assert_eq!(sent, 2);
        assert_eq!(observer.payloads().await, vec![r#"{"data_list":["a","b"],"gzip":0}"#.to_string()]);
        assert!(accumulator.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_an_empty_flush_stays_home() -> Result<()> {
        let observer = InMemoryTransport::new();
        let sent = Accumulator::new(5)
            .flush_to(&RecordEncoder::default(), &mut observer.clone())
            .await?;
        assert_eq!(sent, 0);
        assert!(observer.payloads().await.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_failed_flush_still_empties_the_bucket() {
        let observer = InMemoryTransport::failing(500);
        let mut accumulator = Accumulator::new(5);
        accumulator.push("doomed".into());

        let err = accumulator
            .flush_to(&RecordEncoder::default(), &mut observer.clone())
            .await
            .expect_err("💀 transport was told to fail");
        assert!(err.is_delivery());
        assert!(accumulator.is_empty());
        assert_eq!(accumulator.len(), 0);
    }
}
