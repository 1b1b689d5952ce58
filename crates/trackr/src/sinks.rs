//! 🕳️ Sinks: where validated records go to be delivered, eventually.
//!
//! A sink accepts one record at a time, already validated, and decides when the
//! transport sees it. Right away (immediate, debug), once a local batch fills up
//! (batch), or whenever the background worker gets around to it (async batch).
//!
//! # Knowledge Graph 🧠
//! - Pattern: trait → concrete impls → `SinkBackend` enum, same as transports
//! - Sinks do: encode → (buffer) → compose → `transport.send(payload)`
//! - Sinks never validate. A rejected record never makes it this far.
//! - `SinkBackend::from_config` picks the variant the config asked for

use std::fmt::Debug;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::app_config::{AppConfig, ConsumerConfig};
use crate::codec::RecordEncoder;
use crate::error::{Error, Result};
use crate::record::Record;
use crate::transport::{HttpTransport, TransportBackend, debug_url};

pub mod async_batch;
pub mod batch;
pub mod debug;
pub mod immediate;

pub use async_batch::{AsyncBatchConfig, AsyncBatchSink, EngineState};
pub use batch::{BatchSink, BatchSinkConfig};
pub use debug::DebugSink;
pub use immediate::ImmediateSink;

/// 📏 Smallest batch anyone may ask for.
pub const MIN_BATCH_SIZE: usize = 1;
/// 📏 Largest batch anyone may ask for.
pub const MAX_BATCH_SIZE: usize = 50;
/// 📏 What you get when you ask for something outside `MIN_BATCH_SIZE..=MAX_BATCH_SIZE`.
pub const DEFAULT_BATCH_SIZE: usize = 20;

/// Reject-and-default: anything outside the allowed range becomes the default, loudly.
pub(crate) fn sanitize_batch_size(requested: usize) -> usize {
    if (MIN_BATCH_SIZE..=MAX_BATCH_SIZE).contains(&requested) {
        requested
    } else {
        warn!(
            requested,
            default = DEFAULT_BATCH_SIZE,
            "⚠️ Batch size must be between {MIN_BATCH_SIZE} and {MAX_BATCH_SIZE}, using the default"
        );
        DEFAULT_BATCH_SIZE
    }
}

/// 🕳️ Accepts validated records and gets them to a transport.
///
/// # Contract 📜
/// - `send` takes one already validated record. Delivery errors come back here only
///   when the sink delivers on the caller's time.
/// - `flush` transmits anything buffered and returns once the attempt is over.
/// - `close` flushes and releases the sink. Terminal. Call it once.
#[async_trait]
pub trait Sink: Debug + Send {
    async fn send(&mut self, record: Record) -> Result<()>;
    async fn flush(&mut self) -> Result<()>;
    async fn close(&mut self) -> Result<()>;
}

/// 🎭 The many faces of a sink.
#[derive(Debug)]
pub enum SinkBackend {
    Immediate(ImmediateSink),
    Batch(BatchSink),
    AsyncBatch(AsyncBatchSink),
    Debug(DebugSink),
}

impl SinkBackend {
    /// 🏗️ Builds the sink the configuration describes, talking HTTP to `server_url`.
    ///
    /// The async variant comes back already started. `debug = true` overrides the
    /// consumer choice entirely: debugging is one request per record, no buffering.
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let encoder = RecordEncoder::new(config.gzip);

        if config.debug {
            let url = debug_url(&config.server_url)?;
            info!(url = %url, dry_run = config.dry_run, "🔍 Debug sink selected");
            let transport = HttpTransport::new(url, &config.transport, config.dry_run)?;
            return Ok(SinkBackend::Debug(DebugSink::new(transport.into(), encoder)));
        }

        let url = reqwest::Url::parse(&config.server_url).map_err(|e| {
            Error::InvalidConfig(format!("server url [{}] is not a URL: {e}", config.server_url))
        })?;
        let transport: TransportBackend = HttpTransport::new(url, &config.transport, false)?.into();

        let sink = match &config.consumer {
            ConsumerConfig::Immediate => SinkBackend::Immediate(ImmediateSink::new(transport, encoder)),
            ConsumerConfig::Batch(batch) => SinkBackend::Batch(BatchSink::new(transport, encoder, batch.batch_size)),
            ConsumerConfig::Async(engine) => {
                let sink = AsyncBatchSink::new(transport, encoder, engine.clone());
                sink.start().await?;
                SinkBackend::AsyncBatch(sink)
            }
        };
        info!(consumer = config.consumer.name(), "🚀 Sink ready");
        Ok(sink)
    }
}

#[async_trait]
impl Sink for SinkBackend {
    async fn send(&mut self, record: Record) -> Result<()> {
        match self {
            SinkBackend::Immediate(sink) => sink.send(record).await,
            SinkBackend::Batch(sink) => sink.send(record).await,
            SinkBackend::AsyncBatch(sink) => Sink::send(sink, record).await,
            SinkBackend::Debug(sink) => sink.send(record).await,
        }
    }

    async fn flush(&mut self) -> Result<()> {
        match self {
            SinkBackend::Immediate(sink) => sink.flush().await,
            SinkBackend::Batch(sink) => sink.flush().await,
            SinkBackend::AsyncBatch(sink) => Sink::flush(sink).await,
            SinkBackend::Debug(sink) => sink.flush().await,
        }
    }

    async fn close(&mut self) -> Result<()> {
        match self {
            SinkBackend::Immediate(sink) => sink.close().await,
            SinkBackend::Batch(sink) => sink.close().await,
            SinkBackend::AsyncBatch(sink) => Sink::close(sink).await,
            SinkBackend::Debug(sink) => sink.close().await,
        }
    }
}

impl From<ImmediateSink> for SinkBackend {
    fn from(sink: ImmediateSink) -> Self {
        SinkBackend::Immediate(sink)
    }
}

impl From<BatchSink> for SinkBackend {
    fn from(sink: BatchSink) -> Self {
        SinkBackend::Batch(sink)
    }
}

impl From<AsyncBatchSink> for SinkBackend {
    fn from(sink: AsyncBatchSink) -> Self {
        SinkBackend::AsyncBatch(sink)
    }
}

impl From<DebugSink> for SinkBackend {
    fn from(sink: DebugSink) -> Self {
        SinkBackend::Debug(sink)
    }
}
