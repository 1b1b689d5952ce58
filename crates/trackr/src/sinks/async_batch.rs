//! 🔄 The asynchronous batching engine.
//!
//! 🎬 *[callers throw records over the wall. a worker on the other side catches them.]*
//! *[every so often, or whenever its arms are full, the worker throws them at the server.]*
//!
//! ```text
//!   Stopped ──start()──▶ Starting ──▶ Running ──stop()──▶ Stopping ──▶ Stopped
//! ```
//!
//! 🧠 Knowledge graph:
//! - `start()` spawns exactly one `BatchWorker` on a fresh bounded intake queue.
//!   The check-and-set happens under the lifecycle lock, so two racing starts
//!   produce one worker and one `AlreadyRunning`.
//! - `send()` encodes on the caller's task, then enqueues. A full queue makes the
//!   caller wait. Nothing is dropped.
//! - `flush()` asks the worker to flush now and waits for the transport's answer.
//! - `stop()` holds the lifecycle lock while the worker drains, so no start can
//!   sneak in mid-shutdown. It returns once the worker is gone.
//! - Worker-driven flushes log failures. Only an explicit `flush()` returns them.
//!
//! ⚠️ There is no per-request timeout unless the transport was built with one. A hung
//! request stalls the worker, and with it every batch behind it.
//!
//! `AsyncBatchSink` is a cheap `Clone` handle. Every clone drives the same engine, so
//! any number of producer tasks can share it. When the last handle is dropped without
//! `stop()`, the worker notices its senders are gone, drains, and exits on its own.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{DEFAULT_BATCH_SIZE, Sink, sanitize_batch_size};
use crate::codec::RecordEncoder;
use crate::error::{LifecycleError, Result};
use crate::record::Record;
use crate::transport::TransportBackend;
use crate::workers::{BatchWorker, FlushReply, Worker};

pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;
pub const DEFAULT_FLUSH_INTERVAL_MS: u64 = 30_000;

/// Outstanding explicit flush requests the worker will hold before `flush()` callers queue up.
const FLUSH_REQUEST_CAPACITY: usize = 16;

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct AsyncBatchConfig {
    /// 📏 Records per request, `1..=50`. Out of range falls back to 20.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    /// 📬 How many encoded records may wait in the intake queue before `send` waits too.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// ⏱️ How often the worker flushes a partial batch.
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
}

fn default_max_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_flush_interval_ms() -> u64 {
    DEFAULT_FLUSH_INTERVAL_MS
}

impl Default for AsyncBatchConfig {
    fn default() -> Self {
        Self {
            max_batch_size: DEFAULT_BATCH_SIZE,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            flush_interval_ms: DEFAULT_FLUSH_INTERVAL_MS,
        }
    }
}

impl AsyncBatchConfig {
    /// 🔧 Same config, every out-of-range knob replaced by its default (with a warning).
    pub fn sanitized(self) -> Self {
        let queue_capacity = if self.queue_capacity == 0 {
            warn!(default = DEFAULT_QUEUE_CAPACITY, "⚠️ queue_capacity of 0 would deadlock every send, using the default");
            DEFAULT_QUEUE_CAPACITY
        } else {
            self.queue_capacity
        };
        let flush_interval_ms = if self.flush_interval_ms == 0 {
            warn!(default = DEFAULT_FLUSH_INTERVAL_MS, "⚠️ flush_interval_ms must be positive, using the default");
            DEFAULT_FLUSH_INTERVAL_MS
        } else {
            self.flush_interval_ms
        };
        Self {
            max_batch_size: sanitize_batch_size(self.max_batch_size),
            queue_capacity,
            flush_interval_ms,
        }
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

/// 🚦 Where the engine is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EngineState {
    Stopped = 0,
    Starting = 1,
    Running = 2,
    Stopping = 3,
}

impl EngineState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => EngineState::Starting,
            2 => EngineState::Running,
            3 => EngineState::Stopping,
            _ => EngineState::Stopped,
        }
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineState::Stopped => "stopped",
            EngineState::Starting => "starting",
            EngineState::Running => "running",
            EngineState::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

/// Everything that exists only while a worker does.
#[derive(Debug)]
struct RunningWorker {
    intake: async_channel::Sender<String>,
    stop_tx: oneshot::Sender<()>,
    flush_tx: mpsc::Sender<FlushReply>,
    handle: JoinHandle<Result<()>>,
}

#[derive(Debug, Default)]
struct Lifecycle {
    worker: Option<RunningWorker>,
}

/// 🔄 Cloneable handle to one background batching engine.
#[derive(Debug, Clone)]
pub struct AsyncBatchSink {
    config: AsyncBatchConfig,
    encoder: RecordEncoder,
    transport: TransportBackend,
    /// 🔒 Guards every transition. Held across the whole of `start()` and `stop()`.
    lifecycle: Arc<Mutex<Lifecycle>>,
    /// Mirror of the state that can be read without waiting on the lock.
    state: Arc<AtomicU8>,
}

impl AsyncBatchSink {
    /// Builds a stopped engine. Nothing runs until `start()`.
    pub fn new(transport: TransportBackend, encoder: RecordEncoder, config: AsyncBatchConfig) -> Self {
        Self {
            config: config.sanitized(),
            encoder,
            transport,
            lifecycle: Arc::new(Mutex::new(Lifecycle::default())),
            state: Arc::new(AtomicU8::new(EngineState::Stopped as u8)),
        }
    }

    pub fn config(&self) -> &AsyncBatchConfig {
        &self.config
    }

    pub fn state(&self) -> EngineState {
        EngineState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: EngineState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    /// 🚀 Stopped → Running, with exactly one fresh worker.
    pub async fn start(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.worker.is_some() || self.state() != EngineState::Stopped {
            return Err(LifecycleError::AlreadyRunning.into());
        }
        self.set_state(EngineState::Starting);

        let (intake, intake_rx) = async_channel::bounded(self.config.queue_capacity);
        let (stop_tx, stop_rx) = oneshot::channel();
        let (flush_tx, flush_rx) = mpsc::channel(FLUSH_REQUEST_CAPACITY);
        let handle = BatchWorker::new(
            intake_rx,
            stop_rx,
            flush_rx,
            self.config.max_batch_size,
            self.encoder,
            self.transport.clone(),
            self.config.flush_interval(),
        )
        .start();

        lifecycle.worker = Some(RunningWorker {
            intake,
            stop_tx,
            flush_tx,
            handle,
        });
        self.set_state(EngineState::Running);
        info!(
            max_batch_size = self.config.max_batch_size,
            queue_capacity = self.config.queue_capacity,
            flush_interval_ms = self.config.flush_interval_ms,
            "🚀 Async batching engine running"
        );
        Ok(())
    }

    /// 📬 Encodes and enqueues one record. Waits while the intake queue is full.
    pub async fn send(&self, record: Record) -> Result<()> {
        let encoded = self.encoder.encode(&record)?;
        let intake = {
            let lifecycle = self.lifecycle.lock().await;
            match &lifecycle.worker {
                Some(worker) if self.state() == EngineState::Running => worker.intake.clone(),
                _ => return Err(LifecycleError::NotRunning.into()),
            }
        };
        // -- the lock is released before we wait, so a full queue never blocks stop()
        intake
            .send(encoded)
            .await
            .map_err(|_| LifecycleError::NotRunning)?;
        Ok(())
    }

    /// 🚽 Flushes everything accepted so far and reports how the transport took it.
    ///
    /// A stopped engine has nothing buffered, so this is `Ok(())`.
    pub async fn flush(&self) -> Result<()> {
        let flush_tx = {
            let lifecycle = self.lifecycle.lock().await;
            match &lifecycle.worker {
                Some(worker) => worker.flush_tx.clone(),
                None => return Ok(()),
            }
        };
        let (reply_tx, reply_rx) = oneshot::channel();
        if flush_tx.send(reply_tx).await.is_err() {
            // -- the worker is already on its way out, and it flushes on the way
            return Ok(());
        }
        match reply_rx.await {
            Ok(outcome) => outcome,
            Err(_) => Ok(()),
        }
    }

    /// 🛑 Running → Stopped. Returns after the worker drained the queue, flushed the
    /// remainder, and exited. Stopping a stopped engine does nothing.
    pub async fn stop(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        let Some(worker) = lifecycle.worker.take() else {
            return Ok(());
        };
        self.set_state(EngineState::Stopping);
        debug!("🛑 Stopping async batching engine");

        let RunningWorker {
            intake,
            stop_tx,
            flush_tx,
            handle,
        } = worker;
        // -- a worker that already died can't hear us; the join below tells us why
        let _ = stop_tx.send(());
        drop(intake);
        drop(flush_tx);

        let joined = handle.await;
        self.set_state(EngineState::Stopped);
        match joined {
            Ok(result) => {
                info!("🏁 Async batching engine stopped");
                result
            }
            Err(join_error) => Err(LifecycleError::WorkerPanicked(join_error.to_string()).into()),
        }
    }

    /// Same as `stop()`.
    pub async fn close(&self) -> Result<()> {
        self.stop().await
    }
}

#[async_trait]
impl Sink for AsyncBatchSink {
    async fn send(&mut self, record: Record) -> Result<()> {
        AsyncBatchSink::send(self, record).await
    }

    async fn flush(&mut self) -> Result<()> {
        AsyncBatchSink::flush(self).await
    }

    async fn close(&mut self) -> Result<()> {
        AsyncBatchSink::close(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::decode_payload;
    use crate::error::{DeliveryError, Error};
    use crate::transport::{HttpTransport, InMemoryTransport};
    use crate::validator::RecordValidator;
    use futures::future::join_all;
    use serde_json::{Map, Value, json};
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn record(n: usize) -> Record {
        let mut properties = Map::new();
        properties.insert("n".into(), json!(n));
        RecordValidator::new(None, false)
            .and_then(|v| v.track("u1", "Tick", properties, false))
            .expect("💀 fixture record should validate")
    }

    fn numbers(records: &[Value]) -> Vec<u64> {
        records
            .iter()
            .filter_map(|r| r["properties"]["n"].as_u64())
            .collect()
    }

    fn engine(observer: &InMemoryTransport, max_batch_size: usize, queue_capacity: usize, flush_interval_ms: u64) -> AsyncBatchSink {
        AsyncBatchSink::new(
            observer.clone().into(),
            RecordEncoder::default(),
            AsyncBatchConfig {
                max_batch_size,
                queue_capacity,
                flush_interval_ms,
            },
        )
    }

    fn http_engine(server: &MockServer, max_batch_size: usize, queue_capacity: usize) -> AsyncBatchSink {
        let transport = HttpTransport::from_url(&format!("{}/sa", server.uri())).expect("💀 mock uri parses");
        AsyncBatchSink::new(
            transport.into(),
            RecordEncoder::default(),
            AsyncBatchConfig {
                max_batch_size,
                queue_capacity,
                flush_interval_ms: 3_600_000,
            },
        )
    }

    /// Every record the mock server was handed, failed requests included.
    async fn received_numbers(server: &MockServer) -> Vec<u64> {
        let requests = server.received_requests().await.expect("💀 request recording is on");
        let mut records = Vec::new();
        for request in requests {
            let body = String::from_utf8(request.body).expect("💀 payloads are utf-8");
            records.extend(decode_payload(&body).expect("💀 payload decodes"));
        }
        numbers(&records)
    }

    /// Polls until `count` payloads arrived or a generous deadline passes.
    async fn wait_for_payloads(observer: &InMemoryTransport, count: usize) -> Vec<String> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let payloads = observer.payloads().await;
            if payloads.len() >= count || tokio::time::Instant::now() >= deadline {
                return payloads;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn the_one_where_start_only_works_once() -> Result<()> {
        let engine = engine(&InMemoryTransport::new(), 20, 100, 60_000);
        assert_eq!(engine.state(), EngineState::Stopped);

        engine.start().await?;
        assert_eq!(engine.state(), EngineState::Running);
        let err = engine.start().await.expect_err("💀 second start must fail");
        assert!(matches!(err, Error::Lifecycle(LifecycleError::AlreadyRunning)));
        assert_eq!(engine.state(), EngineState::Running);

        engine.stop().await?;
        assert_eq!(engine.state(), EngineState::Stopped);
        // -- and it can go around again
        engine.start().await?;
        engine.stop().await
    }

    #[tokio::test]
    async fn the_one_where_racing_starts_make_one_worker() {
        let engine = engine(&InMemoryTransport::new(), 20, 100, 60_000);
        let outcomes = join_all((0..8).map(|_| engine.start())).await;
        assert_eq!(outcomes.iter().filter(|o| o.is_ok()).count(), 1);
        assert!(
            outcomes
                .iter()
                .filter_map(|o| o.as_ref().err())
                .all(|e| matches!(e, Error::Lifecycle(LifecycleError::AlreadyRunning)))
        );
        engine.stop().await.expect("💀 clean stop");
    }

    #[tokio::test]
    async fn the_one_where_a_full_batch_does_not_wait_for_the_timer() -> Result<()> {
        let observer = InMemoryTransport::new();
        let engine = engine(&observer, 5, 100, 3_600_000);
        engine.start().await?;
        for n in 0..5 {
            engine.send(record(n)).await?;
        }

        let payloads = wait_for_payloads(&observer, 1).await;
        assert_eq!(payloads.len(), 1);
        assert_eq!(numbers(&observer.records().await?), vec![0, 1, 2, 3, 4]);

        engine.stop().await?;
        // -- nothing left over, so stop sends nothing more
        assert_eq!(observer.payloads().await.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_the_timer_flushes_a_partial_batch() -> Result<()> {
        let observer = InMemoryTransport::new();
        let engine = engine(&observer, 20, 100, 50);
        engine.start().await?;
        for n in 0..3 {
            engine.send(record(n)).await?;
        }

        let payloads = wait_for_payloads(&observer, 1).await;
        assert_eq!(payloads.len(), 1);
        assert_eq!(numbers(&observer.records().await?), vec![0, 1, 2]);

        // -- empty ticks send nothing
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(observer.payloads().await.len(), 1);
        engine.stop().await
    }

    #[tokio::test]
    async fn the_one_where_stop_loses_nothing_and_duplicates_nothing() -> Result<()> {
        let observer = InMemoryTransport::new();
        let engine = engine(&observer, 7, 1000, 3_600_000);
        engine.start().await?;
        for n in 0..100 {
            engine.send(record(n)).await?;
        }
        engine.stop().await?;

        assert_eq!(numbers(&observer.records().await?), (0..100u64).collect::<Vec<_>>());
        // -- 14 full batches of 7 plus the 2 stragglers
        assert_eq!(observer.payloads().await.len(), 15);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_the_engine_is_closed_for_business() -> Result<()> {
        let engine = engine(&InMemoryTransport::new(), 20, 100, 60_000);

        let err = engine.send(record(0)).await.expect_err("💀 never started");
        assert!(matches!(err, Error::Lifecycle(LifecycleError::NotRunning)));
        // -- flush and stop on a stopped engine shrug
        engine.flush().await?;
        engine.stop().await?;

        engine.start().await?;
        engine.stop().await?;
        let err = engine.send(record(1)).await.expect_err("💀 already stopped");
        assert!(matches!(err, Error::Lifecycle(LifecycleError::NotRunning)));
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_an_explicit_flush_tells_the_truth() -> Result<()> {
        let observer = InMemoryTransport::failing(500);
        let engine = engine(&observer, 20, 100, 3_600_000);
        engine.start().await?;
        engine.send(record(0)).await?;
        engine.send(record(1)).await?;

        let err = engine.flush().await.expect_err("💀 transport was told to fail");
        assert!(err.is_delivery());
        assert_eq!(numbers(&observer.records().await?), vec![0, 1]);

        // -- the failed batch is gone for good; a healthy flush sends nothing new
        observer.set_failure(None);
        engine.flush().await?;
        engine.send(record(2)).await?;
        engine.flush().await?;
        assert_eq!(observer.payloads().await.len(), 2);
        assert_eq!(numbers(&observer.records().await?), vec![0, 1, 2]);
        engine.stop().await
    }

    #[tokio::test]
    async fn the_one_where_one_bad_batch_spoils_the_whole_flush() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("nope"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let engine = http_engine(&server, 2, 100);
        engine.start().await?;
        for n in 0..5 {
            engine.send(record(n)).await?;
        }

        // -- [0,1] got the 500, [2,3] and [4] landed; the flush still owns up to the failure
        let err = engine.flush().await.expect_err("💀 the first batch was refused");
        assert!(matches!(
            err,
            Error::Delivery(DeliveryError::Status { status: 500, .. })
        ));
        assert_eq!(server.received_requests().await.map(|r| r.len()), Some(3));
        assert_eq!(received_numbers(&server).await, (0..5u64).collect::<Vec<_>>());

        engine.flush().await?;
        engine.stop().await
    }

    #[tokio::test]
    async fn the_one_where_autonomous_failures_are_only_logged() -> Result<()> {
        let observer = InMemoryTransport::failing(503);
        let engine = engine(&observer, 2, 100, 3_600_000);
        engine.start().await?;
        for n in 0..4 {
            engine.send(record(n)).await?;
        }
        // -- both size flushes failed, yet stop is clean: nobody is left to tell
        engine.stop().await?;
        assert_eq!(observer.payloads().await.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_many_producers_share_one_engine() -> Result<()> {
        let observer = InMemoryTransport::new();
        let engine = engine(&observer, 10, 50, 3_600_000);
        engine.start().await?;

        let producers = (0..4).map(|producer| {
            let handle = engine.clone();
            async move {
                for i in 0..25 {
                    handle.send(record(producer * 100 + i)).await?;
                }
                Ok::<(), Error>(())
            }
        });
        for outcome in join_all(producers).await {
            outcome?;
        }
        engine.stop().await?;

        let mut seen = numbers(&observer.records().await?);
        assert_eq!(seen.len(), 100);
        // -- each producer's own records keep their order
        for producer in 0..4u64 {
            let mine: Vec<u64> = seen.iter().copied().filter(|n| n / 100 == producer).collect();
            assert_eq!(mine, (0..25).map(|i| producer * 100 + i).collect::<Vec<_>>());
        }
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), 100);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_tiny_queue_pushes_back() -> Result<()> {
        let observer = InMemoryTransport::new();
        let engine = engine(&observer, 3, 1, 3_600_000);
        engine.start().await?;
        for n in 0..10 {
            engine.send(record(n)).await?;
        }
        engine.stop().await?;
        assert_eq!(numbers(&observer.records().await?), (0..10u64).collect::<Vec<_>>());
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_full_queue_makes_producers_wait() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        // -- one record per request, one seat in the queue
        let engine = http_engine(&server, 1, 1);
        engine.start().await?;
        // 🐌 record 0 is stuck in a slow request, record 1 takes the only seat
        engine.send(record(0)).await?;
        engine.send(record(1)).await?;

        let mut blocked = tokio::spawn({
            let engine = engine.clone();
            async move { engine.send(record(2)).await }
        });
        assert!(
            tokio::time::timeout(Duration::from_millis(100), &mut blocked)
                .await
                .is_err(),
            "💀 send should still be waiting for a seat"
        );

        engine.stop().await?;
        let outcome = blocked.await.expect("💀 producer task should not panic");
        assert!(matches!(outcome, Err(Error::Lifecycle(LifecycleError::NotRunning))));
        // -- everything accepted before the stop went out, the refused record did not
        assert_eq!(received_numbers(&server).await, vec![0, 1]);
        Ok(())
    }

    #[test]
    fn the_one_where_bad_knobs_get_defaults() {
        let config = AsyncBatchConfig {
            max_batch_size: 500,
            queue_capacity: 0,
            flush_interval_ms: 0,
        }
        .sanitized();
        assert_eq!(config, AsyncBatchConfig::default());
        assert_eq!(config.flush_interval(), Duration::from_secs(30));

        let parsed: AsyncBatchConfig = toml::from_str("max_batch_size = 5").expect("💀 partial config parses");
        assert_eq!(parsed.max_batch_size, 5);
        assert_eq!(parsed.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert_eq!(parsed.flush_interval_ms, DEFAULT_FLUSH_INTERVAL_MS);
    }

    #[test]
    fn the_one_where_states_have_names() {
        assert_eq!(EngineState::Running.to_string(), "running");
        assert_eq!(EngineState::from_u8(EngineState::Stopping as u8), EngineState::Stopping);
    }
}
