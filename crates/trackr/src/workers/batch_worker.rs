//! 🎬 *[a queue fills with base64. a timer ticks. somewhere, a stop signal waits its turn.]*
//!
//! 🪣 The BatchWorker: one task, one accumulator, four things to listen for.
//!
//! 🧠 Knowledge graph:
//! - stop signal → close intake, drain every queued record, final flush, exit
//! - flush request → pull whatever is already queued, flush, reply with the first failure (if any)
//! - record on intake → accumulate, flush when the batch is full
//! - timer tick → flush whatever is pending, partial batches included
//!
//! The `select!` is `biased` and listed in that order. Stop wins every tie, so once
//! `stop()` has spoken the worker never starts another idle wait.
//!
//! Autonomous flushes (size, timer, drain) only log their failures. The caller who
//! enqueued those records got `Ok` a long time ago and has moved on with their life.

use std::time::Duration;

use async_channel::Receiver;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, trace};

use super::Worker;
use crate::accumulator::Accumulator;
use crate::codec::RecordEncoder;
use crate::error::Result;
use crate::transport::TransportBackend;

/// 📬 How an explicit `flush()` gets its answer back out of the worker.
pub(crate) type FlushReply = oneshot::Sender<Result<()>>;

#[derive(Debug)]
pub(crate) struct BatchWorker {
    intake: Receiver<String>,
    stop_rx: oneshot::Receiver<()>,
    flush_rx: mpsc::Receiver<FlushReply>,
    accumulator: Accumulator,
    encoder: RecordEncoder,
    transport: TransportBackend,
    flush_interval: Duration,
}

impl BatchWorker {
    pub(crate) fn new(
        intake: Receiver<String>,
        stop_rx: oneshot::Receiver<()>,
        flush_rx: mpsc::Receiver<FlushReply>,
        max_batch_size: usize,
        encoder: RecordEncoder,
        transport: TransportBackend,
        flush_interval: Duration,
    ) -> Self {
        Self {
            intake,
            stop_rx,
            flush_rx,
            accumulator: Accumulator::new(max_batch_size),
            encoder,
            transport,
            flush_interval,
        }
    }

    /// Pushes one record and, when that fills the batch, sends it. `Ok(0)` means no request.
    async fn accept(&mut self, encoded: String) -> Result<usize> {
        self.accumulator.push(encoded);
        if !self.accumulator.is_full() {
            return Ok(0);
        }
        self.accumulator.flush_to(&self.encoder, &mut self.transport).await
    }

    async fn accept_logged(&mut self, encoded: String) {
        match self.accept(encoded).await {
            Ok(0) => {}
            outcome => log_flush("size", outcome),
        }
    }

    /// Moves everything already sitting in the queue into the accumulator without waiting.
    ///
    /// Full batches go out on the way. A failed one doesn't stop the pull, but the first
    /// failure is what comes back.
    async fn pull_queued(&mut self) -> Result<()> {
        let mut first_failure = None;
        while let Ok(encoded) = self.intake.try_recv() {
            match self.accept(encoded).await {
                Ok(_) => {}
                Err(e) => {
                    error!(error = %e, "💀 Batch flush failed during an explicit flush");
                    first_failure.get_or_insert(e);
                }
            }
        }
        first_failure.map_or(Ok(()), Err)
    }

    /// 🚽 An explicit flush: everything queued, then the remainder. Every batch is sent
    /// even after a failure.
    async fn flush_requested(&mut self) -> Result<()> {
        let pulled = self.pull_queued().await;
        let remainder = self
            .accumulator
            .flush_to(&self.encoder, &mut self.transport)
            .await
            .map(|_| ());
        pulled.and(remainder)
    }

    async fn flush_logged(&mut self, trigger: &'static str) {
        let outcome = self.accumulator.flush_to(&self.encoder, &mut self.transport).await;
        log_flush(trigger, outcome);
    }

    /// 🏁 Closes the intake to new records, then empties it.
    async fn drain_and_exit(&mut self) {
        self.intake.close();
        let mut drained = 0usize;
        while let Ok(encoded) = self.intake.recv().await {
            drained += 1;
            self.accept_logged(encoded).await;
        }
        debug!(drained, pending = self.accumulator.len(), "🚰 Intake drained, final flush");
        self.flush_logged("drain").await;
    }
}

fn log_flush(trigger: &'static str, outcome: Result<usize>) {
    match outcome {
        Ok(0) => trace!(trigger, "💤 Nothing to flush"),
        Ok(sent) => debug!(trigger, batch_len = sent, "✅ Batch delivered"),
        Err(e) => error!(
            trigger,
            error = %e,
            "💀 Batch flush failed. The records are gone, the worker carries on."
        ),
    }
}

impl Worker for BatchWorker {
    fn start(mut self) -> JoinHandle<Result<()>> {
        tokio::spawn(async move {
            debug!(
                max_batch_size = self.accumulator.max_batch_size(),
                flush_interval_ms = self.flush_interval.as_millis() as u64,
                "📥 BatchWorker started"
            );
            // ⏱️ first tick one full interval from now, not immediately
            let mut ticker = tokio::time::interval_at(Instant::now() + self.flush_interval, self.flush_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;

                    // -- an Err here means the engine was dropped without stop(); same exit either way
                    _ = &mut self.stop_rx => {
                        self.drain_and_exit().await;
                        debug!("🏁 BatchWorker stopped");
                        return Ok(());
                    }
                    Some(reply) = self.flush_rx.recv() => {
                        let outcome = self.flush_requested().await;
                        // -- the caller may have given up waiting; that's their business
                        let _ = reply.send(outcome);
                    }
                    received = self.intake.recv() => match received {
                        Ok(encoded) => self.accept_logged(encoded).await,
                        Err(_) => {
                            // 🔌 every sender is gone and the queue is empty
                            self.drain_and_exit().await;
                            debug!("🏁 BatchWorker: intake closed. Shutting down.");
                            return Ok(());
                        }
                    },
                    _ = ticker.tick() => self.flush_logged("timer").await,
                }
            }
        })
    }
}
