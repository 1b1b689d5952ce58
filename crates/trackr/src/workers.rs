//! 🧵 Workers: the things that keep running after the caller has gone home.
//!
//! Right now there is exactly one: the batch worker behind the async sink. It owns the
//! intake queue's receiving end and the accumulator, and nobody else touches either.
//!
//! ⚠️ "If you're reading this, the worker is still draining. Let it finish."

use tokio::task::JoinHandle;

use crate::error::Result;

mod batch_worker;
pub(crate) use batch_worker::{BatchWorker, FlushReply};

/// 🏗️ A background worker, that does work. duh.
///
/// Consumes itself on start, so a worker can only ever run once.
pub(crate) trait Worker {
    /// 🚀 Spawn the worker. The handle resolves when the worker has fully exited.
    fn start(self) -> JoinHandle<Result<()>>;
}
