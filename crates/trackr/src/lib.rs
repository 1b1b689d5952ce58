//! 📊 trackr: validate analytics events, then get them to the ingestion endpoint.
//!
//! 🧠 Knowledge graph:
//! ```text
//!   Client ─▶ RecordValidator ─▶ Record ─▶ Sink ─▶ (Accumulator / BatchWorker) ─▶ Transport
//! ```
//! - `validator`: naming, size and type rules; session defaults (super properties)
//! - `codec`: record → base64(JSON) → `{"data":..}` / `{"data_list":[..]}`
//! - `sinks`: immediate, local batch, async batching engine, debug
//! - `transport`: HTTP via reqwest, or an in-memory stand-in for tests
//! - `app_config`: figment-powered TOML + TRACKR_* env loading
//!
//! 🦆 The duck validates nothing. It just watches.

pub mod app_config;
pub mod client;
pub mod codec;
pub mod error;
pub mod record;
pub mod sinks;
pub mod transport;
pub mod validator;

mod accumulator;
mod workers;

pub use app_config::{AppConfig, ConsumerConfig, load_config};
pub use client::Client;
pub use error::{DeliveryError, Error, LifecycleError, Result};
pub use record::{PropertyValue, Record, RecordKind};
pub use sinks::{AsyncBatchSink, BatchSink, DebugSink, EngineState, ImmediateSink, Sink, SinkBackend};
pub use transport::{HttpTransport, InMemoryTransport, Transport, TransportBackend};
pub use validator::{Properties, RecordValidator};
