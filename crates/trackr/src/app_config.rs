//! 🔧 App Configuration: the sacred TOML-to-struct pipeline.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Behind the fridge.
//! In the junk drawer. Nothing." (every developer at 3am) 🦆
//!
//! 🏗️ Powered by Figment, because manually parsing env vars is a form of
//! self-harm that even the borrow checker wouldn't approve of.

use std::path::Path;

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use tracing::info;

use crate::sinks::{AsyncBatchConfig, BatchSinkConfig};
use crate::transport::TransportConfig;

/// 📦 Everything a `Client` needs to know about where records go and how.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// 📡 The ingestion endpoint, query string and all.
    pub server_url: String,
    /// Must be a valid identifier when present. Empty is rejected when the client is built.
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub time_free: bool,
    /// 🗜️ Gzip each encoded record before base64.
    #[serde(default)]
    pub gzip: bool,
    /// 🔍 Route everything through the debug sink, one request per record.
    #[serde(default)]
    pub debug: bool,
    /// 🧪 Debug sink only: validate without persisting.
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub consumer: ConsumerConfig,
}

/// 🎭 Which sink delivers the records.
///
/// figment's env provider lowercases keys, so `TRACKR_CONSUMER__ASYNC__...` arrives as
/// `async`. Every variant answers to its lowercase name too.
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub enum ConsumerConfig {
    /// One request per record, on the caller's time.
    #[default]
    #[serde(alias = "immediate")]
    Immediate,
    /// A local bucket flushed on the caller's time when full.
    #[serde(alias = "batch")]
    Batch(BatchSinkConfig),
    /// The background batching engine.
    #[serde(alias = "AsyncBatch", alias = "async", alias = "async_batch")]
    Async(AsyncBatchConfig),
}

impl ConsumerConfig {
    pub fn name(&self) -> &'static str {
        match self {
            ConsumerConfig::Immediate => "immediate",
            ConsumerConfig::Batch(_) => "batch",
            ConsumerConfig::Async(_) => "async",
        }
    }
}

/// 🚀 Load the config: from a file, from env vars, or from the sheer power of hoping.
///
/// 🔧 Merges environment variables (TRACKR_*) with an optional TOML file.
///   - `None` → env vars only.
///   - `Some(path)` → env vars + TOML file, merged. TOML wins on conflicts.
///
/// 💀 Returns an error if the config is unparseable, with context saying where we looked.
pub fn load_config(config_file_name: Option<&Path>) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {:#?}",
        config_file_name.unwrap_or(Path::new(""))
    );

    // -- nested keys come in as TRACKR_TRANSPORT__CONNECT_TIMEOUT_MS and friends
    let config = Figment::new().merge(Env::prefixed("TRACKR_").split("__"));
    let config = match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    };

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables (TRACKR_*). \
             The file exists in our hearts, but apparently not on disk.",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables (TRACKR_*). \
                 No file was provided, so this one's all on the environment. Classic."
            .to_string(),
    };

    config.extract().context(context_msg)
}
