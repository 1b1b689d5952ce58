//! 🎯 The `Client`: the front door most callers will ever need.
//!
//! Validate, then deliver. A record that fails validation is returned as `IllegalData`
//! and never reaches the sink. Everything else goes wherever the sink sends it.
//!
//! ⚠️ A `Client` is not for sharing. Its session defaults (super properties) live
//! unguarded inside the validator. Wrap it in a lock if several tasks must use one.

use tracing::{debug, info};

use crate::app_config::AppConfig;
use crate::error::Result;
use crate::record::Record;
use crate::sinks::{Sink, SinkBackend};
use crate::validator::{Properties, RecordValidator};

#[derive(Debug)]
pub struct Client {
    validator: RecordValidator,
    sink: SinkBackend,
}

impl Client {
    pub fn new(validator: RecordValidator, sink: SinkBackend) -> Self {
        Self { validator, sink }
    }

    /// 🏗️ Validator and sink straight from configuration. An async consumer comes back running.
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let validator = RecordValidator::new(config.project.clone(), config.time_free)?;
        let sink = SinkBackend::from_config(config).await?;
        info!(consumer = config.consumer.name(), debug = config.debug, "🎯 Client ready");
        Ok(Self::new(validator, sink))
    }

    pub fn validator(&self) -> &RecordValidator {
        &self.validator
    }

    pub fn sink(&self) -> &SinkBackend {
        &self.sink
    }

    async fn deliver(&mut self, record: Record) -> Result<()> {
        debug!(kind = %record.kind, distinct_id = %record.distinct_id, "📨 Handing record to sink");
        self.sink.send(record).await
    }

    pub async fn track(
        &mut self,
        distinct_id: &str,
        event_name: &str,
        properties: Properties,
        is_login_id: bool,
    ) -> Result<()> {
        let record = self.validator.track(distinct_id, event_name, properties, is_login_id)?;
        self.deliver(record).await
    }

    /// 🔗 Ties the anonymous `original_id` to the registered `distinct_id`.
    pub async fn track_signup(&mut self, distinct_id: &str, original_id: &str, properties: Properties) -> Result<()> {
        let record = self.validator.track_signup(distinct_id, original_id, properties)?;
        self.deliver(record).await
    }

    pub async fn profile_set(&mut self, distinct_id: &str, properties: Properties, is_login_id: bool) -> Result<()> {
        let record = self.validator.profile_set(distinct_id, properties, is_login_id)?;
        self.deliver(record).await
    }

    pub async fn profile_set_once(&mut self, distinct_id: &str, properties: Properties, is_login_id: bool) -> Result<()> {
        let record = self.validator.profile_set_once(distinct_id, properties, is_login_id)?;
        self.deliver(record).await
    }

    pub async fn profile_increment(&mut self, distinct_id: &str, properties: Properties, is_login_id: bool) -> Result<()> {
        let record = self.validator.profile_increment(distinct_id, properties, is_login_id)?;
        self.deliver(record).await
    }

    pub async fn profile_append(&mut self, distinct_id: &str, properties: Properties, is_login_id: bool) -> Result<()> {
        let record = self.validator.profile_append(distinct_id, properties, is_login_id)?;
        self.deliver(record).await
    }

    pub async fn profile_unset(&mut self, distinct_id: &str, keys: Vec<String>, is_login_id: bool) -> Result<()> {
        let record = self.validator.profile_unset(distinct_id, keys, is_login_id)?;
        self.deliver(record).await
    }

    pub async fn profile_delete(&mut self, distinct_id: &str, is_login_id: bool) -> Result<()> {
        let record = self.validator.profile_delete(distinct_id, is_login_id)?;
        self.deliver(record).await
    }

    /// Merged into every event from now on. Caller properties still win per record.
    pub fn register_super_properties(&mut self, properties: Properties) {
        self.validator.register_defaults(properties);
    }

    /// Back to `$lib` and `$lib_version`, nothing else.
    pub fn clear_super_properties(&mut self) {
        self.validator.clear_defaults();
    }

    pub async fn flush(&mut self) -> Result<()> {
        self.sink.flush().await
    }

    /// 🗑️ Flushes and shuts the sink down. The client is gone afterwards.
    pub async fn close(mut self) -> Result<()> {
        info!("🗑️ Closing client");
        self.sink.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::RecordEncoder;
    use crate::sinks::{AsyncBatchConfig, AsyncBatchSink, BatchSink, ImmediateSink};
    use crate::transport::InMemoryTransport;
    use serde_json::{Map, Value, json};

    fn props(pairs: &[(&str, Value)]) -> Properties {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn client_with(sink: SinkBackend) -> Client {
        let validator = RecordValidator::new(Some("default".into()), false).expect("💀 project is valid");
        Client::new(validator, sink)
    }

    #[tokio::test]
    async fn the_one_where_a_login_goes_all_the_way_through() -> Result<()> {
        let observer = InMemoryTransport::new();
        let mut client = client_with(ImmediateSink::new(observer.clone().into(), RecordEncoder::default()).into());
        client.register_super_properties(props(&[("$app_version", json!("1.2.3"))]));

        client
            .track("abc123", "Login", props(&[("Age", json!(33))]), false)
            .await?;
        client.close().await?;

        let records = observer.records().await?;
        assert_eq!(records.len(), 1);
        let login = &records[0];
        assert_eq!(login["type"], "track");
        assert_eq!(login["distinct_id"], "abc123");
        assert_eq!(login["event"], "Login");
        assert_eq!(login["project"], "default");
        assert_eq!(login["properties"]["Age"], 33);
        assert_eq!(login["properties"]["$lib"], "rust");
        assert_eq!(login["lib"]["$app_version"], "1.2.3");
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_illegal_data_never_reaches_the_sink() {
        let observer = InMemoryTransport::new();
        let mut client = client_with(ImmediateSink::new(observer.clone().into(), RecordEncoder::default()).into());

        let err = client
            .track("u1", "Login", props(&[("1st", json!("nope"))]), false)
            .await
            .expect_err("💀 digit-led key must be rejected");
        assert!(err.is_illegal_data());
        let err = client
            .track("u1", "Login", props(&[("nested", json!({"a": 1}))]), false)
            .await
            .expect_err("💀 nested object must be rejected");
        assert!(err.is_illegal_data());
        let err = client
            .track_signup("u1", "", Map::new())
            .await
            .expect_err("💀 empty original id must be rejected");
        assert!(err.to_string().contains("original_id"));

        assert!(observer.payloads().await.is_empty());
    }

    #[tokio::test]
    async fn the_one_where_every_operation_lands_in_order() -> Result<()> {
        let observer = InMemoryTransport::new();
        let mut client = client_with(BatchSink::new(observer.clone().into(), RecordEncoder::default(), 50).into());

        client.track("u1", "Viewed", Map::new(), true).await?;
        client.track_signup("u1", "anon-7", Map::new()).await?;
        client.profile_set("u1", props(&[("name", json!("Ada"))]), true).await?;
        client.profile_set_once("u1", props(&[("first_seen", json!("today"))]), false).await?;
        client.profile_increment("u1", props(&[("visits", json!(1))]), false).await?;
        client.profile_append("u1", props(&[("tags", json!(["a", "b"]))]), false).await?;
        client.profile_unset("u1", vec!["name".into()], false).await?;
        client.profile_delete("u1", false).await?;
        assert!(observer.payloads().await.is_empty());

        client.flush().await?;
        let kinds: Vec<String> = observer
            .records()
            .await?
            .iter()
            .filter_map(|r| r["type"].as_str().map(str::to_string))
            .collect();
        assert_eq!(
            kinds,
            vec![
                "track",
                "track_signup",
                "profile_set",
                "profile_set_once",
                "profile_increment",
                "profile_append",
                "profile_unset",
                "profile_delete"
            ]
        );
        client.close().await
    }

    #[tokio::test]
    async fn the_one_where_the_async_engine_drains_on_close() -> Result<()> {
        let observer = InMemoryTransport::new();
        let engine = AsyncBatchSink::new(observer.clone().into(), RecordEncoder::default(), AsyncBatchConfig::default());
        engine.start().await?;
        let mut client = client_with(engine.into());

        for i in 0..30 {
            client.track("u1", "Tick", props(&[("i", json!(i))]), false).await?;
        }
        client.close().await?;

        let records = observer.records().await?;
        assert_eq!(records.len(), 30);
        assert_eq!(records[29]["properties"]["i"], 29);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_super_properties_come_and_go() -> Result<()> {
        let observer = InMemoryTransport::new();
        let mut client = client_with(ImmediateSink::new(observer.clone().into(), RecordEncoder::default()).into());

        client.register_super_properties(props(&[("plan", json!("gold"))]));
        client.track("u1", "A", Map::new(), false).await?;
        client.clear_super_properties();
        client.track("u1", "B", Map::new(), false).await?;

        let records = observer.records().await?;
        assert_eq!(records[0]["properties"]["plan"], "gold");
        assert!(records[1]["properties"].get("plan").is_none());
        assert_eq!(records[1]["properties"]["$lib"], "rust");
        Ok(())
    }
}
