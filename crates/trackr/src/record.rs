//! 📦 The canonical record, the one shape every event and profile mutation is squeezed into
//! before it is allowed anywhere near a sink.
//!
//! 🎬 *[a raw event walks in. loose properties. questionable timestamp. no ID.]*
//! *[it leaves as a `Record`. typed. normalized. ready for the wire.]*
//!
//! 🧠 Knowledge graph:
//! - Built by: `validator::RecordValidator` (the only constructor that matters)
//! - Consumed by: `codec::RecordEncoder` (turns it into base64 JSON) and then a `Sink`
//! - Never retained after encoding. A record lives exactly as long as one `send()`.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};

/// 🏷️ What kind of thing this record is. Serializes to the `type` field on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Track,
    TrackSignup,
    ProfileSet,
    ProfileSetOnce,
    ProfileIncrement,
    ProfileAppend,
    ProfileUnset,
    ProfileDelete,
}

impl RecordKind {
    /// 🎯 Only the two event kinds carry an `event` name.
    pub fn is_event(self) -> bool {
        matches!(self, RecordKind::Track | RecordKind::TrackSignup)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RecordKind::Track => "track",
            RecordKind::TrackSignup => "track_signup",
            RecordKind::ProfileSet => "profile_set",
            RecordKind::ProfileSetOnce => "profile_set_once",
            RecordKind::ProfileIncrement => "profile_increment",
            RecordKind::ProfileAppend => "profile_append",
            RecordKind::ProfileUnset => "profile_unset",
            RecordKind::ProfileDelete => "profile_delete",
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 🎭 A property value, closed over the four shapes the backend accepts.
///
/// Anything else (maps, booleans, nulls, lists of numbers) is turned away by the
/// validator long before it gets here. Untagged on the wire: a string is a string.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PropertyValue {
    String(String),
    Int(i64),
    Float(f64),
    StringList(Vec<String>),
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::String(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::String(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Int(value)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        PropertyValue::Float(value)
    }
}

impl From<Vec<String>> for PropertyValue {
    fn from(value: Vec<String>) -> Self {
        PropertyValue::StringList(value)
    }
}

/// 📚 Library metadata attached to every record's `lib` field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LibInfo {
    #[serde(rename = "$lib")]
    pub lib: String,
    #[serde(rename = "$lib_version")]
    pub lib_version: String,
    #[serde(rename = "$lib_method")]
    pub lib_method: String,
    #[serde(rename = "$app_version", skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,
}

/// 🎯 One normalized event or profile mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub kind: RecordKind,
    pub distinct_id: String,
    /// Present only for `track` / `track_signup`.
    pub event_name: Option<String>,
    /// Present only for `track_signup`.
    pub original_id: Option<String>,
    /// Milliseconds since the epoch. Always. Seconds got scaled on the way in.
    pub timestamp: i64,
    pub properties: BTreeMap<String, PropertyValue>,
    /// Keys removed by `profile_unset`; rendered as `"key": true`.
    pub unset_keys: Vec<String>,
    pub project: Option<String>,
    pub lib: LibInfo,
    pub time_free: bool,
    /// Rendered as `"$is_login_id": true` inside `properties`.
    pub is_login_id: bool,
}

/// 📡 The exact JSON shape the ingestion endpoint expects.
#[derive(Serialize)]
struct WireRecord<'a> {
    #[serde(rename = "type")]
    kind: RecordKind,
    time: i64,
    distinct_id: &'a str,
    properties: Map<String, Value>,
    lib: &'a LibInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    project: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    event: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    original_id: Option<&'a str>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    time_free: bool,
}

impl Serialize for Record {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // 🔧 flatten the typed properties back into plain JSON, then sprinkle in the flags
        let mut properties = Map::new();
        for (key, value) in &self.properties {
            let value = serde_json::to_value(value).map_err(serde::ser::Error::custom)?;
            properties.insert(key.clone(), value);
        }
        for key in &self.unset_keys {
            properties.insert(key.clone(), Value::Bool(true));
        }
        if self.is_login_id {
            properties.insert("$is_login_id".to_string(), Value::Bool(true));
        }

        WireRecord {
            kind: self.kind,
            time: self.timestamp,
            distinct_id: &self.distinct_id,
            properties,
            lib: &self.lib,
            project: self.project.as_deref(),
            event: self.event_name.as_deref(),
            original_id: self.original_id.as_deref(),
            time_free: self.time_free,
        }
        .serialize(serializer)
    }
}
