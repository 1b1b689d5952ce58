//! 🛂 The Record Validator: passport control for analytics events.
//!
//! 🎬 COLD OPEN. INT. BORDER CHECKPOINT. 3:12 AM.
//! A raw event approaches the booth. Its `distinct_id` is 300 bytes long. Its timestamp
//! has nine digits. One of its properties is a nested map named `1st_try`.
//! The officer sighs, stamps `IllegalData` on it, and calls the next one.
//!
//! 🧠 Knowledge graph:
//! - Input: caller properties as `serde_json::Map` (dynamic, untrusted)
//! - Merged with: [`SessionDefaults`] ("super properties"), caller wins on collisions
//! - Output: a typed [`Record`] or `Error::IllegalData` with a human-readable cause
//! - Rules run in a fixed order and the first failure wins:
//!   distinct id → original id → timestamp → event name → project → properties
//! - `$time` is pulled out of the property bag before any rule runs
//!
//! ⚠️ No internal locking. Mutating the defaults takes `&mut self`, so sharing one
//! validator across threads needs an external lock. The borrow checker enforces the
//! rest. It is very good at this. Suspiciously good. 🦆

use std::collections::BTreeMap;
use std::sync::LazyLock;
use std::time::{SystemTime, UNIX_EPOCH};

use regex::Regex;
use serde_json::{Map, Value};
use tracing::trace;

use crate::error::{Error, Result};
use crate::record::{LibInfo, PropertyValue, Record, RecordKind};

/// 📦 Dynamic property input, straight from the caller.
pub type Properties = Map<String, Value>;

pub const LIB_NAME: &str = "rust";
pub const LIB_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const LIB_METHOD: &str = "code";

/// ⏱️ The reserved override property: "use this timestamp instead of now".
pub const TIME_OVERRIDE_KEY: &str = "$time";

const APP_VERSION_KEY: &str = "$app_version";
const SIGNUP_EVENT: &str = "$SignUp";

pub const MAX_ID_BYTES: usize = 255;
pub const MAX_KEY_BYTES: usize = 255;
pub const MAX_STRING_VALUE_BYTES: usize = 8192;

/// 🚫 Names the backend keeps for itself. Property keys and event names may not use them.
pub const RESERVED_KEYWORDS: &[&str] = &[
    "date",
    "datetime",
    "distinct_id",
    "event",
    "events",
    "first_id",
    "id",
    "original_id",
    "device_id",
    "properties",
    "second_id",
    "time",
    "user_id",
    "users",
];

static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"^[a-zA-Z_$][a-zA-Z0-9_$]{0,99}$").expect("failed creating regex")
});

/// 🔤 Identifier grammar: letter, `_` or `$` first, then up to 99 of letters/digits/`_`/`$`,
/// and not a reserved keyword.
pub fn is_valid_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name) && !RESERVED_KEYWORDS.contains(&name)
}

/// ⏱️ Wall-clock milliseconds since the epoch.
pub(crate) fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or_default()
}

// ============================================================
// 🎁 Session defaults
// ============================================================

/// 🎁 Properties merged into every event record from one validator.
///
/// Seeded with the library identity (`$lib`, `$lib_version`). `clear()` puts exactly
/// those two back and nothing else.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionDefaults {
    properties: Properties,
}

impl Default for SessionDefaults {
    fn default() -> Self {
        Self {
            properties: Self::library_identity(),
        }
    }
}

impl SessionDefaults {
    pub fn new() -> Self {
        Self::default()
    }

    fn library_identity() -> Properties {
        let mut identity = Map::new();
        identity.insert("$lib".to_string(), Value::from(LIB_NAME));
        identity.insert("$lib_version".to_string(), Value::from(LIB_VERSION));
        identity
    }

    /// 🔄 Merge new defaults in. The newcomer wins on key collision.
    pub fn register(&mut self, properties: Properties) {
        self.properties.extend(properties);
    }

    /// 🗑️ Back to factory settings.
    pub fn clear(&mut self) {
        self.properties = Self::library_identity();
    }

    pub fn as_map(&self) -> &Properties {
        &self.properties
    }

    /// Defaults underneath, caller on top. The defaults themselves are not touched.
    fn merged_under(&self, caller: Properties) -> Properties {
        let mut merged = self.properties.clone();
        merged.extend(caller);
        merged
    }

    fn app_version(&self) -> Option<String> {
        self.properties
            .get(APP_VERSION_KEY)
            .map(|version| match version {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
    }
}

// ============================================================
// 🛂 The validator
// ============================================================

/// 📝 A record before normalization. Fields are loose on purpose; `normalize` tightens them.
#[derive(Debug)]
struct Draft {
    kind: RecordKind,
    distinct_id: String,
    event_name: Option<String>,
    original_id: Option<String>,
    timestamp: Option<Value>,
    properties: Properties,
    unset_keys: Vec<String>,
    is_login_id: bool,
}

impl Draft {
    fn new(kind: RecordKind, distinct_id: &str, mut properties: Properties, is_login_id: bool) -> Self {
        // ⏱️ caller-supplied `$time` beats the wall clock, and never counts as a property
        let timestamp = properties
            .remove(TIME_OVERRIDE_KEY)
            .or_else(|| Some(Value::from(now_millis())));
        Self {
            kind,
            distinct_id: distinct_id.to_string(),
            event_name: None,
            original_id: None,
            timestamp,
            properties,
            unset_keys: Vec::new(),
            is_login_id,
        }
    }
}

/// 🛂 Turns raw calls into canonical [`Record`]s.
#[derive(Debug, Clone)]
pub struct RecordValidator {
    project: Option<String>,
    time_free: bool,
    defaults: SessionDefaults,
}

impl RecordValidator {
    /// 🚀 `project` is optional, but an empty one is a configuration mistake.
    pub fn new(project: Option<String>, time_free: bool) -> Result<Self> {
        if project.as_deref() == Some("") {
            return Err(Error::illegal("project name must not be empty"));
        }
        Ok(Self {
            project,
            time_free,
            defaults: SessionDefaults::new(),
        })
    }

    pub fn defaults(&self) -> &SessionDefaults {
        &self.defaults
    }

    pub fn register_defaults(&mut self, properties: Properties) {
        self.defaults.register(properties);
    }

    pub fn clear_defaults(&mut self) {
        self.defaults.clear();
    }

    /// 🎯 A behavioural event.
    pub fn track(
        &self,
        distinct_id: &str,
        event_name: &str,
        properties: Properties,
        is_login_id: bool,
    ) -> Result<Record> {
        let mut draft = Draft::new(
            RecordKind::Track,
            distinct_id,
            self.defaults.merged_under(properties),
            is_login_id,
        );
        draft.event_name = Some(event_name.to_string());
        self.normalize(draft)
    }

    /// 🔗 Ties the pre-registration identity `original_id` to `distinct_id`.
    pub fn track_signup(
        &self,
        distinct_id: &str,
        original_id: &str,
        properties: Properties,
    ) -> Result<Record> {
        let mut draft = Draft::new(
            RecordKind::TrackSignup,
            distinct_id,
            self.defaults.merged_under(properties),
            false,
        );
        draft.event_name = Some(SIGNUP_EVENT.to_string());
        draft.original_id = Some(original_id.to_string());
        self.normalize(draft)
    }

    pub fn profile_set(&self, distinct_id: &str, properties: Properties, is_login_id: bool) -> Result<Record> {
        self.profile(RecordKind::ProfileSet, distinct_id, properties, is_login_id)
    }

    pub fn profile_set_once(&self, distinct_id: &str, properties: Properties, is_login_id: bool) -> Result<Record> {
        self.profile(RecordKind::ProfileSetOnce, distinct_id, properties, is_login_id)
    }

    pub fn profile_increment(&self, distinct_id: &str, properties: Properties, is_login_id: bool) -> Result<Record> {
        self.profile(RecordKind::ProfileIncrement, distinct_id, properties, is_login_id)
    }

    pub fn profile_append(&self, distinct_id: &str, properties: Properties, is_login_id: bool) -> Result<Record> {
        self.profile(RecordKind::ProfileAppend, distinct_id, properties, is_login_id)
    }

    /// 🗑️ Removes the named profile properties.
    pub fn profile_unset(&self, distinct_id: &str, keys: Vec<String>, is_login_id: bool) -> Result<Record> {
        let mut draft = Draft::new(RecordKind::ProfileUnset, distinct_id, Map::new(), is_login_id);
        draft.unset_keys = keys;
        self.normalize(draft)
    }

    /// 💀 Removes the whole profile.
    pub fn profile_delete(&self, distinct_id: &str, is_login_id: bool) -> Result<Record> {
        self.profile(RecordKind::ProfileDelete, distinct_id, Map::new(), is_login_id)
    }

    fn profile(
        &self,
        kind: RecordKind,
        distinct_id: &str,
        properties: Properties,
        is_login_id: bool,
    ) -> Result<Record> {
        self.normalize(Draft::new(kind, distinct_id, properties, is_login_id))
    }

    fn lib_info(&self) -> LibInfo {
        LibInfo {
            lib: LIB_NAME.to_string(),
            lib_version: LIB_VERSION.to_string(),
            lib_method: LIB_METHOD.to_string(),
            app_version: self.defaults.app_version(),
        }
    }

    /// 🧹 The rulebook. Order matters: the first failure is the one you hear about.
    fn normalize(&self, draft: Draft) -> Result<Record> {
        check_id("distinct_id", &draft.distinct_id)?;
        if let Some(original_id) = &draft.original_id {
            check_id("original_id", original_id)?;
        }

        let timestamp = normalize_timestamp(draft.timestamp.as_ref())?;

        match (&draft.event_name, draft.kind.is_event()) {
            (Some(event), true) if !is_valid_identifier(event) => {
                return Err(Error::illegal(format!(
                    "event name must be a valid variable name. [event={event}]"
                )));
            }
            (Some(_), true) | (None, false) => {}
            (Some(event), false) => {
                return Err(Error::illegal(format!(
                    "{} records do not carry an event name. [event={event}]",
                    draft.kind
                )));
            }
            (None, true) => {
                return Err(Error::illegal(format!("{} records need an event name", draft.kind)));
            }
        }
        if let Some(project) = &self.project {
            if !is_valid_identifier(project) {
                return Err(Error::illegal(format!(
                    "project name must be a valid variable name. [project={project}]"
                )));
            }
        }

        let mut properties = BTreeMap::new();
        for (key, value) in draft.properties {
            check_property_key(&key)?;
            let value = normalize_value(&key, value)?;
            properties.insert(key, value);
        }
        for key in &draft.unset_keys {
            check_property_key(key)?;
        }

        trace!(
            "✅ {} record for [{}] passed passport control",
            draft.kind, draft.distinct_id
        );
        Ok(Record {
            kind: draft.kind,
            distinct_id: draft.distinct_id,
            event_name: draft.event_name,
            original_id: draft.original_id,
            timestamp,
            properties,
            unset_keys: draft.unset_keys,
            project: self.project.clone(),
            lib: self.lib_info(),
            time_free: self.time_free,
            is_login_id: draft.is_login_id,
        })
    }
}

fn check_id(field: &str, id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(Error::illegal(format!("property [{field}] must not be empty")));
    }
    if id.len() > MAX_ID_BYTES {
        return Err(Error::illegal(format!(
            "the max length of property [{field}] is {MAX_ID_BYTES}"
        )));
    }
    Ok(())
}

/// ⏱️ Integer only; 10 digits means seconds (scaled ×1000), 13 digits means milliseconds.
fn normalize_timestamp(timestamp: Option<&Value>) -> Result<i64> {
    let Some(timestamp) = timestamp else {
        return Err(Error::illegal("property [time] must not be empty"));
    };
    let Some(ts) = timestamp.as_i64() else {
        return Err(Error::illegal("property [time] must be an integer"));
    };
    let digits = if ts > 0 { ts.to_string().len() } else { 0 };
    match digits {
        10 => Ok(ts * 1000),
        11..=13 => Ok(ts),
        _ => Err(Error::illegal(format!(
            "property [time] must be a timestamp in seconds or milliseconds. [time={ts}]"
        ))),
    }
}

fn check_property_key(key: &str) -> Result<()> {
    if key.len() > MAX_KEY_BYTES {
        return Err(Error::illegal(format!(
            "the max length of property key is {MAX_KEY_BYTES}. [key={key}]"
        )));
    }
    if !is_valid_identifier(key) {
        return Err(Error::illegal(format!(
            "the property key must be a valid variable name. [key={key}]"
        )));
    }
    Ok(())
}

fn normalize_value(key: &str, value: Value) -> Result<PropertyValue> {
    match value {
        Value::String(s) if s.len() > MAX_STRING_VALUE_BYTES => Err(Error::illegal(format!(
            "the max length of property value is {MAX_STRING_VALUE_BYTES}. [key={key}]"
        ))),
        Value::String(s) => Ok(PropertyValue::String(s)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(PropertyValue::Int(i))
            } else if n.is_u64() {
                Err(Error::illegal(format!(
                    "property value is out of the integer range. [key={key}]"
                )))
            } else {
                n.as_f64().map(PropertyValue::Float).ok_or_else(|| {
                    Error::illegal(format!("property value is not a finite number. [key={key}]"))
                })
            }
        }
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => Ok(s),
                other => Err(Error::illegal(format!(
                    "list property values must contain only strings. [key={key}, item={other}]"
                ))),
            })
            .collect::<Result<Vec<_>>>()
            .map(PropertyValue::StringList),
        other => Err(Error::illegal(format!(
            "property value must be a str/int/float/list. [key={key}, value={other}]"
        ))),
    }
}
