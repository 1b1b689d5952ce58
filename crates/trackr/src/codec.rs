//! 🎼 The codec: records in, wire payloads out.
//!
//! *[the record arrives. typed. validated. naked.]*
//! *["wrap me," it says. "base64 me. put me in an envelope."]*
//! *[we oblige. with brackets and commas assembled by hand, like artisans.]*
//!
//! 🧠 Knowledge graph:
//! - `RecordEncoder::encode`: `Record` → JSON → (gzip?) → base64. One string per record.
//! - `compose_single`: `{"data":"<b64>","gzip":0}` for the immediate and debug sinks
//! - `compose_batch`: `{"data_list":["<b64>",...],"gzip":0}` for everything that batches
//! - `decode_payload`: the reverse trip, for tests and for anyone debugging the wire
//!
//! ```text
//!   Record ──encode──▶ "eyJ0eXBlIjoi..." ──compose──▶ {"data_list":[...],"gzip":0} ──▶ Transport
//! ```
//!
//! Base64 only ever produces `A-Z a-z 0-9 + / =`, none of which need JSON escaping,
//! so the framing is plain string pushing. No serde was harmed in the making of the envelope.

use std::io::{Read, Write};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::record::Record;

/// 📦 Encodes records and frames them into request payloads.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordEncoder {
    gzip: bool,
}

impl RecordEncoder {
    pub fn new(gzip: bool) -> Self {
        Self { gzip }
    }

    pub fn gzip(&self) -> bool {
        self.gzip
    }

    fn gzip_flag(&self) -> u8 {
        u8::from(self.gzip)
    }

    /// 🔤 One record → one base64 string.
    ///
    /// Failures here mean the record could not be turned into bytes, which is a data
    /// problem, not a delivery problem, so they surface as `IllegalData`.
    pub fn encode(&self, record: &Record) -> Result<String> {
        let json = serde_json::to_vec(record)
            .map_err(|e| Error::illegal(format!("record could not be serialized: {e}")))?;

        let bytes = if self.gzip {
            let mut encoder = GzEncoder::new(Vec::with_capacity(json.len() / 2), Compression::default());
            encoder
                .write_all(&json)
                .and_then(|_| encoder.finish())
                .map_err(|e| Error::illegal(format!("record could not be compressed: {e}")))?
        } else {
            json
        };

        Ok(STANDARD.encode(bytes))
    }

    /// 📨 Envelope for exactly one encoded record.
    pub fn compose_single(&self, encoded: &str) -> String {
        // 🧮 {"data":"  +  encoded  +  ","gzip":N}
        let mut payload = String::with_capacity(encoded.len() + 20);
        payload.push_str(r#"{"data":""#);
        payload.push_str(encoded);
        payload.push_str(r#"","gzip":"#);
        payload.push_str(&self.gzip_flag().to_string());
        payload.push('}');
        payload
    }

    /// 📦 Envelope for a whole batch, in the order given.
    pub fn compose_batch(&self, encoded: &[String]) -> String {
        // 🧮 exact-ish capacity: quotes and commas per item, plus the fixed framing
        let estimated_size: usize = 32 + encoded.iter().map(|item| item.len() + 3).sum::<usize>();
        let mut payload = String::with_capacity(estimated_size);
        payload.push_str(r#"{"data_list":["#);
        for (i, item) in encoded.iter().enumerate() {
            if i > 0 {
                payload.push(',');
            }
            payload.push('"');
            payload.push_str(item);
            payload.push('"');
        }
        payload.push_str(r#"],"gzip":"#);
        payload.push_str(&self.gzip_flag().to_string());
        payload.push('}');
        payload
    }
}

/// 🔍 Unwraps a single or batch payload back into the JSON records it carries.
pub fn decode_payload(payload: &str) -> Result<Vec<Value>> {
    let envelope: Value = serde_json::from_str(payload)
        .map_err(|e| Error::illegal(format!("payload is not JSON: {e}")))?;
    let gzip = envelope.get("gzip").and_then(Value::as_u64) == Some(1);

    let encoded: Vec<&str> = match (envelope.get("data"), envelope.get("data_list")) {
        (Some(Value::String(single)), _) => vec![single.as_str()],
        (_, Some(Value::Array(list))) => list.iter().filter_map(Value::as_str).collect(),
        _ => return Err(Error::illegal("payload carries neither data nor data_list")),
    };

    encoded
        .into_iter()
        .map(|item| decode_record(item, gzip))
        .collect()
}

fn decode_record(encoded: &str, gzip: bool) -> Result<Value> {
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| Error::illegal(format!("record is not base64: {e}")))?;
    let json = if gzip {
        let mut inflated = Vec::new();
        GzDecoder::new(bytes.as_slice())
            .read_to_end(&mut inflated)
            .map_err(|e| Error::illegal(format!("record is not gzip: {e}")))?;
        inflated
    } else {
        bytes
    };
    serde_json::from_slice(&json).map_err(|e| Error::illegal(format!("record is not JSON: {e}")))
}
