//! Location payload decoding.
//!
//! A payload is a single JSON object or a non-empty array of objects. Each
//! object maps onto a [`LocationRecord`] using the v1 field names:
//!
//! | field         | aliases                      | default       |
//! |---------------|------------------------------|---------------|
//! | `latitude`    | `lat`                        | `0.0`         |
//! | `longitude`   | `lon`, `lng`                 | `0.0`         |
//! | `altitude`    |                              | `0.0`         |
//! | `accuracy`    |                              | `0.0`         |
//! | `speed`       |                              | `0.0`         |
//! | `timestamp`   | `time`                       | receipt time  |
//! | `networkType` | `net_type`, `network_type`   | `""`          |
//! | `signalLevel` | `signal_lvl`, `signal_level` | `""`          |
//!
//! `null` counts as absent. Unknown fields are ignored.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::fmt;

/// Bytes of payload shown on each side of a parse error position.
const CONTEXT_RADIUS: usize = 32;

const NAIVE_TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// A validated location reading.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationRecord {
    /// When the reading was taken, as reported by the client.
    pub timestamp: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub accuracy: f64,
    pub speed: f64,
    pub network_type: String,
    pub signal_level: String,
}

/// Result of decoding one payload; the shape is fixed here so nothing
/// downstream inspects JSON types.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedPayload {
    Single(LocationRecord),
    Batch(Vec<LocationRecord>),
}

impl DecodedPayload {
    pub fn len(&self) -> usize {
        match self {
            DecodedPayload::Single(_) => 1,
            DecodedPayload::Batch(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_records(self) -> Vec<LocationRecord> {
        match self {
            DecodedPayload::Single(record) => vec![record],
            DecodedPayload::Batch(records) => records,
        }
    }
}

/// A payload that could not be turned into location records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeError {
    reason: String,
    /// Byte offset into the payload where parsing failed, when known.
    offset: Option<usize>,
    /// Bounded excerpt of the payload around `offset`.
    context: Option<String>,
}

impl DecodeError {
    pub fn new(reason: impl Into<String>) -> Self {
        DecodeError {
            reason: reason.into(),
            offset: None,
            context: None,
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn offset(&self) -> Option<usize> {
        self.offset
    }

    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    fn from_json(payload: &str, err: &serde_json::Error) -> Self {
        let message = err.to_string();
        // serde_json appends " at line L column C"; the byte offset replaces it.
        let message = match message.rsplit_once(" at line ") {
            Some((head, _)) if err.line() > 0 => head.to_owned(),
            _ => message,
        };
        let offset = (err.line() > 0).then(|| byte_offset(payload, err.line(), err.column()));
        DecodeError {
            reason: format!("malformed payload: {message}"),
            offset,
            context: offset.map(|at| excerpt(payload, at)),
        }
    }

    fn in_record(mut self, index: usize) -> Self {
        self.reason = format!("record {}: {}", index + 1, self.reason);
        self
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.reason)?;
        if let Some(offset) = self.offset {
            write!(f, " at byte {offset}")?;
        }
        if let Some(context) = &self.context {
            write!(f, " near '{context}'")?;
        }
        Ok(())
    }
}

impl std::error::Error for DecodeError {}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decode a payload, defaulting missing timestamps to now.
pub fn decode(payload: &str) -> Result<DecodedPayload, DecodeError> {
    decode_at(payload, Utc::now())
}

/// Decode a payload, defaulting missing timestamps to `received`.
pub fn decode_at(payload: &str, received: DateTime<Utc>) -> Result<DecodedPayload, DecodeError> {
    let document: Value =
        serde_json::from_str(payload).map_err(|e| DecodeError::from_json(payload, &e))?;

    match document {
        Value::Object(_) => record_from_value(document, received).map(DecodedPayload::Single),
        Value::Array(items) => {
            if items.is_empty() {
                return Err(DecodeError::new("empty batch"));
            }
            items
                .into_iter()
                .enumerate()
                .map(|(i, item)| {
                    if !item.is_object() {
                        return Err(DecodeError::new("unsupported payload shape"));
                    }
                    record_from_value(item, received).map_err(|e| e.in_record(i))
                })
                .collect::<Result<Vec<_>, _>>()
                .map(DecodedPayload::Batch)
        }
        _ => Err(DecodeError::new("unsupported payload shape")),
    }
}

fn record_from_value(value: Value, received: DateTime<Utc>) -> Result<LocationRecord, DecodeError> {
    let wire: WireLocation =
        serde_json::from_value(value).map_err(|e| DecodeError::new(e.to_string()))?;

    let timestamp = match wire.timestamp {
        Some(ts) => ts.resolve()?,
        None => received,
    };

    Ok(LocationRecord {
        timestamp,
        latitude: wire.latitude.unwrap_or(0.0),
        longitude: wire.longitude.unwrap_or(0.0),
        altitude: wire.altitude.unwrap_or(0.0),
        accuracy: wire.accuracy.unwrap_or(0.0),
        speed: wire.speed.unwrap_or(0.0),
        network_type: wire.network_type.unwrap_or_default(),
        signal_level: wire.signal_level.unwrap_or_default(),
    })
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct WireLocation {
    #[serde(default, alias = "lat")]
    latitude: Option<f64>,
    #[serde(default, alias = "lon", alias = "lng")]
    longitude: Option<f64>,
    #[serde(default)]
    altitude: Option<f64>,
    #[serde(default)]
    accuracy: Option<f64>,
    #[serde(default)]
    speed: Option<f64>,
    #[serde(default, alias = "time")]
    timestamp: Option<WireTimestamp>,
    #[serde(
        default,
        rename = "networkType",
        alias = "net_type",
        alias = "network_type",
        deserialize_with = "text_or_number"
    )]
    network_type: Option<String>,
    #[serde(
        default,
        rename = "signalLevel",
        alias = "signal_lvl",
        alias = "signal_level",
        deserialize_with = "text_or_number"
    )]
    signal_level: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireTimestamp {
    Millis(f64),
    Text(String),
}

impl WireTimestamp {
    fn resolve(self) -> Result<DateTime<Utc>, DecodeError> {
        match self {
            WireTimestamp::Millis(ms) => from_millis(ms),
            WireTimestamp::Text(text) => parse_timestamp_text(text.trim()),
        }
    }
}

fn from_millis(ms: f64) -> Result<DateTime<Utc>, DecodeError> {
    if !ms.is_finite() {
        return Err(DecodeError::new("invalid timestamp"));
    }
    DateTime::from_timestamp_millis(ms.trunc() as i64)
        .ok_or_else(|| DecodeError::new("timestamp out of range"))
}

fn parse_timestamp_text(text: &str) -> Result<DateTime<Utc>, DecodeError> {
    if let Ok(ms) = text.parse::<f64>() {
        return from_millis(ms);
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Ok(ts.with_timezone(&Utc));
    }
    NAIVE_TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| {
            DecodeError::new(format!(
                "invalid timestamp '{}'",
                clip(text, CONTEXT_RADIUS)
            ))
        })
}

/// Free-text fields; older clients send signal levels as numbers.
fn text_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(other) => Err(D::Error::custom(format!(
            "expected text, found {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ---------------------------------------------------------------------------
// Error position helpers
// ---------------------------------------------------------------------------

/// Convert serde_json's 1-based line/column into a byte offset.
fn byte_offset(payload: &str, line: usize, column: usize) -> usize {
    let line_start: usize = payload
        .split_inclusive('\n')
        .take(line.saturating_sub(1))
        .map(str::len)
        .sum();
    (line_start + column.saturating_sub(1)).min(payload.len())
}

fn excerpt(payload: &str, at: usize) -> String {
    let start = floor_char_boundary(payload, at.saturating_sub(CONTEXT_RADIUS));
    let end = floor_char_boundary(payload, (at + CONTEXT_RADIUS).min(payload.len()));
    payload[start..end].replace(['\r', '\n'], " ")
}

fn clip(text: &str, max: usize) -> &str {
    &text[..floor_char_boundary(text, max.min(text.len()))]
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}
