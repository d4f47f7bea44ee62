//! Documents: field maps identified by (collection, id).

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::id::DocumentId;

/// Field name → value mapping of a document.
///
/// A `BTreeMap` keeps field iteration order stable, which keeps diffs and
/// logged payloads deterministic.
pub type Fields = BTreeMap<String, FieldValue>;

/// A single field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Null,
    Bool(bool),
    Integer(i64),
    Double(f64),
    String(String),
    Timestamp(DateTime<Utc>),
    Array(Vec<FieldValue>),
    Map(BTreeMap<String, FieldValue>),
    /// Write-only sentinel: the store replaces it with its own commit time.
    ///
    /// Never observed in a read.
    ServerTimestamp,
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            FieldValue::Timestamp(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, FieldValue>> {
        match self {
            FieldValue::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[FieldValue]> {
        match self {
            FieldValue::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Value identity as stored data: doubles compare by bit pattern, so a
    /// `NaN` equals itself and `0.0` differs from `-0.0`.
    pub fn same_as(&self, other: &FieldValue) -> bool {
        match (self, other) {
            (FieldValue::Double(a), FieldValue::Double(b)) => a.to_bits() == b.to_bits(),
            (FieldValue::Array(a), FieldValue::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same_as(y))
            }
            (FieldValue::Map(a), FieldValue::Map(b)) => fields_same(a, b),
            _ => self == other,
        }
    }

    /// Replace every `ServerTimestamp` sentinel (recursively) with `now`.
    pub fn resolve_server_timestamps(&mut self, now: DateTime<Utc>) {
        match self {
            FieldValue::ServerTimestamp => *self = FieldValue::Timestamp(now),
            FieldValue::Array(items) => items
                .iter_mut()
                .for_each(|v| v.resolve_server_timestamps(now)),
            FieldValue::Map(map) => map
                .values_mut()
                .for_each(|v| v.resolve_server_timestamps(now)),
            _ => {}
        }
    }

    /// Plain JSON rendering (timestamps as RFC 3339 strings).
    pub fn to_json(&self) -> JsonValue {
        match self {
            FieldValue::Null | FieldValue::ServerTimestamp => JsonValue::Null,
            FieldValue::Bool(b) => JsonValue::Bool(*b),
            FieldValue::Integer(i) => JsonValue::from(*i),
            FieldValue::Double(d) => JsonValue::from(*d),
            FieldValue::String(s) => JsonValue::String(s.clone()),
            FieldValue::Timestamp(t) => {
                JsonValue::String(t.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
            FieldValue::Array(items) => {
                JsonValue::Array(items.iter().map(FieldValue::to_json).collect())
            }
            FieldValue::Map(map) => fields_to_json(map),
        }
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Double(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::String(value)
    }
}

impl From<&DocumentId> for FieldValue {
    fn from(value: &DocumentId) -> Self {
        FieldValue::String(value.as_str().to_string())
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(value)
    }
}

impl From<Vec<FieldValue>> for FieldValue {
    fn from(value: Vec<FieldValue>) -> Self {
        FieldValue::Array(value)
    }
}

impl From<Fields> for FieldValue {
    fn from(value: Fields) -> Self {
        FieldValue::Map(value)
    }
}

/// Build a field map from `(name, value)` pairs.
pub fn fields<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Fields
where
    K: Into<String>,
    V: Into<FieldValue>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// [`FieldValue::same_as`] lifted to whole field maps.
pub fn fields_same(a: &Fields, b: &Fields) -> bool {
    a.len() == b.len()
        && a.iter()
            .zip(b)
            .all(|((ka, va), (kb, vb))| ka == kb && va.same_as(vb))
}

pub fn fields_to_json(fields: &Fields) -> JsonValue {
    JsonValue::Object(
        fields
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect(),
    )
}

/// A stored document snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub fields: Fields,
    pub update_time: DateTime<Utc>,
}

impl Document {
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    /// String field lookup; `None` when absent or not a string.
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(FieldValue::as_str)
    }
}
