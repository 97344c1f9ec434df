//! Remote snapshots
//!
//! A [`Snapshot`] is one atomic read of remote device/API state: a flat map
//! of field name to raw value. Snapshots are created fresh on every fetch,
//! shared read-only between sibling sensors, and replaced (never merged) by
//! the next fetch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::error::{Error, Result};

/// Immutable field map read from a remote source at one point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    fields: HashMap<String, Value>,
    fetched_at: DateTime<Utc>,
}

impl Snapshot {
    /// Create a snapshot stamped with the current time
    pub fn new(fields: HashMap<String, Value>) -> Self {
        Self {
            fields,
            fetched_at: Utc::now(),
        }
    }

    /// Build a snapshot from `(field, value)` pairs
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self::new(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Build a snapshot from a JSON object
    ///
    /// Returns [`Error::MalformedSnapshot`] when `value` is not an object.
    pub fn from_json_object(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self::new(map.into_iter().collect())),
            other => Err(Error::malformed(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Look up a raw field
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Whether the snapshot carries `field`
    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// All fields, in no particular order
    pub fn fields(&self) -> &HashMap<String, Value> {
        &self.fields
    }

    /// When the remote read completed
    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the snapshot has no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
