//! Field projection
//!
//! [`project`] turns a shared [`Snapshot`] into one sensor's displayed value
//! and attributes according to its [`SensorDescriptor`]. Projection is pure
//! and total: it performs no I/O, never panics on absent or oddly typed
//! fields, and gives the same output for the same inputs.
//!
//! ## Transforms
//!
//! - [`Transform::Scale`]: divide a numeric field and round to a fixed
//!   precision (e.g. bytes/s → Mbit/s with divisor 125000)
//! - [`Transform::OnOff`]: map `1`/`0` flags to `"on"`/`"off"`
//! - [`Transform::Integer`]: coerce to an integer count
//! - [`Transform::PassThrough`]: free text, unchanged
//!
//! Values a transform cannot interpret become [`StateValue::Unknown`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

use crate::snapshot::{Snapshot, json_kind};

/// Attribute key carrying the data provenance string
pub const ATTR_ATTRIBUTION: &str = "attribution";

/// Label for an enabled flag
pub const STATE_ON: &str = "on";

/// Label for a disabled flag
pub const STATE_OFF: &str = "off";

/// A sensor's displayed state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StateValue {
    /// Integer count
    Integer(i64),
    /// Scaled measurement
    Number(f64),
    /// Text or on/off label
    Text(String),
    /// Field absent or not interpretable
    Unknown,
}

impl StateValue {
    /// Whether the state carries a value
    pub fn is_known(&self) -> bool {
        !matches!(self, StateValue::Unknown)
    }

    /// Text content, if this is a text state
    pub fn as_text(&self) -> Option<&str> {
        match self {
            StateValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric content, if this is a numeric state
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            StateValue::Integer(i) => Some(*i as f64),
            StateValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl std::fmt::Display for StateValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StateValue::Integer(i) => write!(f, "{}", i),
            StateValue::Number(n) => write!(f, "{}", n),
            StateValue::Text(s) => f.write_str(s),
            StateValue::Unknown => f.write_str("unknown"),
        }
    }
}

/// Per-field transform applied to a sensor's primary field
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Transform {
    /// `round(raw / divisor, precision)`
    Scale {
        /// Unit divisor (must be non-zero and finite)
        divisor: f64,
        /// Decimal places kept
        precision: u32,
    },
    /// `1` → `"on"`, `0` → `"off"`, anything else → unknown
    OnOff,
    /// Integer count; floats truncate toward zero
    Integer,
    /// Free text, unchanged
    PassThrough,
}

/// Which snapshot fields a sensor exposes as attributes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AttributePolicy {
    /// No attributes at all
    Hidden,
    /// Every snapshot field except the excluded keys
    Snapshot {
        /// Keys never shown as attributes
        exclude: BTreeSet<String>,
    },
}

/// Static description of one sensor kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorDescriptor {
    /// Sensor kind (e.g. "download_speed", "2g_wifi", "activity")
    pub kind: String,
    /// Display name, used unless `name_field` resolves
    pub name: String,
    /// Snapshot field holding the display name
    #[serde(default)]
    pub name_field: Option<String>,
    /// Unit of measurement
    #[serde(default)]
    pub unit: Option<String>,
    /// Frontend icon
    #[serde(default)]
    pub icon: Option<String>,
    /// Snapshot field surfaced as the state
    pub primary_field: String,
    /// Transform applied to the primary field
    pub transform: Transform,
    /// Attribute selection
    pub attributes: AttributePolicy,
    /// Provenance string added under [`ATTR_ATTRIBUTION`]
    #[serde(default)]
    pub attribution: Option<String>,
}

impl SensorDescriptor {
    /// Create a descriptor without unit, icon or attributes
    pub fn new(
        kind: impl Into<String>,
        name: impl Into<String>,
        primary_field: impl Into<String>,
        transform: Transform,
    ) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            name_field: None,
            unit: None,
            icon: None,
            primary_field: primary_field.into(),
            transform,
            attributes: AttributePolicy::Hidden,
            attribution: None,
        }
    }

    /// Set the unit of measurement
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Set the frontend icon
    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    /// Expose snapshot fields as attributes, minus `exclude`
    pub fn with_attributes<I, S>(mut self, exclude: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes = AttributePolicy::Snapshot {
            exclude: exclude.into_iter().map(Into::into).collect(),
        };
        self
    }

    /// Add a provenance attribute
    pub fn with_attribution(mut self, attribution: impl Into<String>) -> Self {
        self.attribution = Some(attribution.into());
        self
    }

    /// Take the display name from a snapshot field
    pub fn with_name_field(mut self, field: impl Into<String>) -> Self {
        self.name_field = Some(field.into());
        self
    }
}

/// A sensor's state and attributes derived from one snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectedValue {
    /// Transformed primary field
    pub state: StateValue,
    /// Attributes, sorted by key
    pub attributes: BTreeMap<String, Value>,
    /// Display name taken from the snapshot, if the descriptor asks for one
    pub name: Option<String>,
}

impl ProjectedValue {
    /// The value before any snapshot has been projected
    pub fn unknown() -> Self {
        Self {
            state: StateValue::Unknown,
            attributes: BTreeMap::new(),
            name: None,
        }
    }
}

/// Project `snapshot` through `descriptor`
pub fn project(snapshot: &Snapshot, descriptor: &SensorDescriptor) -> ProjectedValue {
    let state = match snapshot.get(&descriptor.primary_field) {
        Some(raw) => apply_transform(raw, &descriptor.transform, descriptor),
        None => StateValue::Unknown,
    };

    let attributes = match &descriptor.attributes {
        AttributePolicy::Hidden => BTreeMap::new(),
        AttributePolicy::Snapshot { exclude } => {
            let mut attributes: BTreeMap<String, Value> = snapshot
                .fields()
                .iter()
                .filter(|(key, _)| !exclude.contains(key.as_str()))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect();
            if let Some(attribution) = &descriptor.attribution {
                attributes.insert(
                    ATTR_ATTRIBUTION.to_string(),
                    Value::String(attribution.clone()),
                );
            }
            attributes
        }
    };

    let name = descriptor
        .name_field
        .as_deref()
        .and_then(|field| snapshot.get(field))
        .and_then(Value::as_str)
        .map(str::to_string);

    ProjectedValue {
        state,
        attributes,
        name,
    }
}

fn apply_transform(raw: &Value, transform: &Transform, descriptor: &SensorDescriptor) -> StateValue {
    match transform {
        Transform::Scale { divisor, precision } => {
            if *divisor == 0.0 || !divisor.is_finite() {
                return StateValue::Unknown;
            }
            match numeric(raw) {
                Some(value) => StateValue::Number(round_to(value / divisor, *precision)),
                None => StateValue::Unknown,
            }
        }
        Transform::OnOff => match flag(raw) {
            Some(true) => StateValue::Text(STATE_ON.to_string()),
            Some(false) => StateValue::Text(STATE_OFF.to_string()),
            None => {
                warn!(
                    "Sensor {} flag field {} has unexpected value {}, reporting unknown",
                    descriptor.kind, descriptor.primary_field, raw
                );
                StateValue::Unknown
            }
        },
        Transform::Integer => match raw {
            Value::Number(n) => match n.as_i64() {
                Some(i) => StateValue::Integer(i),
                None => n
                    .as_f64()
                    .filter(|f| f.is_finite())
                    .map(|f| StateValue::Integer(f.trunc() as i64))
                    .unwrap_or(StateValue::Unknown),
            },
            Value::String(s) => {
                let s = s.trim();
                if let Ok(i) = s.parse::<i64>() {
                    StateValue::Integer(i)
                } else {
                    s.parse::<f64>()
                        .ok()
                        .filter(|f| f.is_finite())
                        .map(|f| StateValue::Integer(f.trunc() as i64))
                        .unwrap_or(StateValue::Unknown)
                }
            }
            _ => StateValue::Unknown,
        },
        Transform::PassThrough => match raw {
            Value::Null => StateValue::Unknown,
            Value::String(s) => StateValue::Text(s.clone()),
            Value::Number(_) | Value::Bool(_) => StateValue::Text(raw.to_string()),
            other => {
                tracing::debug!(
                    "Sensor {} passes through a {} value as JSON text",
                    descriptor.kind,
                    json_kind(other)
                );
                StateValue::Text(other.to_string())
            }
        },
    }
}

fn numeric(raw: &Value) -> Option<f64> {
    let value = match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    value.is_finite().then_some(value)
}

fn flag(raw: &Value) -> Option<bool> {
    match raw {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_f64() {
            Some(v) if v == 1.0 => Some(true),
            Some(v) if v == 0.0 => Some(false),
            _ => None,
        },
        Value::String(s) => match s.trim() {
            "1" => Some(true),
            "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn round_to(value: f64, precision: u32) -> f64 {
    let factor = 10f64.powi(precision as i32);
    (value * factor).round() / factor
}
