//! Backend-neutral values and result rows.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{CoreError, CoreResult};

/// A single column value or statement parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
    TextArray(Vec<String>),
    Json(JsonValue),
}

impl Value {
    /// Short name of the variant, used in decode errors.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Timestamp(_) => "timestamp",
            Self::TextArray(_) => "text[]",
            Self::Json(_) => "json",
        }
    }

    /// Converts a document field into a typed value.
    ///
    /// Integral numbers become `Int`, other numbers `Float`, arrays of
    /// strings `TextArray`; objects and mixed arrays stay `Json`.
    #[must_use]
    pub fn from_json(json: &JsonValue) -> Self {
        match json {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(b) => Self::Bool(*b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or_default()),
            },
            JsonValue::String(s) => Self::Text(s.clone()),
            JsonValue::Array(items) => {
                let strings: Option<Vec<String>> = items
                    .iter()
                    .map(|item| item.as_str().map(str::to_string))
                    .collect();
                match strings {
                    Some(strings) => Self::TextArray(strings),
                    None => Self::Json(json.clone()),
                }
            }
            JsonValue::Object(_) => Self::Json(json.clone()),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Timestamp(v)
    }
}

impl From<Vec<String>> for Value {
    fn from(v: Vec<String>) -> Self {
        Self::TextArray(v)
    }
}

impl From<JsonValue> for Value {
    fn from(v: JsonValue) -> Self {
        Self::Json(v)
    }
}

/// Conversion out of a [`Value`], used by [`Row::scan`].
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> CoreResult<Self>;
}

fn mismatch<T>(expected: &str, value: &Value) -> CoreResult<T> {
    Err(CoreError::Decode(format!(
        "expected {expected}, found {}",
        value.kind()
    )))
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> CoreResult<Self> {
        match value {
            Value::Int(i) => Ok(*i),
            // SUM() over integer columns comes back as a float on some backends.
            Value::Float(f) if f.fract() == 0.0 => {
                // Both bounds are exactly -2^63 and 2^63.
                if (i64::MIN as f64..-(i64::MIN as f64)).contains(f) {
                    Ok(*f as i64)
                } else {
                    Err(CoreError::Decode(format!("float {f} is outside the int range")))
                }
            }
            other => mismatch("int", other),
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> CoreResult<Self> {
        match value {
            Value::Float(f) => Ok(*f),
            Value::Int(i) => Ok(*i as f64),
            other => mismatch("float", other),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> CoreResult<Self> {
        match value {
            Value::Bool(b) => Ok(*b),
            Value::Int(i) => Ok(*i != 0),
            other => mismatch("bool", other),
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> CoreResult<Self> {
        match value {
            Value::Text(s) => Ok(s.clone()),
            other => mismatch("text", other),
        }
    }
}

impl FromValue for Vec<String> {
    fn from_value(value: &Value) -> CoreResult<Self> {
        match value {
            Value::TextArray(items) => Ok(items.clone()),
            // JSON-encoded arrays stored in TEXT columns (SQLite timelines).
            Value::Text(s) => serde_json::from_str(s).map_err(CoreError::from),
            Value::Json(json) => serde_json::from_value(json.clone()).map_err(CoreError::from),
            other => mismatch("text[]", other),
        }
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(value: &Value) -> CoreResult<Self> {
        match value {
            Value::Timestamp(ts) => Ok(*ts),
            Value::Int(millis) => Utc
                .timestamp_millis_opt(*millis)
                .single()
                .ok_or_else(|| CoreError::Decode(format!("invalid timestamp {millis}"))),
            Value::Text(s) => DateTime::parse_from_rfc3339(s)
                .map(|ts| ts.with_timezone(&Utc))
                .map_err(|err| CoreError::Decode(err.to_string())),
            other => mismatch("timestamp", other),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> CoreResult<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

/// One result row: column names paired with values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Row {
    /// Builds a row from parallel column/value vectors.
    #[must_use]
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Raw value at a column position.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Raw value by column name.
    #[must_use]
    pub fn get_named(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|column| column == name)
            .and_then(|index| self.values.get(index))
    }

    /// Decodes the value at `index` into `T`.
    pub fn scan<T: FromValue>(&self, index: usize) -> CoreResult<T> {
        let value = self
            .get(index)
            .ok_or_else(|| CoreError::Decode(format!("no column at index {index}")))?;
        T::from_value(value)
    }

    /// Decodes the named column into `T`.
    pub fn scan_named<T: FromValue>(&self, name: &str) -> CoreResult<T> {
        let value = self
            .get_named(name)
            .ok_or_else(|| CoreError::Decode(format!("no column named `{name}`")))?;
        T::from_value(value)
    }
}
