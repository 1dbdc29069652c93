//! Closed value variant carried by flat records.

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use serde_json::{Number, Value};
use std::fmt;

/// Primary-key value of a referenced entity.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ReferenceId {
    Int(i64),
    Text(String),
}

impl ReferenceId {
    pub fn from_json(v: &Value) -> Option<Self> {
        match v {
            Value::Number(n) => n.as_i64().map(ReferenceId::Int),
            Value::String(s) => Some(ReferenceId::Text(s.clone())),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            ReferenceId::Int(n) => Value::Number((*n).into()),
            ReferenceId::Text(s) => Value::String(s.clone()),
        }
    }
}

impl fmt::Display for ReferenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferenceId::Int(n) => write!(f, "{}", n),
            ReferenceId::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum RecordValue {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    DateTime(DateTime<Utc>),
    Reference(ReferenceId),
    /// Values the flat form cannot split further: empty objects and arrays.
    Json(Value),
}

impl RecordValue {
    pub fn from_json(v: Value) -> Self {
        match v {
            Value::Null => RecordValue::Null,
            Value::Bool(b) => RecordValue::Bool(b),
            Value::Number(n) => RecordValue::Number(n),
            Value::String(s) => RecordValue::String(s),
            other => RecordValue::Json(other),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            RecordValue::Null => Value::Null,
            RecordValue::Bool(b) => Value::Bool(*b),
            RecordValue::Number(n) => Value::Number(n.clone()),
            RecordValue::String(s) => Value::String(s.clone()),
            RecordValue::DateTime(d) => Value::String(d.to_rfc3339()),
            RecordValue::Reference(r) => r.to_json(),
            RecordValue::Json(v) => v.clone(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, RecordValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            RecordValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Text form used for ids, titles and substring filters.
    pub fn to_text(&self) -> Option<String> {
        match self {
            RecordValue::Null | RecordValue::Json(_) => None,
            RecordValue::Bool(b) => Some(b.to_string()),
            RecordValue::Number(n) => Some(n.to_string()),
            RecordValue::String(s) => Some(s.clone()),
            RecordValue::DateTime(d) => Some(d.to_rfc3339()),
            RecordValue::Reference(r) => Some(r.to_string()),
        }
    }
}

impl Serialize for RecordValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl From<&str> for RecordValue {
    fn from(s: &str) -> Self {
        RecordValue::String(s.to_string())
    }
}

impl From<String> for RecordValue {
    fn from(s: String) -> Self {
        RecordValue::String(s)
    }
}

impl From<i64> for RecordValue {
    fn from(n: i64) -> Self {
        RecordValue::Number(n.into())
    }
}

impl From<i32> for RecordValue {
    fn from(n: i32) -> Self {
        RecordValue::Number(n.into())
    }
}

impl From<u64> for RecordValue {
    fn from(n: u64) -> Self {
        RecordValue::Number(n.into())
    }
}

impl From<bool> for RecordValue {
    fn from(b: bool) -> Self {
        RecordValue::Bool(b)
    }
}

impl From<DateTime<Utc>> for RecordValue {
    fn from(d: DateTime<Utc>) -> Self {
        RecordValue::DateTime(d)
    }
}

impl From<ReferenceId> for RecordValue {
    fn from(r: ReferenceId) -> Self {
        RecordValue::Reference(r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn json_conversion_keeps_primitives() {
        for v in [Value::Null, Value::Bool(true), serde_json::json!(4.5), serde_json::json!("x")] {
            assert_eq!(RecordValue::from_json(v.clone()).to_json(), v);
        }
        assert_eq!(RecordValue::from_json(serde_json::json!({})), RecordValue::Json(serde_json::json!({})));
    }

    #[test]
    fn typed_variants_serialize_to_plain_json() {
        let d = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        assert_eq!(RecordValue::from(d).to_json(), serde_json::json!("2024-03-01T12:00:00+00:00"));
        assert_eq!(RecordValue::Reference(ReferenceId::Int(7)).to_json(), serde_json::json!(7));
        assert_eq!(RecordValue::Reference(ReferenceId::Int(7)).to_text().as_deref(), Some("7"));
    }
}
