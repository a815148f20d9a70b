//! Scalar values exchanged with the database.
//!
//! [`Value`] is both the bind-parameter type and the decoded column type, so
//! a value read from one query can be fed straight back into another.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A single SQL scalar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// NULL value
    Null,
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    Float(f64),
    String(String),
    /// Binary data (base64 encoded in JSON)
    #[serde(with = "base64_bytes")]
    Bytes(Vec<u8>),
    /// Structured JSON column or parameter
    Json(JsonValue),
}

impl Value {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the type name of this value for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
            Self::Json(_) => "json",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Plain text rendering, used for comma-separated splitting and map keys.
    ///
    /// Returns `None` for NULL.
    pub fn render(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Bool(v) => Some(v.to_string()),
            Self::Int(v) => Some(v.to_string()),
            Self::Float(v) => Some(v.to_string()),
            Self::String(v) => Some(v.clone()),
            Self::Bytes(v) => Some(String::from_utf8_lossy(v).into_owned()),
            Self::Json(JsonValue::String(s)) => Some(s.clone()),
            Self::Json(v) => Some(v.to_string()),
        }
    }

    /// Convert to a JSON value, keeping bytes as an array of numbers so they
    /// deserialize into `Vec<u8>` fields.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::Null => JsonValue::Null,
            Self::Bool(v) => JsonValue::Bool(*v),
            Self::Int(v) => JsonValue::Number((*v).into()),
            Self::Float(v) => serde_json::Number::from_f64(*v)
                .map(JsonValue::Number)
                .unwrap_or_else(|| JsonValue::String(v.to_string())),
            Self::String(v) => JsonValue::String(v.clone()),
            Self::Bytes(v) => JsonValue::Array(v.iter().map(|b| JsonValue::from(*b)).collect()),
            Self::Json(v) => v.clone(),
        }
    }

    /// Convert a serialized record field back into a bind value.
    ///
    /// Scalars map onto their natural variant; arrays and objects stay JSON.
    pub fn from_json(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(v) => Self::Bool(v),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => n.as_f64().map(Self::Float).unwrap_or(Self::Null),
            },
            JsonValue::String(s) => Self::String(s),
            other => Self::Json(other),
        }
    }

    /// Parse a literal typed on a command line: JSON scalars (`12`, `true`,
    /// `null`, `1.5`) keep their type, anything else is text.
    pub fn parse_literal(raw: &str) -> Self {
        match serde_json::from_str::<JsonValue>(raw) {
            Ok(v @ (JsonValue::Null | JsonValue::Bool(_) | JsonValue::Number(_))) => {
                Self::from_json(v)
            }
            _ => Self::String(raw.to_string()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Self::String(v.clone())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl From<JsonValue> for Value {
    fn from(v: JsonValue) -> Self {
        Self::Json(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Self::String(v.format(crate::mapper::TIMESTAMP_FORMAT).to_string())
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Self::String(v.format("%Y-%m-%d").to_string())
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Self::from(v.naive_utc())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}

/// Custom serialization for binary data as base64.
mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        STANDARD.encode(bytes).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_scalars() {
        assert_eq!(Value::Int(7).render().as_deref(), Some("7"));
        assert_eq!(Value::from("x").render().as_deref(), Some("x"));
        assert_eq!(Value::Bool(true).render().as_deref(), Some("true"));
        assert_eq!(Value::Null.render(), None);
    }

    #[test]
    fn test_from_option() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some(3)), Value::Int(3));
    }

    #[test]
    fn test_parse_literal() {
        assert_eq!(Value::parse_literal("12"), Value::Int(12));
        assert_eq!(Value::parse_literal("1.5"), Value::Float(1.5));
        assert_eq!(Value::parse_literal("true"), Value::Bool(true));
        assert_eq!(Value::parse_literal("null"), Value::Null);
        assert_eq!(Value::parse_literal("hero"), Value::from("hero"));
        // Structured JSON is not a scalar literal
        assert_eq!(Value::parse_literal("[1,2]"), Value::from("[1,2]"));
    }

    #[test]
    fn test_bytes_serialize_as_base64() {
        let json = serde_json::to_value(Value::Bytes(b"hello".to_vec())).unwrap();
        assert_eq!(json, JsonValue::String("aGVsbG8=".to_string()));
    }

    #[test]
    fn test_to_json_keeps_bytes_as_array() {
        let json = Value::Bytes(vec![1, 2]).to_json();
        assert_eq!(json, serde_json::json!([1, 2]));
    }

    #[test]
    fn test_from_json_numbers() {
        assert_eq!(Value::from_json(serde_json::json!(5)), Value::Int(5));
        assert_eq!(Value::from_json(serde_json::json!(2.5)), Value::Float(2.5));
        assert_eq!(
            Value::from_json(serde_json::json!({"a": 1})),
            Value::Json(serde_json::json!({"a": 1}))
        );
    }
}
