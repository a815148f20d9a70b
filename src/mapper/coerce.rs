//! Scalar coercion from column values to declared field types.
//!
//! Coercion produces the JSON shape the record's serde implementation
//! expects for a field, so the mapped object can be deserialized directly.

use super::TIMESTAMP_FORMAT;
use crate::models::{FieldType, Value};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::{Map, Value as JsonValue};

/// Coerce `value` to `ty`. NULL passes through as JSON null; callers decide
/// whether the field accepts it.
pub fn coerce(value: &Value, ty: &FieldType) -> Result<JsonValue, String> {
    if value.is_null() {
        return Ok(JsonValue::Null);
    }
    // JSON scalars coming from JSON columns or arrays behave like their
    // plain counterparts.
    if let Value::Json(json) = value {
        if !json.is_array() && !json.is_object() && !matches!(ty, FieldType::Json) {
            return coerce(&Value::from_json(json.clone()), ty);
        }
    }

    match ty {
        FieldType::Integer => to_integer(value),
        FieldType::Float => to_float(value),
        FieldType::Boolean => to_boolean(value),
        FieldType::Text => to_text(value),
        FieldType::Timestamp => to_timestamp(value),
        FieldType::Json => to_json(value),
        FieldType::Bytes => to_bytes(value),
        FieldType::List(inner) => to_sequence(value, inner, false),
        FieldType::Set(inner) => to_sequence(value, inner, true),
        FieldType::Map(inner) => to_map(value, inner),
    }
}

fn mismatch(expected: &str, value: &Value) -> String {
    format!("expected {}, got {}", expected, value.type_name())
}

fn to_integer(value: &Value) -> Result<JsonValue, String> {
    let parsed = match value {
        Value::Int(v) => Some(*v),
        Value::Bool(v) => Some(i64::from(*v)),
        Value::Float(v) if v.fract() == 0.0 && v.abs() < i64::MAX as f64 => Some(*v as i64),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    parsed
        .map(JsonValue::from)
        .ok_or_else(|| mismatch("integer", value))
}

fn to_float(value: &Value) -> Result<JsonValue, String> {
    let parsed = match value {
        Value::Int(v) => Some(*v as f64),
        Value::Float(v) => Some(*v),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed
        .and_then(serde_json::Number::from_f64)
        .map(JsonValue::Number)
        .ok_or_else(|| mismatch("finite float", value))
}

fn to_boolean(value: &Value) -> Result<JsonValue, String> {
    let parsed = match value {
        Value::Bool(v) => Some(*v),
        Value::Int(0) => Some(false),
        Value::Int(1) => Some(true),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "yes" | "y" | "1" => Some(true),
            "false" | "f" | "no" | "n" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    };
    parsed
        .map(JsonValue::Bool)
        .ok_or_else(|| mismatch("boolean", value))
}

fn to_text(value: &Value) -> Result<JsonValue, String> {
    match value {
        Value::Bytes(bytes) => String::from_utf8(bytes.clone())
            .map(JsonValue::String)
            .map_err(|_| "expected text, got non-UTF-8 bytes".to_string()),
        other => other
            .render()
            .map(JsonValue::String)
            .ok_or_else(|| mismatch("text", other)),
    }
}

/// Parse the textual timestamp forms drivers and users produce.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.naive_utc()))
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn to_timestamp(value: &Value) -> Result<JsonValue, String> {
    match value {
        Value::String(s) => parse_timestamp(s)
            .map(|ts| JsonValue::String(ts.format(TIMESTAMP_FORMAT).to_string()))
            .ok_or_else(|| format!("'{}' is not a recognised timestamp", s)),
        other => Err(mismatch("timestamp", other)),
    }
}

fn to_json(value: &Value) -> Result<JsonValue, String> {
    match value {
        Value::String(s) => {
            serde_json::from_str(s).map_err(|e| format!("invalid JSON text: {}", e))
        }
        Value::Bytes(bytes) => {
            serde_json::from_slice(bytes).map_err(|e| format!("invalid JSON bytes: {}", e))
        }
        other => Ok(other.to_json()),
    }
}

fn to_bytes(value: &Value) -> Result<JsonValue, String> {
    match value {
        Value::Bytes(_) => Ok(value.to_json()),
        Value::String(s) => Ok(Value::Bytes(s.as_bytes().to_vec()).to_json()),
        other => Err(mismatch("bytes", other)),
    }
}

/// Structured input: a JSON value, or text holding JSON.
fn structured(value: &Value, expected: &str) -> Result<JsonValue, String> {
    match value {
        Value::Json(json) => Ok(json.clone()),
        Value::String(s) => serde_json::from_str(s)
            .map_err(|_| format!("expected {} as JSON text, got '{}'", expected, s)),
        other => Err(mismatch(expected, other)),
    }
}

fn to_sequence(value: &Value, inner: &FieldType, dedup: bool) -> Result<JsonValue, String> {
    let JsonValue::Array(items) = structured(value, "array")? else {
        return Err(mismatch("array", value));
    };
    let mut out: Vec<JsonValue> = Vec::with_capacity(items.len());
    for item in items {
        let coerced = coerce(&Value::from_json(item), inner)?;
        if !(dedup && out.contains(&coerced)) {
            out.push(coerced);
        }
    }
    Ok(JsonValue::Array(out))
}

fn to_map(value: &Value, inner: &FieldType) -> Result<JsonValue, String> {
    let JsonValue::Object(entries) = structured(value, "object")? else {
        return Err(mismatch("object", value));
    };
    let mut out = Map::with_capacity(entries.len());
    for (key, item) in entries {
        let coerced =
            coerce(&Value::from_json(item), inner).map_err(|e| format!("key '{}': {}", key, e))?;
        out.insert(key, coerced);
    }
    Ok(JsonValue::Object(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_integer_coercion() {
        assert_eq!(coerce(&Value::from(" 42 "), &FieldType::Integer), Ok(json!(42)));
        assert_eq!(coerce(&Value::Float(3.0), &FieldType::Integer), Ok(json!(3)));
        assert_eq!(coerce(&Value::Bool(true), &FieldType::Integer), Ok(json!(1)));
        assert!(coerce(&Value::Float(3.5), &FieldType::Integer).is_err());
        assert!(coerce(&Value::from("forty"), &FieldType::Integer).is_err());
    }

    #[test]
    fn test_boolean_coercion() {
        assert_eq!(coerce(&Value::Int(1), &FieldType::Boolean), Ok(json!(true)));
        assert_eq!(coerce(&Value::from("FALSE"), &FieldType::Boolean), Ok(json!(false)));
        assert!(coerce(&Value::Int(2), &FieldType::Boolean).is_err());
    }

    #[test]
    fn test_text_coercion() {
        assert_eq!(coerce(&Value::Int(7), &FieldType::Text), Ok(json!("7")));
        assert_eq!(
            coerce(&Value::Bytes(b"abc".to_vec()), &FieldType::Text),
            Ok(json!("abc"))
        );
    }

    #[test]
    fn test_timestamp_coercion_canonicalizes() {
        assert_eq!(
            coerce(&Value::from("2024-03-01 12:30:00"), &FieldType::Timestamp),
            Ok(json!("2024-03-01T12:30:00"))
        );
        assert_eq!(
            coerce(&Value::from("2024-03-01T12:30:00.250"), &FieldType::Timestamp),
            Ok(json!("2024-03-01T12:30:00.250"))
        );
        assert_eq!(
            coerce(&Value::from("2024-03-01T12:30:00+02:00"), &FieldType::Timestamp),
            Ok(json!("2024-03-01T10:30:00"))
        );
        assert!(coerce(&Value::from("yesterday"), &FieldType::Timestamp).is_err());
    }

    #[test]
    fn test_json_text_decoded() {
        assert_eq!(
            coerce(&Value::from(r#"{"a":[1,2]}"#), &FieldType::Json),
            Ok(json!({"a": [1, 2]}))
        );
        assert!(coerce(&Value::from("{oops"), &FieldType::Json).is_err());
    }

    #[test]
    fn test_collections_from_json_text() {
        let list = FieldType::list_of(FieldType::Integer);
        assert_eq!(coerce(&Value::from("[1, \"2\"]"), &list), Ok(json!([1, 2])));

        let set = FieldType::set_of(FieldType::Text);
        assert_eq!(
            coerce(&Value::Json(json!(["a", "b", "a"])), &set),
            Ok(json!(["a", "b"]))
        );

        let map = FieldType::map_of(FieldType::Float);
        assert_eq!(coerce(&Value::from(r#"{"x": 1}"#), &map), Ok(json!({"x": 1.0})));
    }

    #[test]
    fn test_null_passes_through() {
        assert_eq!(coerce(&Value::Null, &FieldType::Integer), Ok(JsonValue::Null));
    }
}
