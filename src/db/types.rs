//! Decoding driver rows into [`RawRow`]s.
//!
//! # Architecture
//!
//! Type conversion uses a two-phase approach:
//! 1. `TypeCategory` classifies column types into logical categories
//! 2. Database-specific decoders handle the actual value extraction
//!
//! Values that cannot be decoded become `Value::Null` and are logged; the
//! result mapper then reports them against the target field if it is required.

use crate::models::{DatabaseType, RawRow, Value};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::postgres::{PgRow, PgTypeInfo, PgValueRef};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Decode, Row, Type, TypeInfo};

// =============================================================================
// Type Classification
// =============================================================================

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Text,
    Binary,
    Json,
    Temporal,
    Unknown,
}

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str, db: DatabaseType) -> TypeCategory {
    let lower = type_name.to_lowercase();

    // Decimal/Numeric - check first as it overlaps with "numeric" in float checks
    if lower.contains("decimal") || lower.contains("numeric") {
        // SQLite's NUMERIC is actually a float
        if db == DatabaseType::SQLite && lower == "numeric" {
            return TypeCategory::Float;
        }
        return TypeCategory::Decimal;
    }

    if lower.contains("int") || lower.contains("serial") || lower.contains("tiny") {
        return TypeCategory::Integer;
    }

    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }

    if lower.contains("float")
        || lower.contains("double")
        || lower == "real"
        || lower == "float4"
        || lower == "float8"
    {
        return TypeCategory::Float;
    }

    if lower == "json" || lower == "jsonb" {
        return TypeCategory::Json;
    }

    if lower.contains("blob") || lower.contains("binary") || lower == "bytea" {
        return TypeCategory::Binary;
    }

    if lower.starts_with("timestamp") || lower == "datetime" || lower == "date" || lower == "time"
    {
        return TypeCategory::Temporal;
    }

    if lower.contains("char") || lower == "text" || lower == "name" || lower.ends_with("text") {
        return TypeCategory::Text;
    }

    TypeCategory::Unknown
}

// =============================================================================
// Decimal Type Support
// =============================================================================

/// Wrapper type for raw DECIMAL/NUMERIC values as strings.
/// This preserves the exact database representation.
#[derive(Debug)]
pub struct RawDecimal(pub String);

impl Type<sqlx::MySql> for RawDecimal {
    fn type_info() -> MySqlTypeInfo {
        <String as Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &MySqlTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("decimal") || name.contains("numeric")
    }
}

impl<'r> Decode<'r, sqlx::MySql> for RawDecimal {
    fn decode(value: MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::MySql>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

impl Type<sqlx::Postgres> for RawDecimal {
    fn type_info() -> PgTypeInfo {
        <String as Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("numeric") || name.contains("decimal")
    }
}

impl<'r> Decode<'r, sqlx::Postgres> for RawDecimal {
    fn decode(value: PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::Postgres>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

// =============================================================================
// Row Conversion
// =============================================================================

/// Conversion from a driver row into an ordered [`RawRow`].
pub trait ToRawRow {
    fn to_raw_row(&self) -> RawRow;
}

impl ToRawRow for MySqlRow {
    fn to_raw_row(&self) -> RawRow {
        let mut row = RawRow::with_capacity(self.columns().len());
        for (idx, col) in self.columns().iter().enumerate() {
            let type_name = col.type_info().name();
            let category = categorize_type(type_name, DatabaseType::MySQL);
            row.push(col.name(), mysql::decode_column(self, idx, type_name, category));
        }
        row
    }
}

impl ToRawRow for PgRow {
    fn to_raw_row(&self) -> RawRow {
        let mut row = RawRow::with_capacity(self.columns().len());
        for (idx, col) in self.columns().iter().enumerate() {
            let type_name = col.type_info().name();
            let category = categorize_type(type_name, DatabaseType::PostgreSQL);
            row.push(col.name(), postgres::decode_column(self, idx, type_name, category));
        }
        row
    }
}

impl ToRawRow for SqliteRow {
    fn to_raw_row(&self) -> RawRow {
        let mut row = RawRow::with_capacity(self.columns().len());
        for (idx, col) in self.columns().iter().enumerate() {
            let type_name = col.type_info().name();
            let category = categorize_type(type_name, DatabaseType::SQLite);
            row.push(col.name(), sqlite::decode_column(self, idx, category));
        }
        row
    }
}

fn float_value(v: f64) -> Value {
    if v.is_finite() {
        Value::Float(v)
    } else {
        Value::String(v.to_string())
    }
}

// =============================================================================
// Database-Specific Decoders
// =============================================================================

mod mysql {
    use super::*;

    pub fn decode_column(
        row: &MySqlRow,
        idx: usize,
        type_name: &str,
        category: TypeCategory,
    ) -> Value {
        match category {
            TypeCategory::Decimal => decode_decimal(row, idx),
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => decode_boolean(row, idx),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Binary => decode_binary(row, idx),
            TypeCategory::Json => decode_json(row, idx),
            TypeCategory::Temporal => decode_temporal(row, idx, type_name),
            TypeCategory::Text | TypeCategory::Unknown => decode_text(row, idx, type_name),
        }
    }

    fn decode_decimal(row: &MySqlRow, idx: usize) -> Value {
        match row.try_get::<Option<RawDecimal>, _>(idx) {
            Ok(Some(v)) => Value::String(v.0),
            Ok(None) => Value::Null,
            Err(e) => {
                tracing::error!("Failed to decode DECIMAL: {:?}", e);
                Value::Null
            }
        }
    }

    fn decode_integer(row: &MySqlRow, idx: usize) -> Value {
        if let Ok(None) = row.try_get::<Option<i64>, _>(idx) {
            return Value::Null;
        }
        if let Ok(Some(v)) = row.try_get::<Option<i8>, _>(idx) {
            return Value::Int(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i16>, _>(idx) {
            return Value::Int(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i32>, _>(idx) {
            return Value::Int(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(idx) {
            return Value::Int(v);
        }
        if let Ok(Some(v)) = row.try_get::<Option<u8>, _>(idx) {
            return Value::Int(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<u16>, _>(idx) {
            return Value::Int(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<u32>, _>(idx) {
            return Value::Int(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<u64>, _>(idx) {
            // Out of i64 range keeps its exact digits as text
            return i64::try_from(v)
                .map(Value::Int)
                .unwrap_or_else(|_| Value::String(v.to_string()));
        }
        Value::Null
    }

    fn decode_boolean(row: &MySqlRow, idx: usize) -> Value {
        row.try_get::<Option<bool>, _>(idx)
            .ok()
            .flatten()
            .map(Value::Bool)
            .unwrap_or(Value::Null)
    }

    fn decode_float(row: &MySqlRow, idx: usize) -> Value {
        if let Ok(Some(v)) = row.try_get::<Option<f64>, _>(idx) {
            return float_value(v);
        }
        if let Ok(Some(v)) = row.try_get::<Option<f32>, _>(idx) {
            return float_value(v as f64);
        }
        Value::Null
    }

    fn decode_binary(row: &MySqlRow, idx: usize) -> Value {
        row.try_get::<Option<Vec<u8>>, _>(idx)
            .ok()
            .flatten()
            .map(Value::Bytes)
            .unwrap_or(Value::Null)
    }

    fn decode_json(row: &MySqlRow, idx: usize) -> Value {
        row.try_get::<Option<JsonValue>, _>(idx)
            .ok()
            .flatten()
            .map(Value::Json)
            .unwrap_or(Value::Null)
    }

    fn decode_temporal(row: &MySqlRow, idx: usize, type_name: &str) -> Value {
        if let Ok(Some(v)) = row.try_get::<Option<NaiveDateTime>, _>(idx) {
            return v.into();
        }
        if let Ok(Some(v)) = row.try_get::<Option<DateTime<Utc>>, _>(idx) {
            return v.into();
        }
        if let Ok(Some(v)) = row.try_get::<Option<NaiveDate>, _>(idx) {
            return v.into();
        }
        if let Ok(Some(v)) = row.try_get::<Option<NaiveTime>, _>(idx) {
            return Value::String(v.to_string());
        }
        decode_text(row, idx, type_name)
    }

    fn decode_text(row: &MySqlRow, idx: usize, type_name: &str) -> Value {
        match row.try_get::<Option<String>, _>(idx) {
            Ok(Some(v)) => Value::String(v),
            Ok(None) => Value::Null,
            Err(e) => {
                tracing::debug!(column = idx, type_name = %type_name, error = %e, "Undecodable column");
                Value::Null
            }
        }
    }
}

mod postgres {
    use super::*;

    pub fn decode_column(row: &PgRow, idx: usize, type_name: &str, category: TypeCategory) -> Value {
        match category {
            TypeCategory::Decimal => decode_decimal(row, idx),
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => decode_boolean(row, idx),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Binary => decode_binary(row, idx),
            TypeCategory::Json => decode_json(row, idx),
            TypeCategory::Temporal => decode_temporal(row, idx, type_name),
            TypeCategory::Text | TypeCategory::Unknown => decode_text(row, idx, type_name),
        }
    }

    fn decode_decimal(row: &PgRow, idx: usize) -> Value {
        match row.try_get::<Option<RawDecimal>, _>(idx) {
            Ok(Some(v)) => Value::String(v.0),
            Ok(None) => Value::Null,
            Err(e) => {
                tracing::error!("Failed to decode NUMERIC: {:?}", e);
                Value::Null
            }
        }
    }

    fn decode_integer(row: &PgRow, idx: usize) -> Value {
        if let Ok(None) = row.try_get::<Option<i64>, _>(idx) {
            return Value::Null;
        }
        if let Ok(Some(v)) = row.try_get::<Option<i16>, _>(idx) {
            return Value::Int(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i32>, _>(idx) {
            return Value::Int(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(idx) {
            return Value::Int(v);
        }
        Value::Null
    }

    fn decode_boolean(row: &PgRow, idx: usize) -> Value {
        row.try_get::<Option<bool>, _>(idx)
            .ok()
            .flatten()
            .map(Value::Bool)
            .unwrap_or(Value::Null)
    }

    fn decode_float(row: &PgRow, idx: usize) -> Value {
        if let Ok(Some(v)) = row.try_get::<Option<f64>, _>(idx) {
            return float_value(v);
        }
        if let Ok(Some(v)) = row.try_get::<Option<f32>, _>(idx) {
            return float_value(v as f64);
        }
        Value::Null
    }

    fn decode_binary(row: &PgRow, idx: usize) -> Value {
        row.try_get::<Option<Vec<u8>>, _>(idx)
            .ok()
            .flatten()
            .map(Value::Bytes)
            .unwrap_or(Value::Null)
    }

    fn decode_json(row: &PgRow, idx: usize) -> Value {
        row.try_get::<Option<JsonValue>, _>(idx)
            .ok()
            .flatten()
            .map(Value::Json)
            .unwrap_or(Value::Null)
    }

    fn decode_temporal(row: &PgRow, idx: usize, type_name: &str) -> Value {
        match type_name.to_lowercase().as_str() {
            "timestamptz" => row
                .try_get::<Option<DateTime<Utc>>, _>(idx)
                .ok()
                .flatten()
                .map(Value::from)
                .unwrap_or(Value::Null),
            "timestamp" => row
                .try_get::<Option<NaiveDateTime>, _>(idx)
                .ok()
                .flatten()
                .map(Value::from)
                .unwrap_or(Value::Null),
            "date" => row
                .try_get::<Option<NaiveDate>, _>(idx)
                .ok()
                .flatten()
                .map(Value::from)
                .unwrap_or(Value::Null),
            "time" => row
                .try_get::<Option<NaiveTime>, _>(idx)
                .ok()
                .flatten()
                .map(|v| Value::String(v.to_string()))
                .unwrap_or(Value::Null),
            _ => decode_text(row, idx, type_name),
        }
    }

    fn decode_text(row: &PgRow, idx: usize, type_name: &str) -> Value {
        match row.try_get::<Option<String>, _>(idx) {
            Ok(Some(v)) => Value::String(v),
            Ok(None) => Value::Null,
            Err(e) => {
                tracing::debug!(column = idx, type_name = %type_name, error = %e, "Undecodable column");
                Value::Null
            }
        }
    }
}

mod sqlite {
    use super::*;

    // SQLite is dynamically typed: the declared type is only a hint, so every
    // category falls back to probing the stored value.
    pub fn decode_column(row: &SqliteRow, idx: usize, category: TypeCategory) -> Value {
        let decoded = match category {
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => decode_boolean(row, idx),
            TypeCategory::Float | TypeCategory::Decimal => decode_float(row, idx),
            TypeCategory::Binary => decode_binary(row, idx),
            _ => None,
        };
        decoded.unwrap_or_else(|| decode_dynamic(row, idx))
    }

    fn decode_integer(row: &SqliteRow, idx: usize) -> Option<Value> {
        row.try_get::<Option<i64>, _>(idx)
            .ok()
            .map(|v| v.map(Value::Int).unwrap_or(Value::Null))
    }

    fn decode_boolean(row: &SqliteRow, idx: usize) -> Option<Value> {
        row.try_get::<Option<bool>, _>(idx)
            .ok()
            .map(|v| v.map(Value::Bool).unwrap_or(Value::Null))
    }

    fn decode_float(row: &SqliteRow, idx: usize) -> Option<Value> {
        row.try_get::<Option<f64>, _>(idx)
            .ok()
            .map(|v| v.map(float_value).unwrap_or(Value::Null))
    }

    fn decode_binary(row: &SqliteRow, idx: usize) -> Option<Value> {
        row.try_get::<Option<Vec<u8>>, _>(idx)
            .ok()
            .map(|v| v.map(Value::Bytes).unwrap_or(Value::Null))
    }

    fn decode_dynamic(row: &SqliteRow, idx: usize) -> Value {
        if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
            return v.map(Value::String).unwrap_or(Value::Null);
        }
        if let Some(v) = decode_integer(row, idx) {
            return v;
        }
        if let Some(v) = decode_float(row, idx) {
            return v;
        }
        if let Some(v) = decode_binary(row, idx) {
            return v;
        }
        tracing::debug!(column = idx, "Undecodable SQLite column");
        Value::Null
    }
}
