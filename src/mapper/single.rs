//! One record per row.

use super::MappedRows;
use super::coerce::coerce;
use crate::error::RowError;
use crate::models::{FieldDef, FieldType, RawRow, Record, Schema, Value};
use serde_json::{Map, Value as JsonValue};

/// Map every row into `T`; rows that fail are skipped and reported.
pub fn map_rows<T: Record>(rows: &[RawRow]) -> MappedRows<T> {
    let schema = T::schema();
    let mut records = Vec::with_capacity(rows.len());
    let mut errors = Vec::new();

    for (idx, row) in rows.iter().enumerate() {
        match map_row_with::<T>(&schema, idx, row) {
            Ok(record) => records.push(record),
            Err(e) => errors.push(e),
        }
    }

    if !errors.is_empty() {
        tracing::debug!(
            table = schema.table_name(),
            failed = errors.len(),
            mapped = records.len(),
            "Some rows could not be mapped"
        );
    }
    MappedRows::new(records, errors)
}

/// Map a single row, reporting it as row 0 on failure.
pub fn map_row<T: Record>(row: &RawRow) -> Result<T, RowError> {
    map_row_with::<T>(&T::schema(), 0, row)
}

fn map_row_with<T: Record>(schema: &Schema, idx: usize, row: &RawRow) -> Result<T, RowError> {
    let object = build_object(schema.fields().iter(), idx, row)?;
    materialize(idx, object)
}

/// Build the JSON object for `fields` from one row.
pub(super) fn build_object<'a>(
    fields: impl Iterator<Item = &'a FieldDef>,
    idx: usize,
    row: &RawRow,
) -> Result<Map<String, JsonValue>, RowError> {
    let mut object = Map::new();
    for field in fields {
        let value = field_value(field, idx, row.get(&field.name))?;
        object.insert(field.name.clone(), value);
    }
    Ok(object)
}

/// Coerce a column value for `field`, applying the absent/NULL rules.
pub(super) fn field_value(
    field: &FieldDef,
    idx: usize,
    value: Option<&Value>,
) -> Result<JsonValue, RowError> {
    match value {
        None | Some(Value::Null) => {
            if let Some(empty) = empty_collection(&field.ty) {
                Ok(empty)
            } else if field.nullable {
                Ok(JsonValue::Null)
            } else if value.is_none() {
                Err(RowError::for_field(idx, &field.name, "no matching column"))
            } else {
                Err(RowError::for_field(idx, &field.name, "NULL in non-nullable field"))
            }
        }
        Some(value) => {
            coerce(value, &field.ty).map_err(|message| RowError::for_field(idx, &field.name, message))
        }
    }
}

pub(super) fn empty_collection(ty: &FieldType) -> Option<JsonValue> {
    match ty {
        FieldType::List(_) | FieldType::Set(_) => Some(JsonValue::Array(Vec::new())),
        FieldType::Map(_) => Some(JsonValue::Object(Map::new())),
        _ => None,
    }
}

/// Deserialize a mapped object into the record type.
pub(super) fn materialize<T: Record>(idx: usize, object: Map<String, JsonValue>) -> Result<T, RowError> {
    serde_json::from_value(JsonValue::Object(object)).map_err(|e| RowError::new(idx, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Item {
        id: i64,
        name: String,
    }

    impl Record for Item {
        fn schema() -> Schema {
            Schema::table("item")
                .field("id", FieldType::Integer)
                .field("name", FieldType::Text)
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Profile {
        id: Option<i64>,
        active: bool,
        nickname: Option<String>,
        scores: Vec<i64>,
        seen_at: Option<chrono::NaiveDateTime>,
    }

    impl Record for Profile {
        fn schema() -> Schema {
            Schema::table("profile")
                .identifier("id", FieldType::Integer)
                .field("active", FieldType::Boolean)
                .nullable("nickname", FieldType::Text)
                .field("scores", FieldType::list_of(FieldType::Integer))
                .nullable("seen_at", FieldType::Timestamp)
        }
    }

    #[test]
    fn test_row_maps_to_equal_instance() {
        let rows = vec![RawRow::new().with("id", 1).with("name", "a")];
        let mapped = map_rows::<Item>(&rows);
        assert!(mapped.is_complete());
        assert_eq!(
            mapped.into_records(),
            vec![Item {
                id: 1,
                name: "a".to_string()
            }]
        );
    }

    #[test]
    fn test_unknown_columns_ignored_and_scalars_coerced() {
        let row = RawRow::new()
            .with("id", "7")
            .with("name", 12)
            .with("extra", "ignored");
        let item = map_row::<Item>(&row).unwrap();
        assert_eq!(
            item,
            Item {
                id: 7,
                name: "12".to_string()
            }
        );
    }

    #[test]
    fn test_optional_and_collection_defaults() {
        let row = RawRow::new()
            .with("id", Value::Null)
            .with("active", "yes")
            .with("seen_at", "2024-05-06 07:08:09");
        let profile = map_row::<Profile>(&row).unwrap();
        assert_eq!(profile.id, None);
        assert!(profile.active);
        assert_eq!(profile.nickname, None);
        assert!(profile.scores.is_empty());
        assert_eq!(
            profile.seen_at.unwrap().to_string(),
            "2024-05-06 07:08:09"
        );
    }

    #[test]
    fn test_bad_rows_collected_not_aborting() {
        let rows = vec![
            RawRow::new().with("id", 1).with("name", "a"),
            RawRow::new().with("name", "missing id"),
            RawRow::new().with("id", "x").with("name", "bad id"),
            RawRow::new().with("id", 2).with("name", Value::Null),
            RawRow::new().with("id", 3).with("name", "c"),
        ];
        let mapped = map_rows::<Item>(&rows);
        let ids: Vec<i64> = mapped.records().iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![1, 3]);

        let errors = mapped.errors();
        assert_eq!(errors.len(), 3);
        assert_eq!(errors[0].row, 1);
        assert_eq!(errors[0].field.as_deref(), Some("id"));
        assert_eq!(errors[1].row, 2);
        assert_eq!(errors[2].row, 3);
        assert_eq!(errors[2].message, "NULL in non-nullable field");

        assert!(mapped.into_result().is_err());
    }
}
