//! Folding several rows into one record.
//!
//! A join such as `hero LEFT JOIN hero_tag` returns one row per tag. With an
//! [`AccumulationRules`] set, rows that agree on every plain column fold into
//! a single record and the designated columns are collected into the
//! record's collection fields.
//!
//! The first row seen for a grouping key initializes the record and validates
//! it by deserializing into `T`. Later rows for that key only touch the
//! accumulating fields; a contribution that cannot be coerced is reported and
//! skipped, and a record whose final form no longer deserializes falls back
//! to the instance validated at initialization.

use super::MappedRows;
use super::coerce::coerce;
use super::single::{empty_collection, field_value, materialize};
use crate::error::{DaoError, DaoResult, RowError};
use crate::models::{FieldDef, FieldType, RawRow, Record, Schema, Value};
use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;

/// How one record field is filled from the folded rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Accumulation {
    /// Append each non-null value in row order.
    List { column: String },
    /// Split a comma-separated value, trim the pieces and append them.
    CsvList { column: String },
    /// Append non-null values not already present.
    Set { column: String },
    /// Decode JSON text once, from the record's first row.
    Json { column: String },
    /// Insert `key_column -> value_column` into a growing map.
    Dict {
        key_column: String,
        value_column: String,
    },
}

impl Accumulation {
    /// Columns this rule reads; they take no part in grouping.
    fn columns(&self) -> Vec<&str> {
        match self {
            Self::List { column }
            | Self::CsvList { column }
            | Self::Set { column }
            | Self::Json { column } => vec![column.as_str()],
            Self::Dict {
                key_column,
                value_column,
            } => vec![key_column.as_str(), value_column.as_str()],
        }
    }
}

/// Per-field accumulation rules. Fields without a rule are plain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccumulationRules {
    rules: Vec<(String, Accumulation)>,
}

impl AccumulationRules {
    pub fn new() -> Self {
        Self::default()
    }

    fn with(mut self, field: impl Into<String>, rule: Accumulation) -> Self {
        let field = field.into();
        self.rules.retain(|(name, _)| *name != field);
        self.rules.push((field, rule));
        self
    }

    pub fn list(self, field: impl Into<String>, column: impl Into<String>) -> Self {
        self.with(field, Accumulation::List { column: column.into() })
    }

    pub fn csv_list(self, field: impl Into<String>, column: impl Into<String>) -> Self {
        self.with(field, Accumulation::CsvList { column: column.into() })
    }

    pub fn set(self, field: impl Into<String>, column: impl Into<String>) -> Self {
        self.with(field, Accumulation::Set { column: column.into() })
    }

    pub fn json(self, field: impl Into<String>, column: impl Into<String>) -> Self {
        self.with(field, Accumulation::Json { column: column.into() })
    }

    pub fn dict(
        self,
        field: impl Into<String>,
        key_column: impl Into<String>,
        value_column: impl Into<String>,
    ) -> Self {
        self.with(
            field,
            Accumulation::Dict {
                key_column: key_column.into(),
                value_column: value_column.into(),
            },
        )
    }

    pub fn get(&self, field: &str) -> Option<&Accumulation> {
        self.rules
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, rule)| rule)
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Every rule must target a schema field of a compatible type.
    fn validate(&self, schema: &Schema) -> DaoResult<()> {
        for (name, rule) in &self.rules {
            let field = schema.get(name).ok_or_else(|| {
                DaoError::configuration(format!(
                    "Accumulation rule for unknown field '{}' on '{}'",
                    name,
                    schema.table_name()
                ))
            })?;
            let compatible = match rule {
                Accumulation::List { .. }
                | Accumulation::CsvList { .. }
                | Accumulation::Set { .. } => {
                    matches!(field.ty, FieldType::List(_) | FieldType::Set(_))
                }
                Accumulation::Dict { .. } => matches!(field.ty, FieldType::Map(_)),
                Accumulation::Json { .. } => true,
            };
            if !compatible {
                return Err(DaoError::configuration(format!(
                    "Field '{}' of type {:?} cannot take a {:?} rule",
                    name, field.ty, rule
                )));
            }
        }
        Ok(())
    }

    fn consumed_columns(&self) -> Vec<&str> {
        self.rules
            .iter()
            .flat_map(|(_, rule)| rule.columns())
            .collect()
    }
}

/// Folding state for one grouping key.
struct Group<T> {
    first_row: usize,
    object: Map<String, JsonValue>,
    validated: T,
}

/// Fold `rows` into records of `T` following `rules`.
///
/// Records come out in the order their grouping key was first seen. Fails
/// only when a rule does not fit the schema; row-level problems are
/// collected in the result.
pub fn map_rows_accumulating<T: Record>(
    rows: &[RawRow],
    rules: &AccumulationRules,
) -> DaoResult<MappedRows<T>> {
    let schema = T::schema();
    rules.validate(&schema)?;

    let consumed = rules.consumed_columns();
    let plain: Vec<&str> = schema
        .fields()
        .iter()
        .map(|f| f.name.as_str())
        .filter(|name| rules.get(name).is_none() && !consumed.contains(name))
        .collect();
    let mut groups: Vec<Group<T>> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut errors = Vec::new();

    for (idx, row) in rows.iter().enumerate() {
        let key = grouping_key(row, &plain);
        match index.get(&key) {
            Some(&position) => {
                let group = &mut groups[position];
                for (name, rule) in &rules.rules {
                    let Some(field) = schema.get(name) else { continue };
                    if let Err(e) = contribute(&mut group.object, field, rule, idx, row) {
                        errors.push(e);
                    }
                }
            }
            None => match initialize::<T>(&schema, rules, idx, row) {
                Ok(group) => {
                    index.insert(key, groups.len());
                    groups.push(group);
                }
                Err(e) => errors.push(e),
            },
        }
    }

    let mut records = Vec::with_capacity(groups.len());
    for group in groups {
        match materialize::<T>(group.first_row, group.object) {
            Ok(record) => records.push(record),
            Err(e) => {
                errors.push(e);
                records.push(group.validated);
            }
        }
    }

    if !errors.is_empty() {
        tracing::debug!(
            table = schema.table_name(),
            errors = errors.len(),
            records = records.len(),
            "Accumulating map finished with row errors"
        );
    }
    Ok(MappedRows::new(records, errors))
}

/// Rendered values of the record's plain fields. Columns that are not
/// fields of the record take no part in grouping.
fn grouping_key(row: &RawRow, plain: &[&str]) -> String {
    let values: Vec<Option<&Value>> = plain.iter().map(|name| row.get(name)).collect();
    format!("{:?}", values)
}

fn initialize<T: Record>(
    schema: &Schema,
    rules: &AccumulationRules,
    idx: usize,
    row: &RawRow,
) -> Result<Group<T>, RowError> {
    let mut object = Map::new();
    for field in schema.fields() {
        let value = match rules.get(&field.name) {
            None => field_value(field, idx, row.get(&field.name))?,
            Some(Accumulation::Json { column }) => field_value(field, idx, row.get(column))?,
            Some(_) => empty_collection(&field.ty).unwrap_or(JsonValue::Null),
        };
        object.insert(field.name.clone(), value);
    }

    for (name, rule) in &rules.rules {
        if let Some(field) = schema.get(name) {
            contribute(&mut object, field, rule, idx, row)?;
        }
    }

    let validated = materialize::<T>(idx, object.clone())?;
    Ok(Group {
        first_row: idx,
        object,
        validated,
    })
}

/// Apply one row's contribution to an accumulating field. On error the
/// object is left untouched.
fn contribute(
    object: &mut Map<String, JsonValue>,
    field: &FieldDef,
    rule: &Accumulation,
    idx: usize,
    row: &RawRow,
) -> Result<(), RowError> {
    let element = field.ty.element().unwrap_or(&field.ty);
    let fail = |message: String| RowError::for_field(idx, &field.name, message);

    match rule {
        // Set at initialization only
        Accumulation::Json { .. } => Ok(()),
        Accumulation::List { column } | Accumulation::Set { column } => {
            let Some(value) = row.get(column).filter(|v| !v.is_null()) else {
                return Ok(());
            };
            let coerced = coerce(value, element).map_err(fail)?;
            let dedup = matches!(rule, Accumulation::Set { .. });
            push_items(object, &field.name, vec![coerced], dedup);
            Ok(())
        }
        Accumulation::CsvList { column } => {
            let Some(text) = row.get(column).and_then(Value::render) else {
                return Ok(());
            };
            let mut items = Vec::new();
            for piece in text.split(',').map(str::trim).filter(|p| !p.is_empty()) {
                items.push(coerce(&Value::from(piece), element).map_err(fail)?);
            }
            let dedup = matches!(field.ty, FieldType::Set(_));
            push_items(object, &field.name, items, dedup);
            Ok(())
        }
        Accumulation::Dict {
            key_column,
            value_column,
        } => {
            let Some(key) = row.get(key_column).and_then(Value::render) else {
                return Ok(());
            };
            let Some(value) = row.get(value_column).filter(|v| !v.is_null()) else {
                return Ok(());
            };
            let coerced = coerce(value, element).map_err(fail)?;
            if let Some(JsonValue::Object(map)) = object.get_mut(&field.name) {
                map.insert(key, coerced);
            }
            Ok(())
        }
    }
}

fn push_items(object: &mut Map<String, JsonValue>, field: &str, items: Vec<JsonValue>, dedup: bool) {
    if let Some(JsonValue::Array(existing)) = object.get_mut(field) {
        for item in items {
            if !(dedup && existing.contains(&item)) {
                existing.push(item);
            }
        }
    }
}
