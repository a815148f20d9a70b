//! Statement generation from record schemas.
//!
//! Table and field names come from a validated [`Schema`], so they are safe
//! to splice into SQL. Every value travels as a named parameter.

use super::{Filter, Statement, StatementKind};
use crate::error::{DaoError, DaoResult};
use crate::models::{FieldDef, FieldType, Params, Record, Schema, Value};
use serde_json::{Map, Value as JsonValue};

/// `SELECT <fields> FROM <table> [WHERE ...]`. An empty filter selects every row.
pub fn build_select(schema: &Schema, filter: &Filter) -> DaoResult<Statement> {
    schema.validate()?;
    let columns = schema.field_names().collect::<Vec<_>>().join(", ");
    let mut sql = format!("SELECT {} FROM {}", columns, schema.table_name());
    let mut params = Params::new();
    push_where(&mut sql, &mut params, schema, filter)?;
    Ok(Statement::new(StatementKind::Select, sql, params))
}

/// `DELETE FROM <table> [WHERE ...]`.
///
/// An empty filter is accepted here; the client refuses to run it.
pub fn build_delete(schema: &Schema, filter: &Filter) -> DaoResult<Statement> {
    schema.validate()?;
    let mut sql = format!("DELETE FROM {}", schema.table_name());
    let mut params = Params::new();
    push_where(&mut sql, &mut params, schema, filter)?;
    Ok(Statement::new(StatementKind::Delete, sql, params))
}

/// `UPDATE <table> SET <every non-identifier field> WHERE <id> = :<id>`.
///
/// Overwrites the whole row with the instance's current values. Fails when
/// the schema has no identifier or the instance's identifier is NULL.
pub fn build_update<T: Record>(instance: &T) -> DaoResult<Statement> {
    let schema = T::schema();
    schema.validate()?;
    let id_field = schema.identifier_field().ok_or_else(|| {
        DaoError::configuration(format!(
            "Cannot update '{}': schema declares no identifier field",
            schema.table_name()
        ))
    })?;

    let mut object = to_object(instance, &schema)?;
    let id_value = field_param(id_field, object.remove(&id_field.name));
    if id_value.is_null() {
        return Err(DaoError::configuration(format!(
            "Cannot update '{}': identifier '{}' has no value",
            schema.table_name(),
            id_field.name
        )));
    }

    let mut params = Params::new();
    let mut assignments = Vec::new();
    for field in schema.fields().iter().filter(|f| !f.identifier) {
        assignments.push(format!("{} = :{}", field.name, field.name));
        params.insert(field.name.clone(), field_param(field, object.remove(&field.name)));
    }
    if assignments.is_empty() {
        return Err(DaoError::configuration(format!(
            "Cannot update '{}': no fields besides the identifier",
            schema.table_name()
        )));
    }
    params.insert(id_field.name.clone(), id_value);

    let sql = format!(
        "UPDATE {} SET {} WHERE {} = :{}",
        schema.table_name(),
        assignments.join(", "),
        id_field.name,
        id_field.name
    );
    Ok(Statement::new(StatementKind::Update, sql, params))
}

/// `INSERT INTO <table> (<fields>) VALUES (...)`.
///
/// A NULL identifier is left out so the database generates it; the
/// statement then records the identifier column as its generated key.
pub fn build_insert<T: Record>(instance: &T) -> DaoResult<Statement> {
    let schema = T::schema();
    schema.validate()?;
    let mut object = to_object(instance, &schema)?;

    let mut columns = Vec::new();
    let mut placeholders = Vec::new();
    let mut params = Params::new();
    let mut generated_key = None;

    for field in schema.fields() {
        let value = field_param(field, object.remove(&field.name));
        if field.identifier && value.is_null() {
            generated_key = Some(field.name.clone());
            continue;
        }
        columns.push(field.name.as_str());
        placeholders.push(format!(":{}", field.name));
        params.insert(field.name.clone(), value);
    }

    let sql = if columns.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES", schema.table_name())
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            schema.table_name(),
            columns.join(", "),
            placeholders.join(", ")
        )
    };
    Ok(Statement::new(StatementKind::Insert, sql, params).with_generated_key(generated_key))
}

fn push_where(sql: &mut String, params: &mut Params, schema: &Schema, filter: &Filter) -> DaoResult<()> {
    let mut predicates = Vec::with_capacity(filter.len());
    for (field, value) in filter.conditions() {
        if schema.get(field).is_none() {
            return Err(DaoError::configuration(format!(
                "Unknown field '{}' for '{}'",
                field,
                schema.table_name()
            )));
        }
        if value.is_null() {
            predicates.push(format!("{} IS NULL", field));
            continue;
        }
        // Repeated fields get distinct parameter names
        let mut name = field.clone();
        let mut suffix = 2;
        while params.get(&name).is_some() {
            name = format!("{}_{}", field, suffix);
            suffix += 1;
        }
        predicates.push(format!("{} = :{}", field, name));
        params.insert(name, value.clone());
    }
    if !predicates.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&predicates.join(" AND "));
    }
    Ok(())
}

fn to_object<T: Record>(instance: &T, schema: &Schema) -> DaoResult<Map<String, JsonValue>> {
    match serde_json::to_value(instance) {
        Ok(JsonValue::Object(map)) => Ok(map),
        Ok(_) => Err(DaoError::configuration(format!(
            "Records of '{}' must serialize to a JSON object",
            schema.table_name()
        ))),
        Err(e) => Err(DaoError::configuration(format!(
            "Could not serialize record for '{}': {}",
            schema.table_name(),
            e
        ))),
    }
}

/// Bind value for a serialized field, shaped by its declared type.
pub(crate) fn field_param(field: &FieldDef, value: Option<JsonValue>) -> Value {
    match (value, &field.ty) {
        (None | Some(JsonValue::Null), _) => Value::Null,
        (Some(JsonValue::Array(items)), FieldType::Bytes) => {
            let bytes: Option<Vec<u8>> = items
                .iter()
                .map(|b| b.as_u64().and_then(|b| u8::try_from(b).ok()))
                .collect();
            match bytes {
                Some(bytes) => Value::Bytes(bytes),
                None => Value::Json(JsonValue::Array(items)),
            }
        }
        (Some(v), FieldType::Json | FieldType::List(_) | FieldType::Set(_) | FieldType::Map(_)) => {
            Value::Json(v)
        }
        (Some(v), _) => Value::from_json(v),
    }
}
