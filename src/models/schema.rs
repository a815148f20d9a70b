//! Record schemas.
//!
//! A [`Schema`] describes the table and typed fields behind a [`Record`]
//! type. The statement builder uses it to generate SQL and the result mapper
//! uses it to coerce column values into field types.

use crate::error::{DaoError, DaoResult};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Declared type of a record field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    Integer,
    Float,
    Boolean,
    Text,
    /// Date-time, exchanged as `YYYY-MM-DDTHH:MM:SS[.fff]`
    Timestamp,
    /// Arbitrary JSON structure (objects, nested arrays)
    Json,
    Bytes,
    List(Box<FieldType>),
    Set(Box<FieldType>),
    /// String-keyed map
    Map(Box<FieldType>),
}

impl FieldType {
    pub fn list_of(inner: FieldType) -> Self {
        Self::List(Box::new(inner))
    }

    pub fn set_of(inner: FieldType) -> Self {
        Self::Set(Box::new(inner))
    }

    pub fn map_of(inner: FieldType) -> Self {
        Self::Map(Box::new(inner))
    }

    /// Element type of a collection field.
    pub fn element(&self) -> Option<&FieldType> {
        match self {
            Self::List(inner) | Self::Set(inner) | Self::Map(inner) => Some(inner),
            _ => None,
        }
    }

    pub fn is_collection(&self) -> bool {
        self.element().is_some()
    }
}

/// One field of a record schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    pub name: String,
    pub ty: FieldType,
    pub nullable: bool,
    pub identifier: bool,
}

impl FieldDef {
    /// A field that must be present and non-null when mapping, unless it is
    /// a collection (collections default to empty).
    pub fn is_required(&self) -> bool {
        !self.nullable && !self.ty.is_collection()
    }
}

/// Table name plus ordered, typed fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    table: String,
    fields: Vec<FieldDef>,
}

impl Schema {
    pub fn table(name: impl Into<String>) -> Self {
        Self {
            table: name.into(),
            fields: Vec::new(),
        }
    }

    /// Add a required field.
    pub fn field(self, name: impl Into<String>, ty: FieldType) -> Self {
        self.push(name, ty, false, false)
    }

    /// Add a field that may be NULL or absent.
    pub fn nullable(self, name: impl Into<String>, ty: FieldType) -> Self {
        self.push(name, ty, true, false)
    }

    /// Add the identifier field. Identifiers are nullable so unsaved records
    /// can leave them to the database.
    pub fn identifier(self, name: impl Into<String>, ty: FieldType) -> Self {
        self.push(name, ty, true, true)
    }

    fn push(mut self, name: impl Into<String>, ty: FieldType, nullable: bool, identifier: bool) -> Self {
        self.fields.push(FieldDef {
            name: name.into(),
            ty,
            nullable,
            identifier,
        });
        self
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn identifier_field(&self) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.identifier)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Check that every name can be spliced into SQL as a bare identifier and
    /// that the schema is internally consistent.
    pub fn validate(&self) -> DaoResult<()> {
        let table_ok = !self.table.is_empty() && self.table.split('.').all(is_identifier);
        if !table_ok {
            return Err(DaoError::configuration(format!(
                "Invalid table name '{}'",
                self.table
            )));
        }
        if self.fields.is_empty() {
            return Err(DaoError::configuration(format!(
                "Schema for '{}' declares no fields",
                self.table
            )));
        }
        for (idx, field) in self.fields.iter().enumerate() {
            if !is_identifier(&field.name) {
                return Err(DaoError::configuration(format!(
                    "Invalid field name '{}' in '{}'",
                    field.name, self.table
                )));
            }
            if self.fields[..idx].iter().any(|f| f.name == field.name) {
                return Err(DaoError::configuration(format!(
                    "Duplicate field '{}' in '{}'",
                    field.name, self.table
                )));
            }
        }
        if self.fields.iter().filter(|f| f.identifier).count() > 1 {
            return Err(DaoError::configuration(format!(
                "Schema for '{}' declares more than one identifier",
                self.table
            )));
        }
        Ok(())
    }
}

/// `[A-Za-z_][A-Za-z0-9_]*`
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

/// An application record type the data-access layer can read and write.
///
/// Records travel through serde: writes serialize the record into a JSON
/// object and bind its fields, reads build a JSON object from coerced column
/// values and deserialize it.
///
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct Hero { id: Option<i64>, name: String, age: Option<i64> }
///
/// impl Record for Hero {
///     fn schema() -> Schema {
///         Schema::table("hero")
///             .identifier("id", FieldType::Integer)
///             .field("name", FieldType::Text)
///             .nullable("age", FieldType::Integer)
///     }
/// }
/// ```
pub trait Record: Serialize + DeserializeOwned + Send + Sync + 'static {
    fn schema() -> Schema;
}
