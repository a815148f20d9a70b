//! Statements and equality filters.
//!
//! A [`Statement`] is a SQL template with `:name` placeholders plus the
//! values to bind. Statements are built from a record schema by the
//! functions in [`builder`], or wrapped around a literal template with
//! [`Statement::from_template`]. Caller values are only ever bound, never
//! spliced into the SQL text.

pub mod builder;

pub use builder::{build_delete, build_insert, build_select, build_update};

use crate::models::{Params, Value};
use std::fmt;

/// What a statement does, as far as the client is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    /// Literal template; the caller decides whether it returns rows.
    Raw,
}

impl StatementKind {
    pub fn is_mutation(&self) -> bool {
        matches!(self, Self::Insert | Self::Update | Self::Delete)
    }
}

/// An immutable SQL template plus its named parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    kind: StatementKind,
    sql: String,
    params: Params,
    /// Identifier column left for the database to generate (inserts only).
    generated_key: Option<String>,
}

impl Statement {
    pub(crate) fn new(kind: StatementKind, sql: String, params: Params) -> Self {
        Self {
            kind,
            sql,
            params,
            generated_key: None,
        }
    }

    pub(crate) fn with_generated_key(mut self, column: Option<String>) -> Self {
        self.generated_key = column;
        self
    }

    /// Wrap a literal template. The SQL is neither parsed nor validated here.
    pub fn from_template(template: impl Into<String>, params: Params) -> Self {
        Self::new(StatementKind::Raw, template.into(), params)
    }

    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn generated_key(&self) -> Option<&str> {
        self.generated_key.as_deref()
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

/// Ordered equality predicates, combined with AND.
///
/// ```ignore
/// let filter = Filter::new().eq("name", "Deadpond").eq("age", 48);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<(String, Value)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `field` to equal `value`. A NULL value matches `IS NULL`.
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push((field.into(), value.into()));
        self
    }

    pub fn conditions(&self) -> &[(String, Value)] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Filter {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Filter::new(), |filter, (field, value)| filter.eq(field, value))
    }
}

/// Human-readable criteria, used in not-found errors.
impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.conditions.is_empty() {
            return f.write_str("no criteria");
        }
        for (idx, (field, value)) in self.conditions.iter().enumerate() {
            if idx > 0 {
                f.write_str(" AND ")?;
            }
            match value.render() {
                Some(rendered) => write!(f, "{} = {:?}", field, rendered)?,
                None => write!(f, "{} IS NULL", field)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_display() {
        let filter = Filter::new().eq("name", "Deadpond").eq("age", Value::Null);
        assert_eq!(filter.to_string(), "name = \"Deadpond\" AND age IS NULL");
        assert_eq!(Filter::new().to_string(), "no criteria");
    }

    #[test]
    fn test_from_template_keeps_sql_verbatim() {
        let stmt = Statement::from_template(
            "select * from hero where name = :name; -- anything",
            Params::new().with("name", "x"),
        );
        assert_eq!(stmt.kind(), StatementKind::Raw);
        assert_eq!(stmt.sql(), "select * from hero where name = :name; -- anything");
        assert_eq!(stmt.params().len(), 1);
    }

    #[test]
    fn test_filter_from_pairs() {
        let filter: Filter = vec![("a", 1), ("b", 2)].into_iter().collect();
        assert_eq!(filter.len(), 2);
        assert_eq!(filter.conditions()[1].0, "b");
    }
}
