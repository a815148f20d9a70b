//! Named-parameter compilation.
//!
//! SQL templates use `:name` placeholders. Before execution they are
//! rewritten to the driver's positional form (`?` for MySQL and SQLite,
//! `$n` for PostgreSQL) and the bound values are ordered to match.
//!
//! Placeholders are found with the sqlparser tokenizer, so `:name` inside
//! string literals, quoted identifiers and comments is left alone, as are
//! PostgreSQL `::type` casts. Everything outside a placeholder is copied
//! from the template byte for byte.

use crate::error::{DaoError, DaoResult};
use crate::models::{DatabaseType, Params, PlaceholderStyle, Value};
use sqlparser::dialect::{Dialect, MySqlDialect, PostgreSqlDialect, SQLiteDialect};
use sqlparser::tokenizer::{Location, Token, TokenWithSpan, Tokenizer};
use std::collections::HashMap;

/// A template rewritten for one backend, with values in bind order.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledSql {
    pub sql: String,
    pub values: Vec<Value>,
}

/// A `:name` occurrence: byte range in the template and the name.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Placeholder {
    start: usize,
    end: usize,
    name: String,
}

/// Get the appropriate SQL dialect for the given database type.
fn get_dialect(db_type: DatabaseType) -> Box<dyn Dialect> {
    match db_type {
        DatabaseType::PostgreSQL => Box::new(PostgreSqlDialect {}),
        DatabaseType::MySQL => Box::new(MySqlDialect {}),
        DatabaseType::SQLite => Box::new(SQLiteDialect {}),
    }
}

/// Names of the placeholders in `template`, in order of first appearance.
pub fn placeholder_names(template: &str, db_type: DatabaseType) -> DaoResult<Vec<String>> {
    let mut names: Vec<String> = Vec::new();
    for placeholder in find_placeholders(template, db_type)? {
        if !names.contains(&placeholder.name) {
            names.push(placeholder.name);
        }
    }
    Ok(names)
}

/// Rewrite `template` for `db_type` and collect the bound values.
///
/// Every placeholder must have a value in `params`; extra params are ignored.
/// A template without placeholders is returned unchanged.
pub fn compile(template: &str, params: &Params, db_type: DatabaseType) -> DaoResult<CompiledSql> {
    let placeholders = find_placeholders(template, db_type)?;
    if placeholders.is_empty() {
        return Ok(CompiledSql {
            sql: template.to_string(),
            values: Vec::new(),
        });
    }

    let style = db_type.placeholder_style();
    let mut sql = String::with_capacity(template.len());
    let mut values = Vec::new();
    let mut numbered: HashMap<&str, usize> = HashMap::new();
    let mut cursor = 0;

    for placeholder in &placeholders {
        let value = params.get(&placeholder.name).ok_or_else(|| {
            DaoError::configuration(format!(
                "No value supplied for parameter ':{}'",
                placeholder.name
            ))
        })?;

        sql.push_str(&template[cursor..placeholder.start]);
        match style {
            PlaceholderStyle::Question => {
                sql.push('?');
                values.push(value.clone());
            }
            PlaceholderStyle::Numbered => {
                let index = match numbered.get(placeholder.name.as_str()) {
                    Some(index) => *index,
                    None => {
                        values.push(value.clone());
                        numbered.insert(&placeholder.name, values.len());
                        values.len()
                    }
                };
                sql.push('$');
                sql.push_str(&index.to_string());
            }
        }
        cursor = placeholder.end;
    }
    sql.push_str(&template[cursor..]);

    Ok(CompiledSql { sql, values })
}

fn find_placeholders(template: &str, db_type: DatabaseType) -> DaoResult<Vec<Placeholder>> {
    // Cheap exit for statements that cannot contain a placeholder
    if !template.contains(':') {
        return Ok(Vec::new());
    }

    let dialect = get_dialect(db_type);
    let tokens = Tokenizer::new(dialect.as_ref(), template)
        .with_unescape(false)
        .tokenize_with_location()
        .map_err(|e| DaoError::configuration(format!("Could not tokenize SQL template: {e}")))?;

    let offsets = LineOffsets::new(template);
    let mut placeholders = Vec::new();
    for pair in tokens.windows(2) {
        let [colon, next] = pair else { continue };
        if colon.token != Token::Colon {
            continue;
        }
        let Some(name) = placeholder_name(next) else {
            continue;
        };
        let Some(start) = offsets.byte_offset(template, colon.span.start) else {
            continue;
        };
        // The name must follow the colon directly
        let end = start + 1 + name.len();
        if template.get(start + 1..end) != Some(name) {
            continue;
        }
        placeholders.push(Placeholder {
            start,
            end,
            name: name.to_string(),
        });
    }
    Ok(placeholders)
}

fn placeholder_name(token: &TokenWithSpan) -> Option<&str> {
    match &token.token {
        Token::Word(word) if word.quote_style.is_none() => Some(word.value.as_str()),
        _ => None,
    }
}

/// Maps tokenizer locations (1-based line and character column) to byte offsets.
struct LineOffsets {
    starts: Vec<usize>,
}

impl LineOffsets {
    fn new(text: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(text.match_indices('\n').map(|(idx, _)| idx + 1));
        Self { starts }
    }

    fn byte_offset(&self, text: &str, location: Location) -> Option<usize> {
        let line = usize::try_from(location.line).ok()?.checked_sub(1)?;
        let column = usize::try_from(location.column).ok()?.checked_sub(1)?;
        let line_start = *self.starts.get(line)?;
        text[line_start..]
            .char_indices()
            .nth(column)
            .map(|(idx, _)| line_start + idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> Params {
        Params::new().with("name", "Deadpond").with("age", 30)
    }

    #[test]
    fn test_question_style_one_value_per_occurrence() {
        let compiled = compile(
            "SELECT * FROM hero WHERE name = :name OR alias = :name AND age > :age",
            &params(),
            DatabaseType::SQLite,
        )
        .unwrap();
        assert_eq!(
            compiled.sql,
            "SELECT * FROM hero WHERE name = ? OR alias = ? AND age > ?"
        );
        assert_eq!(
            compiled.values,
            vec![Value::from("Deadpond"), Value::from("Deadpond"), Value::Int(30)]
        );
    }

    #[test]
    fn test_numbered_style_reuses_index() {
        let compiled = compile(
            "SELECT * FROM hero WHERE name = :name OR alias = :name AND age > :age",
            &params(),
            DatabaseType::PostgreSQL,
        )
        .unwrap();
        assert_eq!(
            compiled.sql,
            "SELECT * FROM hero WHERE name = $1 OR alias = $1 AND age > $2"
        );
        assert_eq!(compiled.values, vec![Value::from("Deadpond"), Value::Int(30)]);
    }

    #[test]
    fn test_literals_comments_and_casts_untouched() {
        let template = "SELECT ':name', \":age\", created::text -- :age\nFROM hero /* :name */ WHERE id = :age";
        let compiled = compile(template, &params(), DatabaseType::PostgreSQL).unwrap();
        assert_eq!(
            compiled.sql,
            "SELECT ':name', \":age\", created::text -- :age\nFROM hero /* :name */ WHERE id = $1"
        );
        assert_eq!(compiled.values, vec![Value::Int(30)]);
    }

    #[test]
    fn test_multiline_and_unicode_offsets() {
        let template = "SELECT 'héros'\n  FROM hero\n WHERE name = :name";
        let compiled = compile(template, &params(), DatabaseType::MySQL).unwrap();
        assert_eq!(compiled.sql, "SELECT 'héros'\n  FROM hero\n WHERE name = ?");
    }

    #[test]
    fn test_missing_parameter_is_configuration_error() {
        let err = compile(
            "SELECT * FROM hero WHERE power = :power",
            &params(),
            DatabaseType::SQLite,
        )
        .unwrap_err();
        assert!(matches!(err, DaoError::Configuration { .. }));
        assert!(err.to_string().contains(":power"));
    }

    #[test]
    fn test_no_placeholders_returns_template() {
        let template = "SELECT count(*) FROM hero";
        let compiled = compile(template, &Params::new(), DatabaseType::PostgreSQL).unwrap();
        assert_eq!(compiled.sql, template);
        assert!(compiled.values.is_empty());
    }

    #[test]
    fn test_placeholder_names_first_appearance() {
        let names = placeholder_names(
            "UPDATE hero SET age = :age WHERE name = :name AND age <> :age",
            DatabaseType::SQLite,
        )
        .unwrap();
        assert_eq!(names, vec!["age", "name"]);
    }
}
