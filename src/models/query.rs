//! Query-related data models.

use crate::config::DatabaseConfig;
use crate::models::row::Params;

/// Default query timeout in seconds.
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;

/// Maximum query timeout in seconds.
pub const MAX_QUERY_TIMEOUT_SECS: u64 = 300;

/// Result of a mutating statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct ExecResult {
    pub rows_affected: u64,
    /// Generated key of the last inserted row, when the backend reports one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_insert_id: Option<i64>,
}

/// A self-contained request to run one template against a database that may
/// not be registered yet.
#[derive(Debug, Clone)]
pub struct SqlRequest {
    /// Name the database is registered under before execution.
    pub db_name: String,
    pub config: DatabaseConfig,
    pub sql: String,
    pub params: Params,
}

impl SqlRequest {
    pub fn new(db_name: impl Into<String>, config: DatabaseConfig, sql: impl Into<String>) -> Self {
        Self {
            db_name: db_name.into(),
            config,
            sql: sql.into(),
            params: Params::new(),
        }
    }

    /// Add a named parameter to this request.
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<crate::Value>) -> Self {
        self.params.insert(name, value);
        self
    }
}
