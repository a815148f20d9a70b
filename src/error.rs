//! Error types for sqldao.
//!
//! All failures surface through [`DaoError`]. Driver failures are converted
//! from `sqlx::Error` and propagated unchanged in meaning; nothing in this
//! crate retries.

use std::fmt;
use thiserror::Error;

/// A single row that could not be mapped into the target record type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowError {
    /// Zero-based index of the row in the result set.
    pub row: usize,
    /// Field that failed, when the failure is attributable to one.
    pub field: Option<String>,
    pub message: String,
}

impl RowError {
    pub fn new(row: usize, message: impl Into<String>) -> Self {
        Self {
            row,
            field: None,
            message: message.into(),
        }
    }

    pub fn for_field(row: usize, field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            row,
            field: Some(field.into()),
            message: message.into(),
        }
    }
}

impl fmt::Display for RowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(f, "row {} field '{}': {}", self.row, field, self.message),
            None => write!(f, "row {}: {}", self.row, self.message),
        }
    }
}

#[derive(Error, Debug)]
pub enum DaoError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Database '{name}' is not registered and has no configuration")]
    UnknownDatabase { name: String },

    #[error("Record not found in '{table}' for {criteria}")]
    NotFound { table: String, criteria: String },

    #[error("Refusing to {operation} from '{table}' without any filter")]
    EmptyFilter { operation: String, table: String },

    #[error("Mapping failed for {} row(s): {}", .errors.len(), summarize(.errors))]
    Mapping { errors: Vec<RowError> },

    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Database error: {message}")]
    Database {
        message: String,
        /// e.g., "23505" for a unique violation
        sql_state: Option<String>,
        suggestion: String,
    },

    #[error("Timeout: {operation} exceeded {elapsed_secs}s")]
    Timeout {
        operation: String,
        elapsed_secs: u32,
    },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

fn summarize(errors: &[RowError]) -> String {
    match errors.first() {
        Some(first) if errors.len() > 1 => format!("{} (and {} more)", first, errors.len() - 1),
        Some(first) => first.to_string(),
        None => "no details".to_string(),
    }
}

impl DaoError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an unknown database error.
    pub fn unknown_database(name: impl Into<String>) -> Self {
        Self::UnknownDatabase { name: name.into() }
    }

    /// Create a record not found error.
    pub fn not_found(table: impl Into<String>, criteria: impl Into<String>) -> Self {
        Self::NotFound {
            table: table.into(),
            criteria: criteria.into(),
        }
    }

    /// Create an empty filter error.
    pub fn empty_filter(operation: impl Into<String>, table: impl Into<String>) -> Self {
        Self::EmptyFilter {
            operation: operation.into(),
            table: table.into(),
        }
    }

    /// Create a mapping error from collected row errors.
    pub fn mapping(errors: Vec<RowError>) -> Self {
        Self::Mapping { errors }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a database error with optional SQL state.
    pub fn database(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Database {
            message: message.into(),
            sql_state,
            suggestion: suggestion.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, elapsed_secs: u32) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs,
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Database { suggestion, .. } => Some(suggestion),
            _ => None,
        }
    }

    /// True for failures that originate in the driver rather than in this crate.
    pub fn is_engine_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::Database { .. } | Self::Timeout { .. }
        )
    }
}

/// Convert sqlx errors to DaoError.
impl From<sqlx::Error> for DaoError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DaoError::connection(
                msg.to_string(),
                "Check the connection string format and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DaoError::database(
                    db_err.message(),
                    code,
                    "Check the SQL syntax, referenced objects and constraints",
                )
            }
            sqlx::Error::RowNotFound => DaoError::database(
                "No rows returned",
                None,
                "Verify the query conditions match existing data",
            ),
            sqlx::Error::PoolTimedOut => DaoError::timeout("connection pool acquire", 30),
            sqlx::Error::PoolClosed => {
                DaoError::connection("Connection pool is closed", "Re-register the database")
            }
            sqlx::Error::Io(io_err) => DaoError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DaoError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DaoError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::ColumnNotFound(col) => {
                DaoError::internal(format!("Column not found: {}", col))
            }
            sqlx::Error::ColumnDecode { index, source } => {
                DaoError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DaoError::internal(format!("Decode error: {}", source)),
            sqlx::Error::WorkerCrashed => DaoError::internal("Database worker crashed"),
            _ => DaoError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Result type alias for data-access operations.
pub type DaoResult<T> = Result<T, DaoError>;
