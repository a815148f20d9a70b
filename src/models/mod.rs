//! Data models for sqldao.
//!
//! This module re-exports all model types used throughout the crate.

pub mod connection;
pub mod query;
pub mod row;
pub mod schema;
pub mod value;

// Re-export commonly used types
pub use connection::{DatabaseType, PlaceholderStyle};
pub use query::{DEFAULT_QUERY_TIMEOUT_SECS, ExecResult, MAX_QUERY_TIMEOUT_SECS, SqlRequest};
pub use row::{Params, RawRow};
pub use schema::{FieldDef, FieldType, Record, Schema};
pub use value::Value;
