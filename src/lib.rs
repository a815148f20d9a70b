//! sqldao library
//!
//! A data-access layer over `sqlx` for MySQL, PostgreSQL and SQLite:
//! - CRUD helpers driven by record schemas and equality filters
//! - Raw SQL templates with `:name` parameters
//! - Mapping of result rows into typed records, including one-to-many
//!   accumulation into collection fields
//! - A registry resolving logical database names to live handles
//! - Repositories with SQL templates bound as callable values

pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod mapper;
pub mod models;
pub mod query;
pub mod repository;

pub use client::DatabaseClient;
pub use config::{ConfigSource, DatabaseConfig, Settings};
pub use db::DatabaseRegistry;
pub use error::{DaoError, DaoResult, RowError};
pub use mapper::{Accumulation, AccumulationRules, MappedRows};
pub use models::{ExecResult, FieldType, Params, RawRow, Record, Schema, SqlRequest, Value};
pub use query::{Filter, Statement};
pub use repository::{BoundModify, BoundQuery, Repository};
