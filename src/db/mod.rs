//! Database access layer.
//!
//! This module provides:
//! - Lazy connection pools per backend
//! - Named-parameter compilation to positional placeholders
//! - Statement execution with timeouts and transactional batches
//! - Row decoding into backend-neutral values
//! - The registry of named database handles

#[macro_use]
pub mod macros;
pub mod executor;
pub mod named;
pub mod params;
pub mod pool;
pub mod registry;
pub mod types;

pub use executor::{PreparedWrite, QueryExecutor};
pub use named::{CompiledSql, compile};
pub use pool::{DbPool, create_pool};
pub use registry::DatabaseRegistry;
