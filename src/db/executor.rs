//! Statement execution engine.
//!
//! This module runs compiled statements against a [`DbPool`] with:
//! - Query timeouts
//! - Generated-key retrieval for inserts
//! - All-or-nothing batches inside one transaction
//!
//! # Architecture
//!
//! The executor uses database-specific implementations organized in submodules:
//! - `mysql`: MySQL-specific query and write operations
//! - `postgres`: PostgreSQL-specific query and write operations
//! - `sqlite`: SQLite-specific query and write operations
//!
//! Each submodule provides identical functionality adapted to the database's type system.

use crate::db::named::CompiledSql;
use crate::db::pool::DbPool;
use crate::db::types::ToRawRow;
use crate::error::{DaoError, DaoResult};
use crate::models::{DEFAULT_QUERY_TIMEOUT_SECS, ExecResult, RawRow};
use futures_util::StreamExt;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::debug;

/// A compiled write plus, for inserts, the identifier column whose generated
/// value should be reported back.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedWrite {
    pub compiled: CompiledSql,
    pub returning: Option<String>,
}

impl PreparedWrite {
    pub fn new(compiled: CompiledSql) -> Self {
        Self {
            compiled,
            returning: None,
        }
    }

    pub fn returning(mut self, column: Option<String>) -> Self {
        self.returning = column;
        self
    }
}

/// Statement executor that applies a default timeout.
#[derive(Debug, Clone)]
pub struct QueryExecutor {
    default_timeout: Duration,
}

impl QueryExecutor {
    /// Create a new executor with the default timeout.
    pub fn new() -> Self {
        Self {
            default_timeout: Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS),
        }
    }

    /// Create a new executor with a custom default timeout.
    pub fn with_timeout(default_timeout: Duration) -> Self {
        Self { default_timeout }
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Run a row-returning statement and decode every row.
    pub async fn fetch_rows(&self, pool: &DbPool, compiled: &CompiledSql) -> DaoResult<Vec<RawRow>> {
        let start = Instant::now();
        let query_timeout = self.default_timeout;

        debug!(
            sql = %compiled.sql,
            params = compiled.values.len(),
            timeout_secs = query_timeout.as_secs(),
            "Executing query"
        );

        let rows = match pool {
            DbPool::MySql(p) => mysql::fetch_rows(p, compiled, query_timeout).await?,
            DbPool::Postgres(p) => postgres::fetch_rows(p, compiled, query_timeout).await?,
            DbPool::SQLite(p) => sqlite::fetch_rows(p, compiled, query_timeout).await?,
        };

        debug!(
            rows = rows.len(),
            execution_time_ms = start.elapsed().as_millis() as u64,
            "Query finished"
        );
        Ok(rows)
    }

    /// Execute a write operation (INSERT, UPDATE, DELETE, DDL).
    ///
    /// When `write.returning` names a column, the generated key of the
    /// inserted row is reported in [`ExecResult::last_insert_id`].
    pub async fn execute(&self, pool: &DbPool, write: &PreparedWrite) -> DaoResult<ExecResult> {
        let start = Instant::now();
        let query_timeout = self.default_timeout;

        debug!(
            sql = %write.compiled.sql,
            params = write.compiled.values.len(),
            timeout_secs = query_timeout.as_secs(),
            "Executing write operation"
        );

        let result = match pool {
            DbPool::MySql(p) => mysql::execute_write(p, write, query_timeout).await?,
            DbPool::Postgres(p) => postgres::execute_write(p, write, query_timeout).await?,
            DbPool::SQLite(p) => sqlite::execute_write(p, write, query_timeout).await?,
        };

        debug!(
            rows_affected = result.rows_affected,
            execution_time_ms = start.elapsed().as_millis() as u64,
            "Write finished"
        );
        Ok(result)
    }

    /// Execute all writes in one transaction; any failure rolls back every one.
    pub async fn execute_batch(
        &self,
        pool: &DbPool,
        writes: &[PreparedWrite],
    ) -> DaoResult<Vec<ExecResult>> {
        let query_timeout = self.default_timeout;

        debug!(
            statements = writes.len(),
            timeout_secs = query_timeout.as_secs(),
            "Executing batch in transaction"
        );

        match pool {
            DbPool::MySql(p) => mysql::execute_batch(p, writes, query_timeout).await,
            DbPool::Postgres(p) => postgres::execute_batch(p, writes, query_timeout).await,
            DbPool::SQLite(p) => sqlite::execute_batch(p, writes, query_timeout).await,
        }
    }
}

impl Default for QueryExecutor {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Common Helper Functions
// =============================================================================

fn collect_rows<R: ToRawRow>(results: Vec<Result<R, sqlx::Error>>) -> DaoResult<Vec<RawRow>> {
    let mut rows = Vec::with_capacity(results.len());
    for result in results {
        rows.push(result.map_err(DaoError::from)?.to_raw_row());
    }
    Ok(rows)
}

fn timeout_error(operation: &str, timeout: Duration) -> DaoError {
    DaoError::timeout(operation, timeout.as_secs() as u32)
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================
//
// Each module below provides the same interface adapted to its database type.
// The code structure is intentionally parallel to make differences obvious.

mod mysql {
    use super::*;
    use crate::db::params::bind_mysql_param;
    use sqlx::mysql::MySqlRow;
    use sqlx::{MySql, MySqlPool};

    pub async fn fetch_rows(
        pool: &MySqlPool,
        compiled: &CompiledSql,
        query_timeout: Duration,
    ) -> DaoResult<Vec<RawRow>> {
        // When params is empty, use raw SQL to avoid prepared statement issues
        let rows_future = if compiled.values.is_empty() {
            use sqlx::Executor;
            pool.fetch(compiled.sql.as_str()).collect::<Vec<_>>()
        } else {
            let mut query = sqlx::query(&compiled.sql);
            for value in &compiled.values {
                query = bind_mysql_param(query, value);
            }
            query.fetch(pool).collect::<Vec<_>>()
        };

        match timeout(query_timeout, rows_future).await {
            Ok(results) => collect_rows::<MySqlRow>(results),
            Err(_) => Err(timeout_error("query execution", query_timeout)),
        }
    }

    pub async fn execute_write(
        pool: &MySqlPool,
        write: &PreparedWrite,
        query_timeout: Duration,
    ) -> DaoResult<ExecResult> {
        write_with(pool, write, query_timeout).await
    }

    pub async fn execute_batch(
        pool: &MySqlPool,
        writes: &[PreparedWrite],
        query_timeout: Duration,
    ) -> DaoResult<Vec<ExecResult>> {
        let mut tx = match timeout(query_timeout, pool.begin()).await {
            Ok(tx) => tx.map_err(DaoError::from)?,
            Err(_) => return Err(timeout_error("transaction begin", query_timeout)),
        };
        let mut results = Vec::with_capacity(writes.len());
        for write in writes {
            match write_with(&mut *tx, write, query_timeout).await {
                Ok(result) => results.push(result),
                Err(e) => {
                    // Best effort rollback - the original error is what matters
                    let _ = tx.rollback().await;
                    return Err(e);
                }
            }
        }
        match timeout(query_timeout, tx.commit()).await {
            Ok(committed) => committed.map_err(DaoError::from)?,
            Err(_) => return Err(timeout_error("transaction commit", query_timeout)),
        }
        Ok(results)
    }

    async fn write_with<'c, E>(
        executor: E,
        write: &PreparedWrite,
        query_timeout: Duration,
    ) -> DaoResult<ExecResult>
    where
        E: sqlx::Executor<'c, Database = MySql>,
    {
        let compiled = &write.compiled;
        // When params is empty, execute raw SQL directly to avoid prepared statement issues
        // (some SQL like CREATE PROCEDURE doesn't support prepared statements)
        let result = if compiled.values.is_empty() {
            timeout(query_timeout, executor.execute(compiled.sql.as_str())).await
        } else {
            let mut query = sqlx::query(&compiled.sql);
            for value in &compiled.values {
                query = bind_mysql_param(query, value);
            }
            timeout(query_timeout, query.execute(executor)).await
        };

        match result {
            Ok(Ok(r)) => Ok(ExecResult {
                rows_affected: r.rows_affected(),
                last_insert_id: write
                    .returning
                    .as_ref()
                    .and_then(|_| i64::try_from(r.last_insert_id()).ok())
                    .filter(|id| *id > 0),
            }),
            Ok(Err(e)) => Err(DaoError::from(e)),
            Err(_) => Err(timeout_error("write operation", query_timeout)),
        }
    }
}

mod postgres {
    use super::*;
    use sqlx::postgres::PgRow;
    use crate::db::params::bind_postgres_param;
    use sqlx::{PgPool, Postgres};

    pub async fn fetch_rows(
        pool: &PgPool,
        compiled: &CompiledSql,
        query_timeout: Duration,
    ) -> DaoResult<Vec<RawRow>> {
        let rows_future = if compiled.values.is_empty() {
            use sqlx::Executor;
            pool.fetch(compiled.sql.as_str()).collect::<Vec<_>>()
        } else {
            let mut query = sqlx::query(&compiled.sql);
            for value in &compiled.values {
                query = bind_postgres_param(query, value);
            }
            query.fetch(pool).collect::<Vec<_>>()
        };

        match timeout(query_timeout, rows_future).await {
            Ok(results) => collect_rows::<PgRow>(results),
            Err(_) => Err(timeout_error("query execution", query_timeout)),
        }
    }

    pub async fn execute_write(
        pool: &PgPool,
        write: &PreparedWrite,
        query_timeout: Duration,
    ) -> DaoResult<ExecResult> {
        write_with(pool, write, query_timeout).await
    }

    pub async fn execute_batch(
        pool: &PgPool,
        writes: &[PreparedWrite],
        query_timeout: Duration,
    ) -> DaoResult<Vec<ExecResult>> {
        let mut tx = match timeout(query_timeout, pool.begin()).await {
            Ok(tx) => tx.map_err(DaoError::from)?,
            Err(_) => return Err(timeout_error("transaction begin", query_timeout)),
        };
        let mut results = Vec::with_capacity(writes.len());
        for write in writes {
            match write_with(&mut *tx, write, query_timeout).await {
                Ok(result) => results.push(result),
                Err(e) => {
                    let _ = tx.rollback().await;
                    return Err(e);
                }
            }
        }
        match timeout(query_timeout, tx.commit()).await {
            Ok(committed) => committed.map_err(DaoError::from)?,
            Err(_) => return Err(timeout_error("transaction commit", query_timeout)),
        }
        Ok(results)
    }

    async fn write_with<'c, E>(
        executor: E,
        write: &PreparedWrite,
        query_timeout: Duration,
    ) -> DaoResult<ExecResult>
    where
        E: sqlx::Executor<'c, Database = Postgres>,
    {
        let compiled = &write.compiled;

        // PostgreSQL reports generated keys through RETURNING
        if let Some(column) = &write.returning {
            let sql = format!("{} RETURNING {}", compiled.sql, column);
            let mut query = sqlx::query(&sql);
            for value in &compiled.values {
                query = bind_postgres_param(query, value);
            }
            return match timeout(query_timeout, query.fetch_optional(executor)).await {
                Ok(Ok(row)) => {
                    let raw = row.map(|r| r.to_raw_row());
                    Ok(ExecResult {
                        rows_affected: u64::from(raw.is_some()),
                        last_insert_id: raw
                            .as_ref()
                            .and_then(|r| r.get(column))
                            .and_then(|v| v.as_i64()),
                    })
                }
                Ok(Err(e)) => Err(DaoError::from(e)),
                Err(_) => Err(timeout_error("write operation", query_timeout)),
            };
        }

        let result = if compiled.values.is_empty() {
            timeout(query_timeout, executor.execute(compiled.sql.as_str())).await
        } else {
            let mut query = sqlx::query(&compiled.sql);
            for value in &compiled.values {
                query = bind_postgres_param(query, value);
            }
            timeout(query_timeout, query.execute(executor)).await
        };

        match result {
            Ok(Ok(r)) => Ok(ExecResult {
                rows_affected: r.rows_affected(),
                last_insert_id: None,
            }),
            Ok(Err(e)) => Err(DaoError::from(e)),
            Err(_) => Err(timeout_error("write operation", query_timeout)),
        }
    }
}

mod sqlite {
    use super::*;
    use crate::db::params::bind_sqlite_param;
    use sqlx::sqlite::SqliteRow;
    use sqlx::{Sqlite, SqlitePool};

    pub async fn fetch_rows(
        pool: &SqlitePool,
        compiled: &CompiledSql,
        query_timeout: Duration,
    ) -> DaoResult<Vec<RawRow>> {
        let rows_future = if compiled.values.is_empty() {
            use sqlx::Executor;
            pool.fetch(compiled.sql.as_str()).collect::<Vec<_>>()
        } else {
            let mut query = sqlx::query(&compiled.sql);
            for value in &compiled.values {
                query = bind_sqlite_param(query, value);
            }
            query.fetch(pool).collect::<Vec<_>>()
        };

        match timeout(query_timeout, rows_future).await {
            Ok(results) => collect_rows::<SqliteRow>(results),
            Err(_) => Err(timeout_error("query execution", query_timeout)),
        }
    }

    pub async fn execute_write(
        pool: &SqlitePool,
        write: &PreparedWrite,
        query_timeout: Duration,
    ) -> DaoResult<ExecResult> {
        write_with(pool, write, query_timeout).await
    }

    pub async fn execute_batch(
        pool: &SqlitePool,
        writes: &[PreparedWrite],
        query_timeout: Duration,
    ) -> DaoResult<Vec<ExecResult>> {
        let mut tx = match timeout(query_timeout, pool.begin()).await {
            Ok(tx) => tx.map_err(DaoError::from)?,
            Err(_) => return Err(timeout_error("transaction begin", query_timeout)),
        };
        let mut results = Vec::with_capacity(writes.len());
        for write in writes {
            match write_with(&mut *tx, write, query_timeout).await {
                Ok(result) => results.push(result),
                Err(e) => {
                    let _ = tx.rollback().await;
                    return Err(e);
                }
            }
        }
        match timeout(query_timeout, tx.commit()).await {
            Ok(committed) => committed.map_err(DaoError::from)?,
            Err(_) => return Err(timeout_error("transaction commit", query_timeout)),
        }
        Ok(results)
    }

    async fn write_with<'c, E>(
        executor: E,
        write: &PreparedWrite,
        query_timeout: Duration,
    ) -> DaoResult<ExecResult>
    where
        E: sqlx::Executor<'c, Database = Sqlite>,
    {
        let compiled = &write.compiled;
        let result = if compiled.values.is_empty() {
            timeout(query_timeout, executor.execute(compiled.sql.as_str())).await
        } else {
            let mut query = sqlx::query(&compiled.sql);
            for value in &compiled.values {
                query = bind_sqlite_param(query, value);
            }
            timeout(query_timeout, query.execute(executor)).await
        };

        match result {
            Ok(Ok(r)) => Ok(ExecResult {
                rows_affected: r.rows_affected(),
                last_insert_id: write
                    .returning
                    .as_ref()
                    .map(|_| r.last_insert_rowid())
                    .filter(|id| *id > 0),
            }),
            Ok(Err(e)) => Err(DaoError::from(e)),
            Err(_) => Err(timeout_error("write operation", query_timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_executor_defaults() {
        let executor = QueryExecutor::new();
        assert_eq!(
            executor.default_timeout(),
            Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS)
        );
    }

    #[test]
    fn test_executor_custom_timeout() {
        let executor = QueryExecutor::with_timeout(Duration::from_secs(60));
        assert_eq!(executor.default_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_prepared_write_returning() {
        let compiled = CompiledSql {
            sql: "INSERT INTO hero (name) VALUES (?)".to_string(),
            values: vec!["Deadpond".into()],
        };
        let write = PreparedWrite::new(compiled).returning(Some("id".to_string()));
        assert_eq!(write.returning.as_deref(), Some("id"));
    }

    #[tokio::test]
    async fn test_batch_deadline_covers_connection_acquisition() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}", dir.path().join("busy.db").display());
        let pool = crate::db::pool::create_pool(&crate::config::DatabaseConfig::from_url(url)).unwrap();
        let DbPool::SQLite(inner) = &pool else {
            panic!("Expected SQLite pool");
        };
        // The only connection is taken, so begin() has to wait
        let _held = inner.acquire().await.unwrap();

        let executor = QueryExecutor::with_timeout(Duration::from_millis(200));
        let write = PreparedWrite::new(CompiledSql {
            sql: "SELECT 1".to_string(),
            values: Vec::new(),
        });
        let start = Instant::now();
        let err = executor.execute_batch(&pool, &[write]).await.unwrap_err();
        assert!(matches!(err, DaoError::Timeout { .. }), "unexpected error: {:?}", err);
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
