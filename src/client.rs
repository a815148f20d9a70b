//! Client facade over one named database.
//!
//! A [`DatabaseClient`] owns a lazy connection pool and offers CRUD helpers
//! keyed by record schemas and equality filters, plus raw template execution.
//! Every call compiles one statement, acquires a pooled connection for it and
//! releases the connection on every exit path. Mutating statements
//! auto-commit; [`DatabaseClient::batch_save`] is the only multi-statement
//! unit and runs inside a single transaction.

use crate::config::DatabaseConfig;
use crate::db::executor::{PreparedWrite, QueryExecutor};
use crate::db::named::{self, CompiledSql};
use crate::db::pool::{DbPool, create_pool};
use crate::error::{DaoError, DaoResult};
use crate::mapper::{AccumulationRules, MappedRows, map_row, map_rows, map_rows_accumulating};
use crate::models::{DatabaseType, ExecResult, Params, RawRow, Record};
use crate::query::{Filter, Statement, build_delete, build_insert, build_select, build_update};
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::{debug, info};

/// Live handle to one logical database.
#[derive(Debug, Clone)]
pub struct DatabaseClient {
    name: String,
    pool: DbPool,
    executor: QueryExecutor,
    echo: bool,
}

impl DatabaseClient {
    /// Validate `config` and build a lazily connecting handle.
    ///
    /// No connection is opened here; the first statement does that.
    pub fn connect(name: impl Into<String>, config: &DatabaseConfig) -> DaoResult<Self> {
        let name = name.into();
        config.validate()?;
        let pool = create_pool(config)?;
        info!(
            database = %name,
            db_type = %pool.db_type(),
            echo = config.echo,
            "Database handle created"
        );
        Ok(Self {
            name,
            pool,
            executor: QueryExecutor::with_timeout(config.query_timeout_or_default()),
            echo: config.echo,
        })
    }

    /// Wrap an existing pool.
    pub fn from_pool(name: impl Into<String>, pool: DbPool) -> Self {
        Self {
            name: name.into(),
            pool,
            executor: QueryExecutor::new(),
            echo: false,
        }
    }

    /// A handle sharing this pool whose calls use `deadline` as their timeout.
    pub fn with_timeout(&self, deadline: Duration) -> Self {
        Self {
            executor: QueryExecutor::with_timeout(deadline),
            ..self.clone()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn db_type(&self) -> DatabaseType {
        self.pool.db_type()
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn timeout(&self) -> Duration {
        self.executor.default_timeout()
    }

    /// Close the underlying pool. Clones of this handle stop working too.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    // =========================================================================
    // Record operations
    // =========================================================================

    /// Insert `instance` and return it with any generated identifier filled in.
    pub async fn save<T: Record>(&self, instance: T) -> DaoResult<T> {
        let stmt = build_insert(&instance)?;
        let write = self.prepare_write(&stmt)?;
        let result = self.executor.execute(&self.pool, &write).await?;
        with_generated_key(instance, stmt.generated_key(), result.last_insert_id)
    }

    /// Insert every instance in one transaction.
    ///
    /// Any failure rolls back the whole batch. Statements are built before
    /// the transaction starts, so an instance that cannot be serialized
    /// aborts the call without touching the database.
    pub async fn batch_save<T: Record>(&self, instances: Vec<T>) -> DaoResult<Vec<T>> {
        if instances.is_empty() {
            return Ok(instances);
        }
        let mut statements = Vec::with_capacity(instances.len());
        let mut writes = Vec::with_capacity(instances.len());
        for instance in &instances {
            let stmt = build_insert(instance)?;
            writes.push(self.prepare_write(&stmt)?);
            statements.push(stmt);
        }

        let results = self.executor.execute_batch(&self.pool, &writes).await?;
        debug!(
            database = %self.name,
            table = T::schema().table_name(),
            saved = results.len(),
            "Batch committed"
        );

        instances
            .into_iter()
            .zip(statements.iter().zip(results))
            .map(|(instance, (stmt, result))| {
                with_generated_key(instance, stmt.generated_key(), result.last_insert_id)
            })
            .collect()
    }

    /// Every record matching `filter`; an empty filter selects all rows.
    pub async fn find_by<T: Record>(&self, filter: &Filter) -> DaoResult<MappedRows<T>> {
        let stmt = build_select(&T::schema(), filter)?;
        let rows = self.query_by_statement(&stmt).await?;
        Ok(map_rows(&rows))
    }

    /// The first record matching `filter`, or `None` when nothing matches.
    ///
    /// Only the first row is mapped; if it fails to map that is an error,
    /// not `None`. Later matching rows are ignored.
    pub async fn find_one<T: Record>(&self, filter: &Filter) -> DaoResult<Option<T>> {
        let stmt = build_select(&T::schema(), filter)?;
        let rows = self.query_by_statement(&stmt).await?;
        match rows.first() {
            Some(row) => map_row::<T>(row)
                .map(Some)
                .map_err(|e| DaoError::mapping(vec![e])),
            None => Ok(None),
        }
    }

    /// Like [`find_one`](Self::find_one) but an empty result is [`DaoError::NotFound`].
    pub async fn get_one_or_fail<T: Record>(&self, filter: &Filter) -> DaoResult<T> {
        self.find_one::<T>(filter).await?.ok_or_else(|| {
            DaoError::not_found(T::schema().table_name(), filter.to_string())
        })
    }

    /// Delete every row matching `filter`. An empty filter is refused before
    /// any statement is issued.
    pub async fn delete_by<T: Record>(&self, filter: &Filter) -> DaoResult<ExecResult> {
        let schema = T::schema();
        if filter.is_empty() {
            return Err(DaoError::empty_filter("delete", schema.table_name()));
        }
        let stmt = build_delete(&schema, filter)?;
        self.execute_statement(&stmt).await
    }

    /// Overwrite the row identified by `instance`'s identifier with its fields.
    pub async fn update_by_id<T: Record>(&self, instance: &T) -> DaoResult<ExecResult> {
        let stmt = build_update(instance)?;
        self.execute_statement(&stmt).await
    }

    // =========================================================================
    // Templates and statements
    // =========================================================================

    /// Run a row-returning template with `:name` parameters.
    pub async fn query(&self, template: &str, params: &Params) -> DaoResult<Vec<RawRow>> {
        let compiled = self.compile(template, params)?;
        self.executor.fetch_rows(&self.pool, &compiled).await
    }

    /// Run a template and map each row into `T`.
    pub async fn query_as<T: Record>(&self, template: &str, params: &Params) -> DaoResult<MappedRows<T>> {
        let rows = self.query(template, params).await?;
        Ok(map_rows(&rows))
    }

    /// Run a template and fold rows into `T` instances using `rules`.
    pub async fn query_accumulating<T: Record>(
        &self,
        template: &str,
        params: &Params,
        rules: &AccumulationRules,
    ) -> DaoResult<MappedRows<T>> {
        let rows = self.query(template, params).await?;
        map_rows_accumulating(&rows, rules)
    }

    /// Run a mutating template. The statement auto-commits.
    pub async fn execute(&self, template: &str, params: &Params) -> DaoResult<ExecResult> {
        let compiled = self.compile(template, params)?;
        self.executor
            .execute(&self.pool, &PreparedWrite::new(compiled))
            .await
    }

    pub async fn query_by_statement(&self, stmt: &Statement) -> DaoResult<Vec<RawRow>> {
        self.query(stmt.sql(), stmt.params()).await
    }

    pub async fn execute_statement(&self, stmt: &Statement) -> DaoResult<ExecResult> {
        let write = self.prepare_write(stmt)?;
        self.executor.execute(&self.pool, &write).await
    }

    fn prepare_write(&self, stmt: &Statement) -> DaoResult<PreparedWrite> {
        let compiled = self.compile(stmt.sql(), stmt.params())?;
        Ok(PreparedWrite::new(compiled).returning(stmt.generated_key().map(str::to_string)))
    }

    fn compile(&self, template: &str, params: &Params) -> DaoResult<CompiledSql> {
        let compiled = named::compile(template, params, self.pool.db_type())?;
        if self.echo {
            info!(database = %self.name, sql = %compiled.sql, params = ?compiled.values, "Statement");
        } else {
            debug!(database = %self.name, sql = %compiled.sql, params = compiled.values.len(), "Statement");
        }
        Ok(compiled)
    }
}

/// Round-trip `instance` through serde to set its generated identifier.
fn with_generated_key<T: Record>(instance: T, column: Option<&str>, id: Option<i64>) -> DaoResult<T> {
    let (Some(column), Some(id)) = (column, id) else {
        return Ok(instance);
    };
    let mut value = serde_json::to_value(&instance)
        .map_err(|e| DaoError::internal(format!("Could not serialize saved record: {e}")))?;
    match value.as_object_mut() {
        Some(object) => {
            object.insert(column.to_string(), JsonValue::from(id));
        }
        None => return Ok(instance),
    }
    serde_json::from_value(value).map_err(|e| {
        DaoError::internal(format!(
            "Could not set generated key '{}' on saved record: {}",
            column, e
        ))
    })
}
