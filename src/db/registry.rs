//! Registry of named database handles.
//!
//! Handles are built lazily: the first lookup of a name asks the
//! [`ConfigSource`] for its settings and constructs a [`DatabaseClient`].
//!
//! # Concurrency
//!
//! - `RwLock` protects the name map; lookups of known names take only a read lock
//! - `OnceCell` per name makes construction single-flight, so concurrent first
//!   lookups all observe the same handle
//! - No lock is held while a handle is being constructed or used
//!
//! Registering a name replaces its cell. Callers holding the previous handle
//! keep a working pool; it is not closed.

use crate::client::DatabaseClient;
use crate::config::{ConfigSource, DEFAULT_DATABASE, DatabaseConfig, Settings};
use crate::error::{DaoError, DaoResult};
use crate::models::{ExecResult, SqlRequest};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, info};

type HandleCell = Arc<OnceCell<Arc<DatabaseClient>>>;

/// Shared map from logical database names to live handles.
pub struct DatabaseRegistry {
    source: Arc<dyn ConfigSource>,
    handles: RwLock<HashMap<String, HandleCell>>,
}

impl DatabaseRegistry {
    /// Registry that resolves unknown names through `source`.
    pub fn new(source: impl ConfigSource + 'static) -> Self {
        Self::with_source(Arc::new(source))
    }

    pub fn with_source(source: Arc<dyn ConfigSource>) -> Self {
        Self {
            source,
            handles: RwLock::new(HashMap::new()),
        }
    }

    /// Registry with no configuration; only registered names resolve.
    pub fn empty() -> Self {
        Self::new(Settings::new())
    }

    /// Handle for `name`, building it from configuration on first use.
    pub async fn get(&self, name: &str) -> DaoResult<Arc<DatabaseClient>> {
        let cell = {
            let handles = self.handles.read().await;
            if let Some(cell) = handles.get(name) {
                Arc::clone(cell)
            } else {
                drop(handles);
                let mut handles = self.handles.write().await;
                // Double-check after acquiring write lock
                Arc::clone(
                    handles
                        .entry(name.to_string())
                        .or_insert_with(|| Arc::new(OnceCell::new())),
                )
            }
        };

        let built = cell
            .get_or_try_init(|| async {
                let config = self
                    .source
                    .lookup(name)
                    .ok_or_else(|| DaoError::unknown_database(name))?;
                debug!(database = %name, "Building handle from configuration");
                DatabaseClient::connect(name, &config).map(Arc::new)
            })
            .await;

        match built {
            Ok(client) => Ok(Arc::clone(client)),
            Err(e) => {
                // Drop the empty cell unless another caller replaced or filled it
                let mut handles = self.handles.write().await;
                let stale = handles
                    .get(name)
                    .is_some_and(|current| Arc::ptr_eq(current, &cell) && !current.initialized());
                if stale {
                    handles.remove(name);
                }
                Err(e)
            }
        }
    }

    /// Handle for [`DEFAULT_DATABASE`].
    pub async fn get_default(&self) -> DaoResult<Arc<DatabaseClient>> {
        self.get(DEFAULT_DATABASE).await
    }

    /// Create a handle for `name` from `config`, replacing any existing one.
    pub async fn register(
        &self,
        name: impl Into<String>,
        config: &DatabaseConfig,
    ) -> DaoResult<Arc<DatabaseClient>> {
        let name = name.into();
        let client = Arc::new(DatabaseClient::connect(name.clone(), config)?);
        let cell = Arc::new(OnceCell::new_with(Some(Arc::clone(&client))));
        let replaced = self.handles.write().await.insert(name.clone(), cell);
        info!(
            database = %name,
            replaced = replaced.is_some_and(|cell| cell.initialized()),
            "Database registered"
        );
        Ok(client)
    }

    /// Register the request's database and run its template as a modifying
    /// statement.
    pub async fn invoke(&self, request: SqlRequest) -> DaoResult<ExecResult> {
        let client = self.register(request.db_name, &request.config).await?;
        client.execute(&request.sql, &request.params).await
    }

    /// Names with a live handle, sorted.
    pub async fn names(&self) -> Vec<String> {
        let handles = self.handles.read().await;
        let mut names: Vec<String> = handles
            .iter()
            .filter(|(_, cell)| cell.initialized())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for DatabaseRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseRegistry").finish_non_exhaustive()
    }
}
