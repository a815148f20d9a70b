//! Repositories and bound SQL templates.
//!
//! A [`Repository`] ties a record type to a database qualifier. Application
//! code builds its query methods as bound values:
//!
//! ```ignore
//! struct HeroRepo {
//!     base: Repository<Hero>,
//!     by_name: BoundQuery<Hero>,
//!     rename: BoundModify,
//! }
//!
//! let base = Repository::<Hero>::new(registry, Some("heroes".into()));
//! let repo = HeroRepo {
//!     by_name: base.bind_query("select * from hero where name = :name"),
//!     rename: base.bind_modify("update hero set name = :new where id = :id"),
//!     base,
//! };
//! let found = repo.by_name.call(&params! { "name" => "Deadpond" }).await?;
//! ```
//!
//! The database is resolved on every call, in this order: the binding's
//! [`on_database`](BoundQuery::on_database) override, the repository
//! qualifier, then `"default"`. Nothing is cached between calls, so a handle
//! re-registered in the registry is picked up by the next call.

use crate::client::DatabaseClient;
use crate::config::DEFAULT_DATABASE;
use crate::db::registry::DatabaseRegistry;
use crate::error::DaoResult;
use crate::mapper::{AccumulationRules, MappedRows};
use crate::models::{ExecResult, Params, Record};
use crate::query::Filter;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

/// Record-typed access to the database named by a qualifier.
pub struct Repository<T> {
    registry: Arc<DatabaseRegistry>,
    qualifier: Option<String>,
    _record: PhantomData<fn() -> T>,
}

impl<T> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            qualifier: self.qualifier.clone(),
            _record: PhantomData,
        }
    }
}

impl<T: Record> Repository<T> {
    /// `qualifier` names the database; `None` means `"default"`.
    pub fn new(registry: Arc<DatabaseRegistry>, qualifier: Option<String>) -> Self {
        Self {
            registry,
            qualifier,
            _record: PhantomData,
        }
    }

    pub fn database_name(&self) -> &str {
        self.qualifier.as_deref().unwrap_or(DEFAULT_DATABASE)
    }

    /// Current handle for this repository's database.
    pub async fn db_handle(&self) -> DaoResult<Arc<DatabaseClient>> {
        self.registry.get(self.database_name()).await
    }

    /// Bind a row-returning template whose rows map into `T`.
    pub fn bind_query(&self, template: impl Into<String>) -> BoundQuery<T> {
        self.bind_query_as::<T>(template)
    }

    /// Bind a row-returning template whose rows map into `U` instead of `T`.
    pub fn bind_query_as<U: Record>(&self, template: impl Into<String>) -> BoundQuery<U> {
        BoundQuery {
            binding: self.binding(template.into()),
            rules: None,
            _record: PhantomData,
        }
    }

    /// Bind a modifying template.
    pub fn bind_modify(&self, template: impl Into<String>) -> BoundModify {
        BoundModify {
            binding: self.binding(template.into()),
        }
    }

    fn binding(&self, template: String) -> Binding {
        Binding {
            registry: Arc::clone(&self.registry),
            qualifier: self.qualifier.clone(),
            db_override: None,
            template,
        }
    }

    pub async fn save(&self, instance: T) -> DaoResult<T> {
        self.db_handle().await?.save(instance).await
    }

    pub async fn batch_save(&self, instances: Vec<T>) -> DaoResult<Vec<T>> {
        self.db_handle().await?.batch_save(instances).await
    }

    pub async fn find_by(&self, filter: &Filter) -> DaoResult<MappedRows<T>> {
        self.db_handle().await?.find_by::<T>(filter).await
    }

    pub async fn find_one(&self, filter: &Filter) -> DaoResult<Option<T>> {
        self.db_handle().await?.find_one::<T>(filter).await
    }

    pub async fn get_one_or_fail(&self, filter: &Filter) -> DaoResult<T> {
        self.db_handle().await?.get_one_or_fail::<T>(filter).await
    }

    pub async fn delete_by(&self, filter: &Filter) -> DaoResult<ExecResult> {
        self.db_handle().await?.delete_by::<T>(filter).await
    }

    pub async fn update_by_id(&self, instance: &T) -> DaoResult<ExecResult> {
        self.db_handle().await?.update_by_id(instance).await
    }
}

impl<T> std::fmt::Debug for Repository<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("qualifier", &self.qualifier)
            .finish_non_exhaustive()
    }
}

/// Template plus everything needed to find its database at call time.
#[derive(Debug, Clone)]
struct Binding {
    registry: Arc<DatabaseRegistry>,
    qualifier: Option<String>,
    db_override: Option<String>,
    template: String,
}

impl Binding {
    fn database_name(&self) -> &str {
        self.db_override
            .as_deref()
            .or(self.qualifier.as_deref())
            .unwrap_or(DEFAULT_DATABASE)
    }

    async fn resolve(&self) -> DaoResult<Arc<DatabaseClient>> {
        let name = self.database_name();
        debug!(database = %name, template = %self.template, "Resolving bound statement");
        self.registry.get(name).await
    }
}

/// A row-returning template bound to a repository.
pub struct BoundQuery<U> {
    binding: Binding,
    rules: Option<AccumulationRules>,
    _record: PhantomData<fn() -> U>,
}

impl<U> Clone for BoundQuery<U> {
    fn clone(&self) -> Self {
        Self {
            binding: self.binding.clone(),
            rules: self.rules.clone(),
            _record: PhantomData,
        }
    }
}

impl<U: Record> BoundQuery<U> {
    /// Run against `name` regardless of the repository qualifier.
    pub fn on_database(mut self, name: impl Into<String>) -> Self {
        self.binding.db_override = Some(name.into());
        self
    }

    /// Fold rows sharing their plain columns into one record each.
    pub fn accumulating(mut self, rules: AccumulationRules) -> Self {
        self.rules = Some(rules);
        self
    }

    pub fn template(&self) -> &str {
        &self.binding.template
    }

    pub fn database_name(&self) -> &str {
        self.binding.database_name()
    }

    pub async fn call(&self, params: &Params) -> DaoResult<MappedRows<U>> {
        let client = self.binding.resolve().await?;
        match &self.rules {
            Some(rules) => {
                client
                    .query_accumulating::<U>(&self.binding.template, params, rules)
                    .await
            }
            None => client.query_as::<U>(&self.binding.template, params).await,
        }
    }
}

impl<U> std::fmt::Debug for BoundQuery<U> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundQuery")
            .field("template", &self.binding.template)
            .field("database", &self.binding.database_name())
            .finish_non_exhaustive()
    }
}

/// A modifying template bound to a repository.
#[derive(Debug, Clone)]
pub struct BoundModify {
    binding: Binding,
}

impl BoundModify {
    /// Run against `name` regardless of the repository qualifier.
    pub fn on_database(mut self, name: impl Into<String>) -> Self {
        self.binding.db_override = Some(name.into());
        self
    }

    pub fn template(&self) -> &str {
        &self.binding.template
    }

    pub fn database_name(&self) -> &str {
        self.binding.database_name()
    }

    pub async fn call(&self, params: &Params) -> DaoResult<ExecResult> {
        let client = self.binding.resolve().await?;
        client.execute(&self.binding.template, params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FieldType, Schema};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize)]
    struct Hero {
        id: Option<i64>,
        name: String,
    }

    impl Record for Hero {
        fn schema() -> Schema {
            Schema::table("hero")
                .identifier("id", FieldType::Integer)
                .field("name", FieldType::Text)
        }
    }

    #[test]
    fn test_database_resolution_order() {
        let registry = Arc::new(DatabaseRegistry::empty());

        let unqualified = Repository::<Hero>::new(Arc::clone(&registry), None);
        assert_eq!(unqualified.database_name(), "default");
        assert_eq!(unqualified.bind_query("select 1").database_name(), "default");

        let qualified = Repository::<Hero>::new(registry, Some("heroes".to_string()));
        let query = qualified.bind_query("select * from hero");
        assert_eq!(query.database_name(), "heroes");
        assert_eq!(query.on_database("archive").database_name(), "archive");

        let modify = qualified.bind_modify("delete from hero where id = :id");
        assert_eq!(modify.database_name(), "heroes");
        assert_eq!(modify.template(), "delete from hero where id = :id");
    }
}
