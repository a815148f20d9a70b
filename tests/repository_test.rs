use serde::{Deserialize, Serialize};
use sqldao::query::Filter;
use sqldao::{
    AccumulationRules, DaoError, DatabaseConfig, DatabaseRegistry, FieldType, Params, Record,
    Repository, Schema, Settings, SqlRequest, params,
};
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::NamedTempFile;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
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

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct HeroWithPowers {
    id: i64,
    name: String,
    powers: Vec<String>,
    ratings: HashMap<String, i64>,
}

impl Record for HeroWithPowers {
    fn schema() -> Schema {
        Schema::table("hero")
            .field("id", FieldType::Integer)
            .field("name", FieldType::Text)
            .field("powers", FieldType::list_of(FieldType::Text))
            .field("ratings", FieldType::map_of(FieldType::Integer))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct NameOnly {
    name: String,
}

impl Record for NameOnly {
    fn schema() -> Schema {
        Schema::table("hero").field("name", FieldType::Text)
    }
}

fn sqlite_config(file: &NamedTempFile) -> DatabaseConfig {
    DatabaseConfig::from_url(format!("sqlite:{}", file.path().display()))
}

async fn prepare(registry: &DatabaseRegistry, name: &str, heroes: &[&str]) {
    let client = registry.get(name).await.unwrap();
    client
        .execute(
            "CREATE TABLE hero (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
            &Params::new(),
        )
        .await
        .unwrap();
    client
        .execute(
            "CREATE TABLE power (hero_id INTEGER NOT NULL, power TEXT NOT NULL, rating INTEGER)",
            &Params::new(),
        )
        .await
        .unwrap();
    for hero in heroes {
        client
            .save(Hero {
                id: None,
                name: hero.to_string(),
            })
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn test_repository_resolves_qualifier_and_default() {
    let default_file = NamedTempFile::new().unwrap();
    let heroes_file = NamedTempFile::new().unwrap();
    let settings = Settings::new()
        .with("default", sqlite_config(&default_file))
        .with("heroes", sqlite_config(&heroes_file));
    let registry = Arc::new(DatabaseRegistry::new(settings));
    prepare(&registry, "default", &["Deadpond"]).await;
    prepare(&registry, "heroes", &["Spider-Boy", "Rusty-Man"]).await;

    let default_repo = Repository::<Hero>::new(Arc::clone(&registry), None);
    let heroes_repo = Repository::<Hero>::new(Arc::clone(&registry), Some("heroes".to_string()));

    let all = default_repo.bind_query("SELECT * FROM hero");
    assert_eq!(all.call(&Params::new()).await.unwrap().len(), 1);

    let all = heroes_repo.bind_query("SELECT * FROM hero");
    assert_eq!(all.call(&Params::new()).await.unwrap().len(), 2);

    // Explicit override beats the qualifier
    let overridden = all.clone().on_database("default");
    let records = overridden.call(&Params::new()).await.unwrap().into_records();
    assert_eq!(records[0].name, "Deadpond");

    let handle = heroes_repo.db_handle().await.unwrap();
    assert_eq!(handle.name(), "heroes");
}

#[tokio::test]
async fn test_bound_modify_and_return_type_override() {
    let file = NamedTempFile::new().unwrap();
    let registry = Arc::new(DatabaseRegistry::new(
        Settings::new().with("default", sqlite_config(&file)),
    ));
    prepare(&registry, "default", &["Deadpond", "Spider-Boy"]).await;

    let repo = Repository::<Hero>::new(Arc::clone(&registry), None);
    let rename = repo.bind_modify("UPDATE hero SET name = :new_name WHERE name = :name");
    let result = rename
        .call(&params! { "name" => "Deadpond", "new_name" => "Deadpool" })
        .await
        .unwrap();
    assert_eq!(result.rows_affected, 1);

    let names = repo.bind_query_as::<NameOnly>("SELECT name FROM hero ORDER BY id");
    let names: Vec<String> = names
        .call(&Params::new())
        .await
        .unwrap()
        .into_iter()
        .map(|n| n.name)
        .collect();
    assert_eq!(names, vec!["Deadpool", "Spider-Boy"]);

    let deleted = repo
        .delete_by(&Filter::new().eq("name", "Deadpool"))
        .await
        .unwrap();
    assert_eq!(deleted.rows_affected, 1);
    assert!(repo.find_one(&Filter::new().eq("name", "Deadpool")).await.unwrap().is_none());
}

#[tokio::test]
async fn test_bound_query_sees_reregistered_database() {
    let first = NamedTempFile::new().unwrap();
    let second = NamedTempFile::new().unwrap();
    let registry = Arc::new(DatabaseRegistry::empty());
    registry.register("main", &sqlite_config(&first)).await.unwrap();
    prepare(&registry, "main", &["Deadpond"]).await;

    let repo = Repository::<Hero>::new(Arc::clone(&registry), Some("main".to_string()));
    let all = repo.bind_query("SELECT * FROM hero");
    assert_eq!(all.call(&Params::new()).await.unwrap().len(), 1);

    registry.register("main", &sqlite_config(&second)).await.unwrap();
    prepare(&registry, "main", &["Spider-Boy", "Rusty-Man", "Tarantula"]).await;
    assert_eq!(all.call(&Params::new()).await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_unknown_database_surfaces_at_call_time() {
    let registry = Arc::new(DatabaseRegistry::empty());
    let repo = Repository::<Hero>::new(registry, Some("missing".to_string()));
    let query = repo.bind_query("SELECT * FROM hero");

    let err = query.call(&Params::new()).await.unwrap_err();
    assert!(matches!(err, DaoError::UnknownDatabase { .. }));
}

#[tokio::test]
async fn test_accumulating_query_over_join() {
    let file = NamedTempFile::new().unwrap();
    let registry = Arc::new(DatabaseRegistry::new(
        Settings::new().with("default", sqlite_config(&file)),
    ));
    prepare(&registry, "default", &["Deadpond", "Spider-Boy", "Rusty-Man"]).await;
    let client = registry.get_default().await.unwrap();
    client
        .execute(
            "INSERT INTO power (hero_id, power, rating) VALUES
                (1, 'regeneration', 9), (1, 'swimming', 6), (2, 'web', 7)",
            &Params::new(),
        )
        .await
        .unwrap();

    let repo = Repository::<HeroWithPowers>::new(Arc::clone(&registry), None);
    let with_powers = repo
        .bind_query(
            "SELECT hero.id, hero.name, power.rowid AS power_id, power.power,
                    power.power AS power_name, power.rating
             FROM hero LEFT JOIN power ON power.hero_id = hero.id
             ORDER BY hero.id, power.power",
        )
        .accumulating(
            AccumulationRules::new()
                .list("powers", "power")
                .dict("ratings", "power_name", "rating"),
        );

    let heroes = with_powers.call(&Params::new()).await.unwrap().into_result().unwrap();
    assert_eq!(heroes.len(), 3);
    assert_eq!(heroes[0].name, "Deadpond");
    assert_eq!(heroes[0].powers, vec!["regeneration", "swimming"]);
    assert_eq!(heroes[0].ratings.get("swimming"), Some(&6));
    assert_eq!(heroes[1].powers, vec!["web"]);
    assert!(heroes[2].powers.is_empty());
    assert!(heroes[2].ratings.is_empty());
}

#[tokio::test]
async fn test_invoke_registers_and_executes() {
    let file = NamedTempFile::new().unwrap();
    let registry = DatabaseRegistry::empty();

    let create = SqlRequest::new(
        "adhoc",
        sqlite_config(&file),
        "CREATE TABLE hero (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
    );
    registry.invoke(create).await.unwrap();

    let insert = SqlRequest::new(
        "adhoc",
        sqlite_config(&file),
        "INSERT INTO hero (name) VALUES (:name)",
    )
    .with_param("name", "Deadpond");
    let result = registry.invoke(insert).await.unwrap();
    assert_eq!(result.rows_affected, 1);

    assert_eq!(registry.names().await, vec!["adhoc".to_string()]);
    let heroes = registry
        .get("adhoc")
        .await
        .unwrap()
        .find_by::<Hero>(&Filter::new())
        .await
        .unwrap();
    assert_eq!(heroes.records()[0].name, "Deadpond");
}
