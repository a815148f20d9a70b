use serde::{Deserialize, Serialize};
use sqldao::query::Filter;
use sqldao::{
    DaoError, DatabaseClient, DatabaseConfig, FieldType, Params, Record, Schema, Value, params,
};
use tempfile::NamedTempFile;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Hero {
    id: Option<i64>,
    name: String,
    secret_name: String,
    age: Option<i64>,
}

impl Hero {
    fn new(name: &str, secret_name: &str, age: Option<i64>) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            secret_name: secret_name.to_string(),
            age,
        }
    }
}

impl Record for Hero {
    fn schema() -> Schema {
        Schema::table("hero")
            .identifier("id", FieldType::Integer)
            .field("name", FieldType::Text)
            .field("secret_name", FieldType::Text)
            .nullable("age", FieldType::Integer)
    }
}

const CREATE_HERO: &str = "CREATE TABLE hero (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    secret_name TEXT NOT NULL,
    age INTEGER CHECK (age IS NULL OR age >= 0)
)";

async fn setup() -> (NamedTempFile, DatabaseClient) {
    let temp_file = NamedTempFile::new().unwrap();
    let url = format!("sqlite:{}", temp_file.path().display());
    let client = DatabaseClient::connect("test", &DatabaseConfig::from_url(url)).unwrap();
    client.execute(CREATE_HERO, &Params::new()).await.unwrap();
    (temp_file, client)
}

async fn seed(client: &DatabaseClient) -> Vec<Hero> {
    client
        .batch_save(vec![
            Hero::new("Deadpond", "Dive Wilson", None),
            Hero::new("Spider-Boy", "Pedro Parqueador", Some(16)),
            Hero::new("Rusty-Man", "Tommy Sharp", Some(48)),
        ])
        .await
        .unwrap()
}

async fn count(client: &DatabaseClient) -> i64 {
    let rows = client
        .query("SELECT COUNT(*) AS n FROM hero", &Params::new())
        .await
        .unwrap();
    rows[0].get("n").and_then(Value::as_i64).unwrap()
}

#[tokio::test]
async fn test_save_returns_generated_id() {
    let (_temp, client) = setup().await;

    let saved = client
        .save(Hero::new("Deadpond", "Dive Wilson", None))
        .await
        .unwrap();
    assert_eq!(saved.id, Some(1));
    assert_eq!(saved.name, "Deadpond");

    let second = client
        .save(Hero::new("Spider-Boy", "Pedro Parqueador", None))
        .await
        .unwrap();
    assert_eq!(second.id, Some(2));
}

#[tokio::test]
async fn test_select_all_and_filtered() {
    let (_temp, client) = setup().await;
    let seeded = seed(&client).await;
    let ids: Vec<_> = seeded.iter().map(|h| h.id).collect();
    assert_eq!(ids, vec![Some(1), Some(2), Some(3)]);

    let all = client.find_by::<Hero>(&Filter::new()).await.unwrap();
    assert!(all.is_complete());
    assert_eq!(all.len(), 3);

    let filtered = client
        .find_by::<Hero>(&Filter::new().eq("name", "Spider-Boy"))
        .await
        .unwrap()
        .into_result()
        .unwrap();
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0].secret_name, "Pedro Parqueador");

    let no_age = client
        .find_by::<Hero>(&Filter::new().eq("age", Value::Null))
        .await
        .unwrap();
    assert_eq!(no_age.records()[0].name, "Deadpond");
}

#[tokio::test]
async fn test_unknown_filter_field_rejected() {
    let (_temp, client) = setup().await;
    let err = client
        .find_by::<Hero>(&Filter::new().eq("power", "flight"))
        .await
        .unwrap_err();
    assert!(matches!(err, DaoError::Configuration { .. }));
}

#[tokio::test]
async fn test_find_one_and_get_one_or_fail() {
    let (_temp, client) = setup().await;
    seed(&client).await;

    let found = client
        .find_one::<Hero>(&Filter::new().eq("name", "Rusty-Man"))
        .await
        .unwrap();
    assert_eq!(found.unwrap().age, Some(48));

    let missing = client
        .find_one::<Hero>(&Filter::new().eq("name", "Captain North"))
        .await
        .unwrap();
    assert!(missing.is_none());

    let err = client
        .get_one_or_fail::<Hero>(&Filter::new().eq("name", "Captain North"))
        .await
        .unwrap_err();
    match err {
        DaoError::NotFound { table, criteria } => {
            assert_eq!(table, "hero");
            assert_eq!(criteria, "name = \"Captain North\"");
        }
        other => panic!("Expected NotFound, got {:?}", other),
    }
}

#[tokio::test]
async fn test_delete_with_empty_filter_deletes_nothing() {
    let (_temp, client) = setup().await;
    seed(&client).await;

    let err = client.delete_by::<Hero>(&Filter::new()).await.unwrap_err();
    assert!(matches!(err, DaoError::EmptyFilter { .. }));
    assert_eq!(count(&client).await, 3);

    let result = client
        .delete_by::<Hero>(&Filter::new().eq("name", "Deadpond"))
        .await
        .unwrap();
    assert_eq!(result.rows_affected, 1);
    assert_eq!(count(&client).await, 2);
}

#[tokio::test]
async fn test_update_by_id() {
    let (_temp, client) = setup().await;
    let mut heroes = seed(&client).await;

    let mut spider_boy = heroes.remove(1);
    spider_boy.age = Some(17);
    spider_boy.secret_name = "Peter Parker".to_string();
    let result = client.update_by_id(&spider_boy).await.unwrap();
    assert_eq!(result.rows_affected, 1);

    let reloaded = client
        .get_one_or_fail::<Hero>(&Filter::new().eq("id", 2))
        .await
        .unwrap();
    assert_eq!(reloaded, spider_boy);
}

#[tokio::test]
async fn test_update_without_id_issues_no_statement() {
    let (_temp, client) = setup().await;
    seed(&client).await;

    let unsaved = Hero::new("Deadpond", "Someone Else", Some(1));
    let err = client.update_by_id(&unsaved).await.unwrap_err();
    assert!(matches!(err, DaoError::Configuration { .. }));

    let deadpond = client
        .get_one_or_fail::<Hero>(&Filter::new().eq("name", "Deadpond"))
        .await
        .unwrap();
    assert_eq!(deadpond.secret_name, "Dive Wilson");
}

#[tokio::test]
async fn test_batch_save_rolls_back_on_failure() {
    let (_temp, client) = setup().await;

    let err = client
        .batch_save(vec![
            Hero::new("Deadpond", "Dive Wilson", None),
            Hero::new("Tarantula", "Natalia Roman-on", Some(-1)),
            Hero::new("Rusty-Man", "Tommy Sharp", Some(48)),
        ])
        .await
        .unwrap_err();
    assert!(err.is_engine_error(), "unexpected error: {:?}", err);
    assert_eq!(count(&client).await, 0);
}

#[tokio::test]
async fn test_raw_query_with_named_params() {
    let (_temp, client) = setup().await;
    seed(&client).await;

    let rows = client
        .query(
            "SELECT name, ':age' AS label FROM hero WHERE age >= :age AND age < :age * 10 ORDER BY id",
            &params! { "age" => 16 },
        )
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get("name"), Some(&Value::from("Spider-Boy")));
    assert_eq!(rows[0].get("label"), Some(&Value::from(":age")));

    let heroes = client
        .query_as::<Hero>("SELECT * FROM hero WHERE name = :name", &params! { "name" => "Rusty-Man" })
        .await
        .unwrap()
        .into_result()
        .unwrap();
    assert_eq!(heroes[0].id, Some(3));

    let err = client
        .query("SELECT * FROM hero WHERE name = :name", &Params::new())
        .await
        .unwrap_err();
    assert!(matches!(err, DaoError::Configuration { .. }));
}

#[tokio::test]
async fn test_execute_template() {
    let (_temp, client) = setup().await;
    seed(&client).await;

    let result = client
        .execute(
            "UPDATE hero SET age = :age WHERE age IS NULL",
            &params! { "age" => 30 },
        )
        .await
        .unwrap();
    assert_eq!(result.rows_affected, 1);

    let rows = client
        .query_as::<Hero>("SELECT * FROM hero WHERE age = 30", &Params::new())
        .await
        .unwrap();
    assert_eq!(rows.records()[0].name, "Deadpond");
}

#[tokio::test]
async fn test_partial_mapping_keeps_good_rows() {
    let (_temp, client) = setup().await;
    seed(&client).await;

    // secret_name is NULL for one row
    let mapped = client
        .query_as::<Hero>(
            "SELECT id, name, CASE WHEN id = 2 THEN NULL ELSE secret_name END AS secret_name, age FROM hero ORDER BY id",
            &Params::new(),
        )
        .await
        .unwrap();
    assert_eq!(mapped.len(), 2);
    assert_eq!(mapped.errors().len(), 1);
    assert_eq!(mapped.errors()[0].row, 1);
    assert_eq!(mapped.errors()[0].field.as_deref(), Some("secret_name"));
}

#[tokio::test]
async fn test_find_one_ignores_later_unmappable_rows() {
    let temp_file = NamedTempFile::new().unwrap();
    let url = format!("sqlite:{}", temp_file.path().display());
    let client = DatabaseClient::connect("test", &DatabaseConfig::from_url(url)).unwrap();
    // Text age column so a non-numeric value can be stored
    client
        .execute(
            "CREATE TABLE hero (id INTEGER PRIMARY KEY, name TEXT, secret_name TEXT, age TEXT)",
            &Params::new(),
        )
        .await
        .unwrap();
    client
        .execute(
            "INSERT INTO hero (id, name, secret_name, age) VALUES
                (1, 'Deadpond', 'Dive Wilson', 30),
                (2, 'Deadpond', 'Dive Wilson', 'thirty')",
            &Params::new(),
        )
        .await
        .unwrap();

    let found = client
        .find_one::<Hero>(&Filter::new().eq("name", "Deadpond"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, Some(1));
    assert_eq!(found.age, Some(30));

    // The unmappable row still fails when it is the first match
    let err = client
        .find_one::<Hero>(&Filter::new().eq("id", 2))
        .await
        .unwrap_err();
    assert!(matches!(err, DaoError::Mapping { .. }), "unexpected error: {:?}", err);
}
