//! Schema creation and additive upgrades

#[path = "../common/mod.rs"]
mod common;

use std::sync::Arc;

use common::{model, person_fields, Person};
use quarry::driver::{ConnectionProvider, SqliteProvider};
use quarry::meta::EntityModel;
use quarry::schema::catalog_for;
use quarry::sql::Dialect;
use quarry::prelude::*;
use quarry::Configuration;

/// The `person` table as it looked before `email` existed
#[derive(Debug, Default, Clone)]
struct LegacyPerson {
    id: i64,
    name: String,
    age: i32,
}

quarry::impl_entity!(LegacyPerson {
    id: i64,
    name: String,
    age: i32,
});

fn legacy_model() -> Arc<EntityModel> {
    Arc::new(
        EntityModel::builder("legacy")
            .add(quarry::model_type!(LegacyPerson => "person" {
                id: BigInt [key, generated],
                name: Varchar [length(64)],
                age: Integer,
            }))
            .build()
            .expect("Failed to build legacy model"),
    )
}

fn store_over(provider: &Arc<SqliteProvider>, model: Arc<EntityModel>) -> EntityDataStore {
    let config = Configuration::builder(provider.clone(), model)
        .build()
        .expect("Failed to build configuration");
    EntityDataStore::new(config)
}

fn schema_objects(provider: &SqliteProvider) -> Vec<String> {
    let mut conn = provider.connection().expect("connection");
    let mut cursor = conn
        .query(
            "SELECT type || ':' || name FROM sqlite_master \
             WHERE name NOT LIKE 'sqlite_%' ORDER BY 1",
            &[],
        )
        .expect("Failed to read sqlite_master");
    let mut objects = Vec::new();
    while let Some(row) = cursor.next_row().expect("row") {
        if let Some(Value::Text(name)) = row.into_iter().next() {
            objects.push(name);
        }
    }
    objects
}

#[test]
fn test_updater_adds_missing_tables_columns_and_indexes() {
    let provider = Arc::new(SqliteProvider::memory().expect("sqlite"));

    let legacy = store_over(&provider, legacy_model());
    legacy
        .schema()
        .create_tables(TableCreationMode::Create)
        .expect("Failed to create legacy schema");
    let mut old = LegacyPerson {
        name: "Ada".into(),
        age: 36,
        ..Default::default()
    };
    legacy.insert(&mut old).expect("Failed to insert legacy row");

    let store = store_over(&provider, model());
    store
        .schema_updater(TableCreationMode::CreateNotExists)
        .update()
        .expect("Failed to upgrade schema");

    let mut conn = provider.connection().expect("connection");
    let catalog = catalog_for(Dialect::Sqlite);
    let columns = catalog.columns(conn.as_mut(), "person").expect("columns");
    assert!(columns.contains("email"));
    for table in ["phone", "event", "account"] {
        assert!(catalog.table_exists(conn.as_mut(), table).expect("exists"), "{table}");
    }
    let indexes = catalog.indexes(conn.as_mut(), "person").expect("indexes");
    assert!(indexes.contains("idx_person_email"));
    drop(conn);

    // existing rows survive, new column reads as NULL
    let ada: Person = store
        .find_by_key(old.id)
        .expect("Failed to find")
        .expect("legacy row kept");
    assert_eq!(ada.name, "Ada");
    assert_eq!(ada.email, None);

    // the added unique index is enforced
    let p = person_fields(store.model());
    store
        .update_rows::<Person>()
        .expect("update_rows")
        .set(&p.email, Some("ada@example.com".to_string()))
        .get()
        .expect("get")
        .value()
        .expect("value");
    let mut twin = Person {
        email: Some("ada@example.com".into()),
        ..Person::new("Twin", 36)
    };
    let err = store.insert(&mut twin).expect_err("duplicate email");
    assert!(err.is_constraint_violation());
}

#[test]
fn test_updater_is_idempotent() {
    let provider = Arc::new(SqliteProvider::memory().expect("sqlite"));
    let store = store_over(&provider, model());

    let updater = store.schema_updater(TableCreationMode::CreateNotExists);
    updater.update().expect("first update");
    let after_first = schema_objects(&provider);
    updater.update().expect("second update");
    assert_eq!(schema_objects(&provider), after_first);
    assert!(after_first.contains(&"table:person".to_string()));
    assert!(after_first.contains(&"index:idx_phone_owner_id".to_string()));
}

#[test]
fn test_drop_create_mode_recreates_tables() {
    let provider = Arc::new(SqliteProvider::memory().expect("sqlite"));
    let store = store_over(&provider, model());
    store
        .schema()
        .create_tables(TableCreationMode::Create)
        .expect("create");
    let mut ada = Person::new("Ada", 36);
    store.insert(&mut ada).expect("insert");

    store
        .schema_updater(TableCreationMode::DropCreate)
        .update()
        .expect("drop-create");
    assert_eq!(
        store
            .count::<Person>()
            .expect("count")
            .get()
            .expect("get")
            .value()
            .expect("value"),
        0
    );
}

#[test]
fn test_create_twice_fails_but_create_not_exists_succeeds() {
    let provider = Arc::new(SqliteProvider::memory().expect("sqlite"));
    let store = store_over(&provider, model());
    let schema = store.schema();

    schema.create_tables(TableCreationMode::Create).expect("create");
    let err = schema
        .create_tables(TableCreationMode::Create)
        .expect_err("tables already exist");
    assert!(matches!(err, QuarryError::TableModification(_)));
    schema
        .create_tables(TableCreationMode::CreateNotExists)
        .expect("if not exists");

    schema.drop_tables().expect("drop");
    assert!(schema_objects(&provider).is_empty());
}

#[test]
fn test_create_tables_string_orders_referenced_tables_first() {
    let store = EntityDataStore::connect("sqlite::memory:", model()).expect("connect");
    let script = store
        .schema()
        .create_tables_string(TableCreationMode::CreateNotExists)
        .expect("script");

    let person = script.find("CREATE TABLE IF NOT EXISTS \"person\"").expect("person table");
    let phone = script.find("CREATE TABLE IF NOT EXISTS \"phone\"").expect("phone table");
    assert!(person < phone);
    assert!(script.contains("REFERENCES \"person\" (\"id\")"));
    assert!(script.contains("CREATE UNIQUE INDEX IF NOT EXISTS \"idx_person_email\""));
}

#[derive(Debug, Default, Clone)]
struct Egg {
    id: i64,
    chicken: i64,
}
quarry::impl_entity!(Egg { id: i64, chicken: i64 });

#[derive(Debug, Default, Clone)]
struct Chicken {
    id: i64,
    egg: i64,
}
quarry::impl_entity!(Chicken { id: i64, egg: i64 });

#[test]
fn test_circular_references_are_rejected() {
    let cyclic = Arc::new(
        EntityModel::builder("cyclic")
            .add(quarry::model_type!(Egg => "egg" {
                id: BigInt [key, generated],
                chicken: BigInt [references("chicken", "id")],
            }))
            .add(quarry::model_type!(Chicken => "chicken" {
                id: BigInt [key, generated],
                egg: BigInt [references("egg", "id")],
            }))
            .build()
            .expect("model"),
    );
    let store = EntityDataStore::connect("sqlite::memory:", cyclic).expect("connect");
    let err = store
        .schema()
        .create_tables(TableCreationMode::Create)
        .expect_err("cycle");
    assert!(matches!(err, QuarryError::CircularReference(_)), "got {err}");
}
