//! Shared fixtures for the integration suites.
//!
//! Every suite runs against SQLite: an in-memory database by default, or a
//! temporary file when a test needs more than one connection.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use quarry::driver::SqliteProvider;
use quarry::meta::{EntityModel, ReferentialAction, Type};
use quarry::query::Field;
use quarry::{Configuration, ConfigurationBuilder, EntityDataStore, TableCreationMode};

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Person {
    pub id: i64,
    pub name: String,
    pub age: i32,
    pub email: Option<String>,
}

quarry::impl_entity!(Person {
    id: i64,
    name: String,
    age: i32,
    email: Option<String>,
});

impl Person {
    pub fn new(name: &str, age: i32) -> Self {
        Self {
            name: name.to_string(),
            age,
            ..Default::default()
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Phone {
    pub id: i64,
    pub number: String,
    pub owner: i64,
}

quarry::impl_entity!(Phone {
    id: i64,
    number: String,
    owner: i64,
});

/// Natural key, no generated columns
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Event {
    pub code: String,
    pub title: String,
}

quarry::impl_entity!(Event { code: String, title: String });

/// Versioned, for optimistic locking
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Account {
    pub id: i64,
    pub holder: String,
    pub balance: i64,
    pub version: i64,
}

quarry::impl_entity!(Account {
    id: i64,
    holder: String,
    balance: i64,
    version: i64,
});

impl Account {
    pub fn open(holder: &str, balance: i64) -> Self {
        Self {
            holder: holder.to_string(),
            balance,
            ..Default::default()
        }
    }
}

pub fn person_type() -> Type {
    quarry::model_type!(Person => "person" {
        id: BigInt [key, generated],
        name: Varchar [length(64)],
        age: Integer,
        email: Varchar [nullable(true), length(255), unique],
    })
}

pub fn phone_type() -> Type {
    quarry::model_type!(Phone => "phone" {
        id: BigInt [key, generated],
        number: Varchar [length(32)],
        owner: BigInt [
            column("owner_id"),
            references("person", "id"),
            on_delete(ReferentialAction::Cascade),
            indexed,
        ],
    })
}

pub fn event_type() -> Type {
    quarry::model_type!(Event => "event" {
        code: Varchar [key, length(32)],
        title: Text,
    })
}

pub fn account_type() -> Type {
    quarry::model_type!(Account => "account" {
        id: BigInt [key, generated],
        holder: Text,
        balance: BigInt,
        version: BigInt [version],
    })
}

pub fn model() -> Arc<EntityModel> {
    Arc::new(
        EntityModel::builder("integration")
            .add(person_type())
            .add(phone_type())
            .add(event_type())
            .add(account_type())
            .build()
            .expect("Failed to build model"),
    )
}

/// In-memory store with every table created
pub fn memory_store() -> EntityDataStore {
    memory_store_with(|builder| builder)
}

pub fn memory_store_with(
    configure: impl FnOnce(ConfigurationBuilder) -> ConfigurationBuilder,
) -> EntityDataStore {
    let provider = Arc::new(SqliteProvider::memory().expect("Failed to open sqlite"));
    build_store(provider, configure)
}

/// Store over a database file, tables created if missing
pub fn file_store(path: &Path) -> EntityDataStore {
    let provider = Arc::new(SqliteProvider::open(path).expect("Failed to open sqlite file"));
    build_store(provider, |builder| builder)
}

fn build_store(
    provider: Arc<SqliteProvider>,
    configure: impl FnOnce(ConfigurationBuilder) -> ConfigurationBuilder,
) -> EntityDataStore {
    let config = configure(Configuration::builder(provider, model()))
        .build()
        .expect("Failed to build configuration");
    let store = EntityDataStore::new(config);
    store
        .schema()
        .create_tables(TableCreationMode::CreateNotExists)
        .expect("Failed to create tables");
    store
}

pub struct PersonFields {
    pub id: Field<Person, i64>,
    pub name: Field<Person, String>,
    pub age: Field<Person, i32>,
    pub email: Field<Person, Option<String>>,
}

pub fn person_fields(model: &EntityModel) -> PersonFields {
    PersonFields {
        id: model.field("id").expect("id"),
        name: model.field("name").expect("name"),
        age: model.field("age").expect("age"),
        email: model.field("email").expect("email"),
    }
}

pub struct PhoneFields {
    pub number: Field<Phone, String>,
    pub owner: Field<Phone, i64>,
}

pub fn phone_fields(model: &EntityModel) -> PhoneFields {
    PhoneFields {
        number: model.field("number").expect("number"),
        owner: model.field("owner").expect("owner"),
    }
}

/// Inserts Alice (75), Carol (10) and Bob (0)
pub fn seed_people(store: &EntityDataStore) -> Vec<Person> {
    use quarry::EntityStore;

    let mut people = vec![
        Person::new("Alice", 75),
        Person::new("Carol", 10),
        Person::new("Bob", 0),
    ];
    store.insert_all(&mut people).expect("Failed to seed people");
    people
}
