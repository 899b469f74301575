//! Fixture entities shared by the unit tests.

use std::sync::Arc;

use crate::config::{Configuration, ConfigurationBuilder};
use crate::meta::{EntityModel, ReferentialAction, Type};
use crate::query::Field;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Person {
    pub id: i64,
    pub name: String,
    pub age: i32,
    pub email: Option<String>,
}

crate::impl_entity!(Person {
    id: i64,
    name: String,
    age: i32,
    email: Option<String>,
});

impl Person {
    pub fn named(name: &str, age: i32) -> Self {
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

crate::impl_entity!(Phone {
    id: i64,
    number: String,
    owner: i64,
});

/// Versioned entity
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Document {
    pub id: i64,
    pub title: String,
    pub version: i64,
}

crate::impl_entity!(Document {
    id: i64,
    title: String,
    version: i64,
});

impl Document {
    pub fn titled(title: &str) -> Self {
        Self {
            title: title.to_string(),
            ..Default::default()
        }
    }
}

/// Entity with a natural (assigned) key
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Tag {
    pub code: String,
    pub label: String,
}

crate::impl_entity!(Tag {
    code: String,
    label: String,
});

impl Tag {
    pub fn new(code: &str, label: &str) -> Self {
        Self {
            code: code.to_string(),
            label: label.to_string(),
        }
    }
}

pub fn person_type() -> Type {
    crate::model_type!(Person => "person" {
        id: BigInt [key, generated],
        name: Text,
        age: Integer,
        email: Varchar [nullable(true), length(255), unique],
    })
}

pub fn phone_type() -> Type {
    crate::model_type!(Phone => "phone" {
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

pub fn document_type() -> Type {
    crate::model_type!(Document => "document" {
        id: BigInt [key, generated],
        title: Text,
        version: BigInt [version],
    })
}

pub fn tag_type() -> Type {
    crate::model_type!(Tag => "tag" {
        code: Varchar [key, length(16)],
        label: Text,
    })
}

pub fn model() -> Arc<EntityModel> {
    Arc::new(
        EntityModel::builder("test")
            .add(phone_type())
            .add(person_type())
            .add(document_type())
            .add(tag_type())
            .build()
            .expect("fixture model is valid"),
    )
}

/// In-memory SQLite store with every fixture table created
#[cfg(feature = "sqlite")]
pub fn store() -> crate::store::EntityDataStore {
    store_with(|builder| builder)
}

#[cfg(feature = "sqlite")]
pub fn store_with(
    configure: impl FnOnce(ConfigurationBuilder) -> ConfigurationBuilder,
) -> crate::store::EntityDataStore {
    let provider = Arc::new(crate::driver::sqlite::SqliteProvider::memory().expect("sqlite"));
    let config = configure(Configuration::builder(provider, model()))
        .build()
        .expect("configuration");
    let store = crate::store::EntityDataStore::new(config);
    store
        .schema()
        .create_tables(crate::schema::TableCreationMode::Create)
        .expect("create tables");
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
    pub id: Field<Phone, i64>,
    pub number: Field<Phone, String>,
    pub owner: Field<Phone, i64>,
}

pub fn phone_fields(model: &EntityModel) -> PhoneFields {
    PhoneFields {
        id: model.field("id").expect("id"),
        number: model.field("number").expect("number"),
        owner: model.field("owner").expect("owner"),
    }
}
