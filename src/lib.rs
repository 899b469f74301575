//! # Quarry
//!
//! Typed entity store and query builder over SQLite and PostgreSQL.
//!
//! Entities are plain structs described by an [`EntityModel`](meta::EntityModel).
//! Queries are built from typed [`Field`](query::Field)s through a stage-typed
//! [`Query`](query::Query), rendered per [`Platform`](sql::Platform) and run by an
//! [`EntityDataStore`]. Schemas are created or upgraded from the same model by
//! [`SchemaModifier`](schema::SchemaModifier) and [`SchemaUpdater`](schema::SchemaUpdater).
//!
//! ```no_run
//! use quarry::prelude::*;
//!
//! #[derive(Debug, Default, Clone)]
//! struct Person { id: i64, name: String, age: i32 }
//! quarry::impl_entity!(Person { id: i64, name: String, age: i32 });
//!
//! # fn main() -> quarry::Result<()> {
//! let model = quarry::meta::EntityModel::builder("default")
//!     .add(quarry::model_type!(Person => "person" {
//!         id: BigInt [key, generated],
//!         name: Varchar [length(64)],
//!         age: Integer,
//!     }))
//!     .build()?;
//! let store = EntityDataStore::connect("sqlite::memory:", std::sync::Arc::new(model))?;
//! store.schema().create_tables(TableCreationMode::CreateNotExists)?;
//!
//! let mut ada = Person { name: "Ada".into(), age: 36, ..Default::default() };
//! store.insert(&mut ada)?;
//! # Ok(())
//! # }
//! ```

pub mod async_store;
pub mod config;
pub mod connection;
pub mod driver;
pub mod entity;
pub mod error;
pub mod executor;
pub mod listener;
mod macros;
pub mod meta;
pub mod metrics;
pub mod query;
pub mod reader;
pub mod result;
pub mod schema;
pub mod sql;
pub mod store;
pub mod transaction;
pub mod value;

#[cfg(test)]
mod test_helpers;

pub use async_store::{AsyncStore, StoreTask};
pub use config::{Configuration, ConfigurationBuilder, StoreSettings};
pub use entity::Entity;
pub use error::{QuarryError, Result};
pub use result::{QueryResult, Scalar, Tuple};
pub use schema::TableCreationMode;
pub use store::{EntityDataStore, EntityStore};
pub use transaction::{IsolationLevel, Transaction};
pub use value::{FieldType, FromValue, Value};

/// Everything needed to declare entities and write queries
pub mod prelude {
    pub use crate::entity::Entity;
    pub use crate::query::{
        AsExpr, AttributeRef, Conditional, NumericExpression, OrderingExpression,
        TextExpression,
    };
    pub use crate::schema::TableCreationMode;
    pub use crate::store::{EntityDataStore, EntityStore};
    pub use crate::value::{FieldType, Value};
    pub use crate::QuarryError;
}
