//! Schema creation and upgrade
//!
//! [`SchemaModifier`] creates, drops and alters the tables of an
//! [`EntityModel`](crate::meta::EntityModel); [`SchemaUpdater`] compares the model
//! with the live database through a [`Catalog`] and applies the missing tables,
//! columns and indexes. DDL text is rendered with `sea-query` for the platform's
//! dialect.
//!
//! Only additive changes are made. Renamed or retyped columns are left to
//! application migrations.

mod catalog;
mod ddl;
mod modifier;
mod updater;

use serde::Deserialize;

pub use catalog::{catalog_for, Catalog, PostgresCatalog, SqliteCatalog};
pub use ddl::IndexSpec;
pub use modifier::SchemaModifier;
pub use updater::SchemaUpdater;

/// What to do with tables that may already exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableCreationMode {
    /// `CREATE TABLE`; fails when a table exists
    Create,
    /// `CREATE TABLE IF NOT EXISTS`
    CreateNotExists,
    /// Drop every table of the model, then create them
    DropCreate,
}

impl TableCreationMode {
    pub(crate) fn if_not_exists(self) -> bool {
        matches!(self, TableCreationMode::CreateNotExists)
    }
}
