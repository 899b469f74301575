//! Additive schema upgrade.

use std::sync::Arc;

use super::catalog::catalog_for;
use super::modifier::SchemaModifier;
use super::TableCreationMode;
use crate::meta::{Attribute, Type};
use crate::store::StoreCore;

/// Brings the database up to the model without touching existing data
///
/// In [`DropCreate`](TableCreationMode::DropCreate) mode every table is recreated.
/// Otherwise, in one transaction:
///
/// 1. missing tables are created
/// 2. missing columns are added, plain columns before foreign keys
/// 3. missing indexes are created, unique columns first
///
/// Running it again against an up-to-date database changes nothing.
pub struct SchemaUpdater {
    modifier: SchemaModifier,
    mode: TableCreationMode,
}

impl SchemaUpdater {
    pub(crate) fn new(core: Arc<StoreCore>, mode: TableCreationMode) -> Self {
        Self {
            modifier: SchemaModifier::new(core),
            mode,
        }
    }

    pub fn mode(&self) -> TableCreationMode {
        self.mode
    }

    /// # Errors
    ///
    /// [`QuarryError::TableModification`](crate::QuarryError::TableModification)
    /// wrapping the failed step; nothing is committed in that case.
    pub fn update(&self) -> crate::Result<()> {
        if self.mode == TableCreationMode::DropCreate {
            return self.modifier.create_tables(TableCreationMode::DropCreate);
        }

        let types = self.modifier.sorted_types()?;
        let core = self.modifier.core();
        let ddl = self.modifier.ddl();
        let catalog = catalog_for(core.config.platform.dialect());
        let separate_constraints = core.config.platform.supports_add_constraint();
        let if_not_exists = self.mode.if_not_exists();

        self.modifier.run("update", |conn, core| {
            let mut created = Vec::new();
            for ty in &types {
                let table = ddl.table_name(ty);
                if !catalog.table_exists(conn, &table)? {
                    log::info!("creating table {table}");
                    core.executor.batch(conn, &ddl.create_table(ty, if_not_exists))?;
                    created.push(ty.name().to_string());
                }
            }

            let mut missing: Vec<(&Arc<Type>, &Arc<Attribute>)> = Vec::new();
            for ty in types.iter().filter(|t| !created.iter().any(|c| c == t.name())) {
                let live = catalog.columns(conn, &ddl.table_name(ty))?;
                missing.extend(
                    ty.columns()
                        .filter(|a| !live.contains(&ddl.column_name(a).to_ascii_lowercase()))
                        .map(|a| (ty, a)),
                );
            }
            // foreign keys may point at columns added in this pass
            missing.sort_by_key(|(_, a)| a.is_foreign_key());
            for (ty, attribute) in missing {
                log::info!("adding column {}.{}", ty.name(), attribute.name());
                for statement in ddl.add_column(ty, attribute, separate_constraints) {
                    core.executor.batch(conn, &statement)?;
                }
            }

            for ty in &types {
                let existing = catalog.indexes(conn, &ddl.table_name(ty))?;
                for spec in ddl.indexes(ty) {
                    if existing.contains(&spec.name.to_ascii_lowercase()) {
                        continue;
                    }
                    log::info!("creating index {}", spec.name);
                    core.executor.batch(conn, &ddl.create_index(ty, &spec, true))?;
                }
            }
            Ok(())
        })
    }
}

impl std::fmt::Debug for SchemaUpdater {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaUpdater")
            .field("mode", &self.mode)
            .finish()
    }
}
