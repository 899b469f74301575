//! Table creation, removal and alteration for a whole model.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;

use super::ddl::{DdlWriter, IndexSpec};
use super::TableCreationMode;
use crate::driver::Connection;
use crate::error::{QuarryError, Result};
use crate::meta::{Attribute, EntityModel, Type};
use crate::store::{in_transaction, StoreCore};

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// Serializes schema changes within the process so two threads never race to
/// alter the same database
pub(super) static SCHEMA_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

/// Creates and alters the tables of a store's model
///
/// Every multi-statement operation runs in one transaction; a failure rolls it
/// back and is returned as [`QuarryError::TableModification`].
pub struct SchemaModifier {
    core: Arc<StoreCore>,
}

impl SchemaModifier {
    pub(crate) fn new(core: Arc<StoreCore>) -> Self {
        Self { core }
    }

    /// Tables of the model, each after the tables it references
    ///
    /// # Errors
    ///
    /// [`QuarryError::CircularReference`] when foreign keys form a cycle.
    pub fn sorted_types(&self) -> Result<Vec<Arc<Type>>> {
        sort_types(&self.core.config.model)
    }

    /// Creates every table of the model, then its indexes
    pub fn create_tables(&self, mode: TableCreationMode) -> Result<()> {
        let statements = self.create_statements(mode)?;
        log::info!(
            "creating {} table(s) ({mode:?})",
            self.core.config.model.types().len()
        );
        self.apply("create_tables", &statements)
    }

    /// The statements [`create_tables`](Self::create_tables) would run, as one script
    pub fn create_tables_string(&self, mode: TableCreationMode) -> Result<String> {
        let statements = self.create_statements(mode)?;
        Ok(statements
            .iter()
            .map(|s| format!("{s};\n"))
            .collect::<String>())
    }

    /// Drops every table of the model, referencing tables first
    pub fn drop_tables(&self) -> Result<()> {
        let ddl = self.ddl();
        let statements: Vec<String> = self
            .sorted_types()?
            .iter()
            .rev()
            .map(|ty| ddl.drop_table(ty))
            .collect();
        self.apply("drop_tables", &statements)
    }

    /// Adds the column of `attribute` to its table
    pub fn add_column(&self, attribute: &Attribute) -> Result<()> {
        let ty = self.declaring_type(attribute)?;
        let separate = self.core.config.platform.supports_add_constraint();
        let statements = self.ddl().add_column(&ty, attribute, separate);
        self.apply("add_column", &statements)
    }

    pub fn drop_column(&self, attribute: &Attribute) -> Result<()> {
        let ty = self.declaring_type(attribute)?;
        let statement = self.ddl().drop_column(&ty, attribute);
        self.apply("drop_column", &[statement])
    }

    /// Creates the index `attribute` belongs to (its own `idx_<table>_<column>`
    /// index, or each named index it is part of)
    pub fn create_index(&self, attribute: &Attribute, mode: TableCreationMode) -> Result<()> {
        let ty = self.declaring_type(attribute)?;
        let ddl = self.ddl();
        let mut specs: Vec<IndexSpec> = ddl
            .indexes(&ty)
            .into_iter()
            .filter(|spec| spec.columns.iter().any(|c| c.as_ref() == attribute))
            .collect();
        if specs.is_empty() {
            let column = ddl.column_name(attribute);
            specs.push(IndexSpec {
                name: format!("idx_{}_{column}", ddl.table_name(&ty)),
                columns: vec![Arc::new(attribute.clone())],
                unique: attribute.is_unique(),
            });
        }
        let statements: Vec<String> = specs
            .iter()
            .map(|spec| ddl.create_index(&ty, spec, mode.if_not_exists()))
            .collect();
        self.apply("create_index", &statements)
    }

    /// Creates every declared index of every table
    pub fn create_indexes(&self, mode: TableCreationMode) -> Result<()> {
        let ddl = self.ddl();
        let mut statements = Vec::new();
        for ty in self.sorted_types()? {
            for spec in ddl.indexes(&ty) {
                statements.push(ddl.create_index(&ty, &spec, mode.if_not_exists()));
            }
        }
        self.apply("create_indexes", &statements)
    }

    pub(super) fn ddl(&self) -> DdlWriter<'_> {
        DdlWriter::new(self.core.config.platform.dialect(), &self.core.config.options)
    }

    pub(super) fn core(&self) -> &Arc<StoreCore> {
        &self.core
    }

    fn create_statements(&self, mode: TableCreationMode) -> Result<Vec<String>> {
        let ddl = self.ddl();
        let types = self.sorted_types()?;
        let mut statements = Vec::new();
        if mode == TableCreationMode::DropCreate {
            statements.extend(types.iter().rev().map(|ty| ddl.drop_table(ty)));
        }
        for ty in &types {
            statements.push(ddl.create_table(ty, mode.if_not_exists()));
        }
        for ty in &types {
            for spec in ddl.indexes(ty) {
                statements.push(ddl.create_index(ty, &spec, mode.if_not_exists()));
            }
        }
        Ok(statements)
    }

    fn declaring_type(&self, attribute: &Attribute) -> Result<Arc<Type>> {
        self.core
            .config
            .model
            .type_named(attribute.declaring_type())
            .cloned()
            .ok_or_else(|| {
                QuarryError::UnsupportedOperation(format!(
                    "type '{}' is not part of the model",
                    attribute.declaring_type()
                ))
            })
    }

    /// Runs `statements` in one transaction under the schema lock
    fn apply(&self, operation: &'static str, statements: &[String]) -> Result<()> {
        self.run(operation, |conn, core| {
            for statement in statements {
                core.executor.batch(conn, statement)?;
            }
            Ok(())
        })
    }

    /// Runs `f` in a transaction under the schema lock; errors become
    /// [`QuarryError::TableModification`]
    pub(super) fn run(
        &self,
        operation: &'static str,
        f: impl FnOnce(&mut dyn Connection, &StoreCore) -> Result<()>,
    ) -> Result<()> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::schema_update_span(operation).entered();

        let _guard = SCHEMA_LOCK.lock();
        let core = self.core.as_ref();
        core.with_connection(|conn| in_transaction(conn, |conn| f(conn, core)))
            .map_err(|e| {
                log::warn!("schema operation {operation} failed: {e}");
                QuarryError::TableModification(Box::new(e))
            })
    }
}

impl std::fmt::Debug for SchemaModifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaModifier")
            .field("platform", &self.core.config.platform.name())
            .finish()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Depth-first ordering of the model's tables (views excluded) so every table
/// comes after the tables it references; self references are allowed.
fn sort_types(model: &EntityModel) -> Result<Vec<Arc<Type>>> {
    let mut marks: HashMap<String, Mark> = HashMap::new();
    let mut sorted = Vec::with_capacity(model.types().len());
    let mut path = Vec::new();
    for ty in model.types().iter().filter(|t| !t.is_view()) {
        visit(model, ty, &mut marks, &mut path, &mut sorted)?;
    }
    Ok(sorted)
}

fn visit(
    model: &EntityModel,
    ty: &Arc<Type>,
    marks: &mut HashMap<String, Mark>,
    path: &mut Vec<String>,
    sorted: &mut Vec<Arc<Type>>,
) -> Result<()> {
    let key = ty.name().to_ascii_lowercase();
    match marks.get(&key) {
        Some(Mark::Done) => return Ok(()),
        Some(Mark::Visiting) => {
            path.push(ty.name().to_string());
            return Err(QuarryError::CircularReference(path.join(" -> ")));
        }
        None => {}
    }
    marks.insert(key.clone(), Mark::Visiting);
    path.push(ty.name().to_string());

    let referenced: Vec<&Arc<Type>> = ty
        .referenced_types()
        .filter(|name| !name.eq_ignore_ascii_case(ty.name()))
        .filter_map(|name| model.type_named(name))
        .filter(|t| !t.is_view())
        .collect();
    for target in referenced {
        visit(model, target, marks, path, sorted)?;
    }

    path.pop();
    marks.insert(key, Mark::Done);
    sorted.push(Arc::clone(ty));
    Ok(())
}
