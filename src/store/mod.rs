//! Entity stores
//!
//! [`EntityStore`] is the query and persistence surface shared by
//! [`EntityDataStore`] (a connection per operation) and
//! [`Transaction`](crate::Transaction) (one pinned connection). Queries are built
//! with the typed stages of [`crate::query`]; single-entity writes go through the
//! entity writer, which handles generated keys, version columns and batching.

mod operation;
mod writer;

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::Configuration;
use crate::driver::{Connection, ConnectionProvider};
use crate::entity::Entity;
use crate::error::{QuarryError, Result};
use crate::executor::StatementExecutor;
use crate::meta::{Association, EntityModel, Type};
use crate::query::{
    count_all, AsExpr, Condition, Deleting, Expr, Filtered, FromSource, Inserting, Operand,
    Operator, Query, QueryElement, QueryKind, Selecting, Updating,
};
use crate::reader::{association_condition, EntityReader, TupleReader};
use crate::result::{QueryResult, Scalar, Tuple};
use crate::schema::{SchemaModifier, SchemaUpdater, TableCreationMode};
use crate::sql::{named, BoundStatement, StatementGenerator};
use crate::transaction::{IsolationLevel, Transaction};
use crate::value::Value;

use operation::{CountOperation, InsertOperation, SelectOperation, TupleOperation, UpdateOperation};
use writer::EntityWriter;

/// Where a store gets its connection from
pub(crate) enum ConnectionSource {
    /// A fresh connection per operation
    Provider(Arc<dyn ConnectionProvider>),
    /// One connection shared by every operation (a transaction)
    Bound(Arc<Mutex<Box<dyn Connection>>>),
}

/// State shared by a store and the queries and results it hands out
pub struct StoreCore {
    pub(crate) config: Configuration,
    pub(crate) source: ConnectionSource,
    pub(crate) executor: StatementExecutor,
}

impl StoreCore {
    pub(crate) fn new(config: Configuration) -> Self {
        let executor = StatementExecutor::new(config.statement_listeners.clone());
        Self {
            source: ConnectionSource::Provider(Arc::clone(&config.provider)),
            config,
            executor,
        }
    }

    /// Same configuration, pinned to `conn`
    pub(crate) fn bound_to(&self, conn: Arc<Mutex<Box<dyn Connection>>>) -> Self {
        Self {
            config: self.config.clone(),
            source: ConnectionSource::Bound(conn),
            executor: self.executor.clone(),
        }
    }

    /// A new connection from the provider
    pub(crate) fn open_connection(&self) -> Result<Box<dyn Connection>> {
        match &self.source {
            ConnectionSource::Provider(provider) => {
                let mut conn = provider.connection()?;
                conn.set_statement_cache_capacity(self.config.statement_cache_size);
                Ok(conn)
            }
            ConnectionSource::Bound(_) => Err(QuarryError::Transaction(
                "a transaction is already open on this store; use begin_nested".to_string(),
            )),
        }
    }

    /// Runs `f` on this store's connection. `f` must not call back into the store.
    pub(crate) fn with_connection<T>(
        &self,
        f: impl FnOnce(&mut dyn Connection) -> Result<T>,
    ) -> Result<T> {
        match &self.source {
            ConnectionSource::Provider(_) => {
                let mut conn = self.open_connection()?;
                f(conn.as_mut())
            }
            ConnectionSource::Bound(conn) => {
                let mut guard = conn.lock();
                f(guard.as_mut())
            }
        }
    }

    pub(crate) fn generate(&self, element: &QueryElement) -> Result<BoundStatement> {
        StatementGenerator::new(self.config.platform.as_ref(), &self.config.options)
            .generate(element)
    }

    pub(crate) fn type_of<E: Entity>(&self) -> Result<Arc<Type>> {
        self.config.model.type_of::<E>().cloned()
    }

    /// Lazy result that runs `statement` on every iteration
    pub(crate) fn result<T>(
        self: &Arc<Self>,
        statement: BoundStatement,
        reader: Arc<dyn crate::reader::ResultReader<T>>,
    ) -> QueryResult<T> {
        let core = Arc::clone(self);
        QueryResult::new(
            move || core.with_connection(|conn| core.executor.query(conn, &statement)),
            reader,
        )
    }
}

impl fmt::Debug for StoreCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = match &self.source {
            ConnectionSource::Provider(_) => "provider",
            ConnectionSource::Bound(_) => "bound",
        };
        f.debug_struct("StoreCore")
            .field("config", &self.config)
            .field("source", &source)
            .finish()
    }
}

/// Runs `f` inside a transaction unless the connection already has one open
pub(crate) fn in_transaction<T>(
    conn: &mut dyn Connection,
    f: impl FnOnce(&mut dyn Connection) -> Result<T>,
) -> Result<T> {
    if conn.in_transaction() {
        return f(conn);
    }
    conn.begin(None)
        .map_err(|e| QuarryError::statement("BEGIN", e))?;
    match f(&mut *conn) {
        Ok(value) => {
            conn.commit()
                .map_err(|e| QuarryError::statement("COMMIT", e))?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback) = conn.rollback() {
                log::warn!("rollback after failed statement also failed: {rollback}");
            }
            Err(e)
        }
    }
}

/// Association `property` of `S`, checked to lead to `T`
fn association_between<S: Entity, T: Entity>(core: &StoreCore, property: &str) -> Result<Association> {
    let source = core.type_of::<S>()?;
    let target = core.type_of::<T>()?;
    let association = core.config.model.association(&source, property)?;
    if association.target.name() != target.name() {
        return Err(QuarryError::UnsupportedOperation(format!(
            "{}.{property} associates {}, not {}",
            source.name(),
            association.target.name(),
            target.name()
        )));
    }
    Ok(association)
}

fn key_equals(ty: &Type, key: Value) -> Result<Condition> {
    let attribute = ty.single_key().ok_or_else(|| {
        QuarryError::UnsupportedOperation(format!("{} does not have a single key", ty.name()))
    })?;
    Ok(Condition::compare(
        Expr::Attribute(Arc::clone(attribute)),
        Operator::Equal,
        Operand::Value(key),
    ))
}

/// Queries and entity persistence
///
/// Everything is a provided method over [`core`](EntityStore::core), so a
/// transaction and a store behave the same way.
pub trait EntityStore {
    #[doc(hidden)]
    fn core(&self) -> &Arc<StoreCore>;

    fn model(&self) -> &Arc<EntityModel> {
        &self.core().config.model
    }

    /// `SELECT` every column of `E`
    fn select<E: Entity>(&self) -> Result<Query<QueryResult<E>, Selecting>> {
        let core = self.core();
        let ty = core.type_of::<E>()?;
        let selection = ty.columns().map(|a| Expr::Attribute(Arc::clone(a))).collect();
        self.select_entities(ty, selection)
    }

    /// `SELECT` some attributes of `E`; the others keep their default value
    fn select_fields<E: Entity>(
        &self,
        fields: &[&dyn crate::query::AttributeRef],
    ) -> Result<Query<QueryResult<E>, Selecting>> {
        let ty = self.core().type_of::<E>()?;
        let selection = fields
            .iter()
            .map(|f| Expr::Attribute(Arc::clone(f.attribute_ref())))
            .collect();
        self.select_entities(ty, selection)
    }

    #[doc(hidden)]
    fn select_entities<E: Entity>(
        &self,
        ty: Arc<Type>,
        selection: Vec<Expr>,
    ) -> Result<Query<QueryResult<E>, Selecting>> {
        let core = self.core();
        let mut element = QueryElement::select(selection);
        element.from.push(FromSource::Table(ty.name().to_string()));
        let operation = SelectOperation::<E>::new(Arc::clone(core), ty);
        Ok(Query::new(
            element,
            Some(Arc::clone(&core.config.model)),
            Some(Arc::new(operation)),
        ))
    }

    /// `SELECT` arbitrary expressions as [`Tuple`]s
    fn select_tuple(&self, selection: &[&dyn AsExpr]) -> Query<QueryResult<Tuple>, Selecting> {
        let core = self.core();
        Query::new(
            QueryElement::select(selection.iter().map(|e| e.as_expr()).collect()),
            Some(Arc::clone(&core.config.model)),
            Some(Arc::new(TupleOperation::new(Arc::clone(core)))),
        )
    }

    /// `SELECT count(*) FROM` the table of `E`
    fn count<E: Entity>(&self) -> Result<Query<Scalar<i64>, Selecting>> {
        let core = self.core();
        let ty = core.type_of::<E>()?;
        let mut element = QueryElement::select(vec![count_all().as_expr()]);
        element.from.push(FromSource::Table(ty.name().to_string()));
        Ok(Query::new(
            element,
            Some(Arc::clone(&core.config.model)),
            Some(Arc::new(CountOperation::new(Arc::clone(core)))),
        ))
    }

    /// `UPDATE` rows of `E`; [`Scalar::value`] runs it and returns the row count.
    /// Loaded entities are not changed.
    fn update_rows<E: Entity>(&self) -> Result<Query<Scalar<u64>, Updating>> {
        let core = self.core();
        let ty = core.type_of::<E>()?;
        Ok(Query::new(
            QueryElement::on_table(QueryKind::Update, ty.name()),
            Some(Arc::clone(&core.config.model)),
            Some(Arc::new(UpdateOperation::new(Arc::clone(core)))),
        ))
    }

    /// `DELETE` rows of `E`; [`Scalar::value`] runs it and returns the row count.
    fn delete_rows<E: Entity>(&self) -> Result<Query<Scalar<u64>, Deleting>> {
        let core = self.core();
        let ty = core.type_of::<E>()?;
        Ok(Query::new(
            QueryElement::on_table(QueryKind::Delete, ty.name()),
            Some(Arc::clone(&core.config.model)),
            Some(Arc::new(UpdateOperation::new(Arc::clone(core)))),
        ))
    }

    /// `INSERT` into the table of `E`; the result holds the generated keys
    fn insert_rows<E: Entity>(&self) -> Result<Query<QueryResult<Tuple>, Inserting>> {
        let core = self.core();
        let ty = core.type_of::<E>()?;
        Ok(Query::new(
            QueryElement::on_table(QueryKind::Insert, ty.name()),
            Some(Arc::clone(&core.config.model)),
            Some(Arc::new(InsertOperation::new(Arc::clone(core), ty))),
        ))
    }

    /// Inserts `entity` and assigns its generated key and version
    fn insert<E: Entity>(&self, entity: &mut E) -> Result<()> {
        let core = self.core();
        let ty = core.type_of::<E>()?;
        core.with_connection(|conn| EntityWriter::new(core, &ty).insert(conn, entity))
    }

    /// Inserts every entity in batches of the configured size, in one transaction
    fn insert_all<E: Entity>(&self, entities: &mut [E]) -> Result<()> {
        let core = self.core();
        let ty = core.type_of::<E>()?;
        core.with_connection(|conn| EntityWriter::new(core, &ty).insert_all(conn, entities))
    }

    /// Writes every non-key column of `entity`, matched by key (and version)
    fn update<E: Entity>(&self, entity: &mut E) -> Result<()> {
        let core = self.core();
        let ty = core.type_of::<E>()?;
        core.with_connection(|conn| EntityWriter::new(core, &ty).update(conn, entity))
    }

    /// Inserts, or updates the row with the same key
    fn upsert<E: Entity>(&self, entity: &mut E) -> Result<()> {
        let core = self.core();
        let ty = core.type_of::<E>()?;
        core.with_connection(|conn| EntityWriter::new(core, &ty).upsert(conn, entity))
    }

    fn delete<E: Entity>(&self, entity: &E) -> Result<()> {
        let core = self.core();
        let ty = core.type_of::<E>()?;
        core.with_connection(|conn| EntityWriter::new(core, &ty).delete(conn, entity))
    }

    /// Deletes every entity, with batched `IN` lists where the type allows it
    fn delete_all<E: Entity>(&self, entities: &[E]) -> Result<()> {
        let core = self.core();
        let ty = core.type_of::<E>()?;
        core.with_connection(|conn| EntityWriter::new(core, &ty).delete_all(conn, entities))
    }

    /// Reloads every column of `entity` from its row
    fn refresh<E: Entity>(&self, entity: &mut E) -> Result<()> {
        let core = self.core();
        let ty = core.type_of::<E>()?;
        core.with_connection(|conn| EntityWriter::new(core, &ty).refresh(conn, entity))
    }

    /// Query for the `T` entities associated with `source` through `property`
    ///
    /// The query can be refined further; a source that is not saved yet matches
    /// nothing.
    fn related<S: Entity, T: Entity>(
        &self,
        source: &S,
        property: &str,
    ) -> Result<Query<QueryResult<T>, Filtered>> {
        let association = association_between::<S, T>(self.core(), property)?;
        Ok(self
            .select::<T>()?
            .filter(association_condition(&association, source)))
    }

    /// Saves `source` and links `targets` to it through `property`, in one
    /// transaction. Targets are saved as well when the association cascades saves.
    fn save_related<S: Entity, T: Entity>(
        &self,
        source: &mut S,
        property: &str,
        targets: &mut [T],
    ) -> Result<()> {
        let core = self.core();
        let association = association_between::<S, T>(core, property)?;
        core.with_connection(|conn| {
            EntityWriter::new(core, &association.source).save_related(
                conn,
                &association,
                source,
                targets,
            )
        })
    }

    /// Removes the links between `source` and `targets`; returns how many went
    fn unlink<S: Entity, T: Entity>(
        &self,
        source: &S,
        property: &str,
        targets: &mut [T],
    ) -> Result<u64> {
        let core = self.core();
        let association = association_between::<S, T>(core, property)?;
        core.with_connection(|conn| {
            EntityWriter::new(core, &association.source).unlink(conn, &association, source, targets)
        })
    }

    /// Entity with the given single-column key
    fn find_by_key<E: Entity>(&self, key: impl Into<Value>) -> Result<Option<E>> {
        let ty = self.core().type_of::<E>()?;
        let condition = key_equals(&ty, key.into())?;
        self.select::<E>()?.filter(condition).get()?.first()
    }

    /// Raw SQL returning rows, with platform placeholders (`?` or `$n`)
    fn raw(&self, sql: &str, params: &[Value]) -> Result<QueryResult<Tuple>> {
        let statement = BoundStatement {
            sql: sql.to_string(),
            params: params.to_vec(),
        };
        Ok(self.core().result(statement, Arc::new(TupleReader)))
    }

    /// Raw SQL whose columns are matched to the attributes of `E` by name
    fn raw_entities<E: Entity>(&self, sql: &str, params: &[Value]) -> Result<QueryResult<E>> {
        let core = self.core();
        let ty = core.type_of::<E>()?;
        let reader = EntityReader::<E>::by_column_name(ty, core.config.entity_listeners.clone());
        let statement = BoundStatement {
            sql: sql.to_string(),
            params: params.to_vec(),
        };
        Ok(core.result(statement, Arc::new(reader)))
    }

    /// Raw SQL with `:name` parameters
    fn raw_named(&self, sql: &str, params: &[(&str, Value)]) -> Result<QueryResult<Tuple>> {
        let core = self.core();
        let statement = named::bind(sql, params, core.config.platform.as_ref())?;
        Ok(core.result(statement, Arc::new(TupleReader)))
    }

    /// Raw SQL that changes rows; returns the affected row count
    fn raw_update(&self, sql: &str, params: &[Value]) -> Result<u64> {
        let core = self.core();
        let statement = BoundStatement {
            sql: sql.to_string(),
            params: params.to_vec(),
        };
        core.with_connection(|conn| core.executor.update(conn, &statement))
    }
}

/// Store over a [`Configuration`]
///
/// Each operation takes a connection from the provider and gives it back when
/// done; use [`begin`](Self::begin) or [`transaction`](Self::transaction) to run
/// several operations on one connection.
#[derive(Clone, Debug)]
pub struct EntityDataStore {
    core: Arc<StoreCore>,
}

impl EntityDataStore {
    pub fn new(config: Configuration) -> Self {
        log::debug!(
            "entity store over {} with {} type(s)",
            config.platform.name(),
            config.model.types().len()
        );
        Self {
            core: Arc::new(StoreCore::new(config)),
        }
    }

    /// Store with default settings for the database at `url`
    /// (see [`crate::connection::connect`])
    pub fn connect(url: &str, model: Arc<EntityModel>) -> Result<Self> {
        let provider = crate::connection::connect(url)?;
        Ok(Self::new(Configuration::builder(provider, model).build()?))
    }

    pub fn configuration(&self) -> &Configuration {
        &self.core.config
    }

    /// Begins a transaction with the configured isolation level
    pub fn begin(&self) -> Result<Transaction> {
        Transaction::begin(&self.core, self.core.config.transaction_isolation)
    }

    pub fn begin_with_isolation(&self, level: IsolationLevel) -> Result<Transaction> {
        Transaction::begin(&self.core, Some(level))
    }

    /// Runs `f` in a transaction, committing when it returns `Ok`
    ///
    /// # Errors
    ///
    /// When `f` fails the transaction is rolled back and the error is returned as
    /// [`QuarryError::Rollback`].
    pub fn transaction<T>(&self, f: impl FnOnce(&mut Transaction) -> Result<T>) -> Result<T> {
        let mut tx = self.begin()?;
        match f(&mut tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback() {
                    log::warn!("rollback after failed transaction body also failed: {rollback}");
                }
                Err(QuarryError::Rollback(Box::new(e)))
            }
        }
    }

    /// Schema operations on this store's database
    pub fn schema(&self) -> SchemaModifier {
        SchemaModifier::new(Arc::clone(&self.core))
    }

    /// Upgrades the database to the model (see [`SchemaUpdater`])
    pub fn schema_updater(&self, mode: TableCreationMode) -> SchemaUpdater {
        SchemaUpdater::new(Arc::clone(&self.core), mode)
    }
}

impl EntityStore for EntityDataStore {
    fn core(&self) -> &Arc<StoreCore> {
        &self.core
    }
}
