//! Query operations: what [`Query::get`](crate::query::Query::get) does for each
//! kind of statement a store hands out.

use std::marker::PhantomData;
use std::sync::Arc;

use super::StoreCore;
use crate::entity::Entity;
use crate::error::Result;
use crate::meta::Type;
use crate::query::{Expr, QueryElement, QueryOperation};
use crate::reader::{EntityReader, TupleReader};
use crate::result::{QueryResult, Scalar, Tuple};
use crate::value::Value;

/// Selects entities of `E`
pub(crate) struct SelectOperation<E> {
    core: Arc<StoreCore>,
    ty: Arc<Type>,
    _entity: PhantomData<fn() -> E>,
}

impl<E> SelectOperation<E> {
    pub(crate) fn new(core: Arc<StoreCore>, ty: Arc<Type>) -> Self {
        Self {
            core,
            ty,
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> QueryOperation<QueryResult<E>> for SelectOperation<E> {
    fn evaluate(&self, element: QueryElement) -> Result<QueryResult<E>> {
        let statement = self.core.generate(&element)?;
        let reader = EntityReader::<E>::for_selection(
            Arc::clone(&self.ty),
            &element.selection,
            self.core.config.entity_listeners.clone(),
        );
        Ok(self.core.result(statement, Arc::new(reader)))
    }
}

/// Selects arbitrary expressions as tuples
pub(crate) struct TupleOperation {
    core: Arc<StoreCore>,
}

impl TupleOperation {
    pub(crate) fn new(core: Arc<StoreCore>) -> Self {
        Self { core }
    }
}

impl QueryOperation<QueryResult<Tuple>> for TupleOperation {
    fn evaluate(&self, element: QueryElement) -> Result<QueryResult<Tuple>> {
        let statement = self.core.generate(&element)?;
        Ok(self.core.result(statement, Arc::new(TupleReader)))
    }
}

/// `SELECT count(*)`; the first column of the first row, 0 when there is none
pub(crate) struct CountOperation {
    core: Arc<StoreCore>,
}

impl CountOperation {
    pub(crate) fn new(core: Arc<StoreCore>) -> Self {
        Self { core }
    }
}

impl QueryOperation<Scalar<i64>> for CountOperation {
    fn evaluate(&self, element: QueryElement) -> Result<Scalar<i64>> {
        let statement = self.core.generate(&element)?;
        let core = Arc::clone(&self.core);
        Ok(Scalar::new(move || {
            core.with_connection(|conn| {
                let mut cursor = core.executor.query(conn, &statement)?;
                let first = cursor.next_row()?;
                cursor.close();
                match first.and_then(|row| row.into_iter().next()) {
                    Some(Value::Null) | None => Ok(0),
                    Some(value) => value.into_typed(),
                }
            })
        }))
    }
}

/// `UPDATE` or `DELETE`; evaluates to the affected row count
pub(crate) struct UpdateOperation {
    core: Arc<StoreCore>,
}

impl UpdateOperation {
    pub(crate) fn new(core: Arc<StoreCore>) -> Self {
        Self { core }
    }
}

impl QueryOperation<Scalar<u64>> for UpdateOperation {
    fn evaluate(&self, element: QueryElement) -> Result<Scalar<u64>> {
        let statement = self.core.generate(&element)?;
        let core = Arc::clone(&self.core);
        Ok(Scalar::new(move || {
            core.with_connection(|conn| core.executor.update(conn, &statement))
        }))
    }
}

/// `INSERT`; runs immediately and keeps the generated key rows
pub(crate) struct InsertOperation {
    core: Arc<StoreCore>,
    ty: Arc<Type>,
}

impl InsertOperation {
    pub(crate) fn new(core: Arc<StoreCore>, ty: Arc<Type>) -> Self {
        Self { core, ty }
    }
}

impl QueryOperation<QueryResult<Tuple>> for InsertOperation {
    fn evaluate(&self, mut element: QueryElement) -> Result<QueryResult<Tuple>> {
        let platform = &self.core.config.platform;
        if self.ty.has_generated_keys() && platform.supports_returning() {
            element.returning = self
                .ty
                .generated_keys()
                .into_iter()
                .map(Expr::Attribute)
                .collect();
        }
        let statement = self.core.generate(&element)?;
        let core = &self.core;

        if element.returning.is_empty() {
            core.with_connection(|conn| core.executor.update(conn, &statement))?;
            return Ok(QueryResult::from_rows(
                Arc::new(Vec::new()),
                Vec::new(),
                Arc::new(TupleReader),
            ));
        }

        let (columns, rows) = core.with_connection(|conn| {
            let mut cursor = core.executor.query(conn, &statement)?;
            let columns = Arc::clone(cursor.columns());
            let mut rows = Vec::new();
            while let Some(row) = cursor.next_row()? {
                rows.push(row);
            }
            Ok((columns, rows))
        })?;
        Ok(QueryResult::from_rows(columns, rows, Arc::new(TupleReader)))
    }
}
