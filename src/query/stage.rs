//! Typed query stages.
//!
//! A [`Query<R, S>`] owns one [`QueryElement`] and a marker `S` naming the stage
//! the statement has reached. Each clause method is only implemented for the
//! stages where SQL allows it and returns the query in its next stage, so an
//! ill-formed statement (a `having` without `group_by`, a join with no `on`, a
//! second `filter` after `order_by`) does not compile. `R` is what
//! [`get`](Query::get) produces.
//!
//! ```text
//! Selecting ─┬─ join ─▶ JoinPending ─ on ─▶ Joined ─┐
//!            ├─ filter ─▶ Filtered ◀────────────────┘
//!            ├─ group_by ─▶ Grouped ─ having ─▶ HavingFiltered
//!            ├─ union/intersect/except ─▶ Combined
//!            └─ order_by ─▶ Ordered ─ limit ─▶ Limited ─ offset ─▶ Finished
//! Updating ─ filter ─▶ UpdateFiltered     Deleting ─ filter ─▶ DeleteFiltered
//! Inserting ─ values_from ─▶ Finished
//! ```

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::Arc;

use super::condition::{Condition, Conjunction};
use super::element::{Clause, FromSource, JoinKind, QueryElement, SetOperator};
use super::expression::{AsExpr, AttributeRef, Expr, Field};
use crate::entity::Entity;
use crate::error::{QuarryError, Result};
use crate::meta::{EntityModel, Type};
use crate::result::{QueryResult, Tuple};
use crate::value::Value;

/// Executes a finished query element and produces the query's result type
pub trait QueryOperation<R>: Send + Sync {
    fn evaluate(&self, element: QueryElement) -> Result<R>;
}

mod sealed {
    pub trait Sealed {}
}

macro_rules! stages {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug)]
            pub enum $name {}
            impl sealed::Sealed for $name {}
        )*
    };
}

stages! {
    /// Projection chosen; `from`, `join`, `filter` and everything after are open
    Selecting,
    /// A join was opened and needs its `on` condition
    JoinPending,
    /// Join condition given; `and`/`or` extend it
    Joined,
    /// `WHERE` given; `and`/`or` extend it
    Filtered,
    Grouped,
    /// `HAVING` given; `and`/`or` extend it
    HavingFiltered,
    Ordered,
    Limited,
    /// Combined with another select through a set operator
    Combined,
    Updating,
    UpdateFiltered,
    Deleting,
    DeleteFiltered,
    Inserting,
    /// Nothing left to add
    Finished,
}

/// Stages accepting `distinct`/`from`
pub trait Selectable: sealed::Sealed {}
impl Selectable for Selecting {}

/// Stages accepting a join
pub trait Joinable: sealed::Sealed {}
impl Joinable for Selecting {}
impl Joinable for Joined {}

/// Stages accepting `filter`, and the stage it leads to
pub trait Filterable: sealed::Sealed {
    type Next;
}
impl Filterable for Selecting {
    type Next = Filtered;
}
impl Filterable for Joined {
    type Next = Filtered;
}
impl Filterable for Updating {
    type Next = UpdateFiltered;
}
impl Filterable for Deleting {
    type Next = DeleteFiltered;
}

/// Stages whose last clause can be extended with `and`/`or`
pub trait Conjoinable: sealed::Sealed {
    #[doc(hidden)]
    const CLAUSE: Clause;
}
impl Conjoinable for Joined {
    const CLAUSE: Clause = Clause::Join;
}
impl Conjoinable for Filtered {
    const CLAUSE: Clause = Clause::Where;
}
impl Conjoinable for HavingFiltered {
    const CLAUSE: Clause = Clause::Having;
}
impl Conjoinable for UpdateFiltered {
    const CLAUSE: Clause = Clause::Where;
}
impl Conjoinable for DeleteFiltered {
    const CLAUSE: Clause = Clause::Where;
}

pub trait Groupable: sealed::Sealed {}
impl Groupable for Selecting {}
impl Groupable for Joined {}
impl Groupable for Filtered {}

pub trait Orderable: sealed::Sealed {}
impl Orderable for Selecting {}
impl Orderable for Joined {}
impl Orderable for Filtered {}
impl Orderable for Grouped {}
impl Orderable for HavingFiltered {}
impl Orderable for Combined {}

pub trait Limitable: sealed::Sealed {}
impl Limitable for Selecting {}
impl Limitable for Joined {}
impl Limitable for Filtered {}
impl Limitable for Grouped {}
impl Limitable for HavingFiltered {}
impl Limitable for Ordered {}
impl Limitable for Combined {}

pub trait Combinable: sealed::Sealed {}
impl Combinable for Selecting {}
impl Combinable for Joined {}
impl Combinable for Filtered {}
impl Combinable for Grouped {}
impl Combinable for HavingFiltered {}
impl Combinable for Combined {}

/// Stages at which the statement is complete and [`Query::get`] is available
pub trait Executable: sealed::Sealed {}
impl Executable for Selecting {}
impl Executable for Joined {}
impl Executable for Filtered {}
impl Executable for Grouped {}
impl Executable for HavingFiltered {}
impl Executable for Ordered {}
impl Executable for Limited {}
impl Executable for Combined {}
impl Executable for Updating {}
impl Executable for UpdateFiltered {}
impl Executable for Deleting {}
impl Executable for DeleteFiltered {}
impl Executable for Inserting {}
impl Executable for Finished {}

/// A statement under construction
pub struct Query<R, S = Selecting> {
    element: QueryElement,
    model: Option<Arc<EntityModel>>,
    operation: Option<Arc<dyn QueryOperation<R>>>,
    _stage: PhantomData<fn() -> S>,
}

impl<R, S> Query<R, S> {
    pub(crate) fn new(
        element: QueryElement,
        model: Option<Arc<EntityModel>>,
        operation: Option<Arc<dyn QueryOperation<R>>>,
    ) -> Self {
        Self {
            element,
            model,
            operation,
            _stage: PhantomData,
        }
    }

    fn into_stage<T>(self) -> Query<R, T> {
        Query {
            element: self.element,
            model: self.model,
            operation: self.operation,
            _stage: PhantomData,
        }
    }

    pub fn element(&self) -> &QueryElement {
        &self.element
    }

    pub fn into_element(self) -> QueryElement {
        self.element
    }

    /// Whether [`get`](Query::get) can execute this query
    pub fn is_attached(&self) -> bool {
        self.operation.is_some()
    }

    fn resolve_type<E: Entity>(&self) -> Result<Arc<Type>> {
        let model = self.model.as_ref().ok_or_else(|| {
            QuarryError::UnsupportedOperation(format!(
                "cannot resolve {} on a query without a model",
                std::any::type_name::<E>()
            ))
        })?;
        model.type_of::<E>().cloned()
    }
}

impl<R, S: Selectable> Query<R, S> {
    pub fn distinct(mut self) -> Self {
        self.element.distinct = true;
        self
    }

    /// Adds the table of `E` to `FROM`
    pub fn from<E: Entity>(self) -> Result<Self> {
        let ty = self.resolve_type::<E>()?;
        Ok(self.from_type(&ty))
    }

    pub fn from_type(mut self, ty: &Type) -> Self {
        self.element
            .from
            .push(FromSource::Table(ty.name().to_string()));
        self
    }

    /// Selects from a derived table; refer to its columns with
    /// [`named`](crate::query::named).
    pub fn from_query<R2, S2>(mut self, query: Query<R2, S2>, alias: &str) -> Self {
        self.element.from.push(FromSource::Query {
            query: Box::new(query.into_element()),
            alias: alias.to_string(),
        });
        self
    }
}

impl<R, S: Joinable> Query<R, S> {
    /// `INNER JOIN` on the table of `E`
    pub fn join<E: Entity>(self) -> Result<Query<R, JoinPending>> {
        let ty = self.resolve_type::<E>()?;
        Ok(self.join_type(JoinKind::Inner, &ty))
    }

    pub fn left_join<E: Entity>(self) -> Result<Query<R, JoinPending>> {
        let ty = self.resolve_type::<E>()?;
        Ok(self.join_type(JoinKind::Left, &ty))
    }

    pub fn right_join<E: Entity>(self) -> Result<Query<R, JoinPending>> {
        let ty = self.resolve_type::<E>()?;
        Ok(self.join_type(JoinKind::Right, &ty))
    }

    pub fn join_type(mut self, kind: JoinKind, ty: &Type) -> Query<R, JoinPending> {
        self.element.push_join(kind, ty.name());
        self.into_stage()
    }
}

impl<R> Query<R, JoinPending> {
    pub fn on(mut self, condition: Condition) -> Query<R, Joined> {
        self.element.push_condition(Clause::Join, None, condition);
        self.into_stage()
    }
}

impl<R, S: Filterable> Query<R, S> {
    /// `WHERE condition`
    pub fn filter(mut self, condition: Condition) -> Query<R, S::Next> {
        self.element.push_condition(Clause::Where, None, condition);
        self.into_stage()
    }

    /// `WHERE EXISTS (subquery)`
    pub fn filter_exists<R2, S2>(self, query: Query<R2, S2>) -> Query<R, S::Next> {
        self.filter(super::condition::exists(query))
    }

    /// `WHERE NOT EXISTS (subquery)`
    pub fn filter_not_exists<R2, S2>(self, query: Query<R2, S2>) -> Query<R, S::Next> {
        self.filter(super::condition::not_exists(query))
    }
}

impl<R, S: Conjoinable> Query<R, S> {
    /// Extends the current clause with `AND condition`
    pub fn and(mut self, condition: Condition) -> Self {
        self.element
            .push_condition(S::CLAUSE, Some(Conjunction::And), condition);
        self
    }

    /// Extends the current clause with `OR condition`
    pub fn or(mut self, condition: Condition) -> Self {
        self.element
            .push_condition(S::CLAUSE, Some(Conjunction::Or), condition);
        self
    }
}

impl<R, S: Groupable> Query<R, S> {
    pub fn group_by(mut self, exprs: &[&dyn AsExpr]) -> Query<R, Grouped> {
        self.element
            .group_by
            .extend(exprs.iter().map(|e| e.as_expr()));
        self.into_stage()
    }
}

impl<R> Query<R, Grouped> {
    pub fn having(mut self, condition: Condition) -> Query<R, HavingFiltered> {
        self.element.push_condition(Clause::Having, None, condition);
        self.into_stage()
    }
}

impl<R, S: Orderable> Query<R, S> {
    /// Plain expressions sort ascending; use `asc()`/`desc()` for direction and
    /// null placement.
    pub fn order_by(mut self, exprs: &[&dyn AsExpr]) -> Query<R, Ordered> {
        self.element
            .order_by
            .extend(exprs.iter().map(|e| e.as_expr()));
        self.into_stage()
    }
}

impl<R, S: Limitable> Query<R, S> {
    pub fn limit(mut self, limit: u64) -> Query<R, Limited> {
        self.element.limit = Some(limit);
        self.into_stage()
    }
}

impl<R> Query<R, Limited> {
    pub fn offset(mut self, offset: u64) -> Query<R, Finished> {
        self.element.offset = Some(offset);
        self.into_stage()
    }
}

impl<R, S: Combinable> Query<R, S> {
    fn combine<R2, S2>(mut self, operator: SetOperator, other: Query<R2, S2>) -> Query<R, Combined> {
        self.element
            .set_operations
            .push((operator, other.into_element()));
        self.into_stage()
    }

    pub fn union<R2, S2>(self, other: Query<R2, S2>) -> Query<R, Combined> {
        self.combine(SetOperator::Union, other)
    }

    pub fn union_all<R2, S2>(self, other: Query<R2, S2>) -> Query<R, Combined> {
        self.combine(SetOperator::UnionAll, other)
    }

    pub fn intersect<R2, S2>(self, other: Query<R2, S2>) -> Query<R, Combined> {
        self.combine(SetOperator::Intersect, other)
    }

    pub fn except<R2, S2>(self, other: Query<R2, S2>) -> Query<R, Combined> {
        self.combine(SetOperator::Except, other)
    }
}

impl<R> Query<R, Updating> {
    /// `SET column = value`
    pub fn set<E, V: Into<Value>>(mut self, field: &Field<E, V>, value: impl Into<V>) -> Self {
        let value: V = value.into();
        self.element
            .assignments
            .push((Arc::clone(field.attribute()), Expr::Literal(value.into())));
        self
    }

    /// `SET column = expression`
    pub fn set_expr<E, V>(mut self, field: &Field<E, V>, expr: &dyn AsExpr) -> Self {
        self.element
            .assignments
            .push((Arc::clone(field.attribute()), expr.as_expr()));
        self
    }
}

impl<R> Query<R, Inserting> {
    /// Adds one column value to the inserted row
    pub fn value<E, V: Into<Value>>(mut self, field: &Field<E, V>, value: impl Into<V>) -> Self {
        let value: V = value.into();
        self.element.columns.push(Arc::clone(field.attribute()));
        match self.element.rows.first_mut() {
            Some(row) => row.push(Expr::Literal(value.into())),
            None => self.element.rows.push(vec![Expr::Literal(value.into())]),
        }
        self
    }

    /// `INSERT INTO t (columns) SELECT …`; the subquery's projection supplies the
    /// values for `columns` in order.
    pub fn values_from<R2, S2>(
        mut self,
        columns: &[&dyn AttributeRef],
        query: Query<R2, S2>,
    ) -> Query<R, Finished> {
        self.element.columns = columns
            .iter()
            .map(|f| Arc::clone(f.attribute_ref()))
            .collect();
        self.element.rows.clear();
        self.element.insert_query = Some(Box::new(query.into_element()));
        self.into_stage()
    }
}

impl<R, S: Executable> Query<R, S> {
    /// Executes the statement.
    ///
    /// # Errors
    ///
    /// [`QuarryError::UnsupportedOperation`] for a detached query (built with the
    /// free [`select`] function, meant for subqueries), otherwise whatever
    /// generation or execution fails with.
    pub fn get(self) -> Result<R> {
        let operation = self.operation.ok_or_else(|| {
            QuarryError::UnsupportedOperation("query is not attached to a store".to_string())
        })?;
        operation.evaluate(self.element)
    }
}

impl<R, S> AsExpr for Query<R, S> {
    fn as_expr(&self) -> Expr {
        Expr::Query(Box::new(self.element.clone()))
    }
}

impl<R, S> PartialEq for Query<R, S> {
    fn eq(&self, other: &Self) -> bool {
        self.element == other.element
    }
}

impl<R, S> Eq for Query<R, S> {}

impl<R, S> Hash for Query<R, S> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.element.hash(state);
    }
}

impl<R, S> fmt::Debug for Query<R, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("stage", &std::any::type_name::<S>())
            .field("element", &self.element)
            .field("attached", &self.operation.is_some())
            .finish()
    }
}

/// Detached select, for subqueries and set operands
///
/// The `FROM` clause is inferred from the selected attributes unless given.
pub fn select(selection: &[&dyn AsExpr]) -> Query<QueryResult<Tuple>, Selecting> {
    Query::new(
        QueryElement::select(selection.iter().map(|e| e.as_expr()).collect()),
        None,
        None,
    )
}
