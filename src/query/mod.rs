//! Query building.
//!
//! Conditions and projections are built from typed [`Field`]s obtained from the
//! [`EntityModel`](crate::meta::EntityModel); statements are assembled through the
//! stage-typed [`Query`] and executed with [`Query::get`].
//!
//! ```no_run
//! # use quarry::prelude::*;
//! # #[derive(Debug, Default, Clone)]
//! # struct Person { id: i64, name: String, age: i32 }
//! # quarry::impl_entity!(Person { id: i64, name: String, age: i32 });
//! # fn run(store: &EntityDataStore) -> quarry::Result<()> {
//! let model = store.model();
//! let age = model.field::<Person, i32>("age")?;
//! let name = model.field::<Person, String>("name")?;
//!
//! let people = store
//!     .select::<Person>()?
//!     .filter(age.gt(5).and(age.lt(75)))
//!     .or(name.eq("Bob"))
//!     .order_by(&[&name.asc()])
//!     .get()?
//!     .to_list()?;
//! # Ok(())
//! # }
//! ```

pub mod condition;
pub mod element;
pub mod expression;
pub mod stage;

pub use condition::{exists, not_exists, Condition, Conjunction, InOperand, Operand, Operator};
pub use element::{FromSource, JoinKind, QueryElement, QueryKind, SetOperator};
pub use expression::{
    coalesce, count, count_all, function, named, now, value, AsExpr, AttributeRef, Conditional,
    Expr, Expression, Field, NullOrder, NumericExpression, Order, OrderingExpression,
    TextExpression,
};
pub use stage::{
    select, Combined, DeleteFiltered, Deleting, Filtered, Finished, Grouped, HavingFiltered,
    Inserting, JoinPending, Joined, Limited, Ordered, Query, QueryOperation, Selecting,
    UpdateFiltered, Updating,
};
