//! SQL generation.
//!
//! [`StatementGenerator`] walks a [`QueryElement`](crate::query::QueryElement) and
//! produces a [`BoundStatement`]; [`Platform`] captures dialect differences and
//! [`named`] handles `:name` parameters in raw SQL.

pub mod builder;
pub mod generator;
pub mod named;
pub mod platform;

pub use builder::{BoundStatement, BuilderOptions, NameTransform, QueryBuilder};
pub use generator::StatementGenerator;
pub use platform::{Dialect, Platform, PostgreSql, Sqlite};
