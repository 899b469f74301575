//! The query element: mutable accumulator for one statement under construction.

use std::sync::Arc;

use super::condition::{Condition, Conjunction};
use super::expression::Expr;
use crate::meta::Attribute;

/// Statement kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    Select,
    Insert,
    /// `INSERT … ON CONFLICT (key) DO UPDATE`
    Upsert,
    Update,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SetOperator {
    Union,
    UnionAll,
    Intersect,
    Except,
}

/// A `FROM` source
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FromSource {
    Table(String),
    Query {
        query: Box<QueryElement>,
        alias: String,
    },
}

/// A condition in a `WHERE`, `ON` or `HAVING` list, with the conjunction that
/// joins it to the previous one
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WhereElement {
    pub conjunction: Option<Conjunction>,
    pub condition: Condition,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JoinElement {
    pub kind: JoinKind,
    pub table: String,
    pub on: Vec<WhereElement>,
}

/// Which clause an `and`/`or` call extends
#[doc(hidden)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clause {
    Where,
    Join,
    Having,
}

/// Everything accumulated for one statement
///
/// The fluent stages in [`super::stage`] own one element each and append to it;
/// equality and hashing are structural, so two queries built the same way compare
/// equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryElement {
    pub kind: QueryKind,
    pub selection: Vec<Expr>,
    pub distinct: bool,
    pub from: Vec<FromSource>,
    pub joins: Vec<JoinElement>,
    pub where_elements: Vec<WhereElement>,
    pub group_by: Vec<Expr>,
    pub having: Vec<WhereElement>,
    pub order_by: Vec<Expr>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub set_operations: Vec<(SetOperator, QueryElement)>,
    /// `UPDATE … SET` assignments
    pub assignments: Vec<(Arc<Attribute>, Expr)>,
    /// `INSERT` columns and rows
    pub columns: Vec<Arc<Attribute>>,
    pub rows: Vec<Vec<Expr>>,
    pub insert_query: Option<Box<QueryElement>>,
    /// Conflict target for upserts
    pub conflict_keys: Vec<Arc<Attribute>>,
    pub returning: Vec<Expr>,
}

impl QueryElement {
    pub fn new(kind: QueryKind) -> Self {
        Self {
            kind,
            selection: Vec::new(),
            distinct: false,
            from: Vec::new(),
            joins: Vec::new(),
            where_elements: Vec::new(),
            group_by: Vec::new(),
            having: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
            set_operations: Vec::new(),
            assignments: Vec::new(),
            columns: Vec::new(),
            rows: Vec::new(),
            insert_query: None,
            conflict_keys: Vec::new(),
            returning: Vec::new(),
        }
    }

    pub fn select(selection: Vec<Expr>) -> Self {
        let mut element = Self::new(QueryKind::Select);
        element.selection = selection;
        element
    }

    /// Statement targeting a single table (insert, update, delete)
    pub fn on_table(kind: QueryKind, table: &str) -> Self {
        let mut element = Self::new(kind);
        element.from.push(FromSource::Table(table.to_string()));
        element
    }

    /// Table targeted by an insert, update or delete
    pub fn target_table(&self) -> Option<&str> {
        self.from.iter().find_map(|f| match f {
            FromSource::Table(t) => Some(t.as_str()),
            FromSource::Query { .. } => None,
        })
    }

    pub(crate) fn push_condition(
        &mut self,
        clause: Clause,
        conjunction: Option<Conjunction>,
        condition: Condition,
    ) {
        let list = match clause {
            Clause::Where => &mut self.where_elements,
            Clause::Having => &mut self.having,
            Clause::Join => match self.joins.last_mut() {
                Some(join) => &mut join.on,
                None => &mut self.where_elements,
            },
        };
        // The first condition of a clause never carries a conjunction
        let conjunction = if list.is_empty() { None } else { conjunction };
        list.push(WhereElement {
            conjunction,
            condition,
        });
    }

    pub(crate) fn push_join(&mut self, kind: JoinKind, table: &str) {
        self.joins.push(JoinElement {
            kind,
            table: table.to_string(),
            on: Vec::new(),
        });
    }
}
