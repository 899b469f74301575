//! Conditions: comparisons and their `AND`/`OR` trees.

use std::marker::PhantomData;

use super::element::QueryElement;
use super::expression::Expr;
use super::stage::Query;
use crate::value::Value;

/// Comparison operator of a [`Condition::Compare`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Equal,
    NotEqual,
    LessThan,
    GreaterThan,
    LessThanOrEqual,
    GreaterThanOrEqual,
    In,
    NotIn,
    IsNull,
    NotNull,
    Like,
    NotLike,
    Between,
}

/// `AND` / `OR`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Conjunction {
    And,
    Or,
}

impl Conjunction {
    pub(crate) fn as_sql(&self) -> &'static str {
        match self {
            Conjunction::And => "AND",
            Conjunction::Or => "OR",
        }
    }
}

/// Right-hand side of a comparison
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operand {
    /// Unary operators (`IS NULL`)
    None,
    Value(Value),
    Values(Vec<Value>),
    /// Inclusive `BETWEEN` bounds
    Range(Value, Value),
    Expr(Expr),
    Query(Box<QueryElement>),
}

/// A boolean condition
///
/// Conditions are immutable values: [`and`](Self::and) and [`or`](Self::or) consume
/// both sides and return a new node, so a composed condition keeps its grouping
/// wherever it is placed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Condition {
    Compare {
        left: Expr,
        operator: Operator,
        right: Operand,
    },
    Logical {
        left: Box<Condition>,
        conjunction: Conjunction,
        right: Box<Condition>,
    },
    Exists {
        negated: bool,
        query: Box<QueryElement>,
    },
    Not(Box<Condition>),
}

impl Condition {
    pub(crate) fn compare(left: Expr, operator: Operator, right: Operand) -> Self {
        Condition::Compare {
            left,
            operator,
            right,
        }
    }

    pub fn and(self, other: Condition) -> Condition {
        Condition::Logical {
            left: Box::new(self),
            conjunction: Conjunction::And,
            right: Box::new(other),
        }
    }

    pub fn or(self, other: Condition) -> Condition {
        Condition::Logical {
            left: Box::new(self),
            conjunction: Conjunction::Or,
            right: Box::new(other),
        }
    }

    pub fn not(self) -> Condition {
        Condition::Not(Box::new(self))
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, Condition::Logical { .. })
    }
}

/// `EXISTS (subquery)`
pub fn exists<R, S>(query: Query<R, S>) -> Condition {
    Condition::Exists {
        negated: false,
        query: Box::new(query.into_element()),
    }
}

/// `NOT EXISTS (subquery)`
pub fn not_exists<R, S>(query: Query<R, S>) -> Condition {
    Condition::Exists {
        negated: true,
        query: Box::new(query.into_element()),
    }
}

/// Operand of `IN`/`NOT IN`: a list of values or a subquery
///
/// Which SQL form is emitted is decided by what was converted in, not by a
/// separate builder call.
pub struct InOperand<V> {
    operand: Operand,
    _marker: PhantomData<fn() -> V>,
}

impl<V> InOperand<V> {
    fn new(operand: Operand) -> Self {
        Self {
            operand,
            _marker: PhantomData,
        }
    }

    pub(crate) fn into_operand(self) -> Operand {
        self.operand
    }
}

impl<V: Into<Value>, T: Into<V>> From<Vec<T>> for InOperand<V> {
    fn from(values: Vec<T>) -> Self {
        InOperand::new(Operand::Values(
            values
                .into_iter()
                .map(|v| {
                    let v: V = v.into();
                    v.into()
                })
                .collect(),
        ))
    }
}

impl<V: Into<Value>, T: Into<V>, const N: usize> From<[T; N]> for InOperand<V> {
    fn from(values: [T; N]) -> Self {
        InOperand::new(Operand::Values(
            values
                .into_iter()
                .map(|v| {
                    let v: V = v.into();
                    v.into()
                })
                .collect(),
        ))
    }
}

impl<V, R, S> From<Query<R, S>> for InOperand<V> {
    fn from(query: Query<R, S>) -> Self {
        InOperand::new(Operand::Query(Box::new(query.into_element())))
    }
}
