//! Expressions: attributes, functions, literals, aliases and orderings.
//!
//! [`Expr`] is the untyped node stored in the query element tree. [`Field`] and
//! [`Expression`] wrap it with the Rust value type the expression produces so
//! comparisons only accept compatible operands. Composition always builds new
//! nodes; nothing here is mutated after construction.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use super::condition::{Condition, InOperand, Operand, Operator};
use super::element::QueryElement;
use crate::meta::Attribute;
use crate::value::{Numeric, Textual, Value};

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Order {
    Asc,
    Desc,
}

/// Placement of nulls in an ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NullOrder {
    First,
    Last,
}

/// Untyped expression node
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expr {
    Attribute(Arc<Attribute>),
    Function { name: String, args: Vec<Expr> },
    Literal(Value),
    Aliased { expr: Box<Expr>, alias: String },
    /// Reference to an alias or a column of a derived table
    Named(String),
    Ordered {
        expr: Box<Expr>,
        order: Order,
        nulls: Option<NullOrder>,
    },
    /// Scalar subquery
    Query(Box<QueryElement>),
    /// SQL keyword emitted verbatim (`CURRENT_TIMESTAMP`)
    Keyword(&'static str),
    /// `*`
    Star,
}

impl Expr {
    /// Attributes referenced anywhere in this expression, in order of appearance
    pub(crate) fn attributes<'a>(&'a self, out: &mut Vec<&'a Arc<Attribute>>) {
        match self {
            Expr::Attribute(a) => out.push(a),
            Expr::Function { args, .. } => args.iter().for_each(|arg| arg.attributes(out)),
            Expr::Aliased { expr, .. } | Expr::Ordered { expr, .. } => expr.attributes(out),
            _ => {}
        }
    }

    pub(crate) fn function(name: &str, args: Vec<Expr>) -> Self {
        Expr::Function {
            name: name.to_string(),
            args,
        }
    }
}

/// Anything that renders as an expression
///
/// Object safe so heterogeneous projections can be passed as `&[&dyn AsExpr]`.
pub trait AsExpr {
    fn as_expr(&self) -> Expr;
}

impl AsExpr for Expr {
    fn as_expr(&self) -> Expr {
        self.clone()
    }
}

impl<T: AsExpr + ?Sized> AsExpr for &T {
    fn as_expr(&self) -> Expr {
        (**self).as_expr()
    }
}

/// Typed handle on an attribute of entity `E` holding values of type `V`
///
/// Obtained from [`EntityModel::field`](crate::meta::EntityModel::field).
pub struct Field<E, V> {
    attribute: Arc<Attribute>,
    _marker: PhantomData<fn() -> (E, V)>,
}

impl<E, V> Field<E, V> {
    pub(crate) fn new(attribute: Arc<Attribute>) -> Self {
        Self {
            attribute,
            _marker: PhantomData,
        }
    }

    pub fn attribute(&self) -> &Arc<Attribute> {
        &self.attribute
    }

    pub fn name(&self) -> &str {
        self.attribute.name()
    }
}

impl<E, V> Clone for Field<E, V> {
    fn clone(&self) -> Self {
        Self::new(Arc::clone(&self.attribute))
    }
}

impl<E, V> fmt::Debug for Field<E, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Field({:?})", self.attribute)
    }
}

impl<E, V> AsExpr for Field<E, V> {
    fn as_expr(&self) -> Expr {
        Expr::Attribute(Arc::clone(&self.attribute))
    }
}

/// Object-safe access to the attribute behind a [`Field`]
pub trait AttributeRef {
    fn attribute_ref(&self) -> &Arc<Attribute>;
}

impl<E, V> AttributeRef for Field<E, V> {
    fn attribute_ref(&self) -> &Arc<Attribute> {
        &self.attribute
    }
}

/// Typed expression producing values of type `V`
pub struct Expression<V> {
    expr: Expr,
    _marker: PhantomData<fn() -> V>,
}

impl<V> Expression<V> {
    pub fn new(expr: Expr) -> Self {
        Self {
            expr,
            _marker: PhantomData,
        }
    }

    pub fn into_expr(self) -> Expr {
        self.expr
    }
}

impl<V> Clone for Expression<V> {
    fn clone(&self) -> Self {
        Self::new(self.expr.clone())
    }
}

impl<V> fmt::Debug for Expression<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Expression({:?})", self.expr)
    }
}

impl<V> AsExpr for Expression<V> {
    fn as_expr(&self) -> Expr {
        self.expr.clone()
    }
}

/// An expression with a sort direction, for `order_by`
#[derive(Debug, Clone)]
pub struct OrderingExpression {
    expr: Expr,
    order: Order,
    nulls: Option<NullOrder>,
}

impl OrderingExpression {
    pub fn nulls_first(mut self) -> Self {
        self.nulls = Some(NullOrder::First);
        self
    }

    pub fn nulls_last(mut self) -> Self {
        self.nulls = Some(NullOrder::Last);
        self
    }

    pub fn order(&self) -> Order {
        self.order
    }
}

impl AsExpr for OrderingExpression {
    fn as_expr(&self) -> Expr {
        Expr::Ordered {
            expr: Box::new(self.expr.clone()),
            order: self.order,
            nulls: self.nulls,
        }
    }
}

/// Comparison builders shared by every typed expression
///
/// Each builder returns a [`Condition`]; combine them with
/// [`Condition::and`]/[`Condition::or`].
pub trait Conditional<V>: AsExpr + Sized {
    fn eq(&self, value: impl Into<V>) -> Condition
    where
        V: Into<Value>,
    {
        Condition::compare(self.as_expr(), Operator::Equal, value_operand(value))
    }

    fn ne(&self, value: impl Into<V>) -> Condition
    where
        V: Into<Value>,
    {
        Condition::compare(self.as_expr(), Operator::NotEqual, value_operand(value))
    }

    fn lt(&self, value: impl Into<V>) -> Condition
    where
        V: Into<Value>,
    {
        Condition::compare(self.as_expr(), Operator::LessThan, value_operand(value))
    }

    fn gt(&self, value: impl Into<V>) -> Condition
    where
        V: Into<Value>,
    {
        Condition::compare(self.as_expr(), Operator::GreaterThan, value_operand(value))
    }

    fn lte(&self, value: impl Into<V>) -> Condition
    where
        V: Into<Value>,
    {
        Condition::compare(self.as_expr(), Operator::LessThanOrEqual, value_operand(value))
    }

    fn gte(&self, value: impl Into<V>) -> Condition
    where
        V: Into<Value>,
    {
        Condition::compare(self.as_expr(), Operator::GreaterThanOrEqual, value_operand(value))
    }

    /// `IN` over a list of values or a subquery
    fn in_(&self, values: impl Into<InOperand<V>>) -> Condition {
        Condition::compare(self.as_expr(), Operator::In, values.into().into_operand())
    }

    fn not_in(&self, values: impl Into<InOperand<V>>) -> Condition {
        Condition::compare(self.as_expr(), Operator::NotIn, values.into().into_operand())
    }

    fn is_null(&self) -> Condition {
        Condition::compare(self.as_expr(), Operator::IsNull, Operand::None)
    }

    fn not_null(&self) -> Condition {
        Condition::compare(self.as_expr(), Operator::NotNull, Operand::None)
    }

    fn like(&self, pattern: &str) -> Condition {
        Condition::compare(
            self.as_expr(),
            Operator::Like,
            Operand::Value(Value::Text(pattern.to_string())),
        )
    }

    fn not_like(&self, pattern: &str) -> Condition {
        Condition::compare(
            self.as_expr(),
            Operator::NotLike,
            Operand::Value(Value::Text(pattern.to_string())),
        )
    }

    /// Inclusive on both bounds
    fn between(&self, start: impl Into<V>, end: impl Into<V>) -> Condition
    where
        V: Into<Value>,
    {
        let start: V = start.into();
        let end: V = end.into();
        Condition::compare(
            self.as_expr(),
            Operator::Between,
            Operand::Range(start.into(), end.into()),
        )
    }

    fn eq_expr(&self, other: &dyn AsExpr) -> Condition {
        Condition::compare(self.as_expr(), Operator::Equal, Operand::Expr(other.as_expr()))
    }

    fn ne_expr(&self, other: &dyn AsExpr) -> Condition {
        Condition::compare(self.as_expr(), Operator::NotEqual, Operand::Expr(other.as_expr()))
    }

    fn lt_expr(&self, other: &dyn AsExpr) -> Condition {
        Condition::compare(self.as_expr(), Operator::LessThan, Operand::Expr(other.as_expr()))
    }

    fn gt_expr(&self, other: &dyn AsExpr) -> Condition {
        Condition::compare(self.as_expr(), Operator::GreaterThan, Operand::Expr(other.as_expr()))
    }

    fn lte_expr(&self, other: &dyn AsExpr) -> Condition {
        Condition::compare(
            self.as_expr(),
            Operator::LessThanOrEqual,
            Operand::Expr(other.as_expr()),
        )
    }

    fn gte_expr(&self, other: &dyn AsExpr) -> Condition {
        Condition::compare(
            self.as_expr(),
            Operator::GreaterThanOrEqual,
            Operand::Expr(other.as_expr()),
        )
    }

    fn asc(&self) -> OrderingExpression {
        OrderingExpression {
            expr: self.as_expr(),
            order: Order::Asc,
            nulls: None,
        }
    }

    fn desc(&self) -> OrderingExpression {
        OrderingExpression {
            expr: self.as_expr(),
            order: Order::Desc,
            nulls: None,
        }
    }

    fn as_(&self, alias: &str) -> Expression<V> {
        Expression::new(Expr::Aliased {
            expr: Box::new(self.as_expr()),
            alias: alias.to_string(),
        })
    }

    fn max(&self) -> Expression<V> {
        Expression::new(Expr::function("max", vec![self.as_expr()]))
    }

    fn min(&self) -> Expression<V> {
        Expression::new(Expr::function("min", vec![self.as_expr()]))
    }

    fn count(&self) -> Expression<i64> {
        count(self)
    }
}

fn value_operand<V: Into<Value>>(value: impl Into<V>) -> Operand {
    let value: V = value.into();
    Operand::Value(value.into())
}

impl<E, V> Conditional<V> for Field<E, V> {}

impl<V> Conditional<V> for Expression<V> {}

/// Numeric functions, available on expressions whose value type is [`Numeric`]
pub trait NumericExpression<V: Numeric>: Conditional<V> {
    fn abs(&self) -> Expression<V> {
        Expression::new(Expr::function("abs", vec![self.as_expr()]))
    }

    fn sum(&self) -> Expression<V> {
        Expression::new(Expr::function("sum", vec![self.as_expr()]))
    }

    fn avg(&self) -> Expression<f64> {
        Expression::new(Expr::function("avg", vec![self.as_expr()]))
    }

    fn round(&self, decimals: i32) -> Expression<V> {
        Expression::new(Expr::function(
            "round",
            vec![self.as_expr(), Expr::Literal(Value::from(decimals))],
        ))
    }
}

impl<V: Numeric, T: Conditional<V>> NumericExpression<V> for T {}

/// String functions, available on expressions whose value type is [`Textual`]
pub trait TextExpression<V: Textual>: Conditional<V> {
    fn upper(&self) -> Expression<V> {
        Expression::new(Expr::function("upper", vec![self.as_expr()]))
    }

    fn lower(&self) -> Expression<V> {
        Expression::new(Expr::function("lower", vec![self.as_expr()]))
    }

    fn trim(&self) -> Expression<V> {
        Expression::new(Expr::function("trim", vec![self.as_expr()]))
    }

    /// One-based `offset`, as in SQL
    fn substr(&self, offset: i32, length: i32) -> Expression<V> {
        Expression::new(Expr::function(
            "substr",
            vec![
                self.as_expr(),
                Expr::Literal(Value::from(offset)),
                Expr::Literal(Value::from(length)),
            ],
        ))
    }

    fn length(&self) -> Expression<i64> {
        Expression::new(Expr::function("length", vec![self.as_expr()]))
    }
}

impl<V: Textual, T: Conditional<V>> TextExpression<V> for T {}

/// `count(expr)`
pub fn count(expr: &dyn AsExpr) -> Expression<i64> {
    Expression::new(Expr::function("count", vec![expr.as_expr()]))
}

/// `count(*)`
pub fn count_all() -> Expression<i64> {
    Expression::new(Expr::function("count", vec![Expr::Star]))
}

/// `coalesce(a, b, ...)`
pub fn coalesce<V>(exprs: &[&dyn AsExpr]) -> Expression<V> {
    Expression::new(Expr::function(
        "coalesce",
        exprs.iter().map(|e| e.as_expr()).collect(),
    ))
}

/// Any SQL function by name
pub fn function<V>(name: &str, args: &[&dyn AsExpr]) -> Expression<V> {
    Expression::new(Expr::function(name, args.iter().map(|e| e.as_expr()).collect()))
}

/// `CURRENT_TIMESTAMP`
pub fn now<V>() -> Expression<V> {
    Expression::new(Expr::Keyword("CURRENT_TIMESTAMP"))
}

/// Literal value as an expression, bound as a parameter
pub fn value<V: Into<Value>>(v: V) -> Expression<V> {
    Expression::new(Expr::Literal(v.into()))
}

/// Reference to an alias or derived-table column by name
pub fn named<V>(name: &str) -> Expression<V> {
    Expression::new(Expr::Named(name.to_string()))
}
