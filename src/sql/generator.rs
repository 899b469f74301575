//! Translates a [`QueryElement`] into parameterized SQL.
//!
//! Columns are qualified with their table only when the statement reads from more
//! than one table, or when the attribute belongs to a table outside the current
//! statement (a correlated reference from inside a subquery). When no `FROM` is
//! given, the tables of the selected attributes are used, minus those already
//! joined.
//!
//! Conditions added with `filter`/`and`/`or` are emitted in call order; a composed
//! [`Condition`] is wrapped in parentheses wherever it is not the whole clause, so
//! `a.and(b).or(c)` keeps its grouping next to other conditions.

use std::sync::Arc;

use super::builder::{BoundStatement, BuilderOptions, QueryBuilder};
use super::platform::Platform;
use crate::error::{QuarryError, Result};
use crate::meta::Attribute;
use crate::query::{
    Condition, Expr, FromSource, JoinKind, NullOrder, Operand, Operator, Order, QueryElement,
    QueryKind, SetOperator,
};
use crate::query::element::WhereElement;
use crate::value::Value;

/// Renders statements for one platform with one set of naming options
#[derive(Debug, Clone, Copy)]
pub struct StatementGenerator<'a> {
    platform: &'a dyn Platform,
    options: &'a BuilderOptions,
}

impl<'a> StatementGenerator<'a> {
    pub fn new(platform: &'a dyn Platform, options: &'a BuilderOptions) -> Self {
        Self { platform, options }
    }

    /// # Errors
    ///
    /// [`QuarryError::UnsupportedOperation`] when the element cannot be expressed
    /// (an update without assignments, a write without a target table, an upsert on
    /// a platform without `ON CONFLICT`).
    pub fn generate(&self, element: &QueryElement) -> Result<BoundStatement> {
        let mut writer = Writer {
            b: QueryBuilder::new(self.platform, self.options),
            scopes: Vec::new(),
        };
        match element.kind {
            QueryKind::Select => writer.select(element)?,
            QueryKind::Insert | QueryKind::Upsert => writer.insert(element)?,
            QueryKind::Update => writer.update(element)?,
            QueryKind::Delete => writer.delete(element)?,
        }
        let statement = writer.b.build();
        log::trace!("generated: {}", statement.sql);
        Ok(statement)
    }
}

/// Where an expression is being rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    /// Select list: aliases render as `expr AS alias`
    Projection,
    /// `GROUP BY`/`ORDER BY`: aliases render as the alias name
    Reference,
    /// Anywhere else: aliases render as their expression
    Value,
}

struct Scope {
    tables: Vec<String>,
    qualify: bool,
}

struct Writer<'a> {
    b: QueryBuilder<'a>,
    scopes: Vec<Scope>,
}

impl<'a> Writer<'a> {
    fn select(&mut self, element: &QueryElement) -> Result<()> {
        self.select_core(element)?;
        for (operator, other) in &element.set_operations {
            self.b.keyword(match operator {
                SetOperator::Union => "UNION",
                SetOperator::UnionAll => "UNION ALL",
                SetOperator::Intersect => "INTERSECT",
                SetOperator::Except => "EXCEPT",
            });
            self.b.push(" ");
            self.select_core(other)?;
        }
        if !element.order_by.is_empty() {
            // Ordering of a compound select refers to its result columns
            let scope = self.open_scope(element);
            self.scopes.push(scope);
            self.b.keyword("ORDER BY ");
            self.expr_list(&element.order_by, Position::Reference)?;
            self.scopes.pop();
        }
        self.limit_offset(element.limit, element.offset);
        Ok(())
    }

    fn select_core(&mut self, element: &QueryElement) -> Result<()> {
        let scope = self.open_scope(element);
        let from = from_tables(element);
        self.scopes.push(scope);

        self.b.keyword("SELECT");
        if element.distinct {
            self.b.keyword("DISTINCT");
        }
        self.b.push(" ");
        if element.selection.is_empty() {
            self.b.push("*");
        } else {
            self.expr_list(&element.selection, Position::Projection)?;
        }

        if !from.is_empty() || !element.from.is_empty() {
            self.b.keyword("FROM ");
            if element.from.is_empty() {
                self.b
                    .comma_separated(from.iter(), |b, table| {
                        b.table(table);
                    });
            } else {
                for (i, source) in element.from.iter().enumerate() {
                    if i > 0 {
                        self.b.push(", ");
                    }
                    match source {
                        FromSource::Table(table) => {
                            self.b.table(table);
                        }
                        FromSource::Query { query, alias } => {
                            self.b.push("(");
                            self.select(query)?;
                            self.b.push(") ");
                            self.b.identifier(alias);
                        }
                    }
                }
            }
        }

        for join in &element.joins {
            self.b.keyword(match join.kind {
                JoinKind::Inner => "INNER JOIN ",
                JoinKind::Left => "LEFT JOIN ",
                JoinKind::Right => "RIGHT JOIN ",
            });
            self.b.table(&join.table);
            if !join.on.is_empty() {
                self.b.keyword("ON ");
                self.where_list(&join.on)?;
            }
        }

        if !element.where_elements.is_empty() {
            self.b.keyword("WHERE ");
            self.where_list(&element.where_elements)?;
        }
        if !element.group_by.is_empty() {
            self.b.keyword("GROUP BY ");
            self.expr_list(&element.group_by, Position::Reference)?;
            if !element.having.is_empty() {
                self.b.keyword("HAVING ");
                self.where_list(&element.having)?;
            }
        }

        self.scopes.pop();
        Ok(())
    }

    fn limit_offset(&mut self, limit: Option<u64>, offset: Option<u64>) {
        match (limit, offset) {
            (Some(limit), offset) => {
                self.b.keyword(&format!("LIMIT {limit}"));
                if let Some(offset) = offset {
                    self.b.keyword(&format!("OFFSET {offset}"));
                }
            }
            (None, Some(offset)) => {
                if self.b.platform().offset_requires_limit() {
                    self.b.keyword("LIMIT -1");
                }
                self.b.keyword(&format!("OFFSET {offset}"));
            }
            (None, None) => {}
        }
    }

    fn insert(&mut self, element: &QueryElement) -> Result<()> {
        let table = target_table(element)?;
        self.scopes.push(Scope {
            tables: vec![table.to_string()],
            qualify: false,
        });

        self.b.keyword("INSERT INTO ");
        self.b.table(table);

        let has_values = element.rows.iter().any(|row| !row.is_empty());
        if element.columns.is_empty() && !has_values && element.insert_query.is_none() {
            self.b.keyword("DEFAULT VALUES");
        } else {
            self.b.push(" (");
            self.b.comma_separated(element.columns.iter(), |b, a| {
                b.column(a.name());
            });
            self.b.push(")");
            match &element.insert_query {
                Some(query) => {
                    self.b.push(" ");
                    self.select(query)?;
                }
                None => {
                    self.b.keyword("VALUES ");
                    for (i, row) in element.rows.iter().enumerate() {
                        if i > 0 {
                            self.b.push(", ");
                        }
                        self.b.push("(");
                        self.expr_list(row, Position::Value)?;
                        self.b.push(")");
                    }
                }
            }
        }

        if element.kind == QueryKind::Upsert {
            self.on_conflict(element)?;
        }
        if !element.returning.is_empty() {
            self.b.keyword("RETURNING ");
            self.expr_list(&element.returning, Position::Value)?;
        }
        self.scopes.pop();
        Ok(())
    }

    fn on_conflict(&mut self, element: &QueryElement) -> Result<()> {
        if !self.b.platform().supports_upsert() {
            return Err(QuarryError::UnsupportedOperation(format!(
                "{} does not support upsert",
                self.b.platform().name()
            )));
        }
        if element.conflict_keys.is_empty() {
            return Err(QuarryError::UnsupportedOperation(
                "upsert requires at least one conflict key".to_string(),
            ));
        }
        self.b.keyword("ON CONFLICT (");
        self.b.comma_separated(element.conflict_keys.iter(), |b, a| {
            b.column(a.name());
        });
        self.b.push(")");
        let updated: Vec<&Arc<Attribute>> = element
            .columns
            .iter()
            .filter(|c| !element.conflict_keys.contains(c))
            .collect();
        if updated.is_empty() {
            self.b.keyword("DO NOTHING");
        } else {
            self.b.keyword("DO UPDATE SET ");
            self.b.comma_separated(updated, |b, a| {
                b.column(a.name()).push(" = excluded.").column(a.name());
            });
        }
        Ok(())
    }

    fn update(&mut self, element: &QueryElement) -> Result<()> {
        let table = target_table(element)?;
        if element.assignments.is_empty() {
            return Err(QuarryError::UnsupportedOperation(format!(
                "update of {table} has no assignments"
            )));
        }
        self.scopes.push(Scope {
            tables: vec![table.to_string()],
            qualify: false,
        });
        self.b.keyword("UPDATE ");
        self.b.table(table);
        self.b.keyword("SET ");
        for (i, (attribute, value)) in element.assignments.iter().enumerate() {
            if i > 0 {
                self.b.push(", ");
            }
            self.b.column(attribute.name()).push(" = ");
            self.expr(value, Position::Value)?;
        }
        if !element.where_elements.is_empty() {
            self.b.keyword("WHERE ");
            self.where_list(&element.where_elements)?;
        }
        self.scopes.pop();
        Ok(())
    }

    fn delete(&mut self, element: &QueryElement) -> Result<()> {
        let table = target_table(element)?;
        self.scopes.push(Scope {
            tables: vec![table.to_string()],
            qualify: false,
        });
        self.b.keyword("DELETE FROM ");
        self.b.table(table);
        if !element.where_elements.is_empty() {
            self.b.keyword("WHERE ");
            self.where_list(&element.where_elements)?;
        }
        self.scopes.pop();
        Ok(())
    }

    fn open_scope(&self, element: &QueryElement) -> Scope {
        let mut tables = from_tables(element);
        for source in &element.from {
            if let FromSource::Table(t) = source {
                if !tables.contains(t) {
                    tables.push(t.clone());
                }
            }
        }
        let sources = if element.from.is_empty() {
            tables.len()
        } else {
            element.from.len()
        };
        let qualify = !element.joins.is_empty() || sources > 1;
        tables.extend(element.joins.iter().map(|j| j.table.clone()));
        Scope { tables, qualify }
    }

    fn where_list(&mut self, elements: &[WhereElement]) -> Result<()> {
        let several = elements.len() > 1;
        for element in elements {
            if let Some(conjunction) = element.conjunction {
                self.b.keyword(conjunction.as_sql());
                self.b.push(" ");
            }
            self.condition(&element.condition, several)?;
        }
        Ok(())
    }

    fn condition(&mut self, condition: &Condition, nested: bool) -> Result<()> {
        match condition {
            Condition::Compare {
                left,
                operator,
                right,
            } => self.compare(left, *operator, right),
            Condition::Logical {
                left,
                conjunction,
                right,
            } => {
                if nested {
                    self.b.push("(");
                }
                self.condition(left, true)?;
                self.b.keyword(conjunction.as_sql());
                self.b.push(" ");
                self.condition(right, true)?;
                if nested {
                    self.b.push(")");
                }
                Ok(())
            }
            Condition::Exists { negated, query } => {
                self.b.push(if *negated { "NOT EXISTS (" } else { "EXISTS (" });
                self.select(query)?;
                self.b.push(")");
                Ok(())
            }
            Condition::Not(inner) => {
                self.b.push("NOT (");
                self.condition(inner, false)?;
                self.b.push(")");
                Ok(())
            }
        }
    }

    fn compare(&mut self, left: &Expr, operator: Operator, right: &Operand) -> Result<()> {
        match (operator, right) {
            (Operator::In, Operand::Values(values)) if values.is_empty() => {
                self.b.push("1 = 0");
                return Ok(());
            }
            (Operator::NotIn, Operand::Values(values)) if values.is_empty() => {
                self.b.push("1 = 1");
                return Ok(());
            }
            _ => {}
        }

        self.expr(left, Position::Value)?;
        let symbol = match (operator, right) {
            (Operator::Equal, Operand::Value(Value::Null)) | (Operator::IsNull, _) => {
                self.b.keyword("IS NULL");
                return Ok(());
            }
            (Operator::NotEqual, Operand::Value(Value::Null)) | (Operator::NotNull, _) => {
                self.b.keyword("IS NOT NULL");
                return Ok(());
            }
            (Operator::Equal, _) => "=",
            (Operator::NotEqual, _) => "!=",
            (Operator::LessThan, _) => "<",
            (Operator::GreaterThan, _) => ">",
            (Operator::LessThanOrEqual, _) => "<=",
            (Operator::GreaterThanOrEqual, _) => ">=",
            (Operator::In, _) => "IN",
            (Operator::NotIn, _) => "NOT IN",
            (Operator::Like, _) => "LIKE",
            (Operator::NotLike, _) => "NOT LIKE",
            (Operator::Between, _) => "BETWEEN",
        };
        self.b.keyword(symbol);
        self.b.push(" ");
        self.operand(right)
    }

    fn operand(&mut self, operand: &Operand) -> Result<()> {
        match operand {
            Operand::None => {}
            Operand::Value(v) => {
                self.b.bind(v.clone());
            }
            Operand::Values(values) => {
                self.b.push("(");
                self.b.comma_separated(values.iter(), |b, v| {
                    b.bind(v.clone());
                });
                self.b.push(")");
            }
            Operand::Range(start, end) => {
                self.b.bind(start.clone());
                self.b.keyword("AND ");
                self.b.bind(end.clone());
            }
            Operand::Expr(e) => self.expr(e, Position::Value)?,
            Operand::Query(query) => {
                self.b.push("(");
                self.select(query)?;
                self.b.push(")");
            }
        }
        Ok(())
    }

    fn expr_list(&mut self, exprs: &[Expr], position: Position) -> Result<()> {
        for (i, e) in exprs.iter().enumerate() {
            if i > 0 {
                self.b.push(", ");
            }
            self.expr(e, position)?;
        }
        Ok(())
    }

    fn expr(&mut self, expr: &Expr, position: Position) -> Result<()> {
        match expr {
            Expr::Attribute(attribute) => self.attribute(attribute),
            Expr::Function { name, args } => {
                self.b.push(name).push("(");
                self.expr_list(args, Position::Value)?;
                self.b.push(")");
            }
            Expr::Literal(v) => {
                self.b.bind(v.clone());
            }
            Expr::Aliased { expr, alias } => match position {
                Position::Projection => {
                    self.expr(expr, Position::Value)?;
                    self.b.keyword("AS ");
                    self.b.identifier(alias);
                }
                Position::Reference => {
                    self.b.identifier(alias);
                }
                Position::Value => self.expr(expr, Position::Value)?,
            },
            Expr::Named(name) => {
                self.b.identifier(name);
            }
            Expr::Ordered { expr, order, nulls } => {
                self.expr(expr, position)?;
                self.b.keyword(match order {
                    Order::Asc => "ASC",
                    Order::Desc => "DESC",
                });
                match nulls {
                    Some(NullOrder::First) => {
                        self.b.keyword("NULLS FIRST");
                    }
                    Some(NullOrder::Last) => {
                        self.b.keyword("NULLS LAST");
                    }
                    None => {}
                }
            }
            Expr::Query(query) => {
                self.b.push("(");
                self.select(query)?;
                self.b.push(")");
            }
            Expr::Keyword(keyword) => {
                self.b.push(keyword);
            }
            Expr::Star => {
                self.b.push("*");
            }
        }
        Ok(())
    }

    fn attribute(&mut self, attribute: &Attribute) {
        let table = attribute.declaring_type();
        let qualify = match self.scopes.last() {
            Some(scope) => scope.qualify || !scope.tables.iter().any(|t| t == table),
            None => false,
        };
        if qualify {
            self.b.qualified(table, attribute.name());
        } else {
            self.b.column(attribute.name());
        }
    }
}

/// Tables inferred from the selected attributes when no `FROM` was given
fn from_tables(element: &QueryElement) -> Vec<String> {
    if !element.from.is_empty() {
        return Vec::new();
    }
    let mut attributes = Vec::new();
    for e in &element.selection {
        e.attributes(&mut attributes);
    }
    let mut tables: Vec<String> = Vec::new();
    for attribute in attributes {
        let table = attribute.declaring_type();
        let joined = element.joins.iter().any(|j| j.table == table);
        if !joined && !tables.iter().any(|t| t == table) {
            tables.push(table.to_string());
        }
    }
    tables
}

fn target_table(element: &QueryElement) -> Result<&str> {
    element.target_table().ok_or_else(|| {
        QuarryError::UnsupportedOperation(format!("{:?} statement has no target table", element.kind))
    })
}
