//! Row readers: turn driver rows into entities or tuples.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::entity::{is_unassigned_key, Entity};
use crate::error::Result;
use crate::listener::EntityListener;
use crate::meta::{Association, Attribute, Link, Type};
use crate::query::element::Clause;
use crate::query::{Condition, Expr, FromSource, Operand, Operator, QueryElement};
use crate::result::Tuple;
use crate::value::Value;

/// Maps one row to a `T`
pub trait ResultReader<T>: Send + Sync {
    fn read(&self, columns: &Arc<Vec<String>>, row: Vec<Value>) -> Result<T>;
}

/// How result columns are matched to attributes
enum Mapping {
    /// Column `i` holds the attribute at position `i`, if any
    Positional(Vec<Option<Arc<Attribute>>>),
    /// Columns are matched to attributes by name (raw SQL)
    ByName,
}

/// Reads rows into entities of type `E`
pub struct EntityReader<E> {
    ty: Arc<Type>,
    mapping: Mapping,
    listeners: Vec<Arc<dyn EntityListener>>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> EntityReader<E> {
    /// Reader for a generated select: expressions of `selection` that are
    /// attributes of `ty` fill the entity, anything else is skipped.
    pub(crate) fn for_selection(
        ty: Arc<Type>,
        selection: &[Expr],
        listeners: Vec<Arc<dyn EntityListener>>,
    ) -> Self {
        let attributes = selection
            .iter()
            .map(|expr| match expr {
                Expr::Attribute(a) if a.declaring_type() == ty.name() => Some(Arc::clone(a)),
                _ => None,
            })
            .collect();
        Self {
            ty,
            mapping: Mapping::Positional(attributes),
            listeners,
            _entity: PhantomData,
        }
    }

    /// Reader for raw SQL, matching column labels to column names
    pub(crate) fn by_column_name(ty: Arc<Type>, listeners: Vec<Arc<dyn EntityListener>>) -> Self {
        Self {
            ty,
            mapping: Mapping::ByName,
            listeners,
            _entity: PhantomData,
        }
    }

    /// Copies a row into an existing entity
    pub(crate) fn fill(
        &self,
        entity: &mut E,
        columns: &Arc<Vec<String>>,
        row: Vec<Value>,
    ) -> Result<()> {
        match &self.mapping {
            Mapping::Positional(attributes) => {
                for (attribute, value) in attributes.iter().zip(row) {
                    if let Some(attribute) = attribute {
                        entity.set(attribute.property(), value)?;
                    }
                }
            }
            Mapping::ByName => {
                for (column, value) in columns.iter().zip(row) {
                    if let Some(attribute) = self.ty.attribute_by_column(column) {
                        entity.set(attribute.property(), value)?;
                    }
                }
            }
        }
        for listener in &self.listeners {
            listener.post_load(&self.ty, entity);
        }
        Ok(())
    }
}

impl<E: Entity> ResultReader<E> for EntityReader<E> {
    fn read(&self, columns: &Arc<Vec<String>>, row: Vec<Value>) -> Result<E> {
        let mut entity = E::create();
        self.fill(&mut entity, columns, row)?;
        Ok(entity)
    }
}

/// Condition on the target type that selects the rows associated with `source`
///
/// A source whose linking value is still unset (a null foreign key, or a key
/// not yet generated) has no associated rows.
pub(crate) fn association_condition(association: &Association, source: &dyn Entity) -> Condition {
    let value = source.get(association.source_value_attribute().property());
    let (column, operand) = match &association.link {
        Link::Owning { target_column, .. } => (target_column, Operand::Value(value.clone())),
        Link::Inverse { target_fk, .. } => (target_fk, Operand::Value(value.clone())),
        Link::Junction {
            junction,
            source_fk,
            target_column,
            target_fk,
            ..
        } => {
            let mut linked = QueryElement::select(vec![Expr::Attribute(Arc::clone(target_fk))]);
            linked
                .from
                .push(FromSource::Table(junction.name().to_string()));
            linked.push_condition(
                Clause::Where,
                None,
                Condition::compare(
                    Expr::Attribute(Arc::clone(source_fk)),
                    Operator::Equal,
                    Operand::Value(value.clone()),
                ),
            );
            (target_column, Operand::Query(Box::new(linked)))
        }
    };
    let column = Expr::Attribute(Arc::clone(column));
    if is_unassigned_key(&value) {
        return Condition::compare(column, Operator::In, Operand::Values(Vec::new()));
    }
    match operand {
        Operand::Query(_) => Condition::compare(column, Operator::In, operand),
        _ => Condition::compare(column, Operator::Equal, operand),
    }
}

/// Reads rows as [`Tuple`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct TupleReader;

impl ResultReader<Tuple> for TupleReader {
    fn read(&self, columns: &Arc<Vec<String>>, row: Vec<Value>) -> Result<Tuple> {
        Ok(Tuple::new(Arc::clone(columns), row))
    }
}
