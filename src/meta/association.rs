//! Association resolution: how two types are joined for one association attribute.

use std::sync::Arc;

use super::attribute::{Attribute, Cardinality};
use super::entity_type::Type;
use super::model::EntityModel;
use crate::error::{QuarryError, Result};

/// The columns an association is navigated through
#[derive(Debug, Clone)]
pub enum Link {
    /// The source row holds the foreign key: `source.fk -> target.column`
    Owning {
        source_fk: Arc<Attribute>,
        target_column: Arc<Attribute>,
    },
    /// The target rows hold the foreign key: `target.fk -> source.column`
    Inverse {
        source_column: Arc<Attribute>,
        target_fk: Arc<Attribute>,
    },
    /// Junction rows hold one foreign key to each side
    Junction {
        junction: Arc<Type>,
        source_column: Arc<Attribute>,
        source_fk: Arc<Attribute>,
        target_column: Arc<Attribute>,
        target_fk: Arc<Attribute>,
    },
}

/// A resolved association attribute
#[derive(Debug, Clone)]
pub struct Association {
    pub attribute: Arc<Attribute>,
    pub source: Arc<Type>,
    pub target: Arc<Type>,
    pub link: Link,
}

impl Association {
    pub fn cardinality(&self) -> Option<Cardinality> {
        self.attribute.cardinality()
    }

    /// Attribute of the source whose value identifies the associated rows
    pub fn source_value_attribute(&self) -> &Arc<Attribute> {
        match &self.link {
            Link::Owning { source_fk, .. } => source_fk,
            Link::Inverse { source_column, .. } | Link::Junction { source_column, .. } => {
                source_column
            }
        }
    }
}

impl EntityModel {
    /// Resolves association `property` of `source`.
    ///
    /// # Errors
    ///
    /// [`QuarryError::UnsupportedOperation`] when the attribute is not an
    /// association or its mapping does not match the model.
    pub fn association(&self, source: &Arc<Type>, property: &str) -> Result<Association> {
        let attribute = source.attribute(property).ok_or_else(|| {
            QuarryError::UnsupportedOperation(format!(
                "{} has no property '{property}'",
                source.name()
            ))
        })?;
        resolve(self, source, attribute)
    }

    /// Associations of `ty` that are not foreign keys of its own table
    pub(crate) fn dependents(&self, ty: &Arc<Type>) -> Result<Vec<Association>> {
        ty.attributes()
            .iter()
            .filter(|a| a.is_association() && !a.is_foreign_key())
            .map(|a| resolve(self, ty, a))
            .collect()
    }
}

fn unsupported(ty: &Type, attribute: &Attribute, reason: &str) -> QuarryError {
    QuarryError::UnsupportedOperation(format!(
        "association {}.{}: {reason}",
        ty.name(),
        attribute.property()
    ))
}

fn named<'m>(model: &'m EntityModel, ty: &Type, attribute: &Attribute, name: &str) -> Result<&'m Arc<Type>> {
    model
        .type_named(name)
        .ok_or_else(|| unsupported(ty, attribute, &format!("unknown type '{name}'")))
}

/// Foreign keys of `holder` that reference `referenced`
fn foreign_keys_to<'t>(holder: &'t Type, referenced: &Type) -> Vec<&'t Arc<Attribute>> {
    holder
        .attributes()
        .iter()
        .filter(|a| {
            a.foreign_key()
                .is_some_and(|fk| fk.referenced_type.eq_ignore_ascii_case(referenced.name()))
        })
        .collect()
}

/// Column of `referenced` that `fk` points at
fn referenced_column(referenced: &Type, fk: &Attribute) -> Option<Arc<Attribute>> {
    let column = &fk.foreign_key()?.referenced_column;
    referenced.attribute_by_column(column).cloned()
}

pub(crate) fn resolve(
    model: &EntityModel,
    source: &Arc<Type>,
    attribute: &Arc<Attribute>,
) -> Result<Association> {
    if !attribute.is_association() {
        return Err(unsupported(source, attribute, "not an association"));
    }

    if let Some(fk) = attribute.foreign_key() {
        let target = named(model, source, attribute, &fk.referenced_type)?;
        let target_column = referenced_column(target, attribute)
            .ok_or_else(|| unsupported(source, attribute, "referenced column is missing"))?;
        return Ok(Association {
            attribute: Arc::clone(attribute),
            source: Arc::clone(source),
            target: Arc::clone(target),
            link: Link::Owning {
                source_fk: Arc::clone(attribute),
                target_column,
            },
        });
    }

    let mapping = attribute
        .association_target()
        .ok_or_else(|| unsupported(source, attribute, "no target type declared"))?;
    let target = named(model, source, attribute, &mapping.target_type)?;

    let link = match (&mapping.junction, attribute.cardinality()) {
        (Some(junction), Some(Cardinality::ManyToMany)) => {
            let junction = named(model, source, attribute, junction)?;
            let to_source = foreign_keys_to(junction, source);
            let to_target = foreign_keys_to(junction, target);
            let source_fk = to_source
                .first()
                .copied()
                .ok_or_else(|| unsupported(source, attribute, "junction has no key to the source"))?;
            // a self-referencing junction uses its second key for the target side
            let target_fk = to_target
                .iter()
                .copied()
                .find(|a| *a != source_fk)
                .ok_or_else(|| unsupported(source, attribute, "junction has no key to the target"))?;
            Link::Junction {
                junction: Arc::clone(junction),
                source_column: referenced_column(source, source_fk)
                    .ok_or_else(|| unsupported(source, attribute, "junction key column is missing"))?,
                source_fk: Arc::clone(source_fk),
                target_column: referenced_column(target, target_fk)
                    .ok_or_else(|| unsupported(source, attribute, "junction key column is missing"))?,
                target_fk: Arc::clone(target_fk),
            }
        }
        (None, Some(Cardinality::OneToMany | Cardinality::OneToOne)) => {
            let target_fk = match &mapping.mapped_by {
                Some(property) => target
                    .attribute(property)
                    .filter(|a| {
                        a.foreign_key().is_some_and(|fk| {
                            fk.referenced_type.eq_ignore_ascii_case(source.name())
                        })
                    })
                    .ok_or_else(|| {
                        unsupported(
                            source,
                            attribute,
                            &format!("{}.{property} is not a foreign key to it", target.name()),
                        )
                    })?,
                None => match foreign_keys_to(target, source).as_slice() {
                    [only] => *only,
                    _ => {
                        return Err(unsupported(
                            source,
                            attribute,
                            "mapped_by is required when the target has no single key back",
                        ))
                    }
                },
            };
            Link::Inverse {
                source_column: referenced_column(source, target_fk)
                    .ok_or_else(|| unsupported(source, attribute, "referenced column is missing"))?,
                target_fk: Arc::clone(target_fk),
            }
        }
        _ => return Err(unsupported(source, attribute, "cardinality does not match its mapping")),
    };

    Ok(Association {
        attribute: Arc::clone(attribute),
        source: Arc::clone(source),
        target: Arc::clone(target),
        link,
    })
}
