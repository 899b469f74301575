//! The entity model: every type known to a store, indexed for lookup.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use super::attribute::Attribute;
use super::entity_type::Type;
use crate::entity::Entity;
use crate::error::{QuarryError, Result};
use crate::query::Field;

/// Immutable collection of [`Type`] definitions
///
/// Built once through [`EntityModelBuilder`] and shared read-only by every store
/// created from it. Lookups go through tables filled at build time; nothing is
/// registered lazily.
#[derive(Debug)]
pub struct EntityModel {
    name: String,
    types: Vec<Arc<Type>>,
    by_id: HashMap<TypeId, usize>,
    by_name: HashMap<String, usize>,
}

impl EntityModel {
    pub fn builder(name: &str) -> EntityModelBuilder {
        EntityModelBuilder {
            name: name.to_string(),
            types: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Types in registration order
    pub fn types(&self) -> &[Arc<Type>] {
        &self.types
    }

    pub fn contains<E: Entity>(&self) -> bool {
        self.by_id.contains_key(&TypeId::of::<E>())
    }

    /// Metadata for entity `E`
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::UnsupportedOperation`] when `E` is not part of the model.
    pub fn type_of<E: Entity>(&self) -> Result<&Arc<Type>> {
        self.by_id
            .get(&TypeId::of::<E>())
            .map(|&i| &self.types[i])
            .ok_or_else(|| {
                QuarryError::UnsupportedOperation(format!(
                    "{} is not registered in model '{}'",
                    std::any::type_name::<E>(),
                    self.name
                ))
            })
    }

    /// Metadata by table name, ignoring ASCII case
    pub fn type_named(&self, name: &str) -> Option<&Arc<Type>> {
        self.by_name
            .get(&name.to_ascii_lowercase())
            .map(|&i| &self.types[i])
    }

    /// Resolves a property of `E` to its attribute.
    ///
    /// The property matches case-insensitively; when nothing matches, a leading
    /// `get` or `is` accessor prefix is stripped and the lookup is retried, so
    /// `"getName"` and `"isActive"` resolve to `name` and `active`.
    ///
    /// # Errors
    ///
    /// [`QuarryError::UnsupportedOperation`] when `E` is unknown, or when no
    /// attribute (or more than one) matches.
    pub fn find_attribute<E: Entity>(&self, property: &str) -> Result<Arc<Attribute>> {
        let ty = self.type_of::<E>()?;
        resolve_attribute(ty, property)
    }

    /// Typed handle on a property of `E`, used to build conditions and projections.
    pub fn field<E: Entity, V>(&self, property: &str) -> Result<Field<E, V>> {
        self.find_attribute::<E>(property).map(Field::new)
    }
}

fn matching<'a>(ty: &'a Type, property: &str) -> Vec<&'a Arc<Attribute>> {
    ty.attributes
        .iter()
        .filter(|a| a.matches_property(property))
        .collect()
}

fn strip_accessor_prefix(property: &str) -> Option<&str> {
    let lower = property.to_ascii_lowercase();
    if lower.starts_with("get") && property.len() > 3 {
        Some(&property[3..])
    } else if lower.starts_with("is") && property.len() > 2 {
        Some(&property[2..])
    } else {
        None
    }
}

pub(crate) fn resolve_attribute(ty: &Type, property: &str) -> Result<Arc<Attribute>> {
    let mut candidates = matching(ty, property);
    if candidates.is_empty() {
        if let Some(stripped) = strip_accessor_prefix(property) {
            candidates = matching(ty, stripped);
        }
    }
    match candidates.as_slice() {
        [single] => Ok(Arc::clone(single)),
        [] => Err(QuarryError::UnsupportedOperation(format!(
            "no attribute '{property}' declared on {}",
            ty.name
        ))),
        _ => Err(QuarryError::UnsupportedOperation(format!(
            "property '{property}' is ambiguous on {}",
            ty.name
        ))),
    }
}

/// Builder for [`EntityModel`]; validates the whole model at [`build`](Self::build).
pub struct EntityModelBuilder {
    name: String,
    types: Vec<Type>,
}

impl EntityModelBuilder {
    pub fn add(mut self, ty: Type) -> Self {
        self.types.push(ty);
        self
    }

    /// Validates and freezes the model.
    ///
    /// # Errors
    ///
    /// [`QuarryError::UnsupportedOperation`] for duplicate types, duplicate
    /// properties or columns within a type, more than one version attribute, a
    /// foreign key to an unknown type or column, or an association whose mapping
    /// does not resolve.
    pub fn build(self) -> Result<EntityModel> {
        let mut by_id = HashMap::new();
        let mut by_name = HashMap::new();

        for (i, ty) in self.types.iter().enumerate() {
            if by_id.insert(ty.type_id, i).is_some() {
                return Err(QuarryError::UnsupportedOperation(format!(
                    "{} registered twice",
                    ty.rust_name
                )));
            }
            if by_name.insert(ty.name.to_ascii_lowercase(), i).is_some() {
                return Err(QuarryError::UnsupportedOperation(format!(
                    "table name '{}' used by more than one type",
                    ty.name
                )));
            }
            validate_attributes(ty)?;
        }

        for ty in &self.types {
            for attr in &ty.attributes {
                let Some(fk) = attr.foreign_key() else {
                    continue;
                };
                let target = by_name
                    .get(&fk.referenced_type.to_ascii_lowercase())
                    .map(|&i| &self.types[i])
                    .ok_or_else(|| {
                        QuarryError::UnsupportedOperation(format!(
                            "{}.{} references unknown type '{}'",
                            ty.name, attr.name, fk.referenced_type
                        ))
                    })?;
                if target.attribute_by_column(&fk.referenced_column).is_none() {
                    return Err(QuarryError::UnsupportedOperation(format!(
                        "{}.{} references unknown column {}.{}",
                        ty.name, attr.name, target.name, fk.referenced_column
                    )));
                }
            }
        }

        log::debug!(
            "Built entity model '{}' with {} type(s)",
            self.name,
            self.types.len()
        );

        let model = EntityModel {
            name: self.name,
            types: self.types.into_iter().map(Arc::new).collect(),
            by_id,
            by_name,
        };
        for ty in &model.types {
            model.dependents(ty)?;
        }
        Ok(model)
    }
}

fn validate_attributes(ty: &Type) -> Result<()> {
    let mut properties = HashMap::new();
    let mut columns = HashMap::new();
    let mut versions = 0;
    for attr in &ty.attributes {
        if properties
            .insert(attr.property.to_ascii_lowercase(), ())
            .is_some()
        {
            return Err(QuarryError::UnsupportedOperation(format!(
                "property '{}' declared twice on {}",
                attr.property, ty.name
            )));
        }
        if attr.is_column() && columns.insert(attr.name.to_ascii_lowercase(), ()).is_some() {
            return Err(QuarryError::UnsupportedOperation(format!(
                "column '{}' declared twice on {}",
                attr.name, ty.name
            )));
        }
        if attr.version {
            versions += 1;
        }
    }
    if versions > 1 {
        return Err(QuarryError::UnsupportedOperation(format!(
            "{} declares more than one version attribute",
            ty.name
        )));
    }
    Ok(())
}
