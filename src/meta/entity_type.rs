//! Type metadata: one entity, one table.

use std::any::TypeId;
use std::fmt;
use std::sync::Arc;

use super::attribute::{Attribute, AttributeBuilder};
use crate::entity::Entity;

/// One entity type and the table it maps to
///
/// Immutable once built. Attributes keep their declaration order, which is also the
/// column order used for `SELECT` lists and `CREATE TABLE`.
pub struct Type {
    pub(crate) name: String,
    pub(crate) type_id: TypeId,
    pub(crate) rust_name: &'static str,
    pub(crate) attributes: Vec<Arc<Attribute>>,
    pub(crate) view: bool,
    pub(crate) read_only: bool,
}

impl Type {
    /// Table name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rust type name of the entity
    pub fn rust_name(&self) -> &'static str {
        self.rust_name
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn is_view(&self) -> bool {
        self.view
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn attributes(&self) -> &[Arc<Attribute>] {
        &self.attributes
    }

    /// Attributes stored as columns of this table
    pub fn columns(&self) -> impl Iterator<Item = &Arc<Attribute>> {
        self.attributes.iter().filter(|a| a.is_column())
    }

    pub fn key_attributes(&self) -> Vec<Arc<Attribute>> {
        self.attributes.iter().filter(|a| a.is_key()).cloned().collect()
    }

    /// The key attribute when the type has exactly one
    pub fn single_key(&self) -> Option<&Arc<Attribute>> {
        let mut keys = self.attributes.iter().filter(|a| a.is_key());
        match (keys.next(), keys.next()) {
            (Some(key), None) => Some(key),
            _ => None,
        }
    }

    pub fn generated_keys(&self) -> Vec<Arc<Attribute>> {
        self.attributes
            .iter()
            .filter(|a| a.is_key() && a.is_generated())
            .cloned()
            .collect()
    }

    pub fn has_generated_keys(&self) -> bool {
        self.attributes.iter().any(|a| a.is_key() && a.is_generated())
    }

    pub fn version_attribute(&self) -> Option<&Arc<Attribute>> {
        self.attributes.iter().find(|a| a.is_version())
    }

    /// Attribute by exact property name
    pub fn attribute(&self, property: &str) -> Option<&Arc<Attribute>> {
        self.attributes.iter().find(|a| a.property == property)
    }

    /// Attribute by column name, ignoring ASCII case
    pub fn attribute_by_column(&self, column: &str) -> Option<&Arc<Attribute>> {
        self.attributes
            .iter()
            .find(|a| a.is_column() && a.name.eq_ignore_ascii_case(column))
    }

    /// Names of the types this type references through foreign keys
    pub fn referenced_types(&self) -> impl Iterator<Item = &str> {
        self.attributes
            .iter()
            .filter_map(|a| a.foreign_key())
            .map(|fk| fk.referenced_type.as_str())
    }
}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Type")
            .field("name", &self.name)
            .field("rust_name", &self.rust_name)
            .field("attributes", &self.attributes)
            .field("view", &self.view)
            .finish()
    }
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id && self.name == other.name
    }
}

impl Eq for Type {}

/// Builder for [`Type`]
pub struct TypeBuilder {
    name: String,
    type_id: TypeId,
    rust_name: &'static str,
    attributes: Vec<AttributeBuilder>,
    view: bool,
    read_only: bool,
}

impl TypeBuilder {
    /// Starts the metadata for entity `E` stored in table `name`.
    pub fn new<E: Entity>(name: &str) -> Self {
        Self {
            name: name.to_string(),
            type_id: TypeId::of::<E>(),
            rust_name: std::any::type_name::<E>(),
            attributes: Vec::new(),
            view: false,
            read_only: false,
        }
    }

    pub fn attribute(mut self, attribute: AttributeBuilder) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Backed by a view: queried but never created or altered
    pub fn view(mut self) -> Self {
        self.view = true;
        self.read_only = true;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn build(self) -> Type {
        let name = self.name;
        let attributes = self
            .attributes
            .into_iter()
            .map(|a| Arc::new(a.build(&name)))
            .collect();
        Type {
            name,
            type_id: self.type_id,
            rust_name: self.rust_name,
            attributes,
            view: self.view,
            read_only: self.read_only,
        }
    }
}
