//! Attribute metadata: one property of an entity, usually one column.

use std::fmt;
use std::hash::{Hash, Hasher};

use crate::value::FieldType;

/// Association kind of an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cardinality {
    OneToOne,
    OneToMany,
    ManyToOne,
    ManyToMany,
}

/// What writing or deleting an entity does to the entities associated with it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CascadeAction {
    /// Saving the owner inserts or updates the associated entities
    Save,
    /// Deleting the owner deletes the rows that reference it
    Delete,
}

/// Other side of an association that is not a foreign key column
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssociationTarget {
    /// Name of the associated type
    pub target_type: String,
    /// Property of the associated type holding the foreign key back to this one.
    /// When absent, the only foreign key of the target referencing this type is used.
    pub mapped_by: Option<String>,
    /// Junction type of a many-to-many association
    pub junction: Option<String>,
}

/// Referential action for foreign keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ReferentialAction {
    #[default]
    NoAction,
    Restrict,
    Cascade,
    SetNull,
    SetDefault,
}

/// Target of a foreign-key attribute
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ForeignKeyReference {
    /// Name of the referenced type
    pub referenced_type: String,
    /// Column name on the referenced type
    pub referenced_column: String,
    pub on_delete: ReferentialAction,
    pub on_update: ReferentialAction,
}

/// A typed property of an entity
///
/// Attributes are created through [`AttributeBuilder`] and frozen when their
/// declaring [`Type`](super::Type) is built. Equality and hashing use the declaring
/// type and column name, so two attributes are equal only if they address the same
/// column of the same table.
#[derive(Clone)]
pub struct Attribute {
    pub(crate) name: String,
    pub(crate) property: String,
    pub(crate) declaring_type: String,
    pub(crate) field_type: FieldType,
    pub(crate) length: Option<u32>,
    pub(crate) key: bool,
    pub(crate) generated: bool,
    pub(crate) nullable: bool,
    pub(crate) unique: bool,
    pub(crate) indexed: bool,
    pub(crate) index_names: Vec<String>,
    pub(crate) cardinality: Option<Cardinality>,
    pub(crate) foreign_key: Option<ForeignKeyReference>,
    pub(crate) target: Option<AssociationTarget>,
    pub(crate) cascade: Vec<CascadeAction>,
    pub(crate) version: bool,
    pub(crate) default_value: Option<String>,
}

impl Attribute {
    /// Column name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Entity property name, as accepted by [`crate::Entity::get`]
    pub fn property(&self) -> &str {
        &self.property
    }

    /// Name of the type (table) declaring this attribute
    pub fn declaring_type(&self) -> &str {
        &self.declaring_type
    }

    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    pub fn length(&self) -> Option<u32> {
        self.length
    }

    pub fn is_key(&self) -> bool {
        self.key
    }

    pub fn is_generated(&self) -> bool {
        self.generated
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub fn is_indexed(&self) -> bool {
        self.indexed
    }

    pub fn index_names(&self) -> &[String] {
        &self.index_names
    }

    pub fn cardinality(&self) -> Option<Cardinality> {
        self.cardinality
    }

    pub fn is_association(&self) -> bool {
        self.cardinality.is_some()
    }

    pub fn is_foreign_key(&self) -> bool {
        self.foreign_key.is_some()
    }

    pub fn foreign_key(&self) -> Option<&ForeignKeyReference> {
        self.foreign_key.as_ref()
    }

    /// Associated type and mapping of an inverse or many-to-many association
    pub fn association_target(&self) -> Option<&AssociationTarget> {
        self.target.as_ref()
    }

    pub fn cascades(&self, action: CascadeAction) -> bool {
        self.cascade.contains(&action)
    }

    pub fn is_version(&self) -> bool {
        self.version
    }

    pub fn default_value(&self) -> Option<&str> {
        self.default_value.as_deref()
    }

    /// Whether the attribute is stored in a column of its declaring table.
    ///
    /// Associations that are not foreign keys (the inverse side of a one-to-many,
    /// for instance) live on the other table and have no column here.
    pub fn is_column(&self) -> bool {
        !self.is_association() || self.is_foreign_key()
    }

    pub(crate) fn matches_property(&self, property: &str) -> bool {
        self.property.eq_ignore_ascii_case(property)
    }
}

impl PartialEq for Attribute {
    fn eq(&self, other: &Self) -> bool {
        self.declaring_type == other.declaring_type && self.name == other.name
    }
}

impl Eq for Attribute {}

impl Hash for Attribute {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.declaring_type.hash(state);
        self.name.hash(state);
    }
}

impl fmt::Debug for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Attribute({}.{})", self.declaring_type, self.name)
    }
}

/// Builder for [`Attribute`]
///
/// ```
/// use quarry::meta::AttributeBuilder;
/// use quarry::FieldType;
///
/// let id = AttributeBuilder::new("id", FieldType::BigInt).key().generated();
/// let email = AttributeBuilder::new("email", FieldType::Varchar)
///     .length(255)
///     .nullable(true)
///     .unique();
/// # let _ = (id, email);
/// ```
#[derive(Debug, Clone)]
pub struct AttributeBuilder {
    attribute: Attribute,
}

impl AttributeBuilder {
    /// Starts an attribute whose column name equals the property name.
    pub fn new(property: &str, field_type: FieldType) -> Self {
        Self {
            attribute: Attribute {
                name: property.to_string(),
                property: property.to_string(),
                declaring_type: String::new(),
                field_type,
                length: None,
                key: false,
                generated: false,
                nullable: false,
                unique: false,
                indexed: false,
                index_names: Vec::new(),
                cardinality: None,
                foreign_key: None,
                target: None,
                cascade: Vec::new(),
                version: false,
                default_value: None,
            },
        }
    }

    /// Overrides the column name
    pub fn column(mut self, name: &str) -> Self {
        self.attribute.name = name.to_string();
        self
    }

    pub fn key(mut self) -> Self {
        self.attribute.key = true;
        self
    }

    /// Key assigned by the database on insert
    pub fn generated(mut self) -> Self {
        self.attribute.generated = true;
        self
    }

    pub fn nullable(mut self, nullable: bool) -> Self {
        self.attribute.nullable = nullable;
        self
    }

    pub fn unique(mut self) -> Self {
        self.attribute.unique = true;
        self
    }

    /// Indexed under the default index name `idx_<table>_<column>`
    pub fn indexed(mut self) -> Self {
        self.attribute.indexed = true;
        self
    }

    /// Member of the named index; attributes sharing a name form a composite index
    pub fn index(mut self, name: &str) -> Self {
        self.attribute.indexed = true;
        self.attribute.index_names.push(name.to_string());
        self
    }

    pub fn length(mut self, length: u32) -> Self {
        self.attribute.length = Some(length);
        self
    }

    /// Sets the association kind of a foreign key, e.g. `OneToOne` instead of
    /// the many-to-one implied by [`references`](Self::references)
    pub fn association(mut self, cardinality: Cardinality) -> Self {
        self.attribute.cardinality = Some(cardinality);
        self
    }

    /// Collection of `target_type` entities whose `mapped_by` foreign key points here.
    /// The attribute has no column of its own.
    pub fn one_to_many(self, target_type: &str, mapped_by: &str) -> Self {
        self.inverse(Cardinality::OneToMany, target_type, Some(mapped_by), None)
    }

    /// Single `target_type` entity whose `mapped_by` foreign key points here
    pub fn one_to_one(self, target_type: &str, mapped_by: &str) -> Self {
        self.inverse(Cardinality::OneToOne, target_type, Some(mapped_by), None)
    }

    /// `target_type` entities linked through rows of the `junction` type, which
    /// declares a foreign key to each side
    pub fn many_to_many(self, target_type: &str, junction: &str) -> Self {
        self.inverse(Cardinality::ManyToMany, target_type, None, Some(junction))
    }

    fn inverse(
        mut self,
        cardinality: Cardinality,
        target_type: &str,
        mapped_by: Option<&str>,
        junction: Option<&str>,
    ) -> Self {
        self.attribute.cardinality = Some(cardinality);
        self.attribute.target = Some(AssociationTarget {
            target_type: target_type.to_string(),
            mapped_by: mapped_by.map(str::to_string),
            junction: junction.map(str::to_string),
        });
        self
    }

    pub fn cascade(mut self, actions: &[CascadeAction]) -> Self {
        for action in actions {
            if !self.attribute.cascade.contains(action) {
                self.attribute.cascade.push(*action);
            }
        }
        self
    }

    /// Foreign key to `column` of `referenced_type`. Implies many-to-one unless an
    /// association kind was already set.
    pub fn references(mut self, referenced_type: &str, column: &str) -> Self {
        if self.attribute.cardinality.is_none() {
            self.attribute.cardinality = Some(Cardinality::ManyToOne);
        }
        self.attribute.foreign_key = Some(ForeignKeyReference {
            referenced_type: referenced_type.to_string(),
            referenced_column: column.to_string(),
            on_delete: ReferentialAction::default(),
            on_update: ReferentialAction::default(),
        });
        self
    }

    pub fn on_delete(mut self, action: ReferentialAction) -> Self {
        if let Some(fk) = self.attribute.foreign_key.as_mut() {
            fk.on_delete = action;
        }
        self
    }

    pub fn on_update(mut self, action: ReferentialAction) -> Self {
        if let Some(fk) = self.attribute.foreign_key.as_mut() {
            fk.on_update = action;
        }
        self
    }

    /// Optimistic-locking version column
    pub fn version(mut self) -> Self {
        self.attribute.version = true;
        self
    }

    /// Column default, emitted verbatim in DDL
    pub fn default_value(mut self, sql: &str) -> Self {
        self.attribute.default_value = Some(sql.to_string());
        self
    }

    pub(crate) fn build(mut self, declaring_type: &str) -> Attribute {
        self.attribute.declaring_type = declaring_type.to_string();
        self.attribute
    }
}
