//! Entity metadata
//!
//! [`EntityModel`] → [`Type`] → [`Attribute`]. Application code (or a derive macro)
//! describes each entity once with the builders here; queries, the SQL generator
//! and schema synchronization all read from the resulting model.

pub mod association;
pub mod attribute;
pub mod entity_type;
pub mod model;

pub use association::{Association, Link};
pub use attribute::{
    AssociationTarget, Attribute, AttributeBuilder, Cardinality, CascadeAction,
    ForeignKeyReference, ReferentialAction,
};
pub use entity_type::{Type, TypeBuilder};
pub use model::{EntityModel, EntityModelBuilder};
