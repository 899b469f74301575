//! Macros
//!
//! - [`impl_entity!`](crate::impl_entity) implements [`Entity`](crate::Entity) for a
//!   plain struct by mapping each listed field to the property of the same name.
//! - [`model_type!`](crate::model_type) shortens a [`TypeBuilder`](crate::meta::TypeBuilder)
//!   chain for the common case.

mod entity;
mod model;
