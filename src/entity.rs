//! The entity contract.
//!
//! A store never sees struct fields; it reads and writes entities through
//! property names that match the attribute metadata. Implement [`Entity`] by hand
//! or with [`impl_entity!`](crate::impl_entity).

use crate::error::Result;
use crate::value::Value;

/// A persistent object the store can read, write and instantiate
///
/// The trait is object safe (except for [`create`](Entity::create)) so listeners
/// and readers can work on `&mut dyn Entity`.
pub trait Entity: Send + 'static {
    /// Current value of `property`; unknown properties read as `Null`.
    fn get(&self, property: &str) -> Value;

    /// Assigns `property` from a column value.
    ///
    /// # Errors
    ///
    /// Conversion errors when the value does not fit the field, or
    /// `UnsupportedOperation` for an unknown property.
    fn set(&mut self, property: &str, value: Value) -> Result<()>;

    /// New, empty instance used when materializing rows
    fn create() -> Self
    where
        Self: Sized;
}

/// True for a generated key that has not been assigned by the database yet.
pub(crate) fn is_unassigned_key(value: &Value) -> bool {
    matches!(value, Value::Null | Value::Integer(0))
}
