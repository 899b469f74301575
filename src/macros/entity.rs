/// Implements [`Entity`](crate::Entity) for a struct with `Default`.
///
/// Each listed field becomes a property of the same name. Field types need
/// `Clone`, `Into<Value>` and [`FromValue`](crate::FromValue).
///
/// # Example
/// ```
/// #[derive(Debug, Default, Clone)]
/// struct Person {
///     id: i64,
///     name: String,
///     email: Option<String>,
/// }
///
/// quarry::impl_entity!(Person { id: i64, name: String, email: Option<String> });
/// ```
#[macro_export]
macro_rules! impl_entity {
    ($entity:ty { $($field:ident : $field_ty:ty),* $(,)? }) => {
        impl $crate::Entity for $entity {
            fn get(&self, property: &str) -> $crate::Value {
                $(
                    if property == stringify!($field) {
                        return $crate::Value::from(::std::clone::Clone::clone(&self.$field));
                    }
                )*
                $crate::Value::Null
            }

            fn set(
                &mut self,
                property: &str,
                value: $crate::Value,
            ) -> ::std::result::Result<(), $crate::QuarryError> {
                $(
                    if property == stringify!($field) {
                        self.$field = <$field_ty as $crate::FromValue>::from_value(value)?;
                        return Ok(());
                    }
                )*
                Err($crate::QuarryError::UnsupportedOperation(format!(
                    "{} has no property '{}'",
                    stringify!($entity),
                    property
                )))
            }

            fn create() -> Self {
                ::std::default::Default::default()
            }
        }
    };
}
