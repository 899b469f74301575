/// Builds a [`Type`](crate::meta::Type) from a compact column list.
///
/// Each entry is `property: FieldType` optionally followed by `[modifier, ...]`,
/// where a modifier is any [`AttributeBuilder`](crate::meta::AttributeBuilder)
/// method, with its arguments in parentheses when it takes some.
///
/// # Example
/// ```
/// #[derive(Default)]
/// struct Phone { id: i64, number: String, owner: i64 }
/// quarry::impl_entity!(Phone { id: i64, number: String, owner: i64 });
///
/// let phone = quarry::model_type!(Phone => "phone" {
///     id: BigInt [key, generated],
///     number: Varchar [length(32), unique],
///     owner: BigInt [column("owner_id"), references("person", "id")],
/// });
/// assert_eq!(phone.name(), "phone");
/// ```
#[macro_export]
macro_rules! model_type {
    ($entity:ty => $table:literal {
        $(
            $prop:ident : $field_type:ident
            $([ $( $modifier:ident $( ( $( $arg:expr ),* ) )? ),* $(,)? ])?
        ),* $(,)?
    }) => {
        $crate::meta::TypeBuilder::new::<$entity>($table)
            $(
                .attribute(
                    $crate::meta::AttributeBuilder::new(
                        stringify!($prop),
                        $crate::FieldType::$field_type,
                    )
                    $( $( .$modifier( $( $( $arg ),* )? ) )* )?
                )
            )*
            .build()
    };
}
