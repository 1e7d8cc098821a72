/// Registers normalizer codes for several error types at once.
///
/// ```ignore
/// register_error_codes! {
///     MissingTable => 404,
///     Throttled => 429,
/// }
/// ```
#[macro_export]
macro_rules! register_error_codes {
    ($($ty:ty => $code:expr),* $(,)?) => {{
        $( $crate::register_error_code::<$ty>($code); )*
    }};
}

/// Builds a `Vec<Resource>`, optionally with typed fields.
///
/// ```ignore
/// let resources = resources![
///     "customers" => "Customers" { "id": "int", "email": "string" },
///     "orders" => "Orders",
/// ];
/// ```
#[macro_export]
macro_rules! resources {
    ($($id:literal => $title:literal $({ $($field:literal : $field_type:literal),* $(,)? })?),* $(,)?) => {
        vec![$(
            $crate::Resource::new($id, $title)
                $(.with_fields(vec![$($crate::Field::new($field).with_type($field_type)),*]))?
        ),*]
    };
}
