/// `impl_from! { i64 => Number::Int; i32 as i64 => Number::Int; }`
#[macro_export]
macro_rules! impl_from {
    (@into $To:ty; $From:ty => $Constructor:expr) => {
        impl From<$From> for $To {
            #[inline]
            fn from(value: $From) -> Self {
                $Constructor(value)
            }
        }
    };
    (@into $To:ty; $From:ty as $cast:ty => $Constructor:expr) => {
        impl From<$From> for $To {
            #[inline]
            fn from(value: $From) -> Self {
                $Constructor(value as $cast)
            }
        }
    };
    ($To:ty { $($From:ty $(as $cast:ty)? => $Constructor:expr;)* }) => {
        $(
            $crate::impl_from!(@into $To; $From $(as $cast)? => $Constructor);
        )*
    };
}
