#[macro_export]
macro_rules! vol_error_wiring {
    (
        $( $src:ty => $dst:ident :: $variant:ident ),+ $(,)?
    ) => {
        $(
            impl From<$src> for $dst {
                #[inline]
                fn from(e: $src) -> Self { <$dst>::$variant(e) }
            }
        )+
    };
}

#[macro_export]
macro_rules! ensure {
    ($cond:expr, $err:expr) => {
        if !$cond {
            return Err($err.into());
        }
    };
}

#[macro_export]
macro_rules! bail {
    ($err:expr) => {
        return Err($err.into());
    };
}
