//! Re-exports and macros shared by the crates which define their own errors.

pub use thiserror::Error;

pub use crate::{def_error_base_on_kind, impl_error_conversion_with_kind};

/// Implements `From<$source> for $target` by tagging the source error with `$kind`.
#[macro_export]
macro_rules! impl_error_conversion_with_kind {
    ($source:ty, $kind:expr, $target:ty) => {
        impl ::std::convert::From<$source> for $target {
            fn from(error: $source) -> Self {
                $kind.because(error)
            }
        }
    };
}

/// Defines an error struct which pairs a kind with a type-erased cause.
///
/// The kind type gains a `because` method which wraps any standard error.
#[macro_export]
macro_rules! def_error_base_on_kind {
    ($error:ident, $error_kind:ty, $comment_error:expr, $comment_because:expr) => {
        #[doc = $comment_error]
        #[derive(Error, Debug, Clone)]
        pub struct $error {
            kind: $error_kind,
            inner: $crate::AnyError,
        }

        impl ::std::fmt::Display for $error {
            fn fmt(&self, f: &mut ::std::fmt::Formatter) -> ::std::fmt::Result {
                if f.alternate() {
                    write!(f, "{}: {}", self.kind(), self.inner)
                } else {
                    write!(f, "{}({})", self.kind(), self.inner)
                }
            }
        }

        impl $error_kind {
            #[doc = $comment_because]
            pub fn because<E>(self, reason: E) -> $error
            where
                E: ::std::error::Error + Send + Sync + 'static,
            {
                $error {
                    kind: self,
                    inner: reason.into(),
                }
            }
        }

        impl $error {
            /// Returns the kind of this error.
            pub fn kind(&self) -> $error_kind {
                self.kind
            }

            /// Attempts to downcast the cause to a concrete error type.
            pub fn downcast_ref<T>(&self) -> Option<&T>
            where
                T: ::std::fmt::Display + ::std::fmt::Debug + Send + Sync + 'static,
            {
                self.inner.downcast_ref::<T>()
            }

            /// The lowest level cause of this error.
            pub fn root_cause(&self) -> &(dyn ::std::error::Error + 'static) {
                self.inner.root_cause()
            }
        }
    };
    ($error:ident, $error_kind:ty, $comment_error:expr) => {
        $crate::def_error_base_on_kind!(
            $error,
            $error_kind,
            $comment_error,
            concat!(
                "Creates `",
                stringify!($error),
                "` base on `",
                stringify!($error_kind),
                "` with an error as the reason."
            )
        );
    };
    ($error:ident, $error_kind:ty) => {
        $crate::def_error_base_on_kind!(
            $error,
            $error_kind,
            concat!(
                "A wrapper around `",
                stringify!($error_kind),
                "` with an underlying cause."
            )
        );
    };
}
