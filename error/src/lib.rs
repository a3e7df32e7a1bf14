//! Underlying error types used over fedchain crates.
//!
//! Every crate defines its own detailed error enums and converts them into the
//! top-level [`Error`], tagged with an [`ErrorKind`]. The kind is what callers
//! match on: a [`ErrorKind::Config`] error halts startup, a [`ErrorKind::Query`]
//! error is a caller precondition violation.

use std::{error::Error as StdError, fmt, ops::Deref, sync::Arc};

pub mod prelude;
pub mod util;

use derive_more::Display;
use prelude::*;

/// A wrapper around a dynamic error type.
#[derive(Debug, Clone)]
pub struct AnyError(Arc<anyhow::Error>);

/// A list specifying categories of fedchain error.
///
/// It is used with [`Error`].
#[derive(Debug, Clone, Copy, Eq, PartialEq, Display)]
pub enum ErrorKind {
    /// The chain parameters are inconsistent. Raised only while building the
    /// consensus; there is no runtime recovery.
    ///
    /// The underlying error is `ConfigError` of `fedchain-chain-spec`.
    Config,
    /// A query was made against history the caller does not have yet.
    ///
    /// The underlying error is `QueryError` of `fedchain-chain-spec`.
    Query,
}

def_error_base_on_kind!(Error, ErrorKind, "Top-level fedchain error type.");

impl<E> From<E> for AnyError
where
    E: StdError + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        Self(Arc::new(error.into()))
    }
}

impl Deref for AnyError {
    type Target = Arc<anyhow::Error>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Display for AnyError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}
