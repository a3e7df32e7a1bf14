//! Helpers for asserting on errors in tests.

use crate::Error;

/// Asserts that two errors have the same kind and render to the same message.
///
/// Used for testing only.
pub fn assert_error_eq<L, R>(l: L, r: R)
where
    L: Into<Error>,
    R: Into<Error>,
{
    let (l, r) = (Into::<Error>::into(l), Into::<Error>::into(r));
    assert_eq!(l.kind(), r.kind(), "kind mismatch: {} vs {}", l, r);
    assert_eq!(l.to_string(), r.to_string());
}
