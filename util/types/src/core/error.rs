//! The error types of the core types.

use thiserror::Error;

/// The error which can be returned when parsing a hex string.
#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum FromHexError {
    /// The string has an odd number of digits, or the wrong number for a
    /// fixed-size value.
    #[error("invalid length: {0}")]
    InvalidLength(usize),
    /// The string contains a character which is not a hex digit.
    #[error("invalid hex character in {0:?}")]
    InvalidCharacter(String),
}
