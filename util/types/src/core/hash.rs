use crate::core::error::FromHexError;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr};

/// A 32-byte hash, e.g. a block hash or the proof-of-work limit.
///
/// Rendered as lower-case hex, prefixed by `0x` in the alternate form and in
/// serialized configuration.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Byte32([u8; 32]);

impl Byte32 {
    /// Creates a hash from raw bytes.
    pub const fn new(inner: [u8; 32]) -> Self {
        Byte32(inner)
    }

    /// The all-zero hash.
    pub const fn zero() -> Self {
        Byte32([0u8; 32])
    }

    /// Returns true if every byte is zero.
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0[..]
    }
}

impl From<[u8; 32]> for Byte32 {
    fn from(inner: [u8; 32]) -> Self {
        Byte32(inner)
    }
}

impl fmt::LowerHex for Byte32 {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if f.alternate() {
            write!(f, "0x")?;
        }
        write!(f, "{}", faster_hex::hex_string(&self.0))
    }
}

impl fmt::Display for Byte32 {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:#x}", self)
    }
}

impl fmt::Debug for Byte32 {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Byte32({:#x})", self)
    }
}

impl FromStr for Byte32 {
    type Err = FromHexError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let digits = input.strip_prefix("0x").unwrap_or(input);
        if digits.len() != 64 {
            return Err(FromHexError::InvalidLength(digits.len()));
        }
        let mut inner = [0u8; 32];
        faster_hex::hex_decode(digits.as_bytes(), &mut inner)
            .map_err(|_| FromHexError::InvalidCharacter(input.to_owned()))?;
        Ok(Byte32(inner))
    }
}

impl Serialize for Byte32 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{:#x}", self))
    }
}

impl<'de> Deserialize<'de> for Byte32 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(de::Error::custom)
    }
}
