use crate::core::error::FromHexError;
use bytes::Bytes;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, ops::Deref, str::FromStr};

/// A variable-length byte string which is written as hex in configuration.
///
/// Cloning is cheap, the buffer is reference counted.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HexBytes(Bytes);

/// A serialized script, e.g. the block signing script or the peg script.
pub type Script = HexBytes;

impl HexBytes {
    /// Creates from a static slice without copying.
    pub const fn from_static(bytes: &'static [u8]) -> Self {
        HexBytes(Bytes::from_static(bytes))
    }

    /// Returns the inner buffer.
    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

impl Deref for HexBytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for HexBytes {
    fn from(inner: Vec<u8>) -> Self {
        HexBytes(inner.into())
    }
}

impl From<&[u8]> for HexBytes {
    fn from(inner: &[u8]) -> Self {
        HexBytes(Bytes::copy_from_slice(inner))
    }
}

impl From<Bytes> for HexBytes {
    fn from(inner: Bytes) -> Self {
        HexBytes(inner)
    }
}

impl fmt::Display for HexBytes {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "0x{}", faster_hex::hex_string(&self.0))
    }
}

impl fmt::Debug for HexBytes {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "HexBytes({})", self)
    }
}

impl FromStr for HexBytes {
    type Err = FromHexError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let digits = input.strip_prefix("0x").unwrap_or(input);
        if digits.len() % 2 != 0 {
            return Err(FromHexError::InvalidLength(digits.len()));
        }
        if digits.is_empty() {
            return Ok(HexBytes::default());
        }
        let mut inner = vec![0u8; digits.len() / 2];
        faster_hex::hex_decode(digits.as_bytes(), &mut inner)
            .map_err(|_| FromHexError::InvalidCharacter(input.to_owned()))?;
        Ok(inner.into())
    }
}

impl Serialize for HexBytes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for HexBytes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(de::Error::custom)
    }
}
