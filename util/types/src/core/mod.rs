//! Rust types.

pub mod error;

mod bytes;
mod dynafed;
mod hash;

pub use self::bytes::{HexBytes, Script};
pub use dynafed::{EpochTransition, FederationParams};
pub use hash::Byte32;

/// Height of a block, the genesis block is 0.
pub type BlockNumber = u64;
/// Index of a federation epoch.
pub type EpochNumber = u64;
/// Block header version, which carries the version bits.
pub type Version = u32;

#[cfg(test)]
mod tests;
