use crate::core::Script;
use serde::{Deserialize, Serialize};

/// The full set of federation parameters committed by a dynamic federation
/// block.
///
/// A federation is authoritative for an epoch: its `signblock_script` signs
/// the blocks, its `fedpeg_program` receives peg-ins and its `fedpeg_script`
/// is the witness script behind that program.
#[derive(Clone, Default, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FederationParams {
    /// The script every block header of the epoch must satisfy.
    pub signblock_script: Script,
    /// Maximum serialized size of the block signature witness.
    pub signblock_witness_limit: u32,
    /// The parent chain `scriptPubKey` peg-ins are sent to.
    pub fedpeg_program: Script,
    /// The witness script of `fedpeg_program`.
    pub fedpeg_script: Script,
    /// Opaque extension data, e.g. the PAK list.
    #[serde(default)]
    pub extension_space: Vec<Script>,
}

impl FederationParams {
    /// A proposal can only take effect if it names both a signer and a peg
    /// destination.
    pub fn is_full(&self) -> bool {
        !self.signblock_script.is_empty() && !self.fedpeg_program.is_empty()
    }
}

/// What the blocks of one epoch committed about the next federation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EpochTransition {
    /// No proposal reached the chain during the epoch.
    Unchanged,
    /// The decoded parameters proposed for the following epoch.
    Proposed(FederationParams),
}
