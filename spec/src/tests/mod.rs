use crate::consensus::{Consensus, ConsensusBuilder};
use crate::error::{ConfigError, QueryError};
use crate::versionbits::{version_signals, Deployment, DeploymentPos, VERSIONBITS_TOP_BITS};
use fedchain_error::{Error, ErrorKind};
use fedchain_traits::SignalHistoryProvider;
use fedchain_types::core::{BlockNumber, Byte32, EpochNumber, EpochTransition, Version};
use std::collections::BTreeMap;
use std::sync::Arc;

mod versionbits;

/// An in-memory chain: one version and hash per block, one transition per
/// elapsed epoch.
#[derive(Clone, Debug, Default)]
pub(crate) struct MockChain {
    versions: Vec<Version>,
    hashes: Vec<Byte32>,
    transitions: Vec<EpochTransition>,
}

impl SignalHistoryProvider for MockChain {
    fn signal_bit(&self, number: BlockNumber, bit: u8) -> Option<bool> {
        self.versions
            .get(number as usize)
            .map(|version| version_signals(*version, bit))
    }

    fn block_hash(&self, number: BlockNumber) -> Option<Byte32> {
        self.hashes.get(number as usize).copied()
    }

    fn epoch_transition(&self, epoch: EpochNumber) -> Option<EpochTransition> {
        self.transitions.get(epoch as usize).cloned()
    }
}

impl MockChain {
    pub(crate) fn new() -> Self {
        MockChain::default()
    }

    pub(crate) fn block_count(&self) -> BlockNumber {
        self.versions.len() as BlockNumber
    }

    pub(crate) fn push_block(&mut self, version: Version) {
        let number = self.block_count();
        self.versions.push(version);
        self.hashes.push(mock_hash(number));
    }

    /// Appends `count` blocks signalling `bit`.
    pub(crate) fn signal(&mut self, count: u64, bit: u8) {
        for _ in 0..count {
            self.push_block(VERSIONBITS_TOP_BITS | (1 << bit));
        }
    }

    /// Appends `count` blocks signalling nothing.
    pub(crate) fn idle(&mut self, count: u64) {
        for _ in 0..count {
            self.push_block(VERSIONBITS_TOP_BITS);
        }
    }

    pub(crate) fn commit_epoch(&mut self, transition: EpochTransition) {
        self.transitions.push(transition);
    }
}

pub(crate) fn mock_hash(number: BlockNumber) -> Byte32 {
    let mut hash = [0u8; 32];
    hash[24..].copy_from_slice(&number.to_be_bytes());
    hash[0] = 0xfe;
    Byte32::new(hash)
}

/// Window 10, threshold 8, and the given deployments.
pub(crate) fn build_consensus(deployments: Vec<(DeploymentPos, Deployment)>) -> Arc<Consensus> {
    let consensus = ConsensusBuilder::default()
        .miner_confirmation_window(10)
        .rule_change_activation_threshold(8)
        .softfork_deployments(deployments.into_iter().collect::<BTreeMap<_, _>>())
        .build()
        .expect("valid consensus");
    Arc::new(consensus)
}

pub(crate) fn assert_config_error(error: Error, expected: ConfigError) {
    assert_eq!(error.kind(), ErrorKind::Config, "{}", error);
    assert_eq!(error.downcast_ref::<ConfigError>(), Some(&expected));
}

pub(crate) fn assert_query_error(error: Error, expected: QueryError) {
    assert_eq!(error.kind(), ErrorKind::Query, "{}", error);
    assert_eq!(error.downcast_ref::<QueryError>(), Some(&expected));
}
