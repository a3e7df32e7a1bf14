//! Dynamic federations.
//!
//! The height axis is cut into epochs of `epoch_length` blocks. The blocks of
//! an epoch may commit a proposal for the federation of the next epoch; without
//! a usable proposal the federation carries over. Recently rotated out
//! federations stay valid for peg-ins for a few epochs so that deposits already
//! in flight are not lost.

use crate::consensus::Consensus;
use crate::error::QueryError;
use fedchain_error::Error;
use fedchain_logger::{info_target, trace_target, warn_target};
use fedchain_traits::SignalHistoryProvider;
use fedchain_types::core::{BlockNumber, EpochNumber, EpochTransition, FederationParams, Script};
use parking_lot::RwLock;
use std::sync::Arc;

const LOG_TARGET: &str = "dynafed";

/// Parameters of a rotating federation.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct DynamicFederation {
    /// Blocks per epoch, never zero.
    pub epoch_length: BlockNumber,
    /// Extension space of epoch 0, before any block committed a proposal.
    pub first_extension_space: Vec<Script>,
}

/// How the signing federation of a chain is chosen.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum FederationMode {
    /// The genesis federation signs forever.
    Static,
    /// The federation may rotate at every epoch boundary.
    Dynamic(DynamicFederation),
}

/// The federation authoritative for one epoch.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct FederationEpochDescriptor {
    epoch: EpochNumber,
    start: BlockNumber,
    params: FederationParams,
}

impl FederationEpochDescriptor {
    /// Creates a descriptor.
    pub fn new(epoch: EpochNumber, start: BlockNumber, params: FederationParams) -> Self {
        FederationEpochDescriptor {
            epoch,
            start,
            params,
        }
    }

    /// The epoch number.
    pub fn epoch(&self) -> EpochNumber {
        self.epoch
    }

    /// The first height of the epoch.
    pub fn start(&self) -> BlockNumber {
        self.start
    }

    /// The federation parameters in force during the epoch.
    pub fn params(&self) -> &FederationParams {
        &self.params
    }

    /// The script block signatures must satisfy.
    pub fn signblock_script(&self) -> &Script {
        &self.params.signblock_script
    }

    /// The witness program peg-ins pay to.
    pub fn fedpeg_program(&self) -> &Script {
        &self.params.fedpeg_program
    }

    /// The script of the federation holding the pegged funds.
    pub fn fedpeg_script(&self) -> &Script {
        &self.params.fedpeg_script
    }

    /// Extra federation data, e.g. the PAK list.
    pub fn extension_space(&self) -> &[Script] {
        &self.params.extension_space
    }
}

// Epoch 0 is signed by the genesis federation.
fn first_descriptor(consensus: &Consensus) -> FederationEpochDescriptor {
    let params = match consensus.federation_mode() {
        FederationMode::Static => consensus.genesis_federation().clone(),
        FederationMode::Dynamic(dynamic) => FederationParams {
            extension_space: dynamic.first_extension_space.clone(),
            ..consensus.genesis_federation().clone()
        },
    };
    FederationEpochDescriptor::new(0, 0, params)
}

// Descriptors indexed by epoch. `generation` changes on every invalidation.
struct DescriptorStore {
    generation: u64,
    epochs: Vec<FederationEpochDescriptor>,
}

/// Resolves the federation of any height.
///
/// Descriptors are derived epoch by epoch from the first one and kept; an
/// epoch's descriptor only depends on the epoch before it, so a kept descriptor
/// never changes while the chain below it stays.
pub struct FederationEpochResolver {
    consensus: Arc<Consensus>,
    descriptors: RwLock<DescriptorStore>,
}

impl FederationEpochResolver {
    /// Creates a resolver which only knows epoch 0.
    pub fn new(consensus: Arc<Consensus>) -> Self {
        let first = first_descriptor(&consensus);
        FederationEpochResolver {
            consensus,
            descriptors: RwLock::new(DescriptorStore {
                generation: 0,
                epochs: vec![first],
            }),
        }
    }

    /// The consensus this resolver evaluates.
    pub fn consensus(&self) -> &Consensus {
        &self.consensus
    }

    fn epoch_length(&self) -> Option<BlockNumber> {
        match self.consensus.federation_mode() {
            FederationMode::Static => None,
            FederationMode::Dynamic(dynamic) => Some(dynamic.epoch_length),
        }
    }

    /// The epoch `number` belongs to, always 0 for a static federation.
    pub fn epoch_number(&self, number: BlockNumber) -> EpochNumber {
        self.epoch_length().map_or(0, |length| number / length)
    }

    /// The first height of `epoch`.
    pub fn epoch_start(&self, epoch: EpochNumber) -> BlockNumber {
        self.epoch_length()
            .map_or(0, |length| epoch.saturating_mul(length))
    }

    /// The federation which signs the block at `number`.
    pub fn active_federation<I: SignalHistoryProvider>(
        &self,
        number: BlockNumber,
        indexer: &I,
    ) -> Result<FederationEpochDescriptor, Error> {
        self.descriptor(self.epoch_number(number), indexer)
    }

    /// The federations peg-ins may use at `number`, newest first: the active
    /// one and those of the `total_valid_epochs - 1` epochs before it.
    pub fn valid_federations<I: SignalHistoryProvider>(
        &self,
        number: BlockNumber,
        indexer: &I,
    ) -> Result<Vec<FederationEpochDescriptor>, Error> {
        let current = self.epoch_number(number);
        let oldest = current.saturating_sub(self.consensus.total_valid_epochs() - 1);
        // The first lookup fills the store up to `current`.
        (oldest..=current)
            .rev()
            .map(|epoch| self.descriptor(epoch, indexer))
            .collect()
    }

    /// Whether a peg-in committed against `descriptor` is acceptable at
    /// `number`. Only the federation parameters are compared.
    pub fn is_federation_valid_at<I: SignalHistoryProvider>(
        &self,
        number: BlockNumber,
        descriptor: &FederationEpochDescriptor,
        indexer: &I,
    ) -> Result<bool, Error> {
        Ok(self
            .valid_federations(number, indexer)?
            .iter()
            .any(|valid| valid.params == descriptor.params))
    }

    /// Forgets the descriptors of the epochs after the one containing `number`,
    /// e.g. after a reorganization replaced the block at `number`.
    pub fn invalidate_from(&self, number: BlockNumber) {
        let keep = self.epoch_number(number).saturating_add(1);
        let mut descriptors = self.descriptors.write();
        descriptors.generation = descriptors.generation.wrapping_add(1);
        if let Ok(keep) = usize::try_from(keep) {
            // Epoch 0 is never derived from the chain.
            descriptors.epochs.truncate(keep.max(1));
        }
    }

    fn descriptor<I: SignalHistoryProvider>(
        &self,
        epoch: EpochNumber,
        indexer: &I,
    ) -> Result<FederationEpochDescriptor, Error> {
        let (generation, mut last) = {
            let descriptors = self.descriptors.read();
            if let Some(descriptor) = usize::try_from(epoch)
                .ok()
                .and_then(|index| descriptors.epochs.get(index))
            {
                trace_target!(LOG_TARGET, "epoch {} known", epoch);
                return Ok(descriptor.clone());
            }
            let last = descriptors
                .epochs
                .last()
                .cloned()
                .unwrap_or_else(|| first_descriptor(&self.consensus));
            (descriptors.generation, last)
        };

        let mut derived = Vec::new();
        let result = loop {
            if last.epoch == epoch {
                break Ok(last.clone());
            }
            match self.next_descriptor(&last, indexer) {
                Ok(next) => {
                    derived.push(next.clone());
                    last = next;
                }
                Err(err) => break Err(err),
            }
        };

        if !derived.is_empty() {
            let mut descriptors = self.descriptors.write();
            if descriptors.generation != generation {
                trace_target!(
                    LOG_TARGET,
                    "drop epochs derived for {}, invalidated meanwhile",
                    epoch
                );
            } else {
                // Another thread may have derived some of them meanwhile.
                for descriptor in derived {
                    if descriptor.epoch == descriptors.epochs.len() as u64 {
                        descriptors.epochs.push(descriptor);
                    }
                }
            }
        }
        result
    }

    fn next_descriptor<I: SignalHistoryProvider>(
        &self,
        previous: &FederationEpochDescriptor,
        indexer: &I,
    ) -> Result<FederationEpochDescriptor, Error> {
        let epoch = previous.epoch + 1;
        let start = self.epoch_start(epoch);
        let transition = indexer
            .epoch_transition(previous.epoch)
            .ok_or(QueryError::EpochTransitionUnavailable {
                epoch: previous.epoch,
            })?;
        let params = match transition {
            EpochTransition::Unchanged => previous.params.clone(),
            EpochTransition::Proposed(params) if params.is_full() => {
                if params != previous.params {
                    info_target!(
                        LOG_TARGET,
                        "federation rotates at epoch {} (height {}): signblock script {}",
                        epoch,
                        start,
                        params.signblock_script
                    );
                }
                params
            }
            EpochTransition::Proposed(params) => {
                warn_target!(
                    LOG_TARGET,
                    "ignore incomplete federation proposal of epoch {}: {:?}",
                    previous.epoch,
                    params
                );
                previous.params.clone()
            }
        };
        Ok(FederationEpochDescriptor::new(epoch, start, params))
    }
}
