use crate::dynafed::{DynamicFederation, FederationMode};
use crate::error::ConfigError;
use crate::versionbits::{ActiveMode, Deployment, DeploymentPos, VERSIONBITS_NUM_BITS};
use fedchain_error::Error;
use fedchain_logger::info;
use fedchain_types::core::{BlockNumber, Byte32, FederationParams, Script};
use std::collections::BTreeMap;
use std::ops::Range;

// Bitcoin's 2 weeks of 10 minute blocks.
pub(crate) const DEFAULT_MINER_CONFIRMATION_WINDOW: BlockNumber = 2016;
// 95% of the window.
pub(crate) const DEFAULT_RULE_CHANGE_ACTIVATION_THRESHOLD: u64 = 1916;
pub(crate) const DEFAULT_TOTAL_VALID_EPOCHS: u64 = 1;
pub(crate) const DEFAULT_POW_TARGET_SPACING: u64 = 60; // 1 minute
pub(crate) const DEFAULT_POW_TARGET_TIMESPAN: u64 = 14 * 24 * 60 * 60; // 2 weeks
pub(crate) const DEFAULT_SUBSIDY_HALVING_INTERVAL: BlockNumber = 150;
// A DER encoded signature plus the sighash byte and a push.
pub(crate) const DEFAULT_MAX_BLOCK_SIGNATURE_SIZE: u32 = 74;
// Parent chain confirmations before a peg-in can be claimed.
pub(crate) const DEFAULT_PEGIN_MIN_DEPTH: u32 = 8;

// The easiest target, as on Bitcoin's regtest.
const DEFAULT_POW_LIMIT: [u8; 32] = {
    let mut limit = [0xff; 32];
    limit[0] = 0x7f;
    limit
};

/// Proof-of-work parameters.
///
/// They are only carried for the header validation, nothing in this crate
/// evaluates them.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct PowParams {
    /// The easiest allowed target.
    pub limit: Byte32,
    /// Expected seconds between blocks.
    pub target_spacing: u64,
    /// Seconds covered by one difficulty adjustment.
    pub target_timespan: u64,
    /// Test networks may accept minimum difficulty blocks after a long gap.
    pub allow_min_difficulty_blocks: bool,
    /// Keep the difficulty constant.
    pub no_retargeting: bool,
}

impl Default for PowParams {
    fn default() -> Self {
        PowParams {
            limit: Byte32::new(DEFAULT_POW_LIMIT),
            target_spacing: DEFAULT_POW_TARGET_SPACING,
            target_timespan: DEFAULT_POW_TARGET_TIMESPAN,
            allow_min_difficulty_blocks: false,
            no_retargeting: false,
        }
    }
}

/// Parameters of the parent chain peg-ins come from.
///
/// Carried for the peg-in validation, nothing in this crate evaluates them.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct PegParams {
    /// Whether peg-ins from a parent chain are possible at all.
    pub has_parent_chain: bool,
    /// The easiest target of parent chain headers.
    pub parent_chain_pow_limit: Byte32,
    /// Parent chain confirmations a peg-in needs.
    pub pegin_min_depth: u32,
    /// Signing script of a signed parent chain, empty if it uses proof-of-work.
    pub parent_chain_signblock_script: Script,
}

impl PegParams {
    /// Parent chain headers carry proof-of-work instead of a signature.
    pub fn parent_chain_has_pow(&self) -> bool {
        self.parent_chain_signblock_script.is_empty()
    }
}

impl Default for PegParams {
    fn default() -> Self {
        PegParams {
            has_parent_chain: false,
            parent_chain_pow_limit: Byte32::new(DEFAULT_POW_LIMIT),
            pegin_min_depth: DEFAULT_PEGIN_MIN_DEPTH,
            parent_chain_signblock_script: Script::default(),
        }
    }
}

/// Heights at which the legacy soft forks are enforced.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct LegacyRuleHeights {
    /// The one block which is allowed to violate P2SH.
    pub bip16_exception: Option<Byte32>,
    /// Height in coinbase.
    pub bip34_height: BlockNumber,
    /// Hash of the block at `bip34_height`, pins the chain BIP34 activated on.
    pub bip34_hash: Option<Byte32>,
    /// `OP_CHECKLOCKTIMEVERIFY`.
    pub bip65_height: BlockNumber,
    /// Strict DER signatures.
    pub bip66_height: BlockNumber,
    /// `OP_CHECKSEQUENCEVERIFY` and relative lock time.
    pub csv_height: BlockNumber,
    /// Segregated witness.
    pub segwit_height: BlockNumber,
}

/// Builds a [`Consensus`], validating every parameter.
pub struct ConsensusBuilder {
    inner: Consensus,
    dynamic_federation: bool,
    dynamic_epoch_length: Option<BlockNumber>,
    first_extension_space: Vec<Script>,
}

impl Default for ConsensusBuilder {
    fn default() -> Self {
        ConsensusBuilder::new(FederationParams::default())
    }
}

impl ConsensusBuilder {
    /// A builder for a chain whose blocks are signed by `genesis_federation`
    /// until a dynamic federation rotates it.
    pub fn new(genesis_federation: FederationParams) -> Self {
        ConsensusBuilder {
            inner: Consensus {
                id: "dev".to_owned(),
                elements_mode: false,
                genesis_hash: None,
                genesis_federation,
                federation_mode: FederationMode::Static,
                total_valid_epochs: DEFAULT_TOTAL_VALID_EPOCHS,
                legacy_rules: LegacyRuleHeights::default(),
                miner_confirmation_window: DEFAULT_MINER_CONFIRMATION_WINDOW,
                rule_change_activation_threshold: DEFAULT_RULE_CHANGE_ACTIVATION_THRESHOLD,
                deployments: BTreeMap::new(),
                pow: PowParams::default(),
                subsidy_halving_interval: DEFAULT_SUBSIDY_HALVING_INTERVAL,
                signed_blocks: false,
                max_block_signature_size: DEFAULT_MAX_BLOCK_SIGNATURE_SIZE,
                min_bip9_warning_height: 0,
                minimum_chain_work: Byte32::zero(),
                default_assume_valid: None,
                peg: PegParams::default(),
            },
            dynamic_federation: false,
            dynamic_epoch_length: None,
            first_extension_space: Vec::new(),
        }
    }

    /// Validates the parameters and freezes them.
    pub fn build(mut self) -> Result<Consensus, Error> {
        let window = self.inner.miner_confirmation_window;
        let threshold = self.inner.rule_change_activation_threshold;
        if window == 0 {
            return Err(ConfigError::ZeroConfirmationWindow.into());
        }
        if threshold == 0 || threshold > window {
            return Err(ConfigError::InvalidActivationThreshold { threshold, window }.into());
        }
        if self.inner.pow.target_spacing == 0 {
            return Err(ConfigError::ZeroPowTargetSpacing.into());
        }
        if self.inner.total_valid_epochs == 0 {
            return Err(ConfigError::ZeroValidEpochs.into());
        }

        for (id, deployment) in &self.inner.deployments {
            self.inner.check_deployment(*id, deployment)?;
        }
        let signalling: Vec<_> = self
            .inner
            .deployments
            .iter()
            .filter_map(|(id, deployment)| {
                self.inner
                    .signalling_heights(deployment)
                    .map(|heights| (*id, deployment.bit, heights))
            })
            .collect();
        for (i, (first, bit, heights)) in signalling.iter().enumerate() {
            if let Some((second, _, _)) = signalling[i + 1..]
                .iter()
                .find(|(_, other_bit, other)| other_bit == bit && overlap(heights, other))
            {
                return Err(ConfigError::DuplicateBitInUse {
                    bit: *bit,
                    first: *first,
                    second: *second,
                }
                .into());
            }
        }

        if self.dynamic_federation {
            self.inner.federation_mode = match self.dynamic_epoch_length {
                // Bitcoin-style chains have no federation to rotate.
                _ if !self.inner.elements_mode => {
                    info!(
                        "{}: dynamic federation needs elements mode, using the genesis federation",
                        self.inner.id
                    );
                    FederationMode::Static
                }
                Some(0) => return Err(ConfigError::ZeroEpochLength.into()),
                Some(epoch_length) => FederationMode::Dynamic(DynamicFederation {
                    epoch_length,
                    first_extension_space: self.first_extension_space,
                }),
                None => {
                    info!(
                        "{}: dynamic federation has no epoch length, using the genesis federation",
                        self.inner.id
                    );
                    FederationMode::Static
                }
            };
        }

        Ok(self.inner)
    }

    /// Sets the chain name.
    #[must_use]
    pub fn id(mut self, id: String) -> Self {
        self.inner.id = id;
        self
    }

    /// Marks an Elements chain, as opposed to a Bitcoin-style one.
    #[must_use]
    pub fn elements_mode(mut self, elements_mode: bool) -> Self {
        self.inner.elements_mode = elements_mode;
        self
    }

    /// Pins the genesis block hash.
    #[must_use]
    pub fn genesis_hash(mut self, genesis_hash: Option<Byte32>) -> Self {
        self.inner.genesis_hash = genesis_hash;
        self
    }

    /// Replaces the genesis federation.
    #[must_use]
    pub fn genesis_federation(mut self, params: FederationParams) -> Self {
        self.inner.genesis_federation = params;
        self
    }

    /// Enables rotating federations; only takes effect in
    /// [`elements_mode`](Self::elements_mode) with a finite
    /// [`dynamic_epoch_length`](Self::dynamic_epoch_length).
    #[must_use]
    pub fn dynamic_federation(mut self, enabled: bool) -> Self {
        self.dynamic_federation = enabled;
        self
    }

    /// `None` is an infinite epoch.
    #[must_use]
    pub fn dynamic_epoch_length(mut self, epoch_length: Option<BlockNumber>) -> Self {
        self.dynamic_epoch_length = epoch_length;
        self
    }

    /// Extension space of the first dynamic epoch.
    #[must_use]
    pub fn first_extension_space(mut self, extension_space: Vec<Script>) -> Self {
        self.first_extension_space = extension_space;
        self
    }

    /// Epochs a federation stays valid for peg-ins, the current one included.
    #[must_use]
    pub fn total_valid_epochs(mut self, total_valid_epochs: u64) -> Self {
        self.inner.total_valid_epochs = total_valid_epochs;
        self
    }

    /// Sets the legacy soft fork heights.
    #[must_use]
    pub fn legacy_rules(mut self, legacy_rules: LegacyRuleHeights) -> Self {
        self.inner.legacy_rules = legacy_rules;
        self
    }

    /// Sets the chain-wide confirmation window.
    #[must_use]
    pub fn miner_confirmation_window(mut self, window: BlockNumber) -> Self {
        self.inner.miner_confirmation_window = window;
        self
    }

    /// Sets the chain-wide activation threshold.
    #[must_use]
    pub fn rule_change_activation_threshold(mut self, threshold: u64) -> Self {
        self.inner.rule_change_activation_threshold = threshold;
        self
    }

    /// Replaces the version bits deployments.
    #[must_use]
    pub fn softfork_deployments(mut self, deployments: BTreeMap<DeploymentPos, Deployment>) -> Self {
        self.inner.deployments = deployments;
        self
    }

    /// Sets the proof-of-work parameters.
    #[must_use]
    pub fn pow(mut self, pow: PowParams) -> Self {
        self.inner.pow = pow;
        self
    }

    /// Blocks between two subsidy halvings.
    #[must_use]
    pub fn subsidy_halving_interval(mut self, interval: BlockNumber) -> Self {
        self.inner.subsidy_halving_interval = interval;
        self
    }

    /// Blocks carry a federation signature instead of proof-of-work.
    #[must_use]
    pub fn signed_blocks(mut self, signed_blocks: bool) -> Self {
        self.inner.signed_blocks = signed_blocks;
        self
    }

    /// Maximum size of a block signature.
    #[must_use]
    pub fn max_block_signature_size(mut self, size: u32) -> Self {
        self.inner.max_block_signature_size = size;
        self
    }

    /// Unknown version bits below this height are not warned about.
    #[must_use]
    pub fn min_bip9_warning_height(mut self, height: BlockNumber) -> Self {
        self.inner.min_bip9_warning_height = height;
        self
    }

    /// Sets the least total work the best chain must have.
    #[must_use]
    pub fn minimum_chain_work(mut self, work: Byte32) -> Self {
        self.inner.minimum_chain_work = work;
        self
    }

    /// Signatures in the ancestors of this block are assumed valid.
    #[must_use]
    pub fn default_assume_valid(mut self, hash: Option<Byte32>) -> Self {
        self.inner.default_assume_valid = hash;
        self
    }

    /// Sets the parent chain parameters.
    #[must_use]
    pub fn peg(mut self, peg: PegParams) -> Self {
        self.inner.peg = peg;
        self
    }
}

fn overlap(a: &Range<BlockNumber>, b: &Range<BlockNumber>) -> bool {
    !a.is_empty() && !b.is_empty() && a.start < b.end && b.start < a.end
}

/// The consensus parameters of one chain.
///
/// Immutable once built, share it as `Arc<Consensus>`.
#[derive(Clone, Debug)]
pub struct Consensus {
    id: String,
    elements_mode: bool,
    genesis_hash: Option<Byte32>,
    genesis_federation: FederationParams,
    federation_mode: FederationMode,
    // How many epochs a rotated out federation stays valid for peg-ins,
    // including the current one.
    total_valid_epochs: u64,
    legacy_rules: LegacyRuleHeights,
    miner_confirmation_window: BlockNumber,
    rule_change_activation_threshold: u64,
    deployments: BTreeMap<DeploymentPos, Deployment>,
    pow: PowParams,
    subsidy_halving_interval: BlockNumber,
    // Blocks carry a signature of the federation instead of proof-of-work.
    signed_blocks: bool,
    max_block_signature_size: u32,
    min_bip9_warning_height: BlockNumber,
    minimum_chain_work: Byte32,
    default_assume_valid: Option<Byte32>,
    peg: PegParams,
}

impl Consensus {
    fn check_deployment(&self, id: DeploymentPos, deployment: &Deployment) -> Result<(), Error> {
        if deployment.bit >= VERSIONBITS_NUM_BITS {
            return Err(ConfigError::BitOutOfRange {
                id,
                bit: deployment.bit,
            }
            .into());
        }
        if deployment.period == Some(0) {
            return Err(ConfigError::ZeroPeriod { id }.into());
        }
        if deployment.threshold == Some(0) {
            return Err(ConfigError::ZeroThreshold { id }.into());
        }
        let (period, threshold) = (
            self.deployment_period(deployment),
            self.deployment_threshold(deployment),
        );
        if threshold > period {
            return Err(ConfigError::ThresholdExceedsPeriod {
                id,
                threshold,
                period,
            }
            .into());
        }
        if deployment.active_mode == ActiveMode::Normal && deployment.timeout <= deployment.start {
            return Err(ConfigError::TimeoutBeforeStart {
                id,
                start: deployment.start,
                timeout: deployment.timeout,
            }
            .into());
        }
        Ok(())
    }

    // Heights whose blocks may set the bit of a deployment: from its first
    // started window to the end of the last window it can be locked in.
    fn signalling_heights(&self, deployment: &Deployment) -> Option<Range<BlockNumber>> {
        if deployment.active_mode != ActiveMode::Normal {
            return None;
        }
        let period = self.deployment_period(deployment);
        let boundary = |height: BlockNumber| height.div_ceil(period).saturating_mul(period);
        Some(boundary(deployment.start)..boundary(deployment.timeout))
    }

    /// The chain name.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether this is an Elements chain.
    pub fn elements_mode(&self) -> bool {
        self.elements_mode
    }

    /// The genesis block hash, if pinned by the chain spec.
    pub fn genesis_hash(&self) -> Option<&Byte32> {
        self.genesis_hash.as_ref()
    }

    /// The federation which signs the genesis block.
    pub fn genesis_federation(&self) -> &FederationParams {
        &self.genesis_federation
    }

    pub fn federation_mode(&self) -> &FederationMode {
        &self.federation_mode
    }

    pub fn total_valid_epochs(&self) -> u64 {
        self.total_valid_epochs
    }

    pub fn legacy_rules(&self) -> &LegacyRuleHeights {
        &self.legacy_rules
    }

    /// The chain-wide confirmation window.
    pub fn miner_confirmation_window(&self) -> BlockNumber {
        self.miner_confirmation_window
    }

    /// The chain-wide activation threshold.
    pub fn rule_change_activation_threshold(&self) -> u64 {
        self.rule_change_activation_threshold
    }

    pub fn deployments(&self) -> &BTreeMap<DeploymentPos, Deployment> {
        &self.deployments
    }

    pub fn deployment(&self, pos: DeploymentPos) -> Option<&Deployment> {
        self.deployments.get(&pos)
    }

    /// The window the deployment is evaluated over.
    pub fn deployment_period(&self, deployment: &Deployment) -> BlockNumber {
        deployment.period.unwrap_or(self.miner_confirmation_window)
    }

    /// The signalling blocks the deployment needs per window.
    pub fn deployment_threshold(&self, deployment: &Deployment) -> u64 {
        deployment
            .threshold
            .unwrap_or(self.rule_change_activation_threshold)
    }

    pub fn pow(&self) -> &PowParams {
        &self.pow
    }

    /// Blocks between two difficulty adjustments.
    pub fn difficulty_adjustment_interval(&self) -> BlockNumber {
        self.pow.target_timespan / self.pow.target_spacing
    }

    pub fn subsidy_halving_interval(&self) -> BlockNumber {
        self.subsidy_halving_interval
    }

    pub fn signed_blocks(&self) -> bool {
        self.signed_blocks
    }

    pub fn max_block_signature_size(&self) -> u32 {
        self.max_block_signature_size
    }

    pub fn min_bip9_warning_height(&self) -> BlockNumber {
        self.min_bip9_warning_height
    }

    pub fn minimum_chain_work(&self) -> &Byte32 {
        &self.minimum_chain_work
    }

    pub fn default_assume_valid(&self) -> Option<&Byte32> {
        self.default_assume_valid.as_ref()
    }

    /// The parent chain parameters.
    pub fn peg(&self) -> &PegParams {
        &self.peg
    }
}
