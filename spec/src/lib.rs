//! # The Chain Specification
//!
//! A chain spec is a TOML file naming the chain, its genesis federation and
//! the consensus parameters which decide which rules are in force at every
//! height. [`ChainSpec::build_consensus`] validates it into an immutable
//! [`Consensus`](consensus::Consensus), which is then handed explicitly to
//! every component that needs it:
//!
//! - [`ThresholdStateCalculator`](versionbits::ThresholdStateCalculator) for the
//!   version bits deployments,
//! - [`FederationEpochResolver`](dynafed::FederationEpochResolver) for the
//!   federation of every epoch,
//! - [`ChainRuleActivationTable`](rules::ChainRuleActivationTable) for the
//!   full rule set of a block.
//!
//! Two chains are bundled, `dev` and `regtest`; any other chain is loaded with
//! [`ChainSpec::load_from_file`].

pub mod consensus;
pub mod dynafed;
pub mod error;
pub mod rules;
pub mod versionbits;

#[cfg(test)]
mod tests;

use crate::consensus::{Consensus, ConsensusBuilder, LegacyRuleHeights, PegParams, PowParams};
use crate::error::ConfigError;
use crate::versionbits::{Deployment, DeploymentPos};
use fedchain_error::Error;
use fedchain_types::core::{BlockNumber, Byte32, FederationParams, Script};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

const BUNDLED_SPECS: [(&str, &str); 2] = [
    ("dev", include_str!("../res/specs/dev.toml")),
    ("regtest", include_str!("../res/specs/regtest.toml")),
];

/// A chain spec file.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChainSpec {
    /// The chain name.
    pub name: String,
    /// The genesis federation.
    pub genesis: Genesis,
    /// Activation and federation parameters.
    pub params: Params,
    /// Proof-of-work parameters.
    #[serde(default)]
    pub pow: Pow,
}

/// The federation which signs the genesis block.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Genesis {
    /// Expected genesis block hash.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<Byte32>,
    pub signblock_script: Script,
    pub signblock_witness_limit: u32,
    pub fedpeg_program: Script,
    pub fedpeg_script: Script,
    #[serde(default)]
    pub extension_space: Vec<Script>,
}

/// Consensus parameters, unset ones take the defaults of
/// [`ConsensusBuilder`].
#[derive(Clone, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Params {
    /// Elements chain, as opposed to a Bitcoin-style one.
    #[serde(default)]
    pub elements_mode: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bip16_exception: Option<Byte32>,
    #[serde(default)]
    pub bip34_height: BlockNumber,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bip34_hash: Option<Byte32>,
    #[serde(default)]
    pub bip65_height: BlockNumber,
    #[serde(default)]
    pub bip66_height: BlockNumber,
    #[serde(default)]
    pub csv_height: BlockNumber,
    #[serde(default)]
    pub segwit_height: BlockNumber,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub miner_confirmation_window: Option<BlockNumber>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_change_activation_threshold: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_valid_epochs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subsidy_halving_interval: Option<BlockNumber>,
    #[serde(default)]
    pub signed_blocks: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_block_signature_size: Option<u32>,
    #[serde(default)]
    pub min_bip9_warning_height: BlockNumber,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum_chain_work: Option<Byte32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_assume_valid: Option<Byte32>,
    #[serde(default)]
    pub dynafed: Dynafed,
    #[serde(default)]
    pub peg: Peg,
    /// Keyed by deployment name.
    #[serde(default)]
    pub deployments: BTreeMap<String, DeploymentSpec>,
}

/// Dynamic federation switch.
#[derive(Clone, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Dynafed {
    #[serde(default)]
    pub enabled: bool,
    /// Blocks per epoch, unset is an infinite epoch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub epoch_length: Option<BlockNumber>,
    #[serde(default)]
    pub first_extension_space: Vec<Script>,
}

/// Parent chain parameters, see [`PegParams`].
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Peg {
    #[serde(default)]
    pub has_parent_chain: bool,
    pub parent_chain_pow_limit: Byte32,
    pub pegin_min_depth: u32,
    /// Empty for a proof-of-work parent chain.
    #[serde(default)]
    pub parent_chain_signblock_script: Script,
}

impl Default for Peg {
    fn default() -> Self {
        let params = PegParams::default();
        Peg {
            has_parent_chain: params.has_parent_chain,
            parent_chain_pow_limit: params.parent_chain_pow_limit,
            pegin_min_depth: params.pegin_min_depth,
            parent_chain_signblock_script: params.parent_chain_signblock_script,
        }
    }
}

impl From<&Peg> for PegParams {
    fn from(peg: &Peg) -> Self {
        PegParams {
            has_parent_chain: peg.has_parent_chain,
            parent_chain_pow_limit: peg.parent_chain_pow_limit,
            pegin_min_depth: peg.pegin_min_depth,
            parent_chain_signblock_script: peg.parent_chain_signblock_script.clone(),
        }
    }
}

/// One version bits deployment.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeploymentSpec {
    pub bit: u8,
    pub start: DeploymentStart,
    /// Unset never times out.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<BlockNumber>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<BlockNumber>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<u64>,
}

/// A start height, or `"always"` / `"never"`.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DeploymentStart {
    Height(BlockNumber),
    Mode(ForcedMode),
}

/// Deployments which skip the state machine.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForcedMode {
    Always,
    Never,
}

/// Proof-of-work parameters, see [`PowParams`].
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Pow {
    pub limit: Byte32,
    pub target_spacing: u64,
    pub target_timespan: u64,
    #[serde(default)]
    pub allow_min_difficulty_blocks: bool,
    #[serde(default)]
    pub no_retargeting: bool,
}

impl Default for Pow {
    fn default() -> Self {
        PowParams::default().into()
    }
}

impl From<PowParams> for Pow {
    fn from(params: PowParams) -> Self {
        Pow {
            limit: params.limit,
            target_spacing: params.target_spacing,
            target_timespan: params.target_timespan,
            allow_min_difficulty_blocks: params.allow_min_difficulty_blocks,
            no_retargeting: params.no_retargeting,
        }
    }
}

impl From<&Pow> for PowParams {
    fn from(pow: &Pow) -> Self {
        PowParams {
            limit: pow.limit,
            target_spacing: pow.target_spacing,
            target_timespan: pow.target_timespan,
            allow_min_difficulty_blocks: pow.allow_min_difficulty_blocks,
            no_retargeting: pow.no_retargeting,
        }
    }
}

impl DeploymentSpec {
    fn to_deployment(&self) -> Deployment {
        let timeout = self.timeout.unwrap_or(Deployment::NO_TIMEOUT);
        let deployment = match self.start {
            DeploymentStart::Height(start) => Deployment::new(self.bit, start, timeout),
            DeploymentStart::Mode(ForcedMode::Always) => Deployment::always_active(self.bit),
            DeploymentStart::Mode(ForcedMode::Never) => Deployment::never_active(self.bit),
        };
        Deployment {
            period: self.period,
            threshold: self.threshold,
            ..deployment
        }
    }
}

impl ChainSpec {
    /// Parses a chain spec.
    pub fn load_from_str(text: &str) -> Result<ChainSpec, Error> {
        toml::from_str(text).map_err(|err| ConfigError::Toml(err.to_string()).into())
    }

    /// Reads and parses a chain spec file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<ChainSpec, Error> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|err| ConfigError::ReadFile {
            path: path.display().to_string(),
            reason: err.to_string(),
        })?;
        Self::load_from_str(&text)
    }

    /// Loads one of the chain specs shipped with this crate.
    pub fn load_bundled(name: &str) -> Result<ChainSpec, Error> {
        let (_, text) = BUNDLED_SPECS
            .iter()
            .find(|(bundled, _)| *bundled == name)
            .ok_or_else(|| ConfigError::UnknownChain(name.to_owned()))?;
        Self::load_from_str(text)
    }

    /// Names of the bundled chain specs.
    pub fn bundled_names() -> impl Iterator<Item = &'static str> {
        BUNDLED_SPECS.iter().map(|(name, _)| *name)
    }

    /// The federation which signs the genesis block.
    pub fn genesis_federation(&self) -> FederationParams {
        FederationParams {
            signblock_script: self.genesis.signblock_script.clone(),
            signblock_witness_limit: self.genesis.signblock_witness_limit,
            fedpeg_program: self.genesis.fedpeg_program.clone(),
            fedpeg_script: self.genesis.fedpeg_script.clone(),
            extension_space: self.genesis.extension_space.clone(),
        }
    }

    /// Validates the spec into a [`Consensus`].
    pub fn build_consensus(&self) -> Result<Consensus, Error> {
        let params = &self.params;
        let mut deployments = BTreeMap::new();
        for (name, spec) in &params.deployments {
            let pos: DeploymentPos = name.parse()?;
            deployments.insert(pos, spec.to_deployment());
        }

        let mut builder = ConsensusBuilder::new(self.genesis_federation())
            .id(self.name.clone())
            .elements_mode(params.elements_mode)
            .genesis_hash(self.genesis.hash)
            .legacy_rules(LegacyRuleHeights {
                bip16_exception: params.bip16_exception,
                bip34_height: params.bip34_height,
                bip34_hash: params.bip34_hash,
                bip65_height: params.bip65_height,
                bip66_height: params.bip66_height,
                csv_height: params.csv_height,
                segwit_height: params.segwit_height,
            })
            .signed_blocks(params.signed_blocks)
            .dynamic_federation(params.dynafed.enabled)
            .dynamic_epoch_length(params.dynafed.epoch_length)
            .first_extension_space(params.dynafed.first_extension_space.clone())
            .softfork_deployments(deployments)
            .pow((&self.pow).into())
            .min_bip9_warning_height(params.min_bip9_warning_height)
            .default_assume_valid(params.default_assume_valid)
            .peg((&params.peg).into());

        if let Some(window) = params.miner_confirmation_window {
            builder = builder.miner_confirmation_window(window);
        }
        if let Some(threshold) = params.rule_change_activation_threshold {
            builder = builder.rule_change_activation_threshold(threshold);
        }
        if let Some(total_valid_epochs) = params.total_valid_epochs {
            builder = builder.total_valid_epochs(total_valid_epochs);
        }
        if let Some(interval) = params.subsidy_halving_interval {
            builder = builder.subsidy_halving_interval(interval);
        }
        if let Some(size) = params.max_block_signature_size {
            builder = builder.max_block_signature_size(size);
        }
        if let Some(work) = params.minimum_chain_work {
            builder = builder.minimum_chain_work(work);
        }

        builder.build()
    }
}
