use crate::versionbits::DeploymentPos;
use fedchain_error::{prelude::*, Error, ErrorKind};
use fedchain_types::core::{BlockNumber, EpochNumber};

/// Inconsistent chain parameters, found while building the consensus.
///
/// Any of these halts node startup.
#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum ConfigError {
    /// The chain spec file could not be read.
    #[error("ReadFile({path}): {reason}")]
    ReadFile {
        /// The path of the file
        path: String,
        /// The io error message
        reason: String,
    },

    /// The chain spec is not valid TOML or misses a field.
    #[error("Toml: {0}")]
    Toml(String),

    /// No bundled chain spec has this name.
    #[error("UnknownChain: {0}")]
    UnknownChain(String),

    /// A deployment table names a deployment this node does not know.
    #[error("UnknownDeployment: {0}")]
    UnknownDeployment(String),

    /// At least the current epoch's federation must stay valid.
    #[error("ZeroValidEpochs")]
    ZeroValidEpochs,

    /// Dynamic federation needs epochs of at least one block.
    #[error("ZeroEpochLength")]
    ZeroEpochLength,

    /// The chain-wide confirmation window is empty.
    #[error("ZeroConfirmationWindow")]
    ZeroConfirmationWindow,

    /// The chain-wide activation threshold is zero or larger than the window.
    #[error("InvalidActivationThreshold(threshold: {threshold}, window: {window})")]
    InvalidActivationThreshold {
        /// The configured threshold
        threshold: u64,
        /// The configured confirmation window
        window: BlockNumber,
    },

    /// Proof-of-work target spacing must be non-zero.
    #[error("ZeroPowTargetSpacing")]
    ZeroPowTargetSpacing,

    /// A deployment's bit is outside the version bits range.
    #[error("BitOutOfRange({id}: {bit})")]
    BitOutOfRange {
        /// The deployment
        id: DeploymentPos,
        /// The configured bit
        bit: u8,
    },

    /// A deployment's window override is zero.
    #[error("ZeroPeriod({id})")]
    ZeroPeriod {
        /// The deployment
        id: DeploymentPos,
    },

    /// A deployment's threshold override is zero.
    #[error("ZeroThreshold({id})")]
    ZeroThreshold {
        /// The deployment
        id: DeploymentPos,
    },

    /// A deployment could never lock in since its threshold exceeds its window.
    #[error("ThresholdExceedsPeriod({id}: threshold {threshold}, period {period})")]
    ThresholdExceedsPeriod {
        /// The deployment
        id: DeploymentPos,
        /// The effective threshold
        threshold: u64,
        /// The effective window length
        period: BlockNumber,
    },

    /// A deployment times out before it starts.
    #[error("TimeoutBeforeStart({id}: start {start}, timeout {timeout})")]
    TimeoutBeforeStart {
        /// The deployment
        id: DeploymentPos,
        /// The start height
        start: BlockNumber,
        /// The timeout height
        timeout: BlockNumber,
    },

    /// Two deployments which can signal at the same time share a bit.
    #[error("DuplicateBitInUse(bit {bit}: {first} and {second})")]
    DuplicateBitInUse {
        /// The shared bit
        bit: u8,
        /// One deployment
        first: DeploymentPos,
        /// The other deployment
        second: DeploymentPos,
    },
}

/// A query for history the caller has not finalized yet.
///
/// It is a programmer error; retrying with the same arguments cannot succeed.
#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum QueryError {
    /// The signalling bits of the block are not available.
    #[error("SignalUnavailable({number})")]
    SignalUnavailable {
        /// The block number
        number: BlockNumber,
    },

    /// The hash of the block is not available.
    #[error("BlockHashUnavailable({number})")]
    BlockHashUnavailable {
        /// The block number
        number: BlockNumber,
    },

    /// The epoch has not elapsed yet, so its transition is unknown.
    #[error("EpochTransitionUnavailable({epoch})")]
    EpochTransitionUnavailable {
        /// The epoch number
        epoch: EpochNumber,
    },

    /// The deployment is not configured on this chain.
    #[error("UnknownDeployment({0})")]
    UnknownDeployment(DeploymentPos),
}

impl_error_conversion_with_kind!(ConfigError, ErrorKind::Config, Error);
impl_error_conversion_with_kind!(QueryError, ErrorKind::Query, Error);
