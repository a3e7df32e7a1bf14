use crate::error::QueryError;
use crate::versionbits::{DeploymentPos, ThresholdState, ThresholdStateCalculator};
use fedchain_error::Error;
use fedchain_traits::SignalHistoryProvider;
use fedchain_types::core::{BlockNumber, Byte32};
use std::collections::BTreeMap;

/// The consensus rules a block is validated against.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct RuleSet {
    /// BIP16, pay to script hash.
    pub p2sh: bool,
    /// BIP34, the coinbase starts with the block height.
    pub height_in_coinbase: bool,
    /// BIP65, `OP_CHECKLOCKTIMEVERIFY`.
    pub check_lock_time_verify: bool,
    /// BIP66, strict DER signatures.
    pub strict_der: bool,
    /// BIP68, BIP112 and BIP113.
    pub check_sequence_verify: bool,
    /// BIP141, BIP143 and BIP147.
    pub segwit: bool,
    /// Whether each configured deployment is active.
    pub deployments: BTreeMap<DeploymentPos, bool>,
}

impl RuleSet {
    /// `false` for deployments the chain does not configure.
    pub fn is_deployment_active(&self, pos: DeploymentPos) -> bool {
        self.deployments.get(&pos).copied().unwrap_or(false)
    }
}

/// Combines the fixed activation heights with the version bits deployments.
///
/// Nothing is cached here, the expensive part is cached by the calculator.
pub struct ChainRuleActivationTable<'a> {
    versionbits: &'a ThresholdStateCalculator,
}

impl<'a> ChainRuleActivationTable<'a> {
    pub fn new(versionbits: &'a ThresholdStateCalculator) -> Self {
        ChainRuleActivationTable { versionbits }
    }

    /// The rules of the block at `number`; its hash is read from `indexer`
    /// when the chain has a BIP16 exception.
    pub fn active_rules<I: SignalHistoryProvider>(
        &self,
        number: BlockNumber,
        indexer: &I,
    ) -> Result<RuleSet, Error> {
        let hash = match self.versionbits.consensus().legacy_rules().bip16_exception {
            Some(_) => Some(
                indexer
                    .block_hash(number)
                    .ok_or(QueryError::BlockHashUnavailable { number })?,
            ),
            None => None,
        };
        self.rules(number, hash.as_ref(), indexer)
    }

    /// The rules of the block `hash` at `number`, for blocks not yet known to
    /// `indexer`.
    pub fn active_rules_for_block<I: SignalHistoryProvider>(
        &self,
        number: BlockNumber,
        hash: &Byte32,
        indexer: &I,
    ) -> Result<RuleSet, Error> {
        self.rules(number, Some(hash), indexer)
    }

    fn rules<I: SignalHistoryProvider>(
        &self,
        number: BlockNumber,
        hash: Option<&Byte32>,
        indexer: &I,
    ) -> Result<RuleSet, Error> {
        let consensus = self.versionbits.consensus();
        let heights = consensus.legacy_rules();
        let p2sh = match (&heights.bip16_exception, hash) {
            (Some(exception), Some(hash)) => exception != hash,
            _ => true,
        };

        let mut deployments = BTreeMap::new();
        for pos in consensus.deployments().keys() {
            let state = self.versionbits.state(*pos, number, indexer)?;
            deployments.insert(*pos, state == ThresholdState::Active);
        }

        Ok(RuleSet {
            p2sh,
            height_in_coinbase: number >= heights.bip34_height,
            check_lock_time_verify: number >= heights.bip65_height,
            strict_der: number >= heights.bip66_height,
            check_sequence_verify: number >= heights.csv_height,
            segwit: number >= heights.segwit_height,
            deployments,
        })
    }
}
