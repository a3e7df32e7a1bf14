//! Soft fork activation through version bits signalling.
//!
//! Each deployment runs the threshold state machine over consecutive
//! confirmation windows of its own length. The state of a window is decided at
//! the window's first block from the state of the previous window and the
//! number of signalling blocks in it, so it only ever has to be computed once
//! per window; [`VersionbitsCache`] keeps the computed windows.

use crate::consensus::Consensus;
use crate::error::{ConfigError, QueryError};
use fedchain_error::Error;
use fedchain_logger::{debug_target, trace_target};
use fedchain_traits::SignalHistoryProvider;
use fedchain_types::core::{BlockNumber, Version};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

const LOG_TARGET: &str = "versionbits";

/// What block versions will have set in their top bits after version bits
/// signalling is in use.
pub const VERSIONBITS_TOP_BITS: Version = 0x20000000;
/// What bitmask determines whether version bits is in use.
pub const VERSIONBITS_TOP_MASK: Version = 0xE0000000;
/// Total bits available for version bits.
pub const VERSIONBITS_NUM_BITS: u8 = 29;

/// Whether a header version signals for `bit`.
pub fn version_signals(version: Version, bit: u8) -> bool {
    bit < VERSIONBITS_NUM_BITS
        && (version & VERSIONBITS_TOP_MASK) == VERSIONBITS_TOP_BITS
        && (version >> bit) & 1 == 1
}

/// The states of a deployment.
///
/// `Defined -> Started -> (LockedIn -> Active) | Failed`, the last two are final.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum ThresholdState {
    /// First state that each soft fork starts out as.
    Defined,
    /// For windows past the start height.
    Started,
    /// For one window after the first window with `Started` blocks of which at
    /// least threshold have the associated bit set in version.
    LockedIn,
    /// For all blocks after the `LockedIn` window (final state).
    Active,
    /// For all blocks once the first window at or after the timeout height is
    /// hit, if `LockedIn` wasn't already reached (final state).
    Failed,
}

impl ThresholdState {
    /// `Active` and `Failed` never change again.
    pub fn is_final(self) -> bool {
        matches!(self, ThresholdState::Active | ThresholdState::Failed)
    }

    /// The lower case name used in logs and status reports.
    pub fn as_str(self) -> &'static str {
        match self {
            ThresholdState::Defined => "defined",
            ThresholdState::Started => "started",
            ThresholdState::LockedIn => "locked_in",
            ThresholdState::Active => "active",
            ThresholdState::Failed => "failed",
        }
    }
}

impl fmt::Display for ThresholdState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a deployment is activated.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ActiveMode {
    /// Run the threshold state machine.
    Normal,
    /// Active from genesis, skip the state machine.
    Always,
    /// Never active, skip the state machine.
    Never,
}

/// Soft fork deployment identifiers.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash, PartialOrd, Ord)]
pub enum DeploymentPos {
    /// Dummy for testing
    Testdummy,
    /// Schnorr signatures and Taproot
    Taproot,
    /// Dynamic federations
    DynaFed,
}

impl DeploymentPos {
    /// Every known deployment.
    pub const ALL: [DeploymentPos; 3] = [
        DeploymentPos::Testdummy,
        DeploymentPos::Taproot,
        DeploymentPos::DynaFed,
    ];

    /// The name used in chain spec files.
    pub fn name(self) -> &'static str {
        match self {
            DeploymentPos::Testdummy => "testdummy",
            DeploymentPos::Taproot => "taproot",
            DeploymentPos::DynaFed => "dynafed",
        }
    }
}

impl fmt::Display for DeploymentPos {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DeploymentPos {
    type Err = ConfigError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        DeploymentPos::ALL
            .iter()
            .find(|pos| pos.name() == name)
            .copied()
            .ok_or_else(|| ConfigError::UnknownDeployment(name.to_owned()))
    }
}

/// Struct for each individual consensus rule change using version bits.
///
/// `start` and `timeout` are block heights.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Deployment {
    /// Bit position to select the particular bit in version.
    pub bit: u8,
    /// First height at which signalling may begin.
    pub start: BlockNumber,
    /// Height at which an unfinished attempt fails.
    pub timeout: BlockNumber,
    /// Whether the state machine runs at all.
    pub active_mode: ActiveMode,
    /// Overrides the chain-wide confirmation window.
    pub period: Option<BlockNumber>,
    /// Overrides the chain-wide activation threshold.
    pub threshold: Option<u64>,
}

impl Deployment {
    /// Timeout of a deployment attempt which never expires.
    pub const NO_TIMEOUT: BlockNumber = BlockNumber::MAX;

    /// A deployment signalled on `bit` between `start` and `timeout`.
    pub fn new(bit: u8, start: BlockNumber, timeout: BlockNumber) -> Self {
        Deployment {
            bit,
            start,
            timeout,
            active_mode: ActiveMode::Normal,
            period: None,
            threshold: None,
        }
    }

    /// A deployment which is active from genesis.
    pub fn always_active(bit: u8) -> Self {
        Deployment {
            active_mode: ActiveMode::Always,
            ..Deployment::new(bit, 0, Self::NO_TIMEOUT)
        }
    }

    /// A deployment which is never active.
    pub fn never_active(bit: u8) -> Self {
        Deployment {
            active_mode: ActiveMode::Never,
            ..Deployment::new(bit, 0, Self::NO_TIMEOUT)
        }
    }

    /// Sets the window length override.
    #[must_use]
    pub fn with_period(mut self, period: BlockNumber) -> Self {
        self.period = Some(period);
        self
    }

    /// Sets the threshold override.
    #[must_use]
    pub fn with_threshold(mut self, threshold: u64) -> Self {
        self.threshold = Some(threshold);
        self
    }
}

/// Signalling progress of the window a block belongs to.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct DeploymentStats {
    /// Length of the window.
    pub period: BlockNumber,
    /// Signalling blocks required to lock in.
    pub threshold: u64,
    /// Blocks of the window before the queried block.
    pub elapsed: BlockNumber,
    /// Signalling blocks among the elapsed ones.
    pub count: u64,
    /// Whether the threshold can still be reached in this window.
    pub possible: bool,
}

/// Computed states of one deployment, keyed by window boundary height.
///
/// Every invalidation starts a new generation. States replayed from a lookup
/// of an older generation may come from replaced history and are dropped.
#[derive(Default, Debug)]
pub struct Cache {
    inner: RwLock<CacheInner>,
}

#[derive(Default, Debug)]
struct CacheInner {
    generation: u64,
    states: BTreeMap<BlockNumber, ThresholdState>,
}

impl Cache {
    /// The current generation and the closest computed boundary at or below
    /// `target`.
    pub fn closest(&self, target: BlockNumber) -> (u64, Option<(BlockNumber, ThresholdState)>) {
        let inner = self.inner.read();
        let closest = inner
            .states
            .range(..=target)
            .next_back()
            .map(|(boundary, state)| (*boundary, *state));
        (inner.generation, closest)
    }

    /// Stores `computed` unless the cache was invalidated since `generation`.
    /// Returns whether it was stored.
    pub fn store(
        &self,
        generation: u64,
        computed: impl IntoIterator<Item = (BlockNumber, ThresholdState)>,
    ) -> bool {
        let mut inner = self.inner.write();
        if inner.generation != generation {
            return false;
        }
        inner.states.extend(computed);
        true
    }

    /// Drops the boundaries at or above `first_stale`.
    pub fn invalidate_from(&self, first_stale: BlockNumber) {
        let mut inner = self.inner.write();
        inner.generation = inner.generation.wrapping_add(1);
        inner.states.split_off(&first_stale);
    }

    /// Drops every boundary.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.generation = inner.generation.wrapping_add(1);
        inner.states.clear();
    }
}

/// The threshold state machine of one deployment.
pub trait ConditionChecker {
    /// Identifies the deployment in logs.
    fn id(&self) -> DeploymentPos;
    /// Whether the block at `number` signals for this deployment.
    fn condition<I: SignalHistoryProvider>(
        &self,
        number: BlockNumber,
        indexer: &I,
    ) -> Result<bool, Error>;
    /// The start height.
    fn start(&self) -> BlockNumber;
    /// The timeout height.
    fn end(&self) -> BlockNumber;
    /// The confirmation window length.
    fn period(&self) -> BlockNumber;
    /// The activation threshold.
    fn threshold(&self) -> u64;
    /// Whether the state machine runs at all.
    fn active_mode(&self) -> ActiveMode;

    /// Counts the signalling blocks in `[from, to)`.
    fn count<I: SignalHistoryProvider>(
        &self,
        from: BlockNumber,
        to: BlockNumber,
        indexer: &I,
    ) -> Result<u64, Error> {
        (from..to).try_fold(0u64, |count, number| {
            Ok(count + u64::from(self.condition(number, indexer)?))
        })
    }

    /// The state of window boundary `boundary` given the state of the window
    /// before it.
    fn transition<I: SignalHistoryProvider>(
        &self,
        previous: ThresholdState,
        boundary: BlockNumber,
        indexer: &I,
    ) -> Result<ThresholdState, Error> {
        let state = match previous {
            ThresholdState::Defined => {
                if boundary >= self.end() {
                    ThresholdState::Failed
                } else if boundary >= self.start() {
                    ThresholdState::Started
                } else {
                    ThresholdState::Defined
                }
            }
            ThresholdState::Started => {
                if boundary >= self.end() {
                    ThresholdState::Failed
                } else {
                    let from = boundary.saturating_sub(self.period());
                    if self.count(from, boundary, indexer)? >= self.threshold() {
                        ThresholdState::LockedIn
                    } else {
                        ThresholdState::Started
                    }
                }
            }
            ThresholdState::LockedIn => ThresholdState::Active,
            ThresholdState::Active | ThresholdState::Failed => previous,
        };
        Ok(state)
    }

    /// Returns the state for the block at `number`.
    ///
    /// Only the windows after the closest computed one are evaluated, and
    /// their results are written back to `cache`. The lock is not held while
    /// reading history; two threads evaluating the same window store the same
    /// state, and nothing is stored if the cache was invalidated meanwhile.
    fn get_state<I: SignalHistoryProvider>(
        &self,
        number: BlockNumber,
        cache: &Cache,
        indexer: &I,
    ) -> Result<ThresholdState, Error> {
        match self.active_mode() {
            ActiveMode::Always => return Ok(ThresholdState::Active),
            ActiveMode::Never => return Ok(ThresholdState::Failed),
            ActiveMode::Normal => {}
        }

        let period = self.period();
        let target = number - number % period;
        // Windows before this one are all `Defined`, none of them is cached.
        let first = {
            let trigger = self.start().min(self.end());
            let first = trigger.div_ceil(period).saturating_mul(period);
            if first > target {
                return Ok(ThresholdState::Defined);
            }
            first
        };

        let (generation, closest) = cache.closest(target);
        let (mut boundary, mut state) = match closest {
            Some((boundary, state)) if boundary == target || state.is_final() => {
                trace_target!(LOG_TARGET, "{} cache hit at {}: {}", self.id(), boundary, state);
                return Ok(state);
            }
            Some((boundary, state)) => (boundary + period, state),
            None => (first, ThresholdState::Defined),
        };

        let mut computed = Vec::new();
        let result = loop {
            let next = match self.transition(state, boundary, indexer) {
                Ok(next) => next,
                Err(err) => break Err(err),
            };
            if next != state {
                debug_target!(
                    LOG_TARGET,
                    "{} moves from {} to {} at {}",
                    self.id(),
                    state,
                    next,
                    boundary
                );
            }
            state = next;
            computed.push((boundary, state));
            if boundary == target || state.is_final() {
                break Ok(state);
            }
            boundary += period;
        };

        trace_target!(
            LOG_TARGET,
            "{} replayed {} windows for {}",
            self.id(),
            computed.len(),
            number
        );
        if !computed.is_empty() && !cache.store(generation, computed) {
            trace_target!(
                LOG_TARGET,
                "{} drops windows replayed for {}, cache invalidated meanwhile",
                self.id(),
                number
            );
        }
        result
    }

    /// Returns the first height of the run of windows which share the state of
    /// the block at `number`. `Defined` is reported since genesis.
    fn get_state_since_height<I: SignalHistoryProvider>(
        &self,
        number: BlockNumber,
        cache: &Cache,
        indexer: &I,
    ) -> Result<BlockNumber, Error> {
        let state = self.get_state(number, cache, indexer)?;
        if state == ThresholdState::Defined || self.active_mode() != ActiveMode::Normal {
            return Ok(0);
        }

        let period = self.period();
        let mut since = number - number % period;
        while since >= period && self.get_state(since - period, cache, indexer)? == state {
            since -= period;
        }
        Ok(since)
    }

    /// Returns the signalling progress of the window containing `number`,
    /// counting the blocks before `number`.
    fn get_stats<I: SignalHistoryProvider>(
        &self,
        number: BlockNumber,
        indexer: &I,
    ) -> Result<DeploymentStats, Error> {
        let period = self.period();
        let threshold = self.threshold();
        let elapsed = number % period;
        let count = self.count(number - elapsed, number, indexer)?;
        Ok(DeploymentStats {
            period,
            threshold,
            elapsed,
            count,
            possible: count + (period - elapsed) >= threshold,
        })
    }
}

/// The [`ConditionChecker`] of a configured deployment.
pub struct VersionbitsConditionChecker<'a> {
    id: DeploymentPos,
    deployment: &'a Deployment,
    consensus: &'a Consensus,
}

impl<'a> VersionbitsConditionChecker<'a> {
    /// Returns `None` if the deployment is not configured.
    pub fn new(id: DeploymentPos, consensus: &'a Consensus) -> Option<Self> {
        consensus
            .deployment(id)
            .map(|deployment| VersionbitsConditionChecker {
                id,
                deployment,
                consensus,
            })
    }

    /// The bit of the deployment as a version mask.
    pub fn mask(&self) -> Version {
        1 << self.deployment.bit
    }
}

impl<'a> ConditionChecker for VersionbitsConditionChecker<'a> {
    fn id(&self) -> DeploymentPos {
        self.id
    }

    fn condition<I: SignalHistoryProvider>(
        &self,
        number: BlockNumber,
        indexer: &I,
    ) -> Result<bool, Error> {
        indexer
            .signal_bit(number, self.deployment.bit)
            .ok_or_else(|| QueryError::SignalUnavailable { number }.into())
    }

    fn start(&self) -> BlockNumber {
        self.deployment.start
    }

    fn end(&self) -> BlockNumber {
        self.deployment.timeout
    }

    fn period(&self) -> BlockNumber {
        self.consensus.deployment_period(self.deployment)
    }

    fn threshold(&self) -> u64 {
        self.consensus.deployment_threshold(self.deployment)
    }

    fn active_mode(&self) -> ActiveMode {
        self.deployment.active_mode
    }
}

/// One state cache per configured deployment.
#[derive(Default, Debug)]
pub struct VersionbitsCache {
    caches: HashMap<DeploymentPos, Cache>,
}

impl VersionbitsCache {
    /// Creates empty caches for `deployments`.
    pub fn new<'a>(deployments: impl Iterator<Item = &'a DeploymentPos>) -> Self {
        VersionbitsCache {
            caches: deployments.map(|pos| (*pos, Cache::default())).collect(),
        }
    }

    /// The cache of `pos`.
    pub fn cache(&self, pos: &DeploymentPos) -> Option<&Cache> {
        self.caches.get(pos)
    }

    /// Forgets every window which counted the block at `number` or later.
    pub fn invalidate_from(&self, number: BlockNumber) {
        // A window boundary only depends on the blocks below it.
        let Some(first_stale) = number.checked_add(1) else {
            return;
        };
        for cache in self.caches.values() {
            cache.invalidate_from(first_stale);
        }
    }

    /// Forgets everything.
    pub fn clear(&self) {
        for cache in self.caches.values() {
            cache.clear();
        }
    }
}

/// Answers which state each deployment is in at a given height.
///
/// Shared between validation threads; the only mutable state is the cache.
pub struct ThresholdStateCalculator {
    consensus: Arc<Consensus>,
    cache: VersionbitsCache,
}

impl ThresholdStateCalculator {
    /// Creates a calculator with cold caches.
    pub fn new(consensus: Arc<Consensus>) -> Self {
        let cache = VersionbitsCache::new(consensus.deployments().keys());
        ThresholdStateCalculator { consensus, cache }
    }

    /// The consensus this calculator evaluates.
    pub fn consensus(&self) -> &Consensus {
        &self.consensus
    }

    fn checker(
        &self,
        pos: DeploymentPos,
    ) -> Result<(VersionbitsConditionChecker<'_>, &Cache), Error> {
        VersionbitsConditionChecker::new(pos, &self.consensus)
            .zip(self.cache.cache(&pos))
            .ok_or_else(|| QueryError::UnknownDeployment(pos).into())
    }

    /// The state of `pos` for the block at `number`.
    pub fn state<I: SignalHistoryProvider>(
        &self,
        pos: DeploymentPos,
        number: BlockNumber,
        indexer: &I,
    ) -> Result<ThresholdState, Error> {
        let (checker, cache) = self.checker(pos)?;
        checker.get_state(number, cache, indexer)
    }

    /// The height at which the current state of `pos` began.
    pub fn state_since<I: SignalHistoryProvider>(
        &self,
        pos: DeploymentPos,
        number: BlockNumber,
        indexer: &I,
    ) -> Result<BlockNumber, Error> {
        let (checker, cache) = self.checker(pos)?;
        checker.get_state_since_height(number, cache, indexer)
    }

    /// Signalling statistics of the window containing `number`.
    ///
    /// `None` for deployments which skip the state machine.
    pub fn statistics<I: SignalHistoryProvider>(
        &self,
        pos: DeploymentPos,
        number: BlockNumber,
        indexer: &I,
    ) -> Result<Option<DeploymentStats>, Error> {
        let (checker, _) = self.checker(pos)?;
        if checker.active_mode() != ActiveMode::Normal {
            return Ok(None);
        }
        checker.get_stats(number, indexer).map(Some)
    }

    /// The version a new block at `number` should carry: the top bits plus the
    /// bit of every deployment that is started or locked in.
    pub fn compute_versionbits<I: SignalHistoryProvider>(
        &self,
        number: BlockNumber,
        indexer: &I,
    ) -> Result<Version, Error> {
        let mut version = VERSIONBITS_TOP_BITS;
        for pos in self.consensus.deployments().keys() {
            let (checker, cache) = self.checker(*pos)?;
            match checker.get_state(number, cache, indexer)? {
                ThresholdState::Started | ThresholdState::LockedIn => version |= checker.mask(),
                _ => {}
            }
        }
        Ok(version)
    }

    /// Drops cached windows which depend on the block at `number` or later,
    /// e.g. after a reorganization replaced that block.
    pub fn invalidate_from(&self, number: BlockNumber) {
        debug_target!(LOG_TARGET, "invalidate cached windows after {}", number);
        self.cache.invalidate_from(number);
    }

    /// Drops all cached windows.
    pub fn clear(&self) {
        self.cache.clear();
    }
}
