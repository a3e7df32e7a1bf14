use super::{assert_query_error, build_consensus, MockChain};
use crate::error::QueryError;
use crate::versionbits::{
    version_signals, Deployment, DeploymentPos, DeploymentStats, ThresholdState,
    ThresholdStateCalculator, VERSIONBITS_TOP_BITS,
};
use fedchain_traits::SignalHistoryProvider;
use fedchain_types::core::{BlockNumber, Byte32, EpochNumber, EpochTransition};
use proptest::prelude::*;
use std::cell::Cell;

const BIT: u8 = 28;

fn calculator(deployment: Deployment) -> ThresholdStateCalculator {
    ThresholdStateCalculator::new(build_consensus(vec![(DeploymentPos::Testdummy, deployment)]))
}

fn state(
    calculator: &ThresholdStateCalculator,
    chain: &MockChain,
    number: BlockNumber,
) -> ThresholdState {
    calculator
        .state(DeploymentPos::Testdummy, number, chain)
        .unwrap()
}

#[test]
fn test_versionbits_active() {
    let calculator = calculator(Deployment::new(BIT, 0, Deployment::NO_TIMEOUT));
    let mut chain = MockChain::new();
    chain.signal(10, BIT);

    assert_eq!(state(&calculator, &chain, 0), ThresholdState::Started);
    assert_eq!(state(&calculator, &chain, 9), ThresholdState::Started);
    assert_eq!(state(&calculator, &chain, 10), ThresholdState::LockedIn);
    assert_eq!(state(&calculator, &chain, 19), ThresholdState::LockedIn);
    assert_eq!(state(&calculator, &chain, 20), ThresholdState::Active);
    assert_eq!(state(&calculator, &chain, 100_000), ThresholdState::Active);
}

#[test]
fn test_versionbits_below_threshold() {
    let calculator = calculator(Deployment::new(BIT, 0, Deployment::NO_TIMEOUT));
    let mut chain = MockChain::new();
    chain.signal(7, BIT);
    chain.idle(3);

    assert_eq!(state(&calculator, &chain, 10), ThresholdState::Started);
}

#[test]
fn test_versionbits_exact_threshold() {
    let calculator = calculator(Deployment::new(BIT, 0, Deployment::NO_TIMEOUT));
    let mut chain = MockChain::new();
    chain.idle(2);
    chain.signal(8, BIT);

    assert_eq!(state(&calculator, &chain, 10), ThresholdState::LockedIn);
}

#[test]
fn test_versionbits_other_bit_does_not_count() {
    let calculator = calculator(Deployment::new(BIT, 0, Deployment::NO_TIMEOUT));
    let mut chain = MockChain::new();
    chain.signal(10, 3);
    // Without the top bits nothing signals.
    for _ in 0..10 {
        chain.push_block(1 << BIT);
    }

    assert_eq!(state(&calculator, &chain, 10), ThresholdState::Started);
    assert_eq!(state(&calculator, &chain, 20), ThresholdState::Started);
}

#[test]
fn test_versionbits_failed() {
    let calculator = calculator(Deployment::new(BIT, 0, 30));
    let mut chain = MockChain::new();
    chain.idle(40);

    assert_eq!(state(&calculator, &chain, 29), ThresholdState::Started);
    assert_eq!(state(&calculator, &chain, 30), ThresholdState::Failed);
    assert_eq!(state(&calculator, &chain, 40), ThresholdState::Failed);
    // Final, nothing above the timeout is read.
    assert_eq!(state(&calculator, &chain, 1_000_000), ThresholdState::Failed);
}

#[test]
fn test_versionbits_failed_cold() {
    let calculator = calculator(Deployment::new(BIT, 0, 30));
    let mut chain = MockChain::new();
    chain.idle(30);

    assert_eq!(state(&calculator, &chain, 1_000_000), ThresholdState::Failed);
}

#[test]
fn test_versionbits_lock_in_before_timeout() {
    let calculator = calculator(Deployment::new(BIT, 0, 20));
    let mut chain = MockChain::new();
    chain.signal(10, BIT);
    chain.idle(10);

    assert_eq!(state(&calculator, &chain, 10), ThresholdState::LockedIn);
    assert_eq!(state(&calculator, &chain, 20), ThresholdState::Active);
}

#[test]
fn test_versionbits_timeout_before_start_window() {
    // Times out at the same boundary it would start at.
    let calculator = calculator(Deployment::new(BIT, 15, 18));
    let chain = MockChain::new();

    assert_eq!(state(&calculator, &chain, 19), ThresholdState::Defined);
    assert_eq!(state(&calculator, &chain, 20), ThresholdState::Failed);
}

#[test]
fn test_versionbits_defined_until_start_window() {
    let calculator = calculator(Deployment::new(BIT, 25, Deployment::NO_TIMEOUT));
    // No history is needed while defined.
    let mut chain = MockChain::new();

    assert_eq!(state(&calculator, &chain, 0), ThresholdState::Defined);
    assert_eq!(state(&calculator, &chain, 29), ThresholdState::Defined);
    assert_eq!(state(&calculator, &chain, 30), ThresholdState::Started);

    chain.idle(30);
    chain.signal(10, BIT);
    assert_eq!(state(&calculator, &chain, 40), ThresholdState::LockedIn);
    assert_eq!(state(&calculator, &chain, 50), ThresholdState::Active);
}

#[test]
fn test_versionbits_always_and_never() {
    let consensus = build_consensus(vec![
        (DeploymentPos::Taproot, Deployment::always_active(2)),
        (DeploymentPos::DynaFed, Deployment::never_active(2)),
    ]);
    let calculator = ThresholdStateCalculator::new(consensus);
    let chain = MockChain::new();

    for number in [0, 9, 10, 1_000_000] {
        assert_eq!(
            calculator.state(DeploymentPos::Taproot, number, &chain).unwrap(),
            ThresholdState::Active
        );
        assert_eq!(
            calculator.state(DeploymentPos::DynaFed, number, &chain).unwrap(),
            ThresholdState::Failed
        );
    }
    assert_eq!(
        calculator
            .state_since(DeploymentPos::Taproot, 1_000, &chain)
            .unwrap(),
        0
    );
    assert_eq!(
        calculator
            .statistics(DeploymentPos::Taproot, 1_000, &chain)
            .unwrap(),
        None
    );
}

#[test]
fn test_versionbits_overrides() {
    // Chain window 10 and threshold 8, the deployment uses 5 and 3.
    let deployment = Deployment::new(BIT, 0, Deployment::NO_TIMEOUT)
        .with_period(5)
        .with_threshold(3);
    let calculator = calculator(deployment);
    let mut chain = MockChain::new();
    chain.idle(2);
    chain.signal(3, BIT);

    assert_eq!(state(&calculator, &chain, 4), ThresholdState::Started);
    assert_eq!(state(&calculator, &chain, 5), ThresholdState::LockedIn);
    assert_eq!(state(&calculator, &chain, 10), ThresholdState::Active);
}

#[test]
fn test_versionbits_threshold_override_only() {
    let calculator = calculator(Deployment::new(BIT, 0, Deployment::NO_TIMEOUT).with_threshold(2));
    let mut chain = MockChain::new();
    chain.idle(8);
    chain.signal(2, BIT);

    assert_eq!(state(&calculator, &chain, 10), ThresholdState::LockedIn);
}

#[test]
fn test_versionbits_statistics() {
    let calculator = calculator(Deployment::new(BIT, 0, Deployment::NO_TIMEOUT));
    let mut chain = MockChain::new();
    chain.signal(4, BIT);
    chain.idle(3);

    assert_eq!(
        calculator
            .statistics(DeploymentPos::Testdummy, 6, &chain)
            .unwrap(),
        Some(DeploymentStats {
            period: 10,
            threshold: 8,
            elapsed: 6,
            count: 4,
            possible: true,
        })
    );
    let stats = calculator
        .statistics(DeploymentPos::Testdummy, 7, &chain)
        .unwrap()
        .unwrap();
    assert_eq!((stats.elapsed, stats.count), (7, 4));
    assert!(!stats.possible);

    chain.idle(3);
    let stats = calculator
        .statistics(DeploymentPos::Testdummy, 10, &chain)
        .unwrap()
        .unwrap();
    assert_eq!((stats.elapsed, stats.count), (0, 0));
    assert!(stats.possible);
}

#[test]
fn test_versionbits_state_since() {
    let calculator = calculator(Deployment::new(BIT, 5, Deployment::NO_TIMEOUT));
    let mut chain = MockChain::new();
    chain.idle(10);
    chain.signal(10, BIT);
    chain.idle(20);

    let since = |number| {
        calculator
            .state_since(DeploymentPos::Testdummy, number, &chain)
            .unwrap()
    };
    assert_eq!(since(3), 0);
    assert_eq!(since(15), 10);
    assert_eq!(since(25), 20);
    assert_eq!(since(39), 30);
    assert_eq!(since(1_000), 30);
}

#[test]
fn test_compute_versionbits() {
    let consensus = build_consensus(vec![
        (
            DeploymentPos::Testdummy,
            Deployment::new(BIT, 0, Deployment::NO_TIMEOUT),
        ),
        (DeploymentPos::Taproot, Deployment::always_active(2)),
        (
            DeploymentPos::DynaFed,
            Deployment::new(25, 100, Deployment::NO_TIMEOUT),
        ),
    ]);
    let calculator = ThresholdStateCalculator::new(consensus);
    let mut chain = MockChain::new();
    chain.signal(10, BIT);

    let started = VERSIONBITS_TOP_BITS | (1 << BIT);
    assert_eq!(calculator.compute_versionbits(5, &chain).unwrap(), started);
    // Still signalled while locked in.
    assert_eq!(calculator.compute_versionbits(15, &chain).unwrap(), started);
    assert_eq!(
        calculator.compute_versionbits(25, &chain).unwrap(),
        VERSIONBITS_TOP_BITS
    );
}

#[test]
fn test_version_signals() {
    assert!(version_signals(VERSIONBITS_TOP_BITS | (1 << 3), 3));
    assert!(!version_signals(VERSIONBITS_TOP_BITS | (1 << 3), 4));
    assert!(!version_signals(1 << 3, 3));
    assert!(!version_signals(0x40000000 | (1 << 3), 3));
    assert!(!version_signals(u32::MAX, 29));
}

#[test]
fn test_versionbits_missing_history() {
    let calculator = calculator(Deployment::new(BIT, 0, Deployment::NO_TIMEOUT));
    let mut chain = MockChain::new();
    chain.signal(4, BIT);

    // The first window is started without reading any block.
    assert_eq!(state(&calculator, &chain, 9), ThresholdState::Started);
    let error = calculator
        .state(DeploymentPos::Testdummy, 10, &chain)
        .unwrap_err();
    assert_query_error(error, QueryError::SignalUnavailable { number: 4 });
}

#[test]
fn test_versionbits_unknown_deployment() {
    let calculator = calculator(Deployment::new(BIT, 0, Deployment::NO_TIMEOUT));
    let chain = MockChain::new();

    let error = calculator
        .state(DeploymentPos::Taproot, 0, &chain)
        .unwrap_err();
    assert_query_error(error, QueryError::UnknownDeployment(DeploymentPos::Taproot));
}

#[test]
fn test_versionbits_invalidate_from() {
    let calculator = calculator(Deployment::new(BIT, 0, Deployment::NO_TIMEOUT));
    let mut chain = MockChain::new();
    chain.signal(10, BIT);
    assert_eq!(state(&calculator, &chain, 20), ThresholdState::Active);

    // A reorganization replaces the blocks from 5 on.
    let mut fork = MockChain::new();
    fork.signal(5, BIT);
    fork.idle(15);
    assert_eq!(state(&calculator, &fork, 20), ThresholdState::Active);

    calculator.invalidate_from(5);
    assert_eq!(state(&calculator, &fork, 20), ThresholdState::Started);

    // Blocks at a boundary only matter to the windows after it.
    calculator.invalidate_from(10);
    assert_eq!(state(&calculator, &fork, 20), ThresholdState::Started);
}

// Invalidates the calculator on the first signal read, as a reorganization
// landing in the middle of a query would, and keeps serving the old history.
struct ReorgDuringRead<'a> {
    chain: &'a MockChain,
    calculator: &'a ThresholdStateCalculator,
    reorged: Cell<bool>,
}

impl SignalHistoryProvider for ReorgDuringRead<'_> {
    fn signal_bit(&self, number: BlockNumber, bit: u8) -> Option<bool> {
        if !self.reorged.replace(true) {
            self.calculator.invalidate_from(0);
        }
        self.chain.signal_bit(number, bit)
    }

    fn block_hash(&self, number: BlockNumber) -> Option<Byte32> {
        self.chain.block_hash(number)
    }

    fn epoch_transition(&self, epoch: EpochNumber) -> Option<EpochTransition> {
        self.chain.epoch_transition(epoch)
    }
}

#[test]
fn test_versionbits_invalidate_during_query() {
    let calculator = calculator(Deployment::new(BIT, 0, Deployment::NO_TIMEOUT));
    let mut chain = MockChain::new();
    chain.signal(10, BIT);
    chain.idle(10);
    let stale = ReorgDuringRead {
        chain: &chain,
        calculator: &calculator,
        reorged: Cell::new(false),
    };
    // Answered from the history it read.
    assert_eq!(
        calculator
            .state(DeploymentPos::Testdummy, 20, &stale)
            .unwrap(),
        ThresholdState::Active
    );

    // Nothing read before the invalidation was kept.
    let mut fork = MockChain::new();
    fork.idle(20);
    assert_eq!(state(&calculator, &fork, 20), ThresholdState::Started);
    assert_eq!(state(&calculator, &fork, 10), ThresholdState::Started);
}

#[test]
fn test_versionbits_concurrent_queries() {
    let calculator = calculator(Deployment::new(BIT, 0, 1_000));
    let mut chain = MockChain::new();
    chain.idle(300);
    chain.signal(10, BIT);
    chain.idle(100);

    let expected = |number: BlockNumber| match number {
        0..=309 => ThresholdState::Started,
        310..=319 => ThresholdState::LockedIn,
        _ => ThresholdState::Active,
    };
    std::thread::scope(|scope| {
        for offset in 0..4u64 {
            let (calculator, chain) = (&calculator, &chain);
            scope.spawn(move || {
                for number in (0..410).rev().filter(|n| n % 4 == offset) {
                    assert_eq!(state(calculator, chain, number), expected(number));
                }
            });
        }
    });
}

// Replays every window from genesis without any cache.
fn reference_state(
    signals: &[bool],
    deployment: &Deployment,
    period: BlockNumber,
    threshold: u64,
    number: BlockNumber,
) -> ThresholdState {
    let mut state = ThresholdState::Defined;
    let mut boundary = 0;
    while boundary <= number {
        state = match state {
            ThresholdState::Defined | ThresholdState::Started
                if boundary >= deployment.timeout =>
            {
                ThresholdState::Failed
            }
            ThresholdState::Defined if boundary >= deployment.start => ThresholdState::Started,
            ThresholdState::Started if boundary >= period => {
                let window = &signals[(boundary - period) as usize..boundary as usize];
                if window.iter().filter(|signal| **signal).count() as u64 >= threshold {
                    ThresholdState::LockedIn
                } else {
                    ThresholdState::Started
                }
            }
            ThresholdState::LockedIn => ThresholdState::Active,
            other => other,
        };
        boundary += period;
    }
    state
}

fn allowed(from: ThresholdState, to: ThresholdState) -> bool {
    use ThresholdState::*;
    from == to
        || matches!(
            (from, to),
            (Defined, _) | (Started, LockedIn | Active | Failed) | (LockedIn, Active)
        )
}

proptest! {
    #[test]
    fn test_versionbits_matches_reference(
        signals in prop::collection::vec(any::<bool>(), 1..150),
        start in 0..80u64,
        duration in 1..150u64,
        period in 1..12u64,
        threshold_seed in any::<u64>(),
        queries in prop::collection::vec(any::<prop::sample::Index>(), 1..30),
    ) {
        let threshold = 1 + threshold_seed % period;
        let deployment = Deployment::new(BIT, start, start + duration)
            .with_period(period)
            .with_threshold(threshold);
        let calculator = calculator(deployment.clone());
        let mut chain = MockChain::new();
        for signal in &signals {
            if *signal {
                chain.signal(1, BIT);
            } else {
                chain.idle(1);
            }
        }

        // Random order warms the cache unevenly.
        for query in &queries {
            let number = query.index(signals.len()) as BlockNumber;
            prop_assert_eq!(
                state(&calculator, &chain, number),
                reference_state(&signals, &deployment, period, threshold, number)
            );
        }

        let mut previous = ThresholdState::Defined;
        for number in 0..signals.len() as BlockNumber {
            let current = state(&calculator, &chain, number);
            prop_assert!(allowed(previous, current), "{} -> {} at {}", previous, current, number);
            previous = current;
        }
    }
}
