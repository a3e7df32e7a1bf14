use fedchain_types::core::{BlockNumber, Byte32, EpochTransition, EpochNumber};

/// Read access to the decoded history of the active chain.
///
/// Every answer for a finalized block must be stable. `None` means the block
/// (or the whole epoch) is not available yet; asking for it is a caller error.
pub trait SignalHistoryProvider {
    /// Whether the block at `number` sets the version bit `bit`.
    fn signal_bit(&self, number: BlockNumber, bit: u8) -> Option<bool>;

    /// Hash of the block at `number`.
    fn block_hash(&self, number: BlockNumber) -> Option<Byte32>;

    /// The federation proposal committed by the blocks of `epoch`.
    fn epoch_transition(&self, epoch: EpochNumber) -> Option<EpochTransition>;
}

impl<T: SignalHistoryProvider + ?Sized> SignalHistoryProvider for &T {
    fn signal_bit(&self, number: BlockNumber, bit: u8) -> Option<bool> {
        (**self).signal_bit(number, bit)
    }

    fn block_hash(&self, number: BlockNumber) -> Option<Byte32> {
        (**self).block_hash(number)
    }

    fn epoch_transition(&self, epoch: EpochNumber) -> Option<EpochTransition> {
        (**self).epoch_transition(epoch)
    }
}
