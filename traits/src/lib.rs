//! The interfaces through which the rule activation core reads the header
//! chain it does not own.
mod signal_history_provider;

pub use crate::signal_history_provider::SignalHistoryProvider;
