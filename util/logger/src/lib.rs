//! Fedchain logging facade.
//!
//! This crate is a wrapper of the crate [`log`].
//!
//! [`log`]: https://docs.rs/log/*/log/index.html
//!
//! The library crates never install a logger; whichever binary embeds them
//! decides where the records go. The basic macros always use the module path
//! as target, the `*_target!` macros take the target as the first argument so
//! that rule activation and federation rotation records can be filtered apart
//! from the rest of the node.
pub use log::{self as internal, Level, SetLoggerError};

/// Logs a message at the trace level using the default target.
///
/// # Examples
///
/// ```
/// use fedchain_logger::trace;
///
/// let (boundary, replayed) = (2016u64, 3usize);
/// trace!("boundary {} reached after replaying {} windows", boundary, replayed);
/// ```
#[macro_export(local_inner_macros)]
macro_rules! trace {
    ($( $args:tt )*) => {
        $crate::internal::trace!($( $args )*);
    }
}

/// Logs a message at the debug level using the default target.
#[macro_export(local_inner_macros)]
macro_rules! debug {
    ($( $args:tt )*) => {
        $crate::internal::debug!($( $args )*);
    }
}

/// Logs a message at the info level using the default target.
#[macro_export(local_inner_macros)]
macro_rules! info {
    ($( $args:tt )*) => {
        $crate::internal::info!($( $args )*);
    }
}

/// Logs a message at the warn level using the default target.
///
/// # Examples
///
/// ```
/// use fedchain_logger::warn;
///
/// let epoch = 12u64;
/// warn!("ignore malformed federation proposal committed in epoch {}", epoch);
/// ```
#[macro_export(local_inner_macros)]
macro_rules! warn {
    ($( $args:tt )*) => {
        $crate::internal::warn!($( $args )*);
    }
}

/// Logs a message at the error level using the default target.
#[macro_export(local_inner_macros)]
macro_rules! error {
    ($( $args:tt )*) => {
        $crate::internal::error!($( $args )*);
    }
}

/// Determines if a message logged at the specified level and with the default
/// target will be logged.
///
/// Useful to skip formatting a whole federation descriptor when nobody listens.
///
/// ```
/// use fedchain_logger::Level::Debug;
/// use fedchain_logger::{debug, log_enabled};
///
/// if log_enabled!(Debug) {
///     debug!("expensive debug data: {:?}", vec![0u8; 4]);
/// }
/// ```
#[macro_export(local_inner_macros)]
macro_rules! log_enabled {
    ($level:expr) => {
        $crate::internal::log_enabled!($level)
    };
}

/// Logs a message at the trace level using the specified target.
#[macro_export(local_inner_macros)]
macro_rules! trace_target {
    ($target:expr, $( $args:tt )*) => {
        $crate::internal::trace!(target: $target, $( $args )*);
    }
}

/// Logs a message at the debug level using the specified target.
///
/// ```
/// use fedchain_logger::debug_target;
///
/// debug_target!("versionbits", "deployment {} moves to {}", "taproot", "STARTED");
/// ```
#[macro_export(local_inner_macros)]
macro_rules! debug_target {
    ($target:expr, $( $args:tt )*) => {
        $crate::internal::debug!(target: $target, $( $args )*);
    }
}

/// Logs a message at the info level using the specified target.
#[macro_export(local_inner_macros)]
macro_rules! info_target {
    ($target:expr, $( $args:tt )*) => {
        $crate::internal::info!(target: $target, $( $args )*);
    }
}

/// Logs a message at the warn level using the specified target.
#[macro_export(local_inner_macros)]
macro_rules! warn_target {
    ($target:expr, $( $args:tt )*) => {
        $crate::internal::warn!(target: $target, $( $args )*);
    }
}
