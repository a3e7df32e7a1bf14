//! # The Core Types Library
//!
//! This Library provides the essential types for fedchain: block and epoch
//! numbers, fixed-size hashes, hex-serialized byte strings and the federation
//! parameters committed by dynamic federation blocks.

pub use bytes;

pub mod core;
