//! lm-core: Shared types for the LiveMix fast-path audio engine
//!
//! This crate provides the foundational types used across all LiveMix crates:
//! the worker command word, the output format descriptor, packed stereo
//! volume, and the error types of the external seams.

mod command;
mod error;
mod format;
mod volume;

pub use command::*;
pub use error::*;
pub use format::*;
pub use volume::*;

/// Maximum number of fast-path track slots.
///
/// The active set is described by a 32-bit mask, one bit per slot.
pub const MAX_TRACKS: usize = 32;
