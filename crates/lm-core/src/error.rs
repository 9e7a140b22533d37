//! Error types for the LiveMix external seams

use thiserror::Error;

/// Errors reported by an output sink.
///
/// The worker counts these in `write_errors` and keeps running; no sink
/// error is fatal to the loop.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    #[error("sink cannot accept frames without blocking")]
    WouldBlock,

    #[error("output device error ({0})")]
    Device(i32),

    #[error("sink is shut down")]
    Closed,
}

/// Errors reported by the monotonic clock.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockError {
    #[error("monotonic clock read failed (errno {0})")]
    ReadFailed(i32),
}
