//! External collaborator seams
//!
//! The fast path does no DSP of its own. Mixing is delegated to a
//! `MixKernel`, output to a `Sink`, and per-track sample and volume data to
//! the providers bound into each track slot. All hot methods are required to
//! be bounded-time and allocation-free.

use std::sync::Arc;

use lm_core::{Format, PackedVolume, SinkError};

/// Opaque handle issued by the kernel identifying a track within its own
/// bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackName(pub u32);

/// Volume channel selector for `MixKernel::set_volume`.
///
/// `Left` is channel 0 (the low half of a packed volume word), `Right` is
/// channel 1 (the high half).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeChannel {
    Left,
    Right,
}

/// The external DSP mixing kernel.
///
/// Created by the worker through a [`KernelFactory`] whenever the output
/// format or frame count changes, and dropped on reconfiguration or exit.
/// Newly acquired track names default to unity volume on both channels.
pub trait MixKernel: Send {
    /// Allocate a track name, or `None` when the kernel is out of slots.
    fn acquire_track(&mut self) -> Option<TrackName>;

    /// Return a track name to the kernel.
    fn release_track(&mut self, name: TrackName);

    /// Bind the sample source for a track.
    fn set_buffer_provider(&mut self, name: TrackName, provider: Arc<dyn BufferProvider>);

    /// Route the track's rendered output to the main mix buffer.
    fn route_main(&mut self, name: TrackName);

    /// Set one channel's gain; `PackedVolume::UNITY_GAIN` is unity.
    fn set_volume(&mut self, name: TrackName, channel: VolumeChannel, gain: u16);

    /// Include the track in subsequent `process` calls.
    fn enable(&mut self, name: TrackName);

    /// Render one buffer of interleaved stereo 16-bit frames.
    ///
    /// `pts` is the presentation timestamp of the first frame, or `None`
    /// when the caller has no timeline to offer. CPU-bound; must not block.
    fn process(&mut self, main: &mut [i16], pts: Option<i64>);
}

/// Constructor for the mix kernel: `(frame_count, sample_rate, max_tracks)`.
///
/// Invoked from the worker thread at reconfiguration points only; this is
/// one of the two documented allocation sites on the fast path.
pub type KernelFactory = Box<dyn FnMut(usize, u32, usize) -> Box<dyn MixKernel> + Send>;

/// Non-blocking output sink.
///
/// Shared through immutable state snapshots, so writes take `&self`;
/// implementations use interior atomics or rings. `write` must never block
/// for unbounded time.
pub trait Sink: Send + Sync {
    /// Current output format. Channel count must be 2.
    fn format(&self) -> Format;

    /// Accept interleaved stereo frames; returns how many were taken.
    fn write(&self, buffer: &[i16]) -> Result<usize, SinkError>;
}

/// Per-track sample source, consumed by the kernel.
pub trait BufferProvider: Send + Sync {
    /// Fill `out` with interleaved stereo samples; returns frames produced.
    fn fill(&self, out: &mut [i16]) -> usize;
}

/// Per-track volume source.
pub trait VolumeProvider: Send + Sync {
    /// Current stereo volume, fetched once per mix cycle.
    fn volume_lr(&self) -> PackedVolume;
}
