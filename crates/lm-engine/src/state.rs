//! Published worker state
//!
//! The controller describes what the worker should do by building a
//! `MixState` and publishing it through the state queue. Snapshots are
//! immutable after publication and travel as `Arc<MixState>`; the worker
//! retains the current and previous snapshots to diff them.

use std::sync::Arc;

use lm_core::{Command, MAX_TRACKS};
use lm_realtime::{ColdGate, DumpState};

use crate::{BufferProvider, Sink, VolumeProvider};

/// One fast-path track slot.
///
/// Only slots whose bit is set in [`MixState::track_mask`] are meaningful;
/// an active slot always carries a buffer provider. A missing volume
/// provider means unity gain.
#[derive(Clone, Default)]
pub struct TrackSlot {
    pub buffer_provider: Option<Arc<dyn BufferProvider>>,
    pub volume_provider: Option<Arc<dyn VolumeProvider>>,
    /// Bumped by the controller when the slot keeps its identity but its
    /// providers are replaced.
    pub generation: u32,
}

/// Immutable description of what the worker should do this cycle.
#[derive(Clone)]
pub struct MixState {
    pub command: Command,
    /// Output frames per cycle; positive whenever not idle.
    pub frame_count: usize,
    /// Bit i set means slot i is active.
    pub track_mask: u32,
    pub tracks: [TrackSlot; MAX_TRACKS],
    /// Advances whenever the track set or any active slot's generation
    /// changes.
    pub tracks_gen: u32,
    pub sink: Option<Arc<dyn Sink>>,
    /// Advances whenever `sink` is replaced.
    pub sink_gen: u32,
    /// Advances on each intended cold-idle transition.
    pub cold_gen: u32,
    /// Parking word for cold idle; required when publishing `COLD_IDLE`.
    pub cold_gate: Option<Arc<ColdGate>>,
    pub dump: Option<Arc<DumpState>>,
}

impl Default for MixState {
    fn default() -> Self {
        Self {
            command: Command::INITIAL,
            frame_count: 0,
            track_mask: 0,
            tracks: std::array::from_fn(|_| TrackSlot::default()),
            tracks_gen: 0,
            sink: None,
            sink_gen: 0,
            cold_gen: 0,
            cold_gate: None,
            dump: None,
        }
    }
}

impl MixState {
    /// Number of active track slots.
    pub fn num_tracks(&self) -> u32 {
        self.track_mask.count_ones()
    }
}
