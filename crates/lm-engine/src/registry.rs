//! Track registry
//!
//! Maps the 32-slot track mask onto kernel track names and reconciles
//! snapshot differences against the kernel. Reconciliation order is fixed:
//! removals first so churn cannot exhaust the kernel's name space, then
//! additions, then generation-driven rebinds of surviving slots.

use std::sync::Arc;

use lm_core::{PackedVolume, MAX_TRACKS};
use lm_realtime::DumpState;

use crate::{MixKernel, MixState, TrackName, VolumeChannel};

/// Per-slot kernel names and last observed slot generations.
pub struct TrackRegistry {
    names: [Option<TrackName>; MAX_TRACKS],
    generations: [u32; MAX_TRACKS],
    /// Last observed track-set generation.
    tracks_gen: u32,
}

impl TrackRegistry {
    pub fn new() -> Self {
        Self {
            names: [None; MAX_TRACKS],
            generations: [0; MAX_TRACKS],
            tracks_gen: 0,
        }
    }

    /// Kernel name for a slot, if one is bound.
    #[inline]
    pub fn name(&self, slot: usize) -> Option<TrackName> {
        self.names[slot]
    }

    /// True when the published track set has moved past what we reconciled.
    pub fn needs_reconcile(&self, state: &MixState) -> bool {
        state.tracks_gen != self.tracks_gen
    }

    /// Forget all name bindings and force the next reconcile to re-add
    /// every active slot. Used when the kernel is recreated.
    pub fn invalidate(&mut self, current_tracks_gen: u32) {
        self.names = [None; MAX_TRACKS];
        self.tracks_gen = current_tracks_gen.wrapping_sub(1);
    }

    /// Apply the difference between `previous_mask` and the published mask
    /// to the kernel.
    pub fn reconcile(
        &mut self,
        mut kernel: Option<&mut (dyn MixKernel + '_)>,
        state: &MixState,
        previous_mask: u32,
        dump: &DumpState,
    ) {
        let current_mask = state.track_mask;

        // Removed slots first, lowest bit first.
        let mut removed = previous_mask & !current_mask;
        while removed != 0 {
            let i = removed.trailing_zeros() as usize;
            removed &= !(1 << i);
            let name = self.names[i].take();
            debug_assert!(name.is_some(), "removed slot {i} had no kernel name");
            if let (Some(kernel), Some(name)) = (kernel.as_deref_mut(), name) {
                kernel.release_track(name);
            }
            self.generations[i] = state.tracks[i].generation;
        }

        // Newly active slots.
        let mut added = current_mask & !previous_mask;
        while added != 0 {
            let i = added.trailing_zeros() as usize;
            added &= !(1 << i);
            let slot = &state.tracks[i];
            debug_assert!(
                slot.buffer_provider.is_some(),
                "active slot {i} has no buffer provider"
            );
            debug_assert!(self.names[i].is_none(), "added slot {i} already bound");
            if let (Some(kernel), Some(provider)) =
                (kernel.as_deref_mut(), slot.buffer_provider.as_ref())
            {
                match kernel.acquire_track() {
                    Some(name) => {
                        self.names[i] = Some(name);
                        kernel.set_buffer_provider(name, Arc::clone(provider));
                        kernel.route_main(name);
                        // Freshly acquired names default to unity volume.
                        kernel.enable(name);
                    }
                    None => debug_assert!(false, "kernel out of track names"),
                }
            }
            self.generations[i] = slot.generation;
        }

        // Surviving slots: rebind only those whose generation advanced.
        let mut modified = current_mask & previous_mask;
        while modified != 0 {
            let i = modified.trailing_zeros() as usize;
            modified &= !(1 << i);
            let slot = &state.tracks[i];
            if slot.generation == self.generations[i] {
                continue;
            }
            debug_assert!(
                slot.buffer_provider.is_some(),
                "active slot {i} has no buffer provider"
            );
            if let (Some(kernel), Some(provider)) =
                (kernel.as_deref_mut(), slot.buffer_provider.as_ref())
            {
                let name = self.names[i];
                debug_assert!(name.is_some(), "modified slot {i} has no kernel name");
                if let Some(name) = name {
                    kernel.set_buffer_provider(name, Arc::clone(provider));
                    if slot.volume_provider.is_none() {
                        kernel.set_volume(name, VolumeChannel::Left, PackedVolume::UNITY_GAIN);
                        kernel.set_volume(name, VolumeChannel::Right, PackedVolume::UNITY_GAIN);
                    }
                    // Enable state carries over; the slot never left.
                }
            }
            self.generations[i] = slot.generation;
        }

        dump.set_num_tracks(current_mask.count_ones());
        self.tracks_gen = state.tracks_gen;
    }
}

impl Default for TrackRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BufferProvider, TrackSlot};

    /// Kernel that records every call for order-sensitive assertions.
    #[derive(Default)]
    struct RecordingKernel {
        next_name: u32,
        ops: Vec<String>,
    }

    impl MixKernel for RecordingKernel {
        fn acquire_track(&mut self) -> Option<TrackName> {
            let name = TrackName(self.next_name);
            self.next_name += 1;
            self.ops.push(format!("acquire->{}", name.0));
            Some(name)
        }

        fn release_track(&mut self, name: TrackName) {
            self.ops.push(format!("release {}", name.0));
        }

        fn set_buffer_provider(&mut self, name: TrackName, _provider: Arc<dyn BufferProvider>) {
            self.ops.push(format!("bind {}", name.0));
        }

        fn route_main(&mut self, name: TrackName) {
            self.ops.push(format!("route {}", name.0));
        }

        fn set_volume(&mut self, name: TrackName, channel: VolumeChannel, gain: u16) {
            self.ops
                .push(format!("volume {} {:?} {:#x}", name.0, channel, gain));
        }

        fn enable(&mut self, name: TrackName) {
            self.ops.push(format!("enable {}", name.0));
        }

        fn process(&mut self, _main: &mut [i16], _pts: Option<i64>) {
            self.ops.push("process".into());
        }
    }

    struct Silence;

    impl BufferProvider for Silence {
        fn fill(&self, out: &mut [i16]) -> usize {
            out.fill(0);
            out.len() / 2
        }
    }

    fn state_with_mask(mask: u32, tracks_gen: u32) -> MixState {
        let mut state = MixState {
            track_mask: mask,
            tracks_gen,
            ..Default::default()
        };
        for i in 0..MAX_TRACKS {
            if mask & (1 << i) != 0 {
                state.tracks[i].buffer_provider = Some(Arc::new(Silence));
            }
        }
        state
    }

    #[test]
    fn test_removals_precede_additions() {
        let mut registry = TrackRegistry::new();
        let mut kernel = RecordingKernel::default();
        let dump = DumpState::new();

        let first = state_with_mask(0b11, 1);
        registry.reconcile(Some(&mut kernel), &first, 0, &dump);
        assert_eq!(dump.num_tracks(), 2);

        kernel.ops.clear();
        let second = state_with_mask(0b110, 2);
        registry.reconcile(Some(&mut kernel), &second, 0b11, &dump);

        let release_at = kernel.ops.iter().position(|op| op == "release 0").unwrap();
        let acquire_at = kernel
            .ops
            .iter()
            .position(|op| op.starts_with("acquire"))
            .unwrap();
        assert!(
            release_at < acquire_at,
            "slot 0 must be released before slot 2 is acquired: {:?}",
            kernel.ops
        );
        assert_eq!(dump.num_tracks(), 2);
    }

    #[test]
    fn test_add_remove_sequence() {
        let mut registry = TrackRegistry::new();
        let mut kernel = RecordingKernel::default();
        let dump = DumpState::new();

        // Masks over three snapshots: empty, slots 0+2, slot 2 only.
        let a = state_with_mask(0x0, 1);
        registry.reconcile(Some(&mut kernel), &a, 0, &dump);
        assert_eq!(dump.num_tracks(), 0);

        let b = state_with_mask(0x5, 2);
        registry.reconcile(Some(&mut kernel), &b, 0x0, &dump);

        let c = state_with_mask(0x4, 3);
        registry.reconcile(Some(&mut kernel), &c, 0x5, &dump);

        let acquires = kernel
            .ops
            .iter()
            .filter(|op| op.starts_with("acquire"))
            .count();
        let releases = kernel.ops.iter().filter(|op| op.starts_with("release")).count();
        assert_eq!(acquires, 2);
        assert_eq!(releases, 1);
        assert_eq!(dump.num_tracks(), 1);
        assert!(registry.name(0).is_none());
        assert!(registry.name(2).is_some());
    }

    #[test]
    fn test_generation_change_rebinds_only_that_slot() {
        let mut registry = TrackRegistry::new();
        let mut kernel = RecordingKernel::default();
        let dump = DumpState::new();

        let first = state_with_mask(0b11, 1);
        registry.reconcile(Some(&mut kernel), &first, 0, &dump);
        let slot1_name = registry.name(1).unwrap();

        kernel.ops.clear();
        let mut second = state_with_mask(0b11, 2);
        second.tracks[1].generation = 1;
        registry.reconcile(Some(&mut kernel), &second, 0b11, &dump);

        // Slot 1 is rebound and, with no volume provider, forced to unity
        // on both channels. Slot 0 is untouched.
        assert_eq!(
            kernel.ops,
            vec![
                format!("bind {}", slot1_name.0),
                format!("volume {} Left {:#x}", slot1_name.0, 0x1000),
                format!("volume {} Right {:#x}", slot1_name.0, 0x1000),
            ]
        );
    }

    #[test]
    fn test_invalidate_forces_full_readd() {
        let mut registry = TrackRegistry::new();
        let mut kernel = RecordingKernel::default();
        let dump = DumpState::new();

        let state = state_with_mask(0b101, 5);
        registry.reconcile(Some(&mut kernel), &state, 0, &dump);
        assert!(!registry.needs_reconcile(&state));

        registry.invalidate(state.tracks_gen);
        assert!(registry.needs_reconcile(&state));
        assert!(registry.name(0).is_none());

        kernel.ops.clear();
        registry.reconcile(Some(&mut kernel), &state, 0, &dump);
        let acquires = kernel
            .ops
            .iter()
            .filter(|op| op.starts_with("acquire"))
            .count();
        assert_eq!(acquires, 2);
    }

    #[test]
    fn test_reconcile_without_kernel_still_tracks_generations() {
        let mut registry = TrackRegistry::new();
        let dump = DumpState::new();

        let state = state_with_mask(0b1, 1);
        registry.reconcile(None, &state, 0, &dump);

        assert_eq!(dump.num_tracks(), 1);
        assert!(!registry.needs_reconcile(&state));
        assert!(registry.name(0).is_none());
    }
}
