//! The real-time mix worker
//!
//! One loop iteration per cycle: sleep as decided last cycle, poll for a new
//! state snapshot, dispatch the command, reconcile configuration and track
//! changes, render, write, and let the pacer pick the next sleep. The only
//! suspension points are the top-of-loop sleep and the cold-idle park; the
//! loop never takes a lock and only allocates at documented reconfiguration
//! points.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use lm_core::{Command, Format, MAX_TRACKS};
use lm_realtime::{DumpState, StateReader};

use crate::{
    CommandStage, CyclePacer, CycleAction, KernelFactory, MixKernel, MixState, MonotonicClock,
    Pace, Sink, SystemClock, TrackRegistry, VolumeChannel, WorkerConfig,
};

/// Contents of the mix buffer relative to the current cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BufferState {
    /// Stale or never rendered; must be zeroed before a write-only cycle.
    Undefined,
    /// Rendered by the kernel this cycle or the previous one.
    Mixed,
    /// Explicitly zeroed for silent writes.
    Zeroed,
}

/// The fast-path worker. `run` is the body of the real-time thread.
pub struct MixWorker {
    reader: StateReader<MixState>,
    make_kernel: KernelFactory,
    clock: Box<dyn MonotonicClock>,
    config: WorkerConfig,

    current: Arc<MixState>,
    previous: Arc<MixState>,

    kernel: Option<Box<dyn MixKernel>>,
    mix_buffer: Vec<i16>,
    buffer_state: BufferState,

    sink: Option<Arc<dyn Sink>>,
    sink_gen: u32,
    format: Option<Format>,
    sample_rate: u32,

    registry: TrackRegistry,
    pacer: CyclePacer,
    stage: CommandStage,

    dump: Arc<DumpState>,
    fallback_dump: Arc<DumpState>,
}

impl MixWorker {
    pub fn new(
        reader: StateReader<MixState>,
        make_kernel: KernelFactory,
        config: WorkerConfig,
    ) -> Self {
        Self::with_clock(reader, make_kernel, config, Box::new(SystemClock::new()))
    }

    /// Construct with an explicit clock; tests feed synthetic cycle times.
    pub fn with_clock(
        reader: StateReader<MixState>,
        make_kernel: KernelFactory,
        config: WorkerConfig,
        clock: Box<dyn MonotonicClock>,
    ) -> Self {
        let initial = Arc::new(MixState::default());
        let fallback_dump = Arc::new(DumpState::new());
        Self {
            reader,
            make_kernel,
            clock,
            stage: CommandStage::new(config.hot_idle_sleep_ns),
            pacer: CyclePacer::new(config.stats_window),
            config,
            current: initial.clone(),
            previous: initial,
            kernel: None,
            mix_buffer: Vec::new(),
            buffer_state: BufferState::Undefined,
            sink: None,
            sink_gen: 0,
            format: None,
            sample_rate: 0,
            registry: TrackRegistry::new(),
            dump: fallback_dump.clone(),
            fallback_dump,
        }
    }

    /// Run until an `EXIT` command is published.
    ///
    /// Always returns `false`: the host must not re-enter the loop, and must
    /// not treat the return as a restart request (doing so typically means
    /// taking a lock on a thread that just held real-time priority).
    pub fn run(&mut self) -> bool {
        let mut pace = Pace::Spin;

        loop {
            match pace {
                Pace::Spin => {}
                Pace::Yield => thread::yield_now(),
                Pace::Sleep(ns) => {
                    debug_assert!(ns < 1_000_000_000);
                    thread::sleep(Duration::from_nanos(ns));
                }
            }
            // Safety net if no phase below chooses a pace.
            pace = Pace::Sleep(self.config.default_sleep_ns);

            if let Some(next) = self.reader.poll() {
                self.absorb(next);
            }
            self.dump.set_command(self.current.command);

            match self.stage.advance(&self.current) {
                CycleAction::Idle(idle_pace) => {
                    pace = idle_pace;
                    continue;
                }
                CycleAction::Exit => {
                    log::debug!("exit: releasing kernel and mix buffer");
                    self.kernel = None;
                    self.mix_buffer = Vec::new();
                    return false;
                }
                CycleAction::Render => {}
            }

            if !Arc::ptr_eq(&self.current, &self.previous) {
                self.refresh_configuration();
                // The state change is fully absorbed; don't diff it again.
                self.previous = self.current.clone();
            }

            self.mix();
            self.write();

            pace = self.pacer.end_cycle(self.clock.as_mut(), &self.dump);
        }
    }

    /// Take a newly published snapshot, keeping the diff anchor correct
    /// across idle periods.
    fn absorb(&mut self, next: Arc<MixState>) {
        if Arc::ptr_eq(&next, &self.current) {
            return;
        }

        // Switch to a newly published dump area as soon as we learn of it.
        self.dump = next
            .dump
            .clone()
            .unwrap_or_else(|| self.fallback_dump.clone());

        // `previous` must always resolve to the last non-idle snapshot:
        //   non-idle -> non-idle   previous becomes the outgoing current
        //   non-idle -> idle       same, and the retained Arc keeps the
        //                          snapshot addressable for however long
        //                          idleness lasts
        //   idle     -> idle       previous unchanged
        //   idle     -> non-idle   previous unchanged
        if !self.current.command.is_idle() {
            if next.command.is_idle() {
                self.pacer.invalidate_baseline();
            }
            self.previous = self.current.clone();
        }
        self.current = next;
    }

    /// Absorb sink, format, and track-set changes from the current state.
    fn refresh_configuration(&mut self) {
        let state = self.current.clone();

        // Output sink replacement.
        let previous_format = self.format;
        if state.sink_gen != self.sink_gen {
            self.sink = state.sink.clone();
            self.sink_gen = state.sink_gen;
            match &self.sink {
                None => {
                    self.format = None;
                    self.sample_rate = 0;
                }
                Some(sink) => {
                    let format = sink.format();
                    debug_assert_eq!(format.channel_count, 2, "fast path is stereo only");
                    self.sample_rate = format.sample_rate;
                    self.format = Some(format);
                }
            }
        }

        // Kernel and mix buffer follow the format and frame count. These
        // are the documented allocation points on the fast path.
        let frame_count = state.frame_count;
        let previous_mask;
        if self.format != previous_format || frame_count != self.previous.frame_count {
            self.kernel = None;
            self.mix_buffer = Vec::new();
            if frame_count > 0 && self.sample_rate > 0 {
                log::debug!(
                    "reconfigure: {} frames at {} Hz",
                    frame_count,
                    self.sample_rate
                );
                self.kernel = Some((self.make_kernel)(frame_count, self.sample_rate, MAX_TRACKS));
                self.mix_buffer = vec![0; frame_count * 2];
                self.pacer.configure(frame_count, self.sample_rate);
            } else {
                self.pacer.deconfigure();
            }
            self.buffer_state = BufferState::Undefined;
            // Every active slot must re-acquire a kernel name.
            self.registry.invalidate(state.tracks_gen);
            previous_mask = 0;
        } else {
            previous_mask = self.previous.track_mask;
        }

        if self.registry.needs_reconcile(&state) {
            self.registry
                .reconcile(self.kernel.as_deref_mut(), &state, previous_mask, &self.dump);
        }
    }

    /// Render the active tracks into the mix buffer.
    fn mix(&mut self) {
        let state = &self.current;
        let kernel = if state.command.contains(Command::MIX) {
            self.kernel.as_deref_mut()
        } else {
            None
        };

        let Some(kernel) = kernel else {
            // Last cycle's mix is stale once mixing stops.
            if self.buffer_state == BufferState::Mixed {
                self.buffer_state = BufferState::Undefined;
            }
            return;
        };
        debug_assert!(!self.mix_buffer.is_empty());

        // Push per-cycle volumes before rendering.
        let mut remaining = state.track_mask;
        while remaining != 0 {
            let i = remaining.trailing_zeros() as usize;
            remaining &= !(1 << i);
            let slot = &state.tracks[i];
            let name = self.registry.name(i);
            debug_assert!(name.is_some(), "active slot {i} has no kernel name");
            let (Some(name), Some(volume)) = (name, slot.volume_provider.as_ref()) else {
                continue;
            };
            let vlr = volume.volume_lr();
            kernel.set_volume(name, VolumeChannel::Left, vlr.left());
            kernel.set_volume(name, VolumeChannel::Right, vlr.right());
        }

        kernel.process(&mut self.mix_buffer, None);
        self.buffer_state = BufferState::Mixed;
    }

    /// Hand the mix buffer to the sink, bracketed for torn-read detection.
    fn write(&mut self) {
        let state = &self.current;
        if !state.command.contains(Command::WRITE) {
            return;
        }
        let Some(sink) = self.sink.as_ref() else {
            return;
        };
        if self.mix_buffer.is_empty() {
            return;
        }

        if self.buffer_state == BufferState::Undefined {
            self.mix_buffer.fill(0);
            self.buffer_state = BufferState::Zeroed;
        }

        self.dump.begin_write();
        let result = sink.write(&self.mix_buffer);
        self.dump.end_write();
        match result {
            Ok(frames) => self.dump.add_frames_written(frames as u32),
            Err(err) => {
                log::trace!("sink write failed: {err}");
                self.dump.note_write_error();
            }
        }
    }
}
