//! Worker counters observable from other threads
//!
//! The worker is the only writer. Readers are observational: torn reads of
//! the `(write_sequence, frames_written)` pair are detected through the
//! sequence's parity, which is odd exactly while a sink write is in flight.

use std::io;

use lm_core::Command;
use portable_atomic::{AtomicBool, AtomicF64, AtomicU32, Ordering};
use serde::{Deserialize, Serialize};

/// Counters and statistics published by the fast-path worker.
#[derive(Debug)]
pub struct DumpState {
    command: AtomicU32,
    write_sequence: AtomicU32,
    frames_written: AtomicU32,
    num_tracks: AtomicU32,
    write_errors: AtomicU32,
    underruns: AtomicU32,
    overruns: AtomicU32,
    // Cycle time in seconds, refreshed once per statistics window.
    mean: AtomicF64,
    min: AtomicF64,
    max: AtomicF64,
    stddev: AtomicF64,
    stats_valid: AtomicBool,
}

impl DumpState {
    pub fn new() -> Self {
        Self {
            command: AtomicU32::new(Command::INITIAL.bits()),
            write_sequence: AtomicU32::new(0),
            frames_written: AtomicU32::new(0),
            num_tracks: AtomicU32::new(0),
            write_errors: AtomicU32::new(0),
            underruns: AtomicU32::new(0),
            overruns: AtomicU32::new(0),
            mean: AtomicF64::new(0.0),
            min: AtomicF64::new(0.0),
            max: AtomicF64::new(0.0),
            stddev: AtomicF64::new(0.0),
            stats_valid: AtomicBool::new(false),
        }
    }

    // Worker side.

    pub fn set_command(&self, command: Command) {
        self.command.store(command.bits(), Ordering::Relaxed);
    }

    pub fn set_num_tracks(&self, count: u32) {
        self.num_tracks.store(count, Ordering::Relaxed);
    }

    /// Bracket the start of a sink write; the sequence becomes odd.
    pub fn begin_write(&self) {
        self.write_sequence.fetch_add(1, Ordering::Release);
    }

    /// Bracket the end of a sink write; the sequence becomes even again.
    pub fn end_write(&self) {
        self.write_sequence.fetch_add(1, Ordering::Release);
    }

    pub fn add_frames_written(&self, frames: u32) {
        self.frames_written.fetch_add(frames, Ordering::Release);
    }

    pub fn note_write_error(&self) {
        self.write_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn note_underrun(&self) {
        self.underruns.fetch_add(1, Ordering::Relaxed);
    }

    pub fn note_overrun(&self) {
        self.overruns.fetch_add(1, Ordering::Relaxed);
    }

    pub fn publish_cycle_stats(&self, mean: f64, min: f64, max: f64, stddev: f64) {
        self.mean.store(mean, Ordering::Relaxed);
        self.min.store(min, Ordering::Relaxed);
        self.max.store(max, Ordering::Relaxed);
        self.stddev.store(stddev, Ordering::Relaxed);
        self.stats_valid.store(true, Ordering::Release);
    }

    // Reader side.

    pub fn command(&self) -> Command {
        Command::from_bits(self.command.load(Ordering::Relaxed))
    }

    pub fn num_tracks(&self) -> u32 {
        self.num_tracks.load(Ordering::Relaxed)
    }

    pub fn write_errors(&self) -> u32 {
        self.write_errors.load(Ordering::Relaxed)
    }

    pub fn underruns(&self) -> u32 {
        self.underruns.load(Ordering::Relaxed)
    }

    pub fn overruns(&self) -> u32 {
        self.overruns.load(Ordering::Relaxed)
    }

    /// Consistent `(write_sequence, frames_written)` pair.
    ///
    /// Spins until the sequence is even and stable around the frame counter
    /// read, so the pair reflects only completed writes.
    pub fn read_write_counts(&self) -> (u32, u32) {
        loop {
            let before = self.write_sequence.load(Ordering::Acquire);
            if before & 1 != 0 {
                core::hint::spin_loop();
                continue;
            }
            let frames = self.frames_written.load(Ordering::Acquire);
            let after = self.write_sequence.load(Ordering::Acquire);
            if before == after {
                return (before, frames);
            }
        }
    }

    /// Plain snapshot of all counters, safe to persist or ship elsewhere.
    ///
    /// The command is rendered as its short ASCII name, falling back to the
    /// numeric value for bit patterns outside the known set.
    pub fn snapshot(&self) -> DumpSnapshot {
        let (write_sequence, frames_written) = self.read_write_counts();
        let command = Command::from_bits(self.command.load(Ordering::Relaxed));
        DumpSnapshot {
            command: match command.name() {
                Some(name) => name.to_string(),
                None => command.bits().to_string(),
            },
            write_sequence,
            frames_written,
            num_tracks: self.num_tracks.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
            underruns: self.underruns.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            cycle_time: self.cycle_time_stats(),
        }
    }

    fn cycle_time_stats(&self) -> Option<CycleTimeStats> {
        if !self.stats_valid.load(Ordering::Acquire) {
            return None;
        }
        Some(CycleTimeStats {
            mean: self.mean.load(Ordering::Relaxed),
            min: self.min.load(Ordering::Relaxed),
            max: self.max.load(Ordering::Relaxed),
            stddev: self.stddev.load(Ordering::Relaxed),
        })
    }

    /// Human-readable dump. Call from a non-realtime context.
    pub fn dump<W: io::Write>(&self, w: &mut W) -> io::Result<()> {
        let s = self.snapshot();
        writeln!(
            w,
            "LiveMix command={} writeSequence={} framesWritten={}",
            s.command, s.write_sequence, s.frames_written
        )?;
        writeln!(
            w,
            "        numTracks={} writeErrors={} underruns={} overruns={}",
            s.num_tracks, s.write_errors, s.underruns, s.overruns
        )?;
        if let Some(ct) = &s.cycle_time {
            writeln!(
                w,
                "        cycle time in ms: mean={:.1} min={:.1} max={:.1} stddev={:.1}",
                ct.mean * 1e3,
                ct.min * 1e3,
                ct.max * 1e3,
                ct.stddev * 1e3
            )?;
        }
        Ok(())
    }
}

impl Default for DumpState {
    fn default() -> Self {
        Self::new()
    }
}

/// Long-term cycle time statistics in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CycleTimeStats {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub stddev: f64,
}

/// Point-in-time copy of the worker counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DumpSnapshot {
    /// Command name, or the numeric bit pattern for unknown values.
    pub command: String,
    pub write_sequence: u32,
    pub frames_written: u32,
    pub num_tracks: u32,
    pub write_errors: u32,
    pub underruns: u32,
    pub overruns: u32,
    pub cycle_time: Option<CycleTimeStats>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_bracketing_parity() {
        let dump = DumpState::new();

        let (seq, frames) = dump.read_write_counts();
        assert_eq!(seq, 0);
        assert_eq!(frames, 0);

        dump.begin_write();
        // An in-flight write leaves the sequence odd; a reader would spin
        // here, so only check the raw value.
        assert_eq!(dump.write_sequence.load(Ordering::Acquire) & 1, 1);

        dump.add_frames_written(192);
        dump.end_write();

        let (seq, frames) = dump.read_write_counts();
        assert_eq!(seq, 2);
        assert_eq!(frames, 192);
    }

    #[test]
    fn test_snapshot_fields() {
        let dump = DumpState::new();
        dump.set_command(Command::MIX_WRITE);
        dump.set_num_tracks(3);
        dump.note_underrun();
        dump.note_write_error();

        let s = dump.snapshot();
        assert_eq!(s.command, "MIX_WRITE");
        assert_eq!(s.num_tracks, 3);
        assert_eq!(s.underruns, 1);
        assert_eq!(s.overruns, 0);
        assert_eq!(s.write_errors, 1);
        assert!(s.cycle_time.is_none());
    }

    #[test]
    fn test_dump_text() {
        let dump = DumpState::new();
        dump.set_command(Command::MIX_WRITE);
        dump.begin_write();
        dump.add_frames_written(192);
        dump.end_write();
        dump.set_num_tracks(1);

        let mut out = Vec::new();
        dump.dump(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("command=MIX_WRITE"));
        assert!(lines[0].contains("writeSequence=2"));
        assert!(lines[0].contains("framesWritten=192"));
        assert!(lines[1].contains("numTracks=1"));
        assert!(lines[1].contains("underruns=0"));
    }

    #[test]
    fn test_dump_text_unknown_command_and_stats() {
        let dump = DumpState::new();
        dump.set_command(Command::from_bits(0x40));
        dump.publish_cycle_stats(0.004, 0.0039, 0.0042, 0.0001);

        let mut out = Vec::new();
        dump.dump(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        // Unknown commands fall back to the numeric value.
        assert!(text.contains("command=64"));
        assert!(text.contains("cycle time in ms: mean=4.0"));
    }
}
