//! Self-correcting cycle scheduler
//!
//! After each render cycle the pacer measures the elapsed time against the
//! nominal period and decides how the worker reaches the next cycle: busy
//! wait, yield once, or sleep. Cycles outside the envelope are counted as
//! underruns (too long) or overruns (too short) and the next cycle length is
//! adjusted to pull back toward nominal.

use lm_realtime::DumpState;

use crate::MonotonicClock;

/// How the worker gets to the top of the next cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pace {
    /// No sleep: go straight into the next cycle.
    Spin,
    /// Yield the CPU once.
    Yield,
    /// Sleep for the given duration, strictly below one second.
    Sleep(u64),
}

impl Pace {
    /// `Sleep(ns)`, degrading to `Yield` when the duration is zero.
    #[inline]
    pub fn sleep_or_yield(ns: u64) -> Pace {
        if ns == 0 {
            Pace::Yield
        } else {
            Pace::Sleep(ns)
        }
    }
}

/// Cycle timing thresholds and long-term statistics.
pub struct CyclePacer {
    period_ns: u64,
    underrun_ns: u64,
    overrun_ns: u64,
    last_ns: Option<u64>,
    /// Armed on baseline resets and after an underrun, so the corrective
    /// short cycle that follows is not counted as an overrun.
    ignore_next_overrun: bool,
    stats: CycleStats,
    window: usize,
}

impl CyclePacer {
    pub fn new(window: usize) -> Self {
        Self {
            period_ns: 0,
            underrun_ns: 0,
            overrun_ns: 0,
            last_ns: None,
            ignore_next_overrun: true,
            stats: CycleStats::new(),
            window,
        }
    }

    /// Recompute thresholds for a new frame count and sample rate.
    ///
    /// Nominal period is `frame_count / sample_rate`; a cycle longer than
    /// 1.75x is an underrun, shorter than 0.25x is an overrun.
    pub fn configure(&mut self, frame_count: usize, sample_rate: u32) {
        let fc = frame_count as u64;
        let sr = sample_rate as u64;
        self.period_ns = fc * 1_000_000_000 / sr;
        self.underrun_ns = fc * 1_750_000_000 / sr;
        self.overrun_ns = fc * 250_000_000 / sr;
    }

    /// Forget the thresholds; used when no valid format is available.
    pub fn deconfigure(&mut self) {
        self.period_ns = 0;
        self.underrun_ns = 0;
        self.overrun_ns = 0;
    }

    /// Drop the timing baseline, e.g. across an idle period.
    ///
    /// The next measured cycle only re-establishes the baseline, and the
    /// first short cycle after it is not counted as an overrun.
    pub fn invalidate_baseline(&mut self) {
        self.last_ns = None;
        self.ignore_next_overrun = true;
    }

    pub fn period_ns(&self) -> u64 {
        self.period_ns
    }

    /// Measure the cycle that just ended and pick the next pace.
    pub fn end_cycle(&mut self, clock: &mut dyn MonotonicClock, dump: &DumpState) -> Pace {
        let now = match clock.now_ns() {
            Ok(now) => now,
            Err(err) => {
                // Broken clock: drop the baseline and fall back to one
                // nominal period.
                log::warn!("monotonic clock failed: {err}");
                self.last_ns = None;
                return Pace::sleep_or_yield(self.period_ns);
            }
        };

        let Some(last) = self.last_ns.replace(now) else {
            self.ignore_next_overrun = true;
            return Pace::sleep_or_yield(self.period_ns);
        };

        let delta_ns = now.saturating_sub(last);
        let pace = if delta_ns > self.underrun_ns {
            log::trace!("underrun: cycle took {} ns", delta_ns);
            dump.note_underrun();
            self.ignore_next_overrun = true;
            Pace::Spin
        } else if delta_ns < self.overrun_ns {
            if self.ignore_next_overrun {
                self.ignore_next_overrun = false;
            } else {
                log::trace!("overrun: cycle took {} ns", delta_ns);
                dump.note_overrun();
            }
            Pace::sleep_or_yield(self.period_ns - self.overrun_ns)
        } else {
            self.ignore_next_overrun = false;
            Pace::Spin
        };

        self.stats.sample(delta_ns as f64 * 1e-9);
        if self.stats.len() >= self.window {
            self.stats.publish(dump);
            self.stats = CycleStats::new();
        }

        pace
    }
}

/// Streaming mean/min/max/variance of cycle times in seconds.
struct CycleStats {
    n: u32,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl CycleStats {
    fn new() -> Self {
        Self {
            n: 0,
            mean: 0.0,
            m2: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    fn sample(&mut self, x: f64) {
        self.n += 1;
        let delta = x - self.mean;
        self.mean += delta / self.n as f64;
        self.m2 += delta * (x - self.mean);
        self.min = self.min.min(x);
        self.max = self.max.max(x);
    }

    fn len(&self) -> usize {
        self.n as usize
    }

    fn publish(&self, dump: &DumpState) {
        let stddev = if self.n > 1 {
            (self.m2 / (self.n - 1) as f64).sqrt()
        } else {
            0.0
        };
        dump.publish_cycle_stats(self.mean, self.min, self.max, stddev);
    }
}
