//! Monotonic clock seam
//!
//! Cycle pacing needs nanosecond timestamps and an explicit failure path;
//! `clock_gettime` can report errors where `Instant` cannot. The trait also
//! lets tests feed synthetic cycle times.

use lm_core::ClockError;

/// Monotonic nanosecond clock.
pub trait MonotonicClock: Send {
    fn now_ns(&mut self) -> Result<u64, ClockError>;
}

/// The platform monotonic clock.
#[derive(Debug, Default)]
pub struct SystemClock {
    #[cfg(not(unix))]
    origin: Option<std::time::Instant>,
}

impl SystemClock {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(unix)]
impl MonotonicClock for SystemClock {
    fn now_ns(&mut self) -> Result<u64, ClockError> {
        let mut ts = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        let rc = unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) };
        if rc != 0 {
            let errno = std::io::Error::last_os_error().raw_os_error().unwrap_or(0);
            return Err(ClockError::ReadFailed(errno));
        }
        Ok(ts.tv_sec as u64 * 1_000_000_000 + ts.tv_nsec as u64)
    }
}

#[cfg(not(unix))]
impl MonotonicClock for SystemClock {
    fn now_ns(&mut self) -> Result<u64, ClockError> {
        let origin = *self.origin.get_or_insert_with(std::time::Instant::now);
        Ok(origin.elapsed().as_nanos() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_is_monotonic() {
        let mut clock = SystemClock::new();
        let a = clock.now_ns().unwrap();
        let b = clock.now_ns().unwrap();
        assert!(b >= a);
    }
}
