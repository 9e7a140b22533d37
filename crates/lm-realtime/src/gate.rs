//! Cold-idle parking gate
//!
//! A futex-style "wait while the word equals an expected value / wake by
//! address" primitive built on `parking_lot_core`. The worker passes the
//! gate when entering deep idle; the controller opens it to resume.

use portable_atomic::{AtomicI32, Ordering};
use parking_lot_core::{park, unpark_all, DEFAULT_PARK_TOKEN, DEFAULT_UNPARK_TOKEN};

/// Shared parking word for deep idle.
///
/// Protocol: the worker decrements the word once per cold-idle generation
/// and parks when the pre-decrement value was not positive. The controller
/// primes the word before publishing cold idle, and increments plus wakes to
/// release the worker. Spurious wakeups are allowed; the worker re-evaluates
/// its published state on the next cycle.
pub struct ColdGate {
    word: AtomicI32,
}

impl ColdGate {
    pub fn new(initial: i32) -> Self {
        Self {
            word: AtomicI32::new(initial),
        }
    }

    /// Worker side: consume one pass through the gate.
    ///
    /// Decrements the word; if the pre-decrement value was `<= 0`, parks on
    /// the word's address until the controller wakes it (or a spurious wake
    /// occurs). This is the only suspension point besides the worker's
    /// top-of-loop sleep.
    pub fn pass(&self) {
        let old = self.word.fetch_sub(1, Ordering::AcqRel);
        if old <= 0 {
            let expected = old.wrapping_sub(1);
            log::debug!("cold idle: parking (word {})", expected);
            unsafe {
                park(
                    self.key(),
                    || self.word.load(Ordering::Acquire) == expected,
                    || {},
                    |_, _| {},
                    DEFAULT_PARK_TOKEN,
                    None,
                );
            }
            log::debug!("cold idle: woke");
        }
    }

    /// Controller side: release a parked worker.
    pub fn open(&self) {
        self.word.fetch_add(1, Ordering::AcqRel);
        unsafe {
            unpark_all(self.key(), DEFAULT_UNPARK_TOKEN);
        }
    }

    /// Controller side: prime the word before publishing cold idle.
    pub fn set(&self, value: i32) {
        self.word.store(value, Ordering::Release);
    }

    pub fn value(&self) -> i32 {
        self.word.load(Ordering::Acquire)
    }

    fn key(&self) -> usize {
        &self.word as *const AtomicI32 as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        false
    }

    #[test]
    fn test_positive_word_does_not_park() {
        let gate = ColdGate::new(1);
        // Pre-decrement value is 1 > 0, so this returns immediately.
        gate.pass();
        assert_eq!(gate.value(), 0);
    }

    #[test]
    fn test_park_and_wake() {
        let gate = Arc::new(ColdGate::new(0));
        let worker_gate = gate.clone();

        let worker = thread::spawn(move || {
            worker_gate.pass();
        });

        // The worker decrements to -1 and parks.
        assert!(wait_for(|| gate.value() == -1));
        assert!(!worker.is_finished());

        gate.open();
        assert_eq!(gate.value(), 0);
        worker.join().unwrap();
    }

    #[test]
    fn test_open_before_pass_skips_park() {
        let gate = ColdGate::new(0);
        gate.open();
        // Word is now 1; pass decrements to 0 without parking.
        gate.pass();
        assert_eq!(gate.value(), 0);
    }
}
