//! Wait-free state handoff between the control thread and the worker
//!
//! A "latest value" channel: the producer publishes immutable snapshots, the
//! consumer polls for the newest one published since its last poll. Both
//! sides complete in a single atomic `swap`, so neither can block the other
//! and neither side allocates. Stale intermediate publications are dropped;
//! only the newest matters.

use std::cell::UnsafeCell;
use std::sync::Arc;

use portable_atomic::{AtomicU32, Ordering};

const INDEX_MASK: u32 = 0b011;
const FRESH: u32 = 0b100;

/// Three slots plus one packed index word.
///
/// The word's low two bits hold the slot index of the newest publication;
/// the `FRESH` bit is set by `publish` and cleared when the consumer takes
/// the slot. At all times the producer's write slot, the published slot, and
/// the consumer's read slot are three distinct indices, so slot access never
/// races: each side touches only the slot it currently owns, and ownership
/// moves through the swap.
struct Shared<T> {
    slots: [UnsafeCell<Option<Arc<T>>>; 3],
    latest: AtomicU32,
}

// Slot contents only move between threads through the `latest` swap, which
// transfers exclusive ownership of the slot index along with it.
unsafe impl<T: Send + Sync> Send for Shared<T> {}
unsafe impl<T: Send + Sync> Sync for Shared<T> {}

/// Single-producer/single-consumer snapshot channel.
pub struct StateQueue<T> {
    shared: Arc<Shared<T>>,
}

impl<T: Send + Sync> StateQueue<T> {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                slots: [
                    UnsafeCell::new(None),
                    UnsafeCell::new(None),
                    UnsafeCell::new(None),
                ],
                latest: AtomicU32::new(1),
            }),
        }
    }

    /// Split into the controller-side writer and the worker-side reader.
    pub fn split(self) -> (StateWriter<T>, StateReader<T>) {
        (
            StateWriter {
                shared: self.shared.clone(),
                write_idx: 0,
            },
            StateReader {
                shared: self.shared,
                read_idx: 2,
            },
        )
    }
}

impl<T: Send + Sync> Default for StateQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Controller side of the channel.
pub struct StateWriter<T> {
    shared: Arc<Shared<T>>,
    write_idx: usize,
}

impl<T: Send + Sync> StateWriter<T> {
    /// Publish a snapshot, superseding any not-yet-polled publication.
    ///
    /// Wait-free; drops any previously superseded snapshot on this thread,
    /// never on the consumer's.
    pub fn publish(&mut self, state: Arc<T>) {
        unsafe {
            *self.shared.slots[self.write_idx].get() = Some(state);
        }
        let prev = self
            .shared
            .latest
            .swap(self.write_idx as u32 | FRESH, Ordering::AcqRel);
        self.write_idx = (prev & INDEX_MASK) as usize;
    }
}

/// Worker side of the channel.
pub struct StateReader<T> {
    shared: Arc<Shared<T>>,
    read_idx: usize,
}

impl<T: Send + Sync> StateReader<T> {
    /// Newest snapshot published since the last poll, or `None`.
    ///
    /// Wait-free and allocation-free: one load, at most one swap, and an
    /// `Arc` clone. The returned `Arc` stays valid for as long as the caller
    /// holds it, independent of later publications.
    pub fn poll(&mut self) -> Option<Arc<T>> {
        if self.shared.latest.load(Ordering::Acquire) & FRESH == 0 {
            return None;
        }
        let prev = self.shared.latest.swap(self.read_idx as u32, Ordering::AcqRel);
        self.read_idx = (prev & INDEX_MASK) as usize;
        unsafe { (*self.shared.slots[self.read_idx].get()).clone() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_empty_poll() {
        let (_writer, mut reader) = StateQueue::<u32>::new().split();
        assert!(reader.poll().is_none());
        assert!(reader.poll().is_none());
    }

    #[test]
    fn test_publish_then_poll() {
        let (mut writer, mut reader) = StateQueue::new().split();

        writer.publish(Arc::new(7u32));
        assert_eq!(reader.poll().as_deref(), Some(&7));

        // No new publication since the last poll.
        assert!(reader.poll().is_none());
    }

    #[test]
    fn test_latest_wins() {
        let (mut writer, mut reader) = StateQueue::new().split();

        writer.publish(Arc::new(1u32));
        writer.publish(Arc::new(2u32));
        writer.publish(Arc::new(3u32));

        assert_eq!(reader.poll().as_deref(), Some(&3));
        assert!(reader.poll().is_none());
    }

    #[test]
    fn test_retained_snapshot_outlives_reuse() {
        let (mut writer, mut reader) = StateQueue::new().split();

        writer.publish(Arc::new(10u32));
        let first = reader.poll().unwrap();

        // Publications re-use all three slots; the consumer's clone must
        // stay readable regardless.
        for i in 0..16u32 {
            writer.publish(Arc::new(i));
            let _ = reader.poll();
        }
        assert_eq!(*first, 10);
    }

    #[test]
    fn test_cross_thread_monotonic() {
        let (mut writer, mut reader) = StateQueue::new().split();
        const COUNT: u64 = 10_000;

        let producer = thread::spawn(move || {
            for i in 0..COUNT {
                writer.publish(Arc::new(i));
            }
        });

        let mut last = 0u64;
        let mut seen = 0u64;
        while last != COUNT - 1 {
            if let Some(v) = reader.poll() {
                assert!(*v >= last, "went backwards: {} after {}", *v, last);
                last = *v;
                seen += 1;
            }
        }
        assert!(seen <= COUNT);
        producer.join().unwrap();
    }
}
