//! lm-realtime: Lock-free building blocks for the LiveMix fast-path worker
//!
//! Everything here is shared between the control thread and the real-time
//! worker without taking a lock:
//! - `StateQueue`: wait-free single-producer/single-consumer handoff of the
//!   newest published state snapshot
//! - `ColdGate`: futex-style parking word for deep idle
//! - `DumpState`: worker-written counters observable from any thread

mod dump;
mod gate;
mod state_queue;

pub use dump::*;
pub use gate::*;
pub use state_queue::*;
