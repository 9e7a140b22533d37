//! Per-cycle command dispatch
//!
//! Turns the published command into what the cycle does next: stay idle
//! (with a chosen pace), render, or tear down. Cold-idle parking is consumed
//! at most once per published generation; a controller that wants to re-park
//! the worker must bump the generation.

use lm_core::Command;

use crate::{MixState, Pace};

/// What the worker does with the rest of the cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleAction {
    /// Skip rendering and reach the next cycle with the given pace.
    Idle(Pace),
    /// Proceed to the render phase.
    Render,
    /// Tear down and terminate the loop.
    Exit,
}

/// Command state machine.
pub struct CommandStage {
    hot_idle_sleep_ns: u64,
    cold_gen: u32,
}

impl CommandStage {
    pub fn new(hot_idle_sleep_ns: u64) -> Self {
        Self {
            hot_idle_sleep_ns,
            cold_gen: 0,
        }
    }

    /// Dispatch on the current command.
    ///
    /// Panics on a command outside the closed domain; the controller
    /// contract does not allow one, so this is unrecoverable.
    pub fn advance(&mut self, state: &MixState) -> CycleAction {
        match state.command {
            Command::INITIAL | Command::HOT_IDLE => {
                CycleAction::Idle(Pace::Sleep(self.hot_idle_sleep_ns))
            }
            Command::COLD_IDLE => {
                // Park once per generation; a republished state with the
                // same generation degrades to hot-idle pacing.
                if state.cold_gen != self.cold_gen {
                    match &state.cold_gate {
                        Some(gate) => {
                            gate.pass();
                            self.cold_gen = state.cold_gen;
                            CycleAction::Idle(Pace::Spin)
                        }
                        None => {
                            debug_assert!(false, "cold idle published without a gate");
                            CycleAction::Idle(Pace::Sleep(self.hot_idle_sleep_ns))
                        }
                    }
                } else {
                    CycleAction::Idle(Pace::Sleep(self.hot_idle_sleep_ns))
                }
            }
            Command::EXIT => CycleAction::Exit,
            Command::MIX | Command::WRITE | Command::MIX_WRITE => CycleAction::Render,
            other => panic!("bad command {:#x}", other.bits()),
        }
    }
}
