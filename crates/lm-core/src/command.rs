//! Worker command word

/// Command published to the fast-path worker.
///
/// The command is a bit word rather than a flat enum: `MIX_WRITE` is the
/// composition of `MIX` and `WRITE`, and the worker tests each bit
/// independently. The domain is closed; any other bit pattern is rejected by
/// the worker as fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Command(u32);

impl Command {
    /// Start-of-life idle, before the controller publishes a real state.
    pub const INITIAL: Command = Command(0x01);
    /// Low-latency idle: sleep briefly and re-poll.
    pub const HOT_IDLE: Command = Command(0x02);
    /// Deep idle: park on the cold gate until the controller wakes us.
    pub const COLD_IDLE: Command = Command(0x04);
    /// Tear down and terminate the loop.
    pub const EXIT: Command = Command(0x08);
    /// Render the active tracks into the mix buffer.
    pub const MIX: Command = Command(0x10);
    /// Write the mix buffer to the output sink.
    pub const WRITE: Command = Command(0x20);
    /// Mix and write in the same cycle.
    pub const MIX_WRITE: Command = Command(0x30);

    const IDLE_MASK: u32 = 0x07;

    /// Reconstruct a command from its raw bit pattern.
    ///
    /// No validation happens here; the worker's command stage owns the
    /// closed-domain check.
    #[inline]
    pub const fn from_bits(bits: u32) -> Command {
        Command(bits)
    }

    /// Raw bit pattern.
    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// True for `INITIAL`, `HOT_IDLE`, and `COLD_IDLE`.
    #[inline]
    pub const fn is_idle(self) -> bool {
        self.0 & Self::IDLE_MASK != 0
    }

    /// True when all of `other`'s bits are set in `self`.
    #[inline]
    pub const fn contains(self, other: Command) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    /// Short ASCII name for exact command values, `None` otherwise.
    pub const fn name(self) -> Option<&'static str> {
        match self.0 {
            0x01 => Some("INITIAL"),
            0x02 => Some("HOT_IDLE"),
            0x04 => Some("COLD_IDLE"),
            0x08 => Some("EXIT"),
            0x10 => Some("MIX"),
            0x20 => Some("WRITE"),
            0x30 => Some("MIX_WRITE"),
            _ => None,
        }
    }
}

impl Default for Command {
    fn default() -> Self {
        Self::INITIAL
    }
}
