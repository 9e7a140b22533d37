//! Output format descriptor

use serde::{Deserialize, Serialize};

/// Format reported by an output sink.
///
/// The fast path renders interleaved signed 16-bit stereo; `channel_count`
/// other than 2 violates the sink contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Format {
    pub sample_rate: u32,
    pub channel_count: u32,
}

impl Format {
    /// Stereo format at the given sample rate.
    pub const fn stereo(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            channel_count: 2,
        }
    }
}
