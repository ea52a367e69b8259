//! This module contains both fixed device configuration, chosen when the engine is constructed, and the global
//! settings that can be changed over the bus at runtime.

mod channel_mode;
pub use channel_mode::*;

mod settings;
pub use settings::*;

use embassy_time::Duration;

/// Default length of a ratcheted note, in percent of the interval between re-triggers.
pub const DEFAULT_RATCHET_LENGTH: u8 = 75;

/// Default shortest interval between two updates of a ramp.
pub const DEFAULT_RAMP_GRAIN: Duration = Duration::from_millis(30);

/// Device configuration which does not change while the engine is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Determines the number of output channels and how they are routed.
    pub channel_mode: ChannelMode,
    /// Length of each ratcheted note in percent of the re-trigger interval. Must be non-zero.
    pub ratchet_length: u8,
    /// Shortest interval between outgoing messages of a ramp, limiting wire traffic while slewing.
    pub ramp_grain: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            channel_mode: ChannelMode::default(),
            ratchet_length: DEFAULT_RATCHET_LENGTH,
            ramp_grain: DEFAULT_RAMP_GRAIN,
        }
    }
}

impl Config {
    /// Returns the ratchet length as a divisor, never zero.
    pub(crate) fn ratchet_percent(&self) -> i64 {
        i64::from(self.ratchet_length.max(1))
    }
}
