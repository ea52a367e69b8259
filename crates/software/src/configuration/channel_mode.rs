use crate::io::Transport;
use num_derive::{FromPrimitive, ToPrimitive};

/// Number of channels served by a single MIDI transport.
pub const CHANNELS_PER_TRANSPORT: u8 = 16;

/// Determines how many output channels the device addresses and where they are sent.
///
/// Channels 0 through 15 always go out over the TRS jack. In [`ChannelMode::Extended`], channels 16 through 31
/// address devices attached to the USB host port, where they appear as channels 0 through 15 again.
#[derive(Debug, Default, Clone, Copy, ToPrimitive, FromPrimitive, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChannelMode {
    /// 16 output channels, all on the TRS transport.
    #[default]
    Trs,
    /// 32 output channels; the upper 16 are routed to the USB host transport.
    Extended,
}

impl ChannelMode {
    /// Returns the number of addressable output channels.
    pub fn output_channels(&self) -> u8 {
        match self {
            Self::Trs => CHANNELS_PER_TRANSPORT,
            Self::Extended => CHANNELS_PER_TRANSPORT * 2,
        }
    }

    /// Returns `true` if `channel` is a valid output channel index in this mode.
    pub fn contains(&self, channel: i32) -> bool {
        (0..i32::from(self.output_channels())).contains(&channel)
    }

    /// Classifies an output channel by the [`Transport`] it is sent over, without regard to the current mode.
    pub fn transport(channel: u8) -> Transport {
        if channel < CHANNELS_PER_TRANSPORT {
            Transport::Trs
        } else {
            Transport::UsbHost
        }
    }
}
