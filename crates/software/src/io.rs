//! This module provides the seams between the engine and the device's transports.
//!
//! The engine never talks to hardware. Outbound MIDI is handed to a [`MidiOut`] implementation together with the
//! [`Transport`] it should leave on; the firmware decides how to frame and send it.

use crate::configuration::{CHANNELS_PER_TRANSPORT, ChannelMode};
use wmidi::{Channel, MidiMessage};

/// The physical MIDI outputs of the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Transport {
    /// Serial MIDI over the 3.5mm TRS jack.
    Trs,
    /// MIDI sent to devices attached to the USB host port.
    UsbHost,
}

/// Sink for the MIDI messages produced by the engine.
pub trait MidiOut {
    /// Sends `message` over `transport`.
    fn send(&mut self, transport: Transport, message: MidiMessage<'static>);

    /// Signals outbound activity, e.g. by blinking an LED. Called once per channel message the engine attempts to
    /// send, including note-ons suppressed by the note range.
    fn indicate(&mut self) {}
}

/// Maps an output channel index to the transport and wire channel it is sent on.
///
/// Returns `None` for channels the [`ChannelMode`] does not address.
pub fn route(channel: u8, mode: ChannelMode) -> Option<(Transport, Channel)> {
    if !mode.contains(i32::from(channel)) {
        return None;
    }
    let transport = ChannelMode::transport(channel);
    let index = match transport {
        Transport::Trs => channel,
        Transport::UsbHost => channel - CHANNELS_PER_TRANSPORT,
    };
    Channel::from_index(index)
        .ok()
        .map(|channel| (transport, channel))
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_trs() {
        assert_eq!(
            Some((Transport::Trs, Channel::Ch1)),
            route(0, ChannelMode::Trs),
            "Expected left but got right"
        );
        assert_eq!(
            Some((Transport::Trs, Channel::Ch16)),
            route(15, ChannelMode::Extended),
            "Expected left but got right"
        );
    }

    #[test]
    fn route_usb_host_only_when_extended() {
        assert_eq!(None, route(16, ChannelMode::Trs));
        assert_eq!(
            Some((Transport::UsbHost, Channel::Ch1)),
            route(16, ChannelMode::Extended),
            "Expected left but got right"
        );
        assert_eq!(
            Some((Transport::UsbHost, Channel::Ch16)),
            route(31, ChannelMode::Extended),
            "Expected left but got right"
        );
        assert_eq!(None, route(32, ChannelMode::Extended));
    }
}
