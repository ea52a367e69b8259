use bitmask_enum::bitmask;
use wmidi::{Channel, MidiMessage, Note, Velocity};

mod note_history;
pub use note_history::*;

/// Number of MIDI channels received from the USB host port.
pub const INPUT_CHANNELS: usize = 16;

/// Number of controllers remembered per input channel.
pub const INPUT_CONTROLLERS: usize = 128;

/// Operations that may be performed during a state update.
#[bitmask(u8)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Operation {
    /// Indicates a note was added to or removed from a history during the last state update.
    NoteChange,
    /// Indicates a controller value changed during the last state update.
    ControlChange,
}

/// The most recent message of each kind, regardless of channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LastReceived {
    /// Index (0..=15) of the channel of the last note or controller message.
    pub channel: u8,
    /// Note number of the last Note On.
    pub note: u8,
    /// Velocity of the last Note On.
    pub velocity: u8,
    /// Note number of the last Note Off.
    pub note_off: u8,
    /// Controller number of the last Control Change.
    pub controller: u8,
    /// Value of the last Control Change.
    pub value: u8,
}

/// A straightforward representation of the MIDI messages the device has received from the USB host port.
///
/// Notes are tracked per channel in a [`NoteHistory`]. With latch enabled, Note Off messages are ignored and
/// notes stay in the history until they are pushed out by newer ones or the latch setting changes. Controller
/// values are mirrored as received.
#[derive(Clone, Copy)]
pub struct MidiState {
    histories: [NoteHistory; INPUT_CHANNELS],
    controllers: [[u8; INPUT_CONTROLLERS]; INPUT_CHANNELS],
    latch: bool,
    last: LastReceived,
}

impl Default for MidiState {
    fn default() -> Self {
        Self {
            histories: [NoteHistory::default(); INPUT_CHANNELS],
            controllers: [[0; INPUT_CONTROLLERS]; INPUT_CHANNELS],
            latch: true,
            last: LastReceived::default(),
        }
    }
}

impl MidiState {
    /// Updates the `MidiState` given a slice of data. Returns the type of [`Operation`] performed.
    ///
    /// Data may contain one or more USB-MIDI Event Packets.
    pub fn update(&mut self, data: &[u8]) -> Operation {
        let mut operation = Operation::none();
        data.chunks(4)
            .filter_map(|potential_packet| {
                if potential_packet.len() != 4 {
                    error!("USB-MIDI Event Packets must always be 32 bits long");
                    None
                } else {
                    // the zeroth byte is intentionally ignored because the Packet Header is not of interest;
                    // the remaining three bytes contain the actual MIDI event
                    MidiMessage::from_bytes(&potential_packet[1..]).ok()
                }
            })
            .for_each(|msg| operation |= self.receive(&msg));
        operation
    }

    /// Applies a single received message. Returns the type of [`Operation`] performed.
    pub fn receive(&mut self, msg: &MidiMessage) -> Operation {
        match *msg {
            MidiMessage::NoteOn(channel, note, velocity) if u8::from(velocity) == 0 => {
                self.note_off(channel, note)
            }
            MidiMessage::NoteOn(channel, note, velocity) => self.note_on(channel, note, velocity),
            MidiMessage::NoteOff(channel, note, _) => self.note_off(channel, note),
            MidiMessage::ControlChange(channel, function, value) => {
                let index = usize::from(channel.index());
                let controller = u8::from(function);
                self.controllers[index][usize::from(controller)] = u8::from(value);
                self.last.controller = controller;
                self.last.value = u8::from(value);
                self.last.channel = channel.index();
                debug!(
                    "Received Control Change: channel {}, controller {}, value {}",
                    channel.number(),
                    controller,
                    u8::from(value)
                );
                Operation::ControlChange
            }
            _ => {
                trace!("Ignoring unsupported MIDI message");
                Operation::none()
            }
        }
    }

    fn note_on(&mut self, channel: Channel, note: Note, velocity: Velocity) -> Operation {
        let history = &mut self.histories[usize::from(channel.index())];
        // without latch a note is only ever listed once
        if !self.latch {
            history.remove(note);
        }
        history.add(note, velocity);
        self.last.note = note as u8;
        self.last.velocity = u8::from(velocity);
        self.last.channel = channel.index();
        debug!(
            "Received NoteOn: channel {}, note {}, velocity {}",
            channel.number(),
            note as u8,
            u8::from(velocity)
        );
        Operation::NoteChange
    }

    fn note_off(&mut self, channel: Channel, note: Note) -> Operation {
        let mut operation = Operation::none();
        if !self.latch {
            self.histories[usize::from(channel.index())].remove(note);
            operation |= Operation::NoteChange;
        }
        self.last.note_off = note as u8;
        self.last.channel = channel.index();
        debug!(
            "Received NoteOff: channel {}, note {}",
            channel.number(),
            note as u8
        );
        operation
    }

    /// Returns whether Note Off messages are ignored by the histories.
    pub fn latch(&self) -> bool {
        self.latch
    }

    /// Changes the latch setting. Every history is cleared, as its contents were collected under the old rules.
    pub fn set_latch(&mut self, latch: bool) {
        self.latch = latch;
        self.histories.iter_mut().for_each(NoteHistory::clear);
        info!("Latch set to {}; note histories cleared", latch);
    }

    /// Returns the note history of an input channel, if the index is valid.
    pub fn history(&self, channel: usize) -> Option<&NoteHistory> {
        self.histories.get(channel)
    }

    /// Returns the last value received for a controller, if channel and controller are valid.
    pub fn controller(&self, channel: usize, controller: usize) -> Option<u8> {
        self.controllers
            .get(channel)
            .and_then(|controllers| controllers.get(controller))
            .copied()
    }

    /// Returns the most recent message of each kind.
    pub fn last(&self) -> &LastReceived {
        &self.last
    }
}

/// Encodes a message as a USB-MIDI Event Packet on cable 0, mainly useful to feed [`MidiState::update`].
pub fn usb_packet(msg: &MidiMessage) -> [u8; 4] {
    let mut packet = [0_u8; 4];
    // the Code Index Number equals the high nibble of the status byte for channel voice messages
    if msg.copy_to_slice(&mut packet[1..]).is_ok() {
        packet[0] = packet[1] >> 4;
    }
    packet
}
