//! The [`Engine`] owns every piece of musical state of the device and turns commands and the passing of time into
//! outbound MIDI.
//!
//! Nothing in here blocks or talks to hardware. Time is passed in as an [`Instant`], and outbound messages go to a
//! [`MidiOut`]. The host is expected to call [`Engine::tick`] periodically and to hand over command frames and
//! received MIDI as they arrive, one at a time.

mod chord;
mod control;
mod dispatch;
mod notes;
mod ramp;
mod scheduled;

pub use chord::{CHORD_MAX_LENGTH, CHORDS, Chord};
pub use control::{
    CC_MAX, CONTROLLERS, CcState, Controls, NRPN_MAX, NRPN_SLOTS, scale_down, scale_up,
};
pub use notes::{ActiveNote, NOTES_PER_CHANNEL, NotePool};
pub use ramp::{Assignment, RAMPS, Ramp, RampKind, RampOutput, Ramps};
pub use scheduled::{SCHEDULED_NOTES, ScheduledNotes};

use crate::configuration::{CHANNELS_PER_TRANSPORT, Config, Settings};
use crate::io::{MidiOut, Transport, route};
use crate::midi_state::{MidiState, Operation};
use embassy_time::Instant;
use wmidi::{Channel, MidiMessage, U7, U14};

/// Number of output channels state is kept for, regardless of the [`crate::configuration::ChannelMode`].
const OUTPUT_CHANNELS: usize = 2 * CHANNELS_PER_TRANSPORT as usize;

/// System Real-Time messages the engine can send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Realtime {
    /// Timing Clock.
    Clock,
    /// Start.
    Start,
    /// Stop.
    Stop,
    /// Continue.
    Continue,
}

/// All state of the device.
pub struct Engine {
    config: Config,
    settings: Settings,
    notes: [NotePool; OUTPUT_CHANNELS],
    scheduled: ScheduledNotes,
    controls: Controls,
    ramps: Ramps,
    chords: [Chord; CHORDS],
    midi_in: MidiState,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl Engine {
    /// Constructs a new `Engine` with default [`Settings`].
    pub fn new(config: Config) -> Self {
        info!(
            "Starting engine with {} output channels",
            config.channel_mode.output_channels()
        );
        Self {
            config,
            settings: Settings::default(),
            notes: [NotePool::default(); OUTPUT_CHANNELS],
            scheduled: ScheduledNotes::default(),
            controls: Controls::default(),
            ramps: Ramps::default(),
            chords: [Chord::default(); CHORDS],
            midi_in: MidiState::default(),
        }
    }

    /// Getter.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Getter.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Returns the settings for modification.
    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    /// Advances everything that depends on time, in a fixed order: note durations and ratchets, then scheduled
    /// notes, then ramps.
    pub fn tick(&mut self, now: Instant, out: &mut impl MidiOut) {
        self.check_durations(now, out);
        self.check_scheduled(now, out);
        self.update_ramps(now, out);
    }

    /// Sends a Program Change. Invalid channels and programs are ignored.
    pub fn program_change(&self, channel: i32, program: i32, out: &mut impl MidiOut) {
        if !self.config.channel_mode.contains(channel) || !(0..=127).contains(&program) {
            return;
        }
        self.send(channel as u8, out, |wire| {
            MidiMessage::ProgramChange(wire, U7::from_u8_lossy(program as u8))
        });
    }

    /// Sends a Pitch Bend, `value` being clamped to `-8192..=8191` around the center.
    pub fn pitch_bend(&self, channel: i32, value: i32, out: &mut impl MidiOut) {
        if !self.config.channel_mode.contains(channel) {
            return;
        }
        let Ok(value) = U14::try_from((value.clamp(-8192, 8191) + 8192) as u16) else {
            return;
        };
        self.send(channel as u8, out, |wire| MidiMessage::PitchBendChange(wire, value));
    }

    /// Sends Channel Pressure, `value` being clamped to `0..=127`.
    pub fn aftertouch(&self, channel: i32, value: i32, out: &mut impl MidiOut) {
        if !self.config.channel_mode.contains(channel) {
            return;
        }
        let value = value.clamp(0, 127) as u8;
        self.send(channel as u8, out, |wire| {
            MidiMessage::ChannelPressure(wire, U7::from_u8_lossy(value))
        });
    }

    /// Sends a System Real-Time message over the TRS jack.
    pub fn realtime(&self, message: Realtime, out: &mut impl MidiOut) {
        let message = match message {
            Realtime::Clock => MidiMessage::TimingClock,
            Realtime::Start => MidiMessage::Start,
            Realtime::Stop => MidiMessage::Stop,
            Realtime::Continue => MidiMessage::Continue,
        };
        trace!("Sending real-time message");
        out.send(Transport::Trs, message);
    }

    /// Processes one or more USB-MIDI Event Packets received from the USB host port.
    pub fn receive_midi(&mut self, data: &[u8]) -> Operation {
        self.midi_in.update(data)
    }

    /// Processes a single received message.
    pub fn receive_message(&mut self, message: &MidiMessage) -> Operation {
        self.midi_in.receive(message)
    }

    /// Returns what has been received from the USB host port.
    pub fn midi_in(&self) -> &MidiState {
        &self.midi_in
    }

    /// Enables (1) or disables (0) latching of received notes. Other values are ignored.
    pub fn set_latch(&mut self, value: i32) {
        match value {
            0 => self.midi_in.set_latch(false),
            1 => self.midi_in.set_latch(true),
            _ => {}
        }
    }

    /// Routes a channel message and hands it to `out`, then signals activity.
    fn send(
        &self,
        channel: u8,
        out: &mut impl MidiOut,
        message: impl FnOnce(Channel) -> MidiMessage<'static>,
    ) {
        if let Some((transport, wire)) = route(channel, self.config.channel_mode) {
            trace!("Sending MIDI on channel {}", channel);
            out.send(transport, message(wire));
        }
        out.indicate();
    }
}
