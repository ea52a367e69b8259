//! Per-channel pools of sounding notes, their durations and ratchets.

use super::Engine;
use crate::io::MidiOut;
use embassy_time::Instant;
use wmidi::{MidiMessage, Note, U7};

/// Number of notes tracked per output channel.
pub const NOTES_PER_CHANNEL: usize = 8;

/// A note that was started on an output channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ActiveNote {
    number: u8,
    velocity: u8,
    start: Instant,
    /// Milliseconds; 0 holds the note until it is turned off explicitly.
    duration: u32,
    on: bool,
    /// Remaining re-triggers including the current one.
    ratchets: u16,
}

impl Default for ActiveNote {
    fn default() -> Self {
        Self {
            number: 0,
            velocity: 0,
            start: Instant::MIN,
            duration: 0,
            on: false,
            ratchets: 0,
        }
    }
}

impl ActiveNote {
    /// The note number sent on the wire, after transposition.
    pub fn number(&self) -> u8 {
        self.number
    }

    /// Getter.
    pub fn velocity(&self) -> u8 {
        self.velocity
    }

    /// Length of the note (or of a single ratchet) in milliseconds.
    pub fn duration(&self) -> u32 {
        self.duration
    }

    /// Returns `true` while the note sounds.
    pub fn is_on(&self) -> bool {
        self.on
    }

    /// Getter.
    pub fn ratchets(&self) -> u16 {
        self.ratchets
    }

    fn elapsed(&self, now: Instant) -> u64 {
        now.saturating_duration_since(self.start).as_millis()
    }
}

/// A fixed pool of notes for one output channel.
///
/// Slots are handed out round-robin, skipping notes that still sound. When every slot is taken the next one in line
/// is reused, cutting off its note without a Note Off.
#[derive(Clone, Copy, Debug, Default)]
pub struct NotePool {
    slots: [ActiveNote; NOTES_PER_CHANNEL],
    count: usize,
}

impl NotePool {
    /// Returns an [`Iterator`] over all slots, sounding or not.
    pub fn iter(&self) -> impl Iterator<Item = &ActiveNote> {
        self.slots.iter()
    }

    /// Number of notes currently sounding.
    pub fn sounding(&self) -> usize {
        self.slots.iter().filter(|note| note.on).count()
    }

    fn allocate(&mut self) -> usize {
        self.count = self.count.wrapping_add(1);
        let mut current = self.count % NOTES_PER_CHANNEL;
        for _ in 0..NOTES_PER_CHANNEL {
            if !self.slots[current].on {
                break;
            }
            self.count = self.count.wrapping_add(1);
            current = self.count % NOTES_PER_CHANNEL;
        }
        current
    }
}

impl Engine {
    /// Starts a note on an output channel and remembers it so it can be stopped after `duration` milliseconds.
    ///
    /// The global transposition is applied first. Invalid channels, note numbers and negative durations are ignored;
    /// a velocity below 1 sends a Note Off instead. If the note already sounds on the channel it is stopped before
    /// being started again. With repeats or ratchets configured, the note is shortened and re-triggered by
    /// [`Engine::tick`].
    pub fn note_on(
        &mut self,
        channel: i32,
        number: i32,
        velocity: i32,
        duration: i32,
        now: Instant,
        out: &mut impl MidiOut,
    ) {
        if !self.config.channel_mode.contains(channel) {
            return;
        }
        let Some(number) = shifted(number, self.settings.note_shift) else {
            return;
        };
        if duration < 0 {
            return;
        }
        let channel = channel as u8;
        if velocity < 1 {
            self.send_note_off(channel, number, out);
            return;
        }
        let velocity = velocity.min(127) as u8;

        let pool = &mut self.notes[usize::from(channel)];
        let mut stale = false;
        for slot in pool.slots.iter_mut() {
            if slot.number == number && slot.on {
                slot.on = false;
                stale = true;
            }
        }
        if stale {
            debug!("Note {} is already playing on channel {}", number, channel);
            self.send_note_off(channel, number, out);
        }

        let pool = &mut self.notes[usize::from(channel)];
        let index = pool.allocate();

        let mut gate = i64::from(duration);
        let mut ratchets = 0;
        if self.settings.is_ratcheting() {
            gate = gate / i64::from(self.settings.ratcheting) * self.config.ratchet_percent() / 100;
            if gate <= 0 {
                return;
            }
            ratchets = u16::from(self.settings.repetition) * u16::from(self.settings.ratcheting);
        }

        pool.slots[index] = ActiveNote {
            number,
            velocity,
            start: now,
            duration: gate as u32,
            on: true,
            ratchets,
        };
        self.send_note_on(channel, number, velocity, out);
    }

    /// Sends a Note Off, whether or not the note is known to sound.
    pub fn note_off(&mut self, channel: i32, number: i32, out: &mut impl MidiOut) {
        if !self.config.channel_mode.contains(channel) || !(0..=127).contains(&number) {
            return;
        }
        self.send_note_off(channel as u8, number as u8, out);
    }

    /// Returns the note pool of an output channel, if the index is valid.
    pub fn notes(&self, channel: usize) -> Option<&NotePool> {
        if channel < usize::from(self.config.channel_mode.output_channels()) {
            self.notes.get(channel)
        } else {
            None
        }
    }

    /// Stops notes whose duration has passed and re-triggers ratcheted notes.
    pub(crate) fn check_durations(&mut self, now: Instant, out: &mut impl MidiOut) {
        let ratcheting = self.settings.is_ratcheting();
        let percent = self.config.ratchet_percent();
        for channel in 0..self.config.channel_mode.output_channels() {
            for index in 0..NOTES_PER_CHANNEL {
                let note = self.notes[usize::from(channel)].slots[index];
                if note.on && note.duration != 0 && note.elapsed(now) >= u64::from(note.duration) {
                    self.notes[usize::from(channel)].slots[index].on = false;
                    self.send_note_off(channel, note.number, out);
                }

                if ratcheting && note.ratchets > 1 {
                    let interval = i64::from(note.duration) * 100 / percent;
                    if note.elapsed(now) as i64 >= interval {
                        let slot = &mut self.notes[usize::from(channel)].slots[index];
                        slot.start = now;
                        slot.on = true;
                        slot.ratchets -= 1;
                        self.send_note_on(channel, note.number, note.velocity, out);
                    }
                }
            }
        }
    }

    /// Silences everything: restores the default settings, sends a Note Off for every note on channels 0 through 15,
    /// forgets pending ratchets and drops every scheduled note.
    pub fn panic(&mut self, out: &mut impl MidiOut) {
        info!("Panic");
        self.settings = Default::default();
        for channel in 0..crate::configuration::CHANNELS_PER_TRANSPORT {
            for number in 0..=127 {
                self.send_note_off(channel, number, out);
            }
        }
        self.notes
            .iter_mut()
            .flat_map(|pool| pool.slots.iter_mut())
            .for_each(|slot| slot.ratchets = 0);
        self.scheduled.clear();
    }

    pub(super) fn send_note_on(&self, channel: u8, number: u8, velocity: u8, out: &mut impl MidiOut) {
        if !self.settings.allows(number) {
            out.indicate();
            return;
        }
        self.send(channel, out, |wire| {
            MidiMessage::NoteOn(wire, Note::from_u8_lossy(number), U7::from_u8_lossy(velocity))
        });
    }

    pub(super) fn send_note_off(&self, channel: u8, number: u8, out: &mut impl MidiOut) {
        self.send(channel, out, |wire| {
            MidiMessage::NoteOff(wire, Note::from_u8_lossy(number), U7::from_u8_lossy(0))
        });
    }
}

/// Applies the transposition, returning `None` if the result leaves the MIDI note range.
fn shifted(number: i32, shift: i8) -> Option<u8> {
    let number = number + i32::from(shift);
    (0..=127).contains(&number).then_some(number as u8)
}
