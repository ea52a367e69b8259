//! Executes decoded command frames against the [`Engine`].

use super::Engine;
use super::chord::CHORD_MAX_LENGTH;
use crate::command::{Access, Command, Opcode, Response, byte_response, word_response};
use crate::io::MidiOut;
use crate::midi_state::NOTE_HISTORY_LENGTH;
use embassy_time::Instant;

/// Response byte for values that cannot be answered.
const INVALID: u8 = 0xFF;

impl Engine {
    /// Executes a command frame received from the bus master and returns the bytes to answer with.
    ///
    /// Writes are always executed and answer nothing. Reads are only answered if `is_request` is set. Frames that
    /// cannot be decoded are ignored.
    pub fn dispatch(
        &mut self,
        frame: &[u8],
        is_request: bool,
        now: Instant,
        out: &mut impl MidiOut,
    ) -> Response {
        let command = match Command::decode(frame) {
            Ok(command) => command,
            Err(e) => {
                warn!("Ignoring frame: {}", e);
                return Response::new();
            }
        };
        debug!("Dispatching {:?}, request: {}", command.opcode(), is_request);

        match command.opcode().access() {
            Access::Read if is_request => self.read(&command),
            Access::Read => Response::new(),
            Access::Write => {
                self.write(&command, now, out);
                Response::new()
            }
        }
    }

    fn read(&self, command: &Command) -> Response {
        let settings = &self.settings;
        let chord = usize::try_from(command.signed(1) - 1)
            .ok()
            .and_then(|index| self.chords.get(index));

        match command.opcode() {
            Opcode::TimeGet => word_response(i32::from(settings.note_duration)),
            Opcode::ShiftGet => byte_response(settings.note_shift as u8),
            Opcode::RepetitionGet => word_response(i32::from(settings.repetition) - 1),
            Opcode::RatchetGet => word_response(i32::from(settings.ratcheting) - 1),
            Opcode::MinGet => byte_response(settings.note_min),
            Opcode::MaxGet => byte_response(settings.note_max),

            Opcode::ChordLengthGet => byte_response(
                chord
                    .map(|chord| chord.length())
                    .filter(|length| (1..=CHORD_MAX_LENGTH as u8).contains(length))
                    .unwrap_or(INVALID),
            ),
            Opcode::ChordInversionGet => {
                byte_response(chord.map_or(0, |chord| chord.inversion() as u8))
            }
            Opcode::ChordReverseGet => {
                byte_response(chord.map_or(0, |chord| u8::from(chord.reverse())))
            }
            Opcode::ChordRotateGet => byte_response(chord.map_or(0, |chord| chord.rotate() as u8)),
            Opcode::ChordStrumGet => match chord {
                Some(chord) => word_response(i32::from(chord.strum())),
                None => Response::from([INVALID, INVALID]),
            },

            Opcode::CcOffsetGet => word_response(i32::from(
                self.cc_state(command.signed(1), command.signed(2)).offset(),
            )),
            Opcode::CcSlewGet => word_response(i32::from(
                self.cc_state(command.signed(1), command.signed(2)).slew(),
            )),
            Opcode::NrpnOffsetGet => word_response(
                command
                    .fourteen_bit(2)
                    .map_or(0, |controller| self.nrpn_offset(command.signed(1), controller)),
            ),
            Opcode::NrpnSlewGet => word_response(
                command
                    .fourteen_bit(2)
                    .map_or(0, |controller| self.nrpn_slew(command.signed(1), controller)),
            ),

            Opcode::HistoryNote => {
                byte_response(self.history_entry(command).map_or(0, |entry| entry.note()))
            }
            Opcode::HistoryVelocity => byte_response(
                self.history_entry(command)
                    .map(|entry| entry.velocity())
                    .filter(|velocity| *velocity >= 1)
                    .unwrap_or(0),
            ),
            Opcode::ControllerIn => byte_response(
                usize::try_from(command.signed(1))
                    .ok()
                    .zip(usize::try_from(command.signed(2)).ok())
                    .and_then(|(channel, controller)| self.midi_in.controller(channel, controller))
                    .unwrap_or(INVALID),
            ),

            Opcode::LastChannel => byte_response(valid_or_invalid(self.midi_in.last().channel, 15)),
            Opcode::LastNote => byte_response(valid_or_invalid(self.midi_in.last().note, 127)),
            Opcode::LastVelocity => {
                byte_response(valid_or_invalid(self.midi_in.last().velocity, 127))
            }
            Opcode::LastNoteOff => {
                byte_response(valid_or_invalid(self.midi_in.last().note_off, 127))
            }
            Opcode::LastController => {
                byte_response(valid_or_invalid(self.midi_in.last().controller, 127))
            }
            Opcode::LastValue => byte_response(valid_or_invalid(self.midi_in.last().value, 127)),

            _ => Response::new(),
        }
    }

    fn write(&mut self, command: &Command, now: Instant, out: &mut impl MidiOut) {
        let channel = command.signed(1);

        match command.opcode() {
            Opcode::TimeSet => {
                let duration = command.word(1);
                if duration >= 0 {
                    self.settings.note_duration = duration as i16;
                }
            }
            Opcode::ShiftSet => self.settings.note_shift = command.signed(1).clamp(-127, 127) as i8,
            Opcode::RepetitionSet => {
                self.settings.repetition = command.word(1).clamp(0, 127) as u8 + 1
            }
            Opcode::RatchetSet => {
                self.settings.ratcheting = command.word(1).clamp(0, 127) as u8 + 1
            }
            Opcode::MinSet => self.settings.note_min = command.signed(1).clamp(0, 127) as u8,
            Opcode::MaxSet => self.settings.note_max = command.signed(1).clamp(0, 127) as u8,

            Opcode::Note => {
                let duration = i32::from(self.settings.note_duration);
                self.note_on(channel, command.signed(2), command.signed(3), duration, now, out);
            }
            Opcode::NoteOff => self.note_off(channel, command.signed(2), out),
            Opcode::Panic => self.panic(out),

            Opcode::Chord => {
                let duration = i32::from(self.settings.note_duration);
                self.play_chord(
                    channel,
                    command.signed(3),
                    command.signed(4),
                    duration,
                    command.signed(2) - 1,
                    now,
                    out,
                );
            }
            Opcode::ChordAdd => {
                let note = command.signed(2);
                self.chords_mut(command.signed(1))
                    .iter_mut()
                    .for_each(|chord| chord.insert(0, note));
            }
            Opcode::ChordRemove => {
                let note = command.signed(2);
                self.chords_mut(command.signed(1))
                    .iter_mut()
                    .for_each(|chord| chord.remove(note));
            }
            Opcode::ChordClear => self
                .chords_mut(command.signed(1))
                .iter_mut()
                .for_each(|chord| chord.clear()),
            Opcode::ChordLengthSet => {
                let (number, length) = (command.signed(1), command.signed(2));
                if !(1..=CHORD_MAX_LENGTH as i32).contains(&length) {
                    return;
                }
                let length = length as u8;
                let broadcast = number == 0;
                for chord in self.chords_mut(number) {
                    // broadcasts leave chords alone that are not longer than the new length
                    if !broadcast || usize::from(length) < chord.count() {
                        chord.set_length(length);
                    }
                }
            }
            Opcode::ChordInversionSet => {
                let inversion = command.signed(2);
                self.chords_mut(command.signed(1))
                    .iter_mut()
                    .for_each(|chord| chord.set_inversion(inversion));
            }
            Opcode::ChordReverseSet => {
                let reverse = command.signed(2).rem_euclid(2) == 1;
                self.chords_mut(command.signed(1))
                    .iter_mut()
                    .for_each(|chord| chord.set_reverse(reverse));
            }
            Opcode::ChordRotateSet => {
                let rotate = command.signed(2);
                self.chords_mut(command.signed(1))
                    .iter_mut()
                    .for_each(|chord| chord.set_rotate(rotate));
            }
            Opcode::ChordStrumSet => {
                let strum = command.word(2);
                self.chords_mut(command.signed(1))
                    .iter_mut()
                    .for_each(|chord| chord.set_strum(strum));
            }
            // positions are given in the order notes were added, chords store them newest first
            Opcode::ChordInsert => {
                let (position, note) = (command.signed(2), command.signed(3));
                for chord in self.chords_mut(command.signed(1)) {
                    chord.insert(chord.count() as i32 - position, note);
                }
            }
            Opcode::ChordDelete => {
                let position = command.signed(2);
                for chord in self.chords_mut(command.signed(1)) {
                    chord.delete(chord.count() as i32 - 1 - position);
                }
            }
            Opcode::ChordSet => {
                let (position, note) = (command.signed(2), command.signed(3));
                for chord in self.chords_mut(command.signed(1)) {
                    chord.set(chord.count() as i32 - 1 - position, note);
                }
            }

            Opcode::Cc | Opcode::CcSet => {
                if let Some(value) = command.fourteen_bit(3) {
                    let use_ramp = command.opcode() == Opcode::Cc;
                    self.set_cc(channel, command.signed(2), value, use_ramp, now, out);
                }
            }
            Opcode::CcOffsetSet => self.set_cc_offset(channel, command.signed(2), command.word(3)),
            Opcode::CcSlewSet => self.set_cc_slew(channel, command.signed(2), command.word(3)),

            Opcode::Nrpn | Opcode::NrpnSet => {
                let operands = command.fourteen_bit(2).zip(command.fourteen_bit(4));
                if let Some((controller, value)) = operands {
                    let use_ramp = command.opcode() == Opcode::Nrpn;
                    self.set_nrpn(channel, controller, value, use_ramp, now, out);
                }
            }
            Opcode::NrpnOffsetSet => {
                if let Some(controller) = command.fourteen_bit(2) {
                    self.set_nrpn_offset(channel, controller, command.word(4));
                }
            }
            Opcode::NrpnSlewSet => {
                if let Some(controller) = command.fourteen_bit(2) {
                    self.set_nrpn_slew(channel, controller, command.word(4));
                }
            }

            Opcode::ProgramChange => self.program_change(channel, command.signed(2), out),
            Opcode::PitchBend => self.pitch_bend(channel, command.word(2), out),
            Opcode::Aftertouch => self.aftertouch(channel, command.signed(2), out),
            Opcode::Clock => self.realtime(super::Realtime::Clock, out),
            Opcode::Start => self.realtime(super::Realtime::Start, out),
            Opcode::Stop => self.realtime(super::Realtime::Stop, out),
            Opcode::Continue => self.realtime(super::Realtime::Continue, out),

            Opcode::Latch => self.set_latch(command.signed(1)),

            _ => {}
        }
    }

    fn history_entry(&self, command: &Command) -> Option<crate::midi_state::HistoryEntry> {
        let channel = usize::try_from(command.signed(1)).ok()?;
        let n = command.signed(2).rem_euclid(NOTE_HISTORY_LENGTH as i32) as usize;
        self.midi_in.history(channel)?.get(n)
    }
}

fn valid_or_invalid(value: u8, max: u8) -> u8 {
    if value <= max { value } else { INVALID }
}
