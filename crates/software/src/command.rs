//! Decoding of the command frames sent by the bus master.
//!
//! A frame is an opcode byte followed by up to five operand bytes. Each opcode is either a write, which is always
//! executed, or a read, which is only answered when the bus transaction is a request.

use core::fmt;
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::FromPrimitive;
use tinyvec::ArrayVec;

/// Length of a command frame including the opcode. Shorter frames are padded with zeros.
pub const FRAME_LENGTH: usize = 6;

/// Bytes returned to the bus master for a read.
pub type Response = ArrayVec<[u8; 2]>;

/// Every command the bus master can send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Opcode {
    /// Read the note duration.
    TimeGet = 1,
    /// Set the note duration.
    TimeSet = 2,
    /// Read the transposition.
    ShiftGet = 3,
    /// Set the transposition.
    ShiftSet = 4,
    /// Read the number of repeats.
    RepetitionGet = 5,
    /// Set the number of repeats.
    RepetitionSet = 6,
    /// Read the number of ratchets.
    RatchetGet = 7,
    /// Set the number of ratchets.
    RatchetSet = 8,
    /// Read the lowest note let through.
    MinGet = 9,
    /// Set the lowest note let through.
    MinSet = 10,
    /// Read the highest note let through.
    MaxGet = 11,
    /// Set the highest note let through.
    MaxSet = 12,
    /// Play a note.
    Note = 20,
    /// Stop a note.
    NoteOff = 21,
    /// Silence everything and restore the default settings.
    Panic = 22,
    /// Play a chord.
    Chord = 30,
    /// Add a note to a chord.
    ChordAdd = 31,
    /// Remove a note from a chord by value.
    ChordRemove = 32,
    /// Remove all notes from a chord.
    ChordClear = 33,
    /// Read the number of notes played of a chord.
    ChordLengthGet = 34,
    /// Set the number of notes played of a chord.
    ChordLengthSet = 35,
    /// Read a chord's inversion.
    ChordInversionGet = 36,
    /// Set a chord's inversion.
    ChordInversionSet = 37,
    /// Read whether a chord is reversed.
    ChordReverseGet = 38,
    /// Reverse a chord.
    ChordReverseSet = 39,
    /// Slew a Control Change controller to a value.
    Cc = 40,
    /// Read a controller's offset.
    CcOffsetGet = 41,
    /// Set a controller's offset.
    CcOffsetSet = 42,
    /// Read a controller's slew time.
    CcSlewGet = 43,
    /// Set a controller's slew time.
    CcSlewSet = 44,
    /// Set a Control Change controller without slewing.
    CcSet = 45,
    /// Slew an NRPN controller to a value.
    Nrpn = 50,
    /// Read an NRPN controller's offset.
    NrpnOffsetGet = 51,
    /// Set an NRPN controller's offset.
    NrpnOffsetSet = 52,
    /// Read an NRPN controller's slew time.
    NrpnSlewGet = 53,
    /// Set an NRPN controller's slew time.
    NrpnSlewSet = 54,
    /// Set an NRPN controller without slewing.
    NrpnSet = 55,
    /// Send a Program Change.
    ProgramChange = 60,
    /// Send a Pitch Bend.
    PitchBend = 61,
    /// Send Channel Pressure.
    Aftertouch = 62,
    /// Send a Timing Clock.
    Clock = 63,
    /// Send a Start.
    Start = 64,
    /// Send a Stop.
    Stop = 65,
    /// Send a Continue.
    Continue = 66,
    /// Enable or disable latching of received notes.
    Latch = 100,
    /// Read a note from a channel's history of received notes.
    HistoryNote = 110,
    /// Read a velocity from a channel's history of received notes.
    HistoryVelocity = 111,
    /// Read the last value received for a controller.
    ControllerIn = 120,
    /// Read the channel of the last received message.
    LastChannel = 130,
    /// Read the last received Note On.
    LastNote = 131,
    /// Read the velocity of the last received Note On.
    LastVelocity = 132,
    /// Read the last received Note Off.
    LastNoteOff = 133,
    /// Read the controller of the last received Control Change.
    LastController = 134,
    /// Read the value of the last received Control Change.
    LastValue = 135,
    /// Read a chord's strum delay.
    ChordStrumGet = 150,
    /// Set a chord's strum delay.
    ChordStrumSet = 151,
    /// Insert a note into a chord at a position.
    ChordInsert = 152,
    /// Delete the note at a position of a chord.
    ChordDelete = 153,
    /// Replace the note at a position of a chord.
    ChordSet = 154,
    /// Read a chord's rotation.
    ChordRotateGet = 155,
    /// Set a chord's rotation.
    ChordRotateSet = 156,
}

/// Whether an opcode changes state or answers a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Access {
    /// Only executed when the bus transaction is a request.
    Read,
    /// Always executed.
    Write,
}

impl Opcode {
    /// Returns the [`Access`] of the opcode.
    pub fn access(self) -> Access {
        use Opcode::*;
        match self {
            TimeGet | ShiftGet | RepetitionGet | RatchetGet | MinGet | MaxGet | ChordLengthGet
            | ChordInversionGet | ChordReverseGet | ChordRotateGet | ChordStrumGet | CcOffsetGet
            | CcSlewGet | NrpnOffsetGet | NrpnSlewGet | HistoryNote | HistoryVelocity
            | ControllerIn | LastChannel | LastNote | LastVelocity | LastNoteOff
            | LastController | LastValue => Access::Read,
            _ => Access::Write,
        }
    }
}

/// Reasons a frame cannot be turned into a [`Command`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DecodeError {
    /// The frame holds no bytes at all.
    Empty,
    /// The first byte is not a known opcode.
    UnknownOpcode(u8),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty frame"),
            Self::UnknownOpcode(op) => write!(f, "unknown opcode {}", op),
        }
    }
}

/// A decoded frame. Operands are addressed by their byte position in the frame, starting at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    opcode: Opcode,
    frame: [u8; FRAME_LENGTH],
}

impl Command {
    /// Decodes a frame. Bytes beyond [`FRAME_LENGTH`] are ignored.
    pub fn decode(frame: &[u8]) -> Result<Self, DecodeError> {
        let &op = frame.first().ok_or(DecodeError::Empty)?;
        let opcode = Opcode::from_u8(op).ok_or(DecodeError::UnknownOpcode(op))?;
        let mut padded = [0; FRAME_LENGTH];
        let length = frame.len().min(FRAME_LENGTH);
        padded[..length].copy_from_slice(&frame[..length]);
        Ok(Self {
            opcode,
            frame: padded,
        })
    }

    /// Getter.
    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    /// Reads the byte at `position` as a signed value.
    pub fn signed(&self, position: usize) -> i32 {
        i32::from(self.byte(position) as i8)
    }

    /// Reads the byte at `position` as an unsigned value.
    pub fn unsigned(&self, position: usize) -> i32 {
        i32::from(self.byte(position))
    }

    /// Reads two bytes, most significant first, as a signed 16-bit value.
    pub fn word(&self, position: usize) -> i32 {
        i32::from(i16::from_be_bytes([
            self.byte(position),
            self.byte(position + 1),
        ]))
    }

    /// Reads two 7-bit bytes, most significant first, as a 14-bit value. Returns `None` if either byte is above 127.
    pub fn fourteen_bit(&self, position: usize) -> Option<i32> {
        let (msb, lsb) = (self.byte(position), self.byte(position + 1));
        (msb <= 127 && lsb <= 127).then(|| (i32::from(msb) << 7) + i32::from(lsb))
    }

    fn byte(&self, position: usize) -> u8 {
        self.frame.get(position).copied().unwrap_or(0)
    }
}

/// Splits a 16-bit value into response bytes, most significant first.
pub(crate) fn word_response(value: i32) -> Response {
    let [msb, lsb] = (value as i16).to_be_bytes();
    let mut response = Response::new();
    response.push(msb);
    response.push(lsb);
    response
}

/// Wraps a single response byte.
pub(crate) fn byte_response(value: u8) -> Response {
    let mut response = Response::new();
    response.push(value);
    response
}
