//! Provides a struct [`NoteHistory`] for remembering the notes most recently received on an input channel, newest
//! first, so the bus master can ask for "the note played two notes ago".

use tinyvec::{ArrayVec, array_vec};
use wmidi::{Note, U7, Velocity};

/// Number of notes remembered per input channel.
pub const NOTE_HISTORY_LENGTH: usize = 16;

/// A received note and the velocity it was played with.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct HistoryEntry {
    note: U7,
    velocity: U7,
}

impl HistoryEntry {
    /// The received note number.
    pub fn note(&self) -> u8 {
        u8::from(self.note)
    }

    /// The velocity the note was received with.
    pub fn velocity(&self) -> u8 {
        u8::from(self.velocity)
    }
}

/// A bounded, most-recent-first list of received notes.
///
/// Internally, this struct uses the [`U7`] type because [`tinyvec`] requires that `Items` implement [`Default`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NoteHistory<const N: usize = NOTE_HISTORY_LENGTH> {
    data: ArrayVec<[HistoryEntry; N]>,
}

impl Default for NoteHistory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "defmt")]
impl<const N: usize> defmt::Format for NoteHistory<N> {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "NoteHistory {{ data: [");
        for (i, entry) in self.data.iter().enumerate() {
            if i == 0 {
                defmt::write!(fmt, " ");
            } else {
                defmt::write!(fmt, ", ");
            }
            defmt::write!(fmt, "{} ({})", entry.note(), entry.velocity());
        }
        defmt::write!(fmt, " ] }}");
    }
}

impl NoteHistory {
    /// Construct a new, empty `NoteHistory`.
    pub fn new() -> Self {
        Self { data: array_vec!() }
    }

    /// Records a [`Note`] at the front of the history. When the history is full, the oldest entry is dropped.
    pub fn add(&mut self, note: Note, velocity: Velocity) {
        if self.data.len() == self.data.capacity() {
            self.data.pop();
        }
        self.data.insert(
            0,
            HistoryEntry {
                note: U7::from_u8_lossy(note as u8),
                velocity,
            },
        );
    }

    /// Removes the most recent occurrence of a [`Note`], closing the gap.
    pub fn remove(&mut self, note: Note) {
        let u7 = U7::from_u8_lossy(note as u8);
        if let Some(position) = self.data.iter().position(|entry| entry.note == u7) {
            self.data.remove(position);
        }
    }

    /// Forgets every entry.
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Returns the entry `n` places back in the history, where 0 is the newest. Unfilled places read as `None`.
    pub fn get(&self, n: usize) -> Option<HistoryEntry> {
        self.data.get(n).copied()
    }

    /// Determine if no notes are remembered.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns an [`Iterator`] over the remembered entries, newest first.
    pub fn iter(&self) -> impl Iterator<Item = HistoryEntry> + '_ {
        self.data.iter().copied()
    }
}
