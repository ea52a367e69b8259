/// Global note settings adjustable over the bus. [`Settings::default`] is what a panic restores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Settings {
    /// Duration in milliseconds applied to notes and chords played over the bus; 0 holds notes indefinitely.
    pub note_duration: i16,
    /// Transposition in semitones added to every note-on, within -127..=127.
    pub note_shift: i8,
    /// How often a note is repeated; 1 means "play once".
    pub repetition: u8,
    /// How often a note is ratcheted within its duration; 1 means "play once".
    pub ratcheting: u8,
    /// Lowest note number let through to the wire.
    pub note_min: u8,
    /// Highest note number let through to the wire.
    pub note_max: u8,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            note_duration: 100,
            note_shift: 0,
            repetition: 1,
            ratcheting: 1,
            note_min: 0,
            note_max: 127,
        }
    }
}

impl Settings {
    /// Returns `true` if either repeats or ratchets are configured, which shortens and re-triggers notes.
    pub fn is_ratcheting(&self) -> bool {
        self.repetition > 1 || self.ratcheting > 1
    }

    /// Returns `true` if a note-on for `note` may be sent.
    pub fn allows(&self, note: u8) -> bool {
        (self.note_min..=self.note_max).contains(&note)
    }
}
