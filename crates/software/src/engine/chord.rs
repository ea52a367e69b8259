//! Provides the [`Chord`] struct for storing chord shapes and turning them into notes.
//!
//! A chord is a list of semitone offsets from a root note plus a few transformations that are applied when it is
//! played, always in the same order: reverse, rotate, inversion and finally strumming.

use super::Engine;
use crate::io::MidiOut;
use embassy_time::Instant;
use tinyvec::ArrayVec;

/// Number of chords that can be defined.
pub const CHORDS: usize = 8;

/// Maximum number of notes in a chord.
pub const CHORD_MAX_LENGTH: usize = 8;

/// A chord shape and the transformations applied when it is played.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Chord {
    /// Semitone offsets, most recently added first.
    notes: ArrayVec<[i8; CHORD_MAX_LENGTH]>,
    /// How many notes are played, never more than stored.
    length: u8,
    reverse: bool,
    rotate: i8,
    inversion: i8,
    /// Milliseconds between the onsets of consecutive notes.
    strum: u16,
}

impl Chord {
    /// Inserts an offset at a position of the stored list, `0..=count`. When the chord is full, the note at the end
    /// is dropped to make room.
    pub fn insert(&mut self, index: i32, note: i32) {
        if !(0..=self.notes.len() as i32).contains(&index) || !(-127..=127).contains(&note) {
            return;
        }
        let index = index as usize;
        if self.notes.len() == CHORD_MAX_LENGTH {
            if index >= CHORD_MAX_LENGTH {
                return;
            }
            self.notes.pop();
        }
        self.notes.insert(index, note as i8);
        self.length = self.notes.len() as u8;
    }

    /// Deletes the offset at a position of the stored list. Deleting at `count` drops the last note.
    pub fn delete(&mut self, index: i32) {
        if !(0..=self.notes.len() as i32).contains(&index) {
            return;
        }
        let index = index as usize;
        if index < self.notes.len() {
            self.notes.remove(index);
        } else {
            self.notes.pop();
        }
        self.length = self.notes.len() as u8;
    }

    /// Replaces the offset at a position of the stored list.
    pub fn set(&mut self, index: i32, note: i32) {
        if !(0..=127).contains(&note) {
            return;
        }
        if let Some(stored) = usize::try_from(index).ok().and_then(|i| self.notes.get_mut(i)) {
            *stored = note as i8;
        }
    }

    /// Removes the most recently added occurrence of an offset.
    pub fn remove(&mut self, note: i32) {
        if !(0..=127).contains(&note) {
            return;
        }
        if let Some(position) = self.notes.iter().position(|n| i32::from(*n) == note) {
            self.delete(position as i32);
        }
    }

    /// Forgets every note.
    pub fn clear(&mut self) {
        self.notes.clear();
        self.length = 0;
    }

    /// Number of stored notes.
    pub fn count(&self) -> usize {
        self.notes.len()
    }

    /// Number of notes that are played.
    pub fn length(&self) -> u8 {
        self.length
    }

    /// Plays only the first `length` notes, at most as many as are stored.
    pub fn set_length(&mut self, length: u8) {
        self.length = length.min(self.notes.len() as u8);
    }

    /// Returns the stored offsets in the order they were added.
    pub fn offsets(&self) -> impl Iterator<Item = i8> + '_ {
        self.notes.iter().rev().copied()
    }

    /// Getter.
    pub fn reverse(&self) -> bool {
        self.reverse
    }

    /// Setter.
    pub fn set_reverse(&mut self, reverse: bool) {
        self.reverse = reverse;
    }

    /// Getter.
    pub fn rotate(&self) -> i8 {
        self.rotate
    }

    /// Rotates the played notes right (positive) or left (negative). Values outside `-8..=8` are ignored.
    pub fn set_rotate(&mut self, rotate: i32) {
        if (-8..=8).contains(&rotate) {
            self.rotate = rotate as i8;
        }
    }

    /// Getter.
    pub fn inversion(&self) -> i8 {
        self.inversion
    }

    /// Moves notes up (positive) or down (negative) by octaves. Values outside `-32..=32` are ignored.
    pub fn set_inversion(&mut self, inversion: i32) {
        if (-32..=32).contains(&inversion) {
            self.inversion = inversion as i8;
        }
    }

    /// Getter.
    pub fn strum(&self) -> u16 {
        self.strum
    }

    /// Sets the delay between consecutive notes in milliseconds. Negative values are ignored.
    pub fn set_strum(&mut self, strum: i32) {
        if let Ok(strum) = u16::try_from(strum) {
            self.strum = strum;
        }
    }

    /// Returns the notes to play on `root`, after reverse, rotation and inversion.
    pub fn voicing(&self, root: i32) -> ArrayVec<[i32; CHORD_MAX_LENGTH]> {
        let mut current: ArrayVec<[i32; CHORD_MAX_LENGTH]> =
            self.offsets().map(i32::from).collect();
        if self.reverse {
            current.reverse();
        }
        if !current.is_empty() {
            let amount = usize::from(self.rotate.unsigned_abs()) % current.len();
            if self.rotate > 0 {
                current.rotate_right(amount);
            } else {
                current.rotate_left(amount);
            }
        }

        let length = i32::from(self.length);
        let inversion = i32::from(self.inversion);
        current
            .iter()
            .take(usize::from(self.length))
            .enumerate()
            .map(|(i, offset)| {
                let i = i as i32;
                // integer division truncates toward zero
                let octaves = if inversion >= 0 {
                    (inversion + (length - 1 - i)) / length
                } else {
                    (inversion - i) / length
                };
                root + offset + octaves * 12
            })
            .collect()
    }
}

impl Engine {
    /// Plays a chord on a root note. The first note starts right away; with strumming configured the others are
    /// scheduled at multiples of the strum delay.
    pub fn play_chord(
        &mut self,
        channel: i32,
        root: i32,
        velocity: i32,
        duration: i32,
        chord: i32,
        now: Instant,
        out: &mut impl MidiOut,
    ) {
        if !self.config.channel_mode.contains(channel)
            || !(0..=127).contains(&root)
            || duration < 0
        {
            return;
        }
        let Some(chord) = usize::try_from(chord).ok().and_then(|c| self.chords.get(c)) else {
            return;
        };
        if chord.length() == 0 {
            return;
        }
        let strum = u32::from(chord.strum());
        for (i, note) in chord.voicing(root).into_iter().enumerate() {
            if i == 0 || strum == 0 {
                self.note_on(channel, note, velocity, duration, now, out);
            } else {
                self.schedule_note(channel, note, velocity, duration, strum * i as u32, now);
            }
        }
    }

    /// Returns a chord by its index, `0..8`.
    pub fn chord(&self, index: usize) -> Option<&Chord> {
        self.chords.get(index)
    }

    /// Returns the chords addressed by a chord number: 0 means all of them, `1..=8` a single one.
    pub fn chords_mut(&mut self, number: i32) -> &mut [Chord] {
        match number {
            0 => &mut self.chords[..],
            1..=8 => {
                let index = number as usize - 1;
                &mut self.chords[index..=index]
            }
            _ => &mut [],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::test_support::Recorder;

    fn chord(offsets: &[i32]) -> Chord {
        let mut chord = Chord::default();
        for offset in offsets {
            chord.insert(0, *offset);
        }
        chord
    }

    fn added(chord: &Chord) -> std::vec::Vec<i8> {
        chord.offsets().collect()
    }

    #[test]
    fn insert_tracks_count_and_length() {
        let chord = chord(&[0, 4, 7]);
        assert_eq!(std::vec![0, 4, 7], added(&chord), "Expected left but got right");
        assert_eq!(3, chord.count());
        assert_eq!(3, chord.length());
    }

    #[test]
    fn insert_into_full_chord_drops_oldest() {
        let mut chord = chord(&[0, 1, 2, 3, 4, 5, 6, 7]);
        chord.insert(0, 8);
        assert_eq!(std::vec![1, 2, 3, 4, 5, 6, 7, 8], added(&chord), "Expected left but got right");

        chord.insert(8, 9);
        assert_eq!(std::vec![1, 2, 3, 4, 5, 6, 7, 8], added(&chord), "No room at the very end");
    }

    #[test]
    fn insert_rejects_bad_input() {
        let mut chord = chord(&[0, 4]);
        chord.insert(3, 7);
        chord.insert(0, 128);
        chord.insert(-1, 7);
        assert_eq!(std::vec![0, 4], added(&chord));

        chord.insert(2, -12);
        assert_eq!(std::vec![-12, 0, 4], added(&chord), "Negative offsets are allowed");
    }

    #[test]
    fn delete() {
        let mut chord = chord(&[0, 4, 7]);
        chord.delete(1);
        assert_eq!(std::vec![0, 7], added(&chord));
        assert_eq!(2, chord.length());

        chord.delete(2);
        assert_eq!(std::vec![7], added(&chord), "Deleting at the count drops the last stored note");

        chord.delete(5);
        assert_eq!(1, chord.count());
    }

    #[test]
    fn set() {
        let mut chord = chord(&[0, 4, 7]);
        chord.set(0, 8);
        chord.set(3, 1);
        chord.set(1, -3);
        assert_eq!(std::vec![0, 4, 8], added(&chord), "Expected left but got right");
    }

    #[test]
    fn remove_and_clear() {
        let mut chord = chord(&[0, 4, 7, 4]);
        chord.remove(4);
        assert_eq!(std::vec![0, 4, 7], added(&chord), "Most recent occurrence goes first");
        chord.remove(11);
        assert_eq!(3, chord.count());

        chord.clear();
        assert_eq!(0, chord.count());
        assert_eq!(0, chord.length());
    }

    #[test]
    fn set_length_is_capped() {
        let mut chord = chord(&[0, 4, 7]);
        chord.set_length(2);
        assert_eq!(2, chord.length());
        chord.set_length(8);
        assert_eq!(3, chord.length());
    }

    #[test]
    fn transformation_order() {
        let mut chord = chord(&[0, 4, 7, 10]);
        chord.set_reverse(true);
        chord.set_rotate(2);
        chord.set_inversion(1);

        assert_eq!(
            &[76, 60, 70, 67][..],
            chord.voicing(60).as_slice(),
            "Expected left but got right"
        );
    }

    #[test]
    fn rotate_left() {
        let mut chord = chord(&[0, 4, 7]);
        chord.set_rotate(-4);
        assert_eq!(&[64, 67, 60][..], chord.voicing(60).as_slice());
    }

    #[test]
    fn inversions() {
        let mut chord = chord(&[0, 4, 7]);
        chord.set_inversion(2);
        assert_eq!(&[72, 76, 67][..], chord.voicing(60).as_slice());

        chord.set_inversion(-4);
        assert_eq!(&[48, 52, 43][..], chord.voicing(60).as_slice());

        chord.set_inversion(40);
        assert_eq!(-4, chord.inversion(), "Out of range values are ignored");
    }

    #[test]
    fn shortened_chord() {
        let mut chord = chord(&[0, 4, 7, 11]);
        chord.set_length(2);
        assert_eq!(&[60, 64][..], chord.voicing(60).as_slice());
    }

    #[test]
    fn play_without_strum() {
        let mut engine = Engine::default();
        let mut out = Recorder::default();
        engine.chords[0] = chord(&[0, 4, 7]);
        engine.play_chord(0, 60, 100, 100, 0, Instant::from_millis(0), &mut out);

        assert_eq!(std::vec![60, 64, 67], out.note_ons());
    }

    #[test]
    fn play_strummed() {
        let mut engine = Engine::default();
        let mut out = Recorder::default();
        engine.chords[2] = chord(&[0, 4, 7]);
        engine.chords[2].set_strum(20);
        engine.play_chord(0, 60, 100, 100, 2, Instant::from_millis(0), &mut out);
        assert_eq!(std::vec![60], out.note_ons());
        assert_eq!(2, engine.scheduled().pending());

        engine.tick(Instant::from_millis(21), &mut out);
        assert_eq!(std::vec![60, 64], out.note_ons());
        engine.tick(Instant::from_millis(41), &mut out);
        assert_eq!(std::vec![60, 64, 67], out.note_ons());
    }

    #[test]
    fn play_empty_or_invalid() {
        let mut engine = Engine::default();
        let mut out = Recorder::default();
        engine.play_chord(0, 60, 100, 100, 0, Instant::from_millis(0), &mut out);
        engine.chords[0] = chord(&[0]);
        engine.play_chord(0, 60, 100, 100, 8, Instant::from_millis(0), &mut out);
        engine.play_chord(0, 128, 100, 100, 0, Instant::from_millis(0), &mut out);

        assert!(out.events.is_empty());
    }

    #[test]
    fn addressing() {
        let mut engine = Engine::default();
        assert_eq!(CHORDS, engine.chords_mut(0).len());
        assert_eq!(1, engine.chords_mut(8).len());
        assert!(engine.chords_mut(9).is_empty());
        assert!(engine.chords_mut(-1).is_empty());
    }
}
