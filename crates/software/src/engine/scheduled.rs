//! A fixed queue of notes to be started later, shared by all channels.

use super::Engine;
use crate::io::MidiOut;
use embassy_time::{Duration, Instant};
use tinyvec::ArrayVec;

/// Number of notes that can wait to be played at the same time.
pub const SCHEDULED_NOTES: usize = 42;

/// A note-on waiting for its time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScheduledNote {
    channel: i32,
    number: i32,
    velocity: i32,
    duration: i32,
    /// `None` marks an empty slot.
    fire_at: Option<Instant>,
}

/// Wrap-around buffer of [`ScheduledNote`]s.
///
/// There is no occupancy check: once the queue is saturated, new entries overwrite pending ones.
#[derive(Clone, Copy, Debug)]
pub struct ScheduledNotes {
    slots: [ScheduledNote; SCHEDULED_NOTES],
    next: usize,
}

impl Default for ScheduledNotes {
    fn default() -> Self {
        Self {
            slots: [ScheduledNote::default(); SCHEDULED_NOTES],
            next: 0,
        }
    }
}

impl ScheduledNotes {
    fn push(&mut self, note: ScheduledNote) {
        self.slots[self.next] = note;
        self.next = (self.next + 1) % SCHEDULED_NOTES;
    }

    /// Removes and returns every note whose time has strictly passed.
    fn take_due(&mut self, now: Instant) -> ArrayVec<[ScheduledNote; SCHEDULED_NOTES]> {
        let mut due = ArrayVec::new();
        for slot in self.slots.iter_mut() {
            if slot.fire_at.is_some_and(|fire_at| now > fire_at) {
                due.push(*slot);
                *slot = ScheduledNote::default();
            }
        }
        due
    }

    /// Forgets every pending note.
    pub fn clear(&mut self) {
        self.slots = [ScheduledNote::default(); SCHEDULED_NOTES];
        self.next = 0;
    }

    /// Number of notes waiting to be played.
    pub fn pending(&self) -> usize {
        self.slots.iter().filter(|slot| slot.fire_at.is_some()).count()
    }
}

impl Engine {
    /// Plays a note `delay` milliseconds from `now`. The note is validated when it fires, not when it is queued.
    pub fn schedule_note(
        &mut self,
        channel: i32,
        number: i32,
        velocity: i32,
        duration: i32,
        delay: u32,
        now: Instant,
    ) {
        trace!("Scheduling note {} in {} ms", number, delay);
        self.scheduled.push(ScheduledNote {
            channel,
            number,
            velocity,
            duration,
            fire_at: Some(now + Duration::from_millis(u64::from(delay))),
        });
    }

    /// Returns the queue of notes waiting to be played.
    pub fn scheduled(&self) -> &ScheduledNotes {
        &self.scheduled
    }

    /// Starts every scheduled note whose time has passed.
    pub(crate) fn check_scheduled(&mut self, now: Instant, out: &mut impl MidiOut) {
        for note in self.scheduled.take_due(now) {
            self.note_on(
                note.channel,
                note.number,
                note.velocity,
                note.duration,
                now,
                out,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::test_support::Recorder;

    fn at(ms: u64) -> Instant {
        Instant::from_millis(ms)
    }

    #[test]
    fn fires_strictly_after() {
        let mut engine = Engine::default();
        let mut out = Recorder::default();
        engine.schedule_note(0, 60, 100, 100, 50, at(0));

        engine.tick(at(50), &mut out);
        assert!(out.note_ons().is_empty(), "Must not fire when the time is reached exactly");
        assert_eq!(1, engine.scheduled().pending());

        engine.tick(at(51), &mut out);
        assert_eq!(std::vec![60], out.note_ons());
        assert_eq!(0, engine.scheduled().pending());

        engine.tick(at(52), &mut out);
        assert_eq!(1, out.note_ons().len(), "A scheduled note fires only once");
    }

    #[test]
    fn fired_note_gets_its_duration() {
        let mut engine = Engine::default();
        let mut out = Recorder::default();
        engine.schedule_note(1, 60, 100, 20, 10, at(0));

        engine.tick(at(11), &mut out);
        engine.tick(at(30), &mut out);
        assert!(out.note_offs().is_empty());
        engine.tick(at(31), &mut out);
        assert_eq!(std::vec![60], out.note_offs());
    }

    #[test]
    fn invalid_note_is_consumed_silently() {
        let mut engine = Engine::default();
        let mut out = Recorder::default();
        engine.schedule_note(40, 60, 100, 20, 0, at(0));
        engine.tick(at(1), &mut out);

        assert!(out.events.is_empty());
        assert_eq!(0, engine.scheduled().pending());
    }

    #[test]
    fn saturated_queue_overwrites() {
        let mut engine = Engine::default();
        let mut out = Recorder::default();
        for number in 0..(SCHEDULED_NOTES as i32 + 1) {
            engine.schedule_note(0, number, 100, 0, 10, at(0));
        }

        assert_eq!(SCHEDULED_NOTES, engine.scheduled().pending());
        engine.tick(at(11), &mut out);
        let played = out.note_ons();
        assert_eq!(SCHEDULED_NOTES, played.len());
        assert!(!played.contains(&0), "The first entry should have been overwritten");
        assert!(played.contains(&(SCHEDULED_NOTES as u8)));
    }
}
