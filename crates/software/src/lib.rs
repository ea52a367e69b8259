//! This crate contains the architecture-agnostic event core of an I2C-to-MIDI bridge: a device which receives short
//! command frames from a bus master (such as a [monome teletype](https://monome.org/docs/teletype/)) and translates
//! them into [MIDI](https://midi.org/midi-1-0) notes, chords and controller movements, while keeping track of the MIDI
//! it receives on its USB host port so the bus master can ask about it.
//!
//! Everything is driven by the [`engine::Engine`]. Command frames go to [`engine::Engine::dispatch`], received MIDI
//! to [`engine::Engine::receive_midi`], and [`engine::Engine::tick`] must be called periodically for durations,
//! strums, ratchets and slews to advance.

#![cfg_attr(not(test), no_std)]
#![deny(missing_docs)]

// must come first so the logging macros are visible to the other modules
mod fmt;

pub mod command;
pub mod configuration;
pub mod engine;
pub mod io;

/// Data structures for tracking MIDI messages the device has received.
pub mod midi_state;

pub use engine::Engine;
