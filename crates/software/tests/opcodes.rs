//! Drives the engine the way the firmware does: command frames from the bus master, received USB-MIDI packets and a
//! periodic tick.

use embassy_time::Instant;
use i2m_lib::Engine;
use i2m_lib::configuration::{ChannelMode, Config};
use i2m_lib::io::{MidiOut, Transport};
use i2m_lib::midi_state::usb_packet;
use wmidi::{Channel, MidiMessage, Note, U7};

#[derive(Default)]
struct Wire {
    sent: Vec<(u64, Transport, MidiMessage<'static>)>,
    blinks: usize,
    now: u64,
}

impl MidiOut for Wire {
    fn send(&mut self, transport: Transport, message: MidiMessage<'static>) {
        self.sent.push((self.now, transport, message));
    }

    fn indicate(&mut self) {
        self.blinks += 1;
    }
}

impl Wire {
    fn note_ons(&self) -> Vec<(u64, u8)> {
        self.sent
            .iter()
            .filter_map(|(at, _, message)| match message {
                MidiMessage::NoteOn(_, note, _) => Some((*at, *note as u8)),
                _ => None,
            })
            .collect()
    }

    fn note_offs(&self) -> Vec<(u64, u8)> {
        self.sent
            .iter()
            .filter_map(|(at, _, message)| match message {
                MidiMessage::NoteOff(_, note, _) => Some((*at, *note as u8)),
                _ => None,
            })
            .collect()
    }

    fn control_changes(&self) -> Vec<(u8, u8)> {
        self.sent
            .iter()
            .filter_map(|(_, _, message)| match message {
                MidiMessage::ControlChange(_, function, value) => {
                    Some((u8::from(*function), u8::from(*value)))
                }
                _ => None,
            })
            .collect()
    }
}

/// Sends a frame at the wire's current time.
fn send(engine: &mut Engine, wire: &mut Wire, frame: &[u8]) {
    let now = Instant::from_millis(wire.now);
    engine.dispatch(frame, false, now, wire);
}

fn request(engine: &mut Engine, wire: &mut Wire, frame: &[u8]) -> Vec<u8> {
    let now = Instant::from_millis(wire.now);
    engine.dispatch(frame, true, now, wire).to_vec()
}

/// Ticks once per millisecond up to and including `until`.
fn run(engine: &mut Engine, wire: &mut Wire, until: u64) {
    while wire.now < until {
        wire.now += 1;
        engine.tick(Instant::from_millis(wire.now), wire);
    }
}

#[test]
fn ratcheted_note() {
    let mut engine = Engine::default();
    let mut wire = Wire::default();
    send(&mut engine, &mut wire, &[2, 0x01, 0x2C]);
    send(&mut engine, &mut wire, &[8, 0, 2]);
    send(&mut engine, &mut wire, &[20, 0, 60, 100]);
    run(&mut engine, &mut wire, 500);

    assert_eq!(
        vec![(0, 60), (100, 60), (200, 60)],
        wire.note_ons(),
        "Expected left but got right"
    );
    assert_eq!(
        vec![(75, 60), (175, 60), (275, 60)],
        wire.note_offs(),
        "Expected left but got right"
    );
}

#[test]
fn strummed_chord() {
    let mut engine = Engine::default();
    let mut wire = Wire::default();
    for offset in [0, 4, 7] {
        send(&mut engine, &mut wire, &[31, 1, offset]);
    }
    send(&mut engine, &mut wire, &[151, 1, 0, 50]);
    send(&mut engine, &mut wire, &[30, 0, 1, 60, 100]);
    run(&mut engine, &mut wire, 300);

    assert_eq!(
        vec![(0, 60), (51, 64), (101, 67)],
        wire.note_ons(),
        "Expected left but got right"
    );
    assert_eq!(
        vec![(100, 60), (151, 64), (201, 67)],
        wire.note_offs(),
        "Expected left but got right"
    );
}

#[test]
fn reversed_and_inverted_chord() {
    let mut engine = Engine::default();
    let mut wire = Wire::default();
    for offset in [0, 4, 7, 10] {
        send(&mut engine, &mut wire, &[31, 1, offset]);
    }
    send(&mut engine, &mut wire, &[39, 1, 1]);
    send(&mut engine, &mut wire, &[156, 1, 2]);
    send(&mut engine, &mut wire, &[37, 1, 1]);
    send(&mut engine, &mut wire, &[30, 0, 1, 60, 100]);

    let notes: Vec<u8> = wire.note_ons().into_iter().map(|(_, note)| note).collect();
    assert_eq!(vec![76, 60, 70, 67], notes, "Expected left but got right");
}

#[test]
fn extended_channels_use_the_usb_host_port() {
    let mut engine = Engine::new(Config {
        channel_mode: ChannelMode::Extended,
        ..Config::default()
    });
    let mut wire = Wire::default();
    send(&mut engine, &mut wire, &[20, 17, 60, 100]);
    send(&mut engine, &mut wire, &[20, 1, 60, 100]);
    send(&mut engine, &mut wire, &[20, 32, 60, 100]);

    assert_eq!(2, wire.sent.len());
    assert!(matches!(
        wire.sent[0],
        (_, Transport::UsbHost, MidiMessage::NoteOn(Channel::Ch2, Note::C4, _))
    ));
    assert!(matches!(
        wire.sent[1],
        (_, Transport::Trs, MidiMessage::NoteOn(Channel::Ch2, Note::C4, _))
    ));
}

#[test]
fn slewed_nrpn_lands_on_target() {
    let mut engine = Engine::default();
    let mut wire = Wire::default();
    send(&mut engine, &mut wire, &[54, 0, 2, 44, 0, 100]);
    send(&mut engine, &mut wire, &[50, 0, 2, 44, 7, 104]);
    assert!(wire.sent.is_empty());

    run(&mut engine, &mut wire, 200);
    let sent = wire.control_changes();
    assert_eq!(0, sent.len() % 4, "NRPNs are always sent as four Control Changes");
    assert_eq!(
        &[(99, 2), (98, 44), (6, 7), (38, 104)][..],
        &sent[sent.len() - 4..],
        "Expected left but got right"
    );
}

#[test]
fn cc_offset_is_applied() {
    let mut engine = Engine::default();
    let mut wire = Wire::default();
    // -129 in 14 bits moves the 7-bit value down by one
    send(&mut engine, &mut wire, &[42, 0, 74, 0xFF, 0x7F]);
    send(&mut engine, &mut wire, &[45, 0, 74, 64, 0]);

    assert_eq!(vec![(74, 63)], wire.control_changes());
    assert_eq!(vec![0xFF, 0x7F], request(&mut engine, &mut wire, &[41, 0, 74]));
}

#[test]
fn queries_about_received_midi() {
    let mut engine = Engine::default();
    let mut wire = Wire::default();
    send(&mut engine, &mut wire, &[100, 0]);

    let mut packets = Vec::new();
    for (note, velocity) in [(60, 100), (64, 90), (67, 80)] {
        let message = MidiMessage::NoteOn(
            Channel::Ch3,
            Note::from_u8_lossy(note),
            U7::from_u8_lossy(velocity),
        );
        packets.extend_from_slice(&usb_packet(&message));
    }
    let message = MidiMessage::NoteOff(Channel::Ch3, Note::E4, U7::from_u8_lossy(0));
    packets.extend_from_slice(&usb_packet(&message));
    engine.receive_midi(&packets);

    assert_eq!(vec![67], request(&mut engine, &mut wire, &[110, 2, 0]));
    assert_eq!(vec![60], request(&mut engine, &mut wire, &[110, 2, 1]), "64 was released");
    assert_eq!(vec![100], request(&mut engine, &mut wire, &[111, 2, 1]));
    assert_eq!(vec![2], request(&mut engine, &mut wire, &[130]));
    assert_eq!(vec![64], request(&mut engine, &mut wire, &[133]));
    assert!(wire.sent.is_empty(), "Received MIDI is not echoed");
}

#[test]
fn reads_without_request_are_ignored() {
    let mut engine = Engine::default();
    let mut wire = Wire::default();

    let now = Instant::from_millis(0);
    assert!(engine.dispatch(&[1], false, now, &mut wire).is_empty());
    assert!(engine.dispatch(&[200, 1, 2, 3], true, now, &mut wire).is_empty());
    assert_eq!(vec![0, 100], request(&mut engine, &mut wire, &[1]));
}

#[test]
fn panic_stops_pending_work() {
    let mut engine = Engine::default();
    let mut wire = Wire::default();
    for offset in [0, 12] {
        send(&mut engine, &mut wire, &[31, 1, offset]);
    }
    send(&mut engine, &mut wire, &[151, 1, 0, 20]);
    send(&mut engine, &mut wire, &[8, 0, 3]);
    send(&mut engine, &mut wire, &[30, 0, 1, 60, 100]);
    send(&mut engine, &mut wire, &[22]);
    wire.sent.clear();

    run(&mut engine, &mut wire, 1_000);
    assert!(wire.note_ons().is_empty(), "Expected silence after a panic");
    assert_eq!(vec![0, 0], request(&mut engine, &mut wire, &[7]));
}
