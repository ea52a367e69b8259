//! Control Change and NRPN output, with per-controller offsets and slew times.

use super::Engine;
use super::ramp::{Assignment, RampKind};
use crate::configuration::CHANNELS_PER_TRANSPORT;
use crate::io::MidiOut;
use embassy_time::{Duration, Instant};
use wmidi::{ControlFunction, MidiMessage, U7};

/// Number of Control Change controllers per channel.
pub const CONTROLLERS: usize = 128;

/// Number of NRPN controllers that can carry an offset or slew time.
pub const NRPN_SLOTS: usize = 8;

/// Highest 14-bit Control Change value.
pub const CC_MAX: i32 = 16383;

/// Highest NRPN value accepted before encoding. One above the 14-bit range, so it is never actually sent.
pub const NRPN_MAX: i32 = 16384;

/// Scales a 7-bit value up to 14 bits.
pub fn scale_up(value: i32) -> i32 {
    value * 129
}

/// Scales a 14-bit value down to 7 bits, rounding to the nearest step.
pub fn scale_down(value: i32) -> i32 {
    let doubled = (value << 1) / 129;
    (doubled >> 1) + (doubled & 1)
}

/// Stored state of one Control Change controller.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CcState {
    /// Last value set, 14 bits, offset already applied.
    value: u16,
    /// Milliseconds.
    slew: u16,
    offset: i16,
}

impl CcState {
    /// Getter.
    pub fn value(&self) -> u16 {
        self.value
    }

    /// Getter.
    pub fn slew(&self) -> u16 {
        self.slew
    }

    /// Getter.
    pub fn offset(&self) -> i16 {
        self.offset
    }
}

/// Offset and slew time of one NRPN controller. A slot with controller 0 counts as free.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NrpnSlot {
    channel: u8,
    controller: u16,
    offset: i16,
    slew: u16,
    /// Last value set, the starting point of the next slew.
    value: u16,
}

/// All controller state of the output channels.
#[derive(Clone, Copy, Debug)]
pub struct Controls {
    cc: [[CcState; CONTROLLERS]; 2 * CHANNELS_PER_TRANSPORT as usize],
    nrpn: [NrpnSlot; NRPN_SLOTS],
    nrpn_count: usize,
}

impl Default for Controls {
    fn default() -> Self {
        Self {
            cc: [[CcState::default(); CONTROLLERS]; 2 * CHANNELS_PER_TRANSPORT as usize],
            nrpn: [NrpnSlot::default(); NRPN_SLOTS],
            nrpn_count: 0,
        }
    }
}

impl Controls {
    /// Returns a controller's state, if channel and controller are valid.
    pub fn cc(&self, channel: usize, controller: usize) -> Option<&CcState> {
        self.cc.get(channel).and_then(|cc| cc.get(controller))
    }

    fn nrpn_index(&self, channel: u8, controller: u16) -> Option<usize> {
        self.nrpn
            .iter()
            .position(|slot| slot.channel == channel && slot.controller == controller)
    }

    /// Finds the slot of a controller on any channel.
    fn nrpn_index_by_controller(&self, controller: u16) -> Option<usize> {
        self.nrpn.iter().position(|slot| slot.controller == controller)
    }

    /// Returns the slot already holding the controller, or claims the next free one. When no slot is free, the next
    /// one in line is taken over.
    fn nrpn_slot(&mut self, channel: u8, controller: u16) -> &mut NrpnSlot {
        let index = match self.nrpn_index(channel, controller) {
            Some(index) => index,
            None => {
                self.nrpn_count = self.nrpn_count.wrapping_add(1);
                let mut current = self.nrpn_count % NRPN_SLOTS;
                for _ in 0..NRPN_SLOTS {
                    if self.nrpn[current].controller == 0 {
                        break;
                    }
                    self.nrpn_count = self.nrpn_count.wrapping_add(1);
                    current = self.nrpn_count % NRPN_SLOTS;
                }
                self.nrpn[current] = NrpnSlot::default();
                current
            }
        };
        let slot = &mut self.nrpn[index];
        slot.channel = channel;
        slot.controller = controller;
        slot
    }
}

impl Engine {
    /// Sets a Control Change controller to a 14-bit value, after adding its offset and clamping to `0..=16383`.
    ///
    /// With a slew time configured, the value is approached by a ramp; if `use_ramp` is `false` that ramp takes a
    /// single millisecond. Without a slew time the scaled down value is sent right away.
    pub fn set_cc(
        &mut self,
        channel: i32,
        controller: i32,
        value: i32,
        use_ramp: bool,
        now: Instant,
        out: &mut impl MidiOut,
    ) {
        let Some((channel, controller)) = self.cc_address(channel, controller) else {
            return;
        };
        let state = self.controls.cc[usize::from(channel)][usize::from(controller)];
        let value = (value + i32::from(state.offset)).clamp(0, CC_MAX);

        if state.slew != 0 {
            let slew = if use_ramp { u64::from(state.slew) } else { 1 };
            self.ramps.start(
                Assignment {
                    channel,
                    controller: u16::from(controller),
                    kind: RampKind::Cc,
                },
                i32::from(state.value),
                value,
                Duration::from_millis(slew),
                now,
            );
        } else {
            self.send_cc(channel, controller, scale_down(value) as u8, out);
        }
        self.controls.cc[usize::from(channel)][usize::from(controller)].value = value as u16;
    }

    /// Sets the offset added to every value of a controller, clamped to the 14-bit range in either direction.
    pub fn set_cc_offset(&mut self, channel: i32, controller: i32, offset: i32) {
        if let Some((channel, controller)) = self.cc_address(channel, controller) {
            self.controls.cc[usize::from(channel)][usize::from(controller)].offset =
                offset.clamp(-scale_up(127), scale_up(127)) as i16;
        }
    }

    /// Sets the slew time of a controller in milliseconds. Negative times are ignored.
    pub fn set_cc_slew(&mut self, channel: i32, controller: i32, slew: i32) {
        if !(0..=i32::from(i16::MAX)).contains(&slew) {
            return;
        }
        if let Some((channel, controller)) = self.cc_address(channel, controller) {
            self.controls.cc[usize::from(channel)][usize::from(controller)].slew = slew as u16;
        }
    }

    /// Returns the state of a controller. Invalid channels and controllers read channel 0 and controller 0.
    pub fn cc_state(&self, channel: i32, controller: i32) -> CcState {
        let channel = if self.config.channel_mode.contains(channel) {
            channel as usize
        } else {
            0
        };
        let controller = if (0..CONTROLLERS as i32).contains(&controller) {
            controller as usize
        } else {
            0
        };
        self.controls.cc[channel][controller]
    }

    /// Returns all controller state.
    pub fn controls(&self) -> &Controls {
        &self.controls
    }

    /// Sets an NRPN controller to a value, after adding its offset and clamping to `0..=16384`.
    ///
    /// Offset and slew time are taken from the first slot holding the controller number, whatever its channel. With
    /// a slew time and `use_ramp` the value is approached by a ramp, otherwise it is sent right away.
    pub fn set_nrpn(
        &mut self,
        channel: i32,
        controller: i32,
        value: i32,
        use_ramp: bool,
        now: Instant,
        out: &mut impl MidiOut,
    ) {
        if !self.config.channel_mode.contains(channel) || !(0..=CC_MAX).contains(&controller) {
            return;
        }
        let (channel, controller) = (channel as u8, controller as u16);
        let slot = self.controls.nrpn_index_by_controller(controller);
        let (offset, slew, prior) = slot
            .map(|index| self.controls.nrpn[index])
            .map(|slot| (i32::from(slot.offset), slot.slew, i32::from(slot.value)))
            .unwrap_or_default();
        let value = (value + offset).clamp(0, NRPN_MAX);

        if use_ramp && slew != 0 {
            self.ramps.start(
                Assignment {
                    channel,
                    controller,
                    kind: RampKind::Nrpn,
                },
                prior,
                value,
                Duration::from_millis(u64::from(slew)),
                now,
            );
        } else {
            self.send_nrpn(channel, controller, value, out);
        }
        if let Some(index) = slot {
            self.controls.nrpn[index].value = value as u16;
        }
    }

    /// Sets the offset of an NRPN controller on a channel, clamped to `-16384..=16384`.
    pub fn set_nrpn_offset(&mut self, channel: i32, controller: i32, offset: i32) {
        if !self.config.channel_mode.contains(channel) || !(0..=CC_MAX).contains(&controller) {
            return;
        }
        self.controls
            .nrpn_slot(channel as u8, controller as u16)
            .offset = offset.clamp(-NRPN_MAX, NRPN_MAX) as i16;
    }

    /// Sets the slew time of an NRPN controller on a channel. Negative times are ignored.
    pub fn set_nrpn_slew(&mut self, channel: i32, controller: i32, slew: i32) {
        if !self.config.channel_mode.contains(channel)
            || !(0..=CC_MAX).contains(&controller)
            || !(0..=i32::from(i16::MAX)).contains(&slew)
        {
            return;
        }
        self.controls
            .nrpn_slot(channel as u8, controller as u16)
            .slew = slew as u16;
    }

    /// Returns the offset of an NRPN controller on a channel, or 0 if none is stored.
    pub fn nrpn_offset(&self, channel: i32, controller: i32) -> i32 {
        self.nrpn_lookup(channel, controller)
            .map_or(0, |slot| i32::from(slot.offset))
    }

    /// Returns the slew time of an NRPN controller on a channel, or 0 if none is stored.
    pub fn nrpn_slew(&self, channel: i32, controller: i32) -> i32 {
        self.nrpn_lookup(channel, controller)
            .map_or(0, |slot| i32::from(slot.slew))
    }

    fn nrpn_lookup(&self, channel: i32, controller: i32) -> Option<NrpnSlot> {
        let channel = u8::try_from(channel).ok()?;
        let controller = u16::try_from(controller).ok()?;
        self.controls
            .nrpn_index(channel, controller)
            .map(|index| self.controls.nrpn[index])
    }

    /// Sends values produced by the ramps.
    pub(crate) fn update_ramps(&mut self, now: Instant, out: &mut impl MidiOut) {
        for output in self.ramps.update(now, self.config.ramp_grain) {
            let Assignment {
                channel,
                controller,
                kind,
            } = output.assignment;
            match kind {
                RampKind::Cc => {
                    self.send_cc(channel, controller as u8, scale_down(output.value) as u8, out)
                }
                RampKind::Nrpn => self.send_nrpn(channel, controller, output.value, out),
            }
        }
    }

    fn cc_address(&self, channel: i32, controller: i32) -> Option<(u8, u8)> {
        (self.config.channel_mode.contains(channel) && (0..CONTROLLERS as i32).contains(&controller))
            .then_some((channel as u8, controller as u8))
    }

    fn send_cc(&self, channel: u8, controller: u8, value: u8, out: &mut impl MidiOut) {
        self.send(channel, out, |wire| {
            MidiMessage::ControlChange(
                wire,
                ControlFunction(U7::from_u8_lossy(controller)),
                U7::from_u8_lossy(value),
            )
        });
    }

    /// Sends the four Control Changes of an NRPN. Nothing is sent if any part does not fit into 7 bits.
    pub(super) fn send_nrpn(&self, channel: u8, controller: u16, value: i32, out: &mut impl MidiOut) {
        let parts = [
            i32::from(controller) >> 7,
            i32::from(controller) & 0x7F,
            value >> 7,
            value & 0x7F,
        ];
        if parts.iter().any(|part| !(0..=127).contains(part)) {
            warn!("NRPN {} does not fit value {}", controller, value);
            return;
        }
        let functions = [
            ControlFunction::NON_REGISTERED_PARAMETER_NUMBER_MSB,
            ControlFunction::NON_REGISTERED_PARAMETER_NUMBER_LSB,
            ControlFunction::DATA_ENTRY_MSB,
            ControlFunction::DATA_ENTRY_LSB,
        ];
        for (function, part) in functions.into_iter().zip(parts) {
            self.send_cc(channel, u8::from(function), part as u8, out);
        }
    }
}
