//! Provides structs for slewing controller values from one point to another over time.

use super::control::scale_down;
use embassy_time::{Duration, Instant};
use tinyvec::ArrayVec;

/// Number of controllers that can slew at the same time.
pub const RAMPS: usize = 8;

/// Which kind of message a ramp produces.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RampKind {
    /// A Control Change, scaled down to 7 bits.
    #[default]
    Cc,
    /// A full NRPN sequence carrying the 14-bit value.
    Nrpn,
}

/// The controller a ramp is driving.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Assignment {
    /// Output channel index.
    pub channel: u8,
    /// Controller number; 7 bits for CCs, 14 bits for NRPNs.
    pub controller: u16,
    /// Which message the value is sent as.
    pub kind: RampKind,
}

/// A single linear interpolation toward a target value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ramp {
    /// Where the current movement began.
    origin: i32,
    target: i32,
    value: i32,
    /// The [`Instant`] at which the movement began.
    start: Instant,
    duration: Duration,
    last_update: Instant,
    running: bool,
}

impl Default for Ramp {
    fn default() -> Self {
        Self {
            origin: 0,
            target: 0,
            value: 0,
            start: Instant::MIN,
            duration: Duration::from_ticks(0),
            last_update: Instant::MIN,
            running: false,
        }
    }
}

impl Ramp {
    /// Starts moving from wherever the ramp is now to `target`, arriving `duration` after `now`.
    pub fn go(&mut self, target: i32, duration: Duration, now: Instant) {
        self.origin = self.value;
        self.target = target;
        self.start = now;
        self.duration = duration;
        self.last_update = now;
        self.running = true;
    }

    /// Jumps to `value` without producing any output.
    pub fn snap(&mut self, value: i32) {
        self.origin = value;
        self.target = value;
        self.value = value;
        self.running = false;
    }

    /// Getter.
    pub fn value(&self) -> i32 {
        self.value
    }

    /// Returns `true` until the target has been reached.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Advances the ramp, returning the new value if it moved.
    ///
    /// Between the start and the end of the movement, updates are spaced at least `grain` apart. The final value is
    /// always produced once the duration has passed.
    pub fn update(&mut self, now: Instant, grain: Duration) -> Option<i32> {
        if !self.running {
            return None;
        }
        let elapsed = now.saturating_duration_since(self.start);
        if elapsed >= self.duration {
            self.value = self.target;
            self.last_update = now;
            self.running = false;
            return Some(self.value);
        }
        if now.saturating_duration_since(self.last_update) < grain {
            return None;
        }

        let distance = i64::from(self.target) - i64::from(self.origin);
        let progress = elapsed.as_micros() as i64;
        let total = self.duration.as_micros() as i64;
        self.value = self.origin + (distance * progress / total) as i32;
        self.last_update = now;
        Some(self.value)
    }
}

/// A value a ramp wants sent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RampOutput {
    /// Where the value goes.
    pub assignment: Assignment,
    /// The unscaled 14-bit value.
    pub value: i32,
}

/// A fixed pool of [`Ramp`]s, each assigned to the controller that last used it.
///
/// A controller keeps its ramp until pool pressure hands the ramp to another controller. New ramps are taken
/// round-robin, skipping ramps that are still moving; when all of them are, the next one in line is taken over.
#[derive(Clone, Copy, Debug, Default)]
pub struct Ramps {
    ramps: [Ramp; RAMPS],
    assignments: [Option<Assignment>; RAMPS],
    /// Last 7-bit projection seen per ramp, used to suppress redundant output.
    last_scaled: [i32; RAMPS],
    count: usize,
}

impl Ramps {
    /// Slews the controller to `target` over `duration`. `prior` is the controller's value before this change and
    /// becomes the starting point if the controller has to be assigned a ramp first.
    ///
    /// Returns the index of the ramp in use.
    pub fn start(
        &mut self,
        assignment: Assignment,
        prior: i32,
        target: i32,
        duration: Duration,
        now: Instant,
    ) -> usize {
        let index = match self.assigned(assignment) {
            Some(index) => index,
            None => {
                let index = self.next_free();
                self.assignments[index] = Some(assignment);
                self.ramps[index].snap(prior);
                debug!("Using a new ramp {} for controller {}", index, assignment.controller);
                index
            }
        };
        self.ramps[index].go(target, duration, now);
        index
    }

    /// Returns the index of the ramp assigned to a controller.
    pub fn assigned(&self, assignment: Assignment) -> Option<usize> {
        self.assignments
            .iter()
            .position(|assigned| *assigned == Some(assignment))
    }

    /// Getter.
    pub fn get(&self, index: usize) -> Option<&Ramp> {
        self.ramps.get(index)
    }

    /// Advances every running ramp and returns the values whose 7-bit projection changed since the last update.
    pub fn update(&mut self, now: Instant, grain: Duration) -> ArrayVec<[RampOutput; RAMPS]> {
        let mut outputs = ArrayVec::new();
        for index in 0..RAMPS {
            let Some(value) = self.ramps[index].update(now, grain) else {
                continue;
            };
            let scaled = scale_down(value);
            if scaled != self.last_scaled[index] {
                if let Some(assignment) = self.assignments[index] {
                    outputs.push(RampOutput { assignment, value });
                }
            }
            self.last_scaled[index] = scaled;
        }
        outputs
    }

    fn next_free(&mut self) -> usize {
        self.count = self.count.wrapping_add(1);
        let mut current = self.count % RAMPS;
        for _ in 0..RAMPS {
            if !self.ramps[current].is_running() {
                break;
            }
            self.count = self.count.wrapping_add(1);
            current = self.count % RAMPS;
        }
        current
    }
}
