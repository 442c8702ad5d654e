//! A virtual-time platform for host tests.
//!
//! Instructions are free and `busy_wait` advances a tick counter. Each pin
//! records its mode changes and the levels it drove while an output, and can be
//! fed a stimulus waveform that `is_high` replays against the current time.
//!
//! The platform reports [`CpuProfile::ideal`] and charges nothing for code
//! between waits, so loopback tests check the delay arithmetic and sampling
//! points only. The `CpuProfile::avr` overhead figures are not exercised here.

use crate::{
    platform::{Edge, PinMode, Platform},
    registry::Registry,
    timing::CpuProfile,
};
use core::cell::RefCell;
use std::vec::Vec;

pub(crate) const TICK_RATE: u32 = 16_000_000;

const PINS: usize = 8;

/// Idle time inserted before a looped-back waveform.
const LOOPBACK_GAP: u64 = 1000;

#[derive(Default)]
struct SimPin {
    mode: Option<PinMode>,
    latch: bool,
    modes: Vec<PinMode>,
    driven: Vec<(u64, bool)>,
    stimulus: Vec<(u64, bool)>,
    /// Stimulus entries already turned into interrupts.
    delivered: usize,
    armed: Option<Edge>,
}

impl SimPin {
    /// Level of an undriven line: pulled up or floating low.
    fn resting_level(&self) -> bool {
        self.mode == Some(PinMode::InputPullUp)
    }

    fn stimulus_at(&self, now: u64) -> Option<bool> {
        self.stimulus
            .iter()
            .take_while(|&&(t, _)| t <= now)
            .last()
            .map(|&(_, level)| level)
    }
}

struct SimState {
    now: u64,
    pins: [SimPin; PINS],
}

pub(crate) struct Sim {
    state: RefCell<SimState>,
}

impl Sim {
    pub(crate) fn new() -> Self {
        Self {
            state: RefCell::new(SimState {
                now: 0,
                pins: Default::default(),
            }),
        }
    }

    pub(crate) fn now(&self) -> u64 {
        self.state.borrow().now
    }

    pub(crate) fn mode(&self, pin: usize) -> Option<PinMode> {
        self.state.borrow().pins[pin].mode
    }

    /// Every mode `pin` was set to, oldest first.
    pub(crate) fn modes(&self, pin: usize) -> Vec<PinMode> {
        self.state.borrow().pins[pin].modes.clone()
    }

    /// `(time, level)` of every write to `pin` while it was an output.
    pub(crate) fn driven(&self, pin: usize) -> Vec<(u64, bool)> {
        self.state.borrow().pins[pin].driven.clone()
    }

    pub(crate) fn armed(&self, pin: usize) -> Option<Edge> {
        self.state.borrow().pins[pin].armed
    }

    /// Append absolute-time `(time, level)` entries to the waveform seen on `pin`.
    pub(crate) fn stimulate(&self, pin: usize, wave: &[(u64, bool)]) {
        self.state.borrow_mut().pins[pin].stimulus.extend_from_slice(wave);
    }

    /// Move what `from` drove onto the stimulus of `to`, starting shortly after now.
    pub(crate) fn loopback(&self, from: usize, to: usize) {
        let mut state = self.state.borrow_mut();
        let wave = core::mem::take(&mut state.pins[from].driven);
        let Some(&(first, _)) = wave.first() else {
            return;
        };
        let start = state.now + LOOPBACK_GAP;
        state.pins[to]
            .stimulus
            .extend(wave.iter().map(|&(t, level)| (t - first + start, level)));
    }

    /// Undelivered edges on `pin` that match its armed edge, and the new cursor.
    fn pending_edges(&self, pin: usize) -> (Vec<u64>, usize) {
        let state = self.state.borrow();
        let p = &state.pins[pin];
        let Some(edge) = p.armed else {
            return (Vec::new(), p.stimulus.len());
        };
        let mut previous = match p.delivered {
            0 => p.resting_level(),
            n => p.stimulus[n - 1].1,
        };
        let mut edges = Vec::new();
        for &(t, level) in &p.stimulus[p.delivered..] {
            let hit = match edge {
                Edge::Falling => previous && !level,
                Edge::Rising => !previous && level,
            };
            if hit {
                edges.push(t);
            }
            previous = level;
        }
        (edges, p.stimulus.len())
    }
}

/// Fire the interrupt of `pin` for every armed edge in its stimulus.
///
/// Like a latched pin-change flag, edges that happen while the handler is busy
/// collapse into one interrupt taken as soon as it returns.
pub(crate) fn deliver<const N: usize>(registry: &Registry<Sim, N>, pin: usize) {
    let sim = registry.platform();
    let (edges, cursor) = sim.pending_edges(pin);
    sim.state.borrow_mut().pins[pin].delivered = cursor;

    let mut next = 0;
    while next < edges.len() {
        let now = {
            let mut state = sim.state.borrow_mut();
            state.now = state.now.max(edges[next]);
            state.now
        };
        while next < edges.len() && edges[next] <= now {
            next += 1;
        }
        if sim.armed(pin).is_some() {
            registry.handle_interrupt();
        }
    }
}

impl Platform for Sim {
    type Pin = usize;

    fn cpu_profile(&self) -> CpuProfile {
        CpuProfile::ideal(TICK_RATE)
    }

    fn set_mode(&self, pin: usize, mode: PinMode) {
        let mut state = self.state.borrow_mut();
        let p = &mut state.pins[pin];
        p.mode = Some(mode);
        p.modes.push(mode);
    }

    fn is_high(&self, pin: usize) -> bool {
        let state = self.state.borrow();
        let p = &state.pins[pin];
        if p.mode == Some(PinMode::Output) {
            return p.latch;
        }
        p.stimulus_at(state.now).unwrap_or_else(|| p.resting_level())
    }

    fn set_level(&self, pin: usize, high: bool) {
        let mut state = self.state.borrow_mut();
        let now = state.now;
        let p = &mut state.pins[pin];
        p.latch = high;
        if p.mode == Some(PinMode::Output) {
            p.driven.push((now, high));
        }
    }

    fn arm_interrupt(&self, pin: usize, edge: Edge) {
        self.state.borrow_mut().pins[pin].armed = Some(edge);
    }

    fn disarm_interrupt(&self, pin: usize) {
        self.state.borrow_mut().pins[pin].armed = None;
    }

    fn busy_wait(&self, ticks: u32) {
        self.state.borrow_mut().now += u64::from(ticks);
    }
}
