//! The interrupt-driven receive state machine.

use crate::{platform::Platform, port::PortId, timing::Timing};
use core::sync::atomic::{AtomicU8, Ordering};

/// Where the receive interrupt is in the current frame.
///
/// A whole frame is sampled inside one interrupt invocation, so foreground code
/// running on the same core only ever observes [`RxState::Idle`].
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RxState {
    /// Waiting for the edge of a start bit.
    Idle = 0,
    /// Validating the start bit and sampling the data bits.
    Sampling = 1,
    /// Waiting out the stop bit before storing the byte.
    StopCheck = 2,
}

impl RxState {
    pub(crate) fn from_bits(bits: u8) -> Self {
        match bits {
            1 => RxState::Sampling,
            2 => RxState::StopCheck,
            _ => RxState::Idle,
        }
    }
}

/// What the interrupt handler needs to know about the listening port.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RxConfig<Pin> {
    pub(crate) port: PortId,
    pub(crate) pin: Pin,
    pub(crate) inverse_logic: bool,
    pub(crate) timing: Timing,
}

/// Sample one frame. Called from the edge interrupt in state
/// [`RxState::Sampling`]; moves `state` to [`RxState::StopCheck`] once all data
/// bits are in.
///
/// Returns `None` if the line is not at the start-bit level, both on entry and
/// half a bit later. That filters short glitches and the edges latched while a
/// previous frame was being sampled. A glitch that outlasts half a bit is read
/// as a byte. The stop bit is not checked, so a framing error yields whatever
/// the data bits held.
pub(crate) fn sample_frame<P: Platform>(
    platform: &P,
    rx: &RxConfig<P::Pin>,
    state: &AtomicU8,
) -> Option<u8> {
    // Logical 1 is electrical high unless the line is inverted.
    let mark = || platform.is_high(rx.pin) != rx.inverse_logic;

    if mark() {
        return None;
    }
    platform.busy_wait(rx.timing.rx_delay_centering);
    if mark() {
        return None;
    }

    let mut byte = 0u8;
    for _ in 0..8 {
        platform.busy_wait(rx.timing.rx_delay_intrabit);
        byte >>= 1;
        if mark() {
            byte |= 0x80;
        }
    }

    state.store(RxState::StopCheck as u8, Ordering::Relaxed);
    platform.busy_wait(rx.timing.rx_delay_stopbit);

    Some(byte)
}
