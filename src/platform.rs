//! The hardware operations a software serial port needs from the board.
//!
//! Global interrupt masking is not part of this trait: the port uses the
//! `critical-section` implementation selected by the application, which saves
//! and restores the previous interrupt state.

use crate::timing::CpuProfile;

/// Electrical configuration of a GPIO line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PinMode {
    /// High-impedance input.
    Input,
    /// Input with the internal pull-up enabled.
    InputPullUp,
    /// Push-pull output.
    Output,
}

/// Electrical edge that arms the receive interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Edge {
    /// High to low transition.
    Falling,
    /// Low to high transition.
    Rising,
}

impl Edge {
    /// The electrical edge that starts a frame.
    ///
    /// A start bit is a logical 0, which is a falling edge on a normal line and
    /// a rising edge on an inverted one.
    pub const fn start_bit(inverse_logic: bool) -> Self {
        if inverse_logic {
            Edge::Rising
        } else {
            Edge::Falling
        }
    }
}

/// Board glue for pins, edge interrupts and cycle-accurate delays.
///
/// All methods take `&self` because they are reached both from foreground code
/// and from the receive interrupt through a shared [`crate::Registry`].
/// Implementations for real hardware are usually zero-sized types that poke
/// registers directly.
///
/// The interrupt vector armed by [`Platform::arm_interrupt`] must call
/// [`crate::Registry::handle_interrupt`].
pub trait Platform {
    /// Identifier of a GPIO line.
    type Pin: Copy + PartialEq;

    /// Delay and overhead figures for [`Platform::busy_wait`].
    fn cpu_profile(&self) -> CpuProfile;

    /// Reconfigure `pin`.
    fn set_mode(&self, pin: Self::Pin, mode: PinMode);

    /// Read the electrical level of `pin`.
    fn is_high(&self, pin: Self::Pin) -> bool;

    /// Drive `pin` high or low. On an input this may toggle the pull-up, as
    /// on AVR parts.
    fn set_level(&self, pin: Self::Pin, high: bool);

    /// Enable the edge interrupt of `pin`.
    fn arm_interrupt(&self, pin: Self::Pin, edge: Edge);

    /// Disable the edge interrupt of `pin`.
    fn disarm_interrupt(&self, pin: Self::Pin);

    /// Spin for `ticks` units of the profile's tick rate.
    fn busy_wait(&self, ticks: u32);
}
