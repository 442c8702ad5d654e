//! Receive and transmit pin roles, including the shared half-duplex line.

use crate::platform::{PinMode, Platform};

/// Whether transmit and receive use separate lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Duplex {
    /// Separate receive and transmit pins; the transmit pin stays an output.
    #[default]
    Full,
    /// The transmit pin is an input except while a byte is sent, pulled up
    /// unless the line is inverted. Usually the same pin as the receive pin.
    Half,
}

/// Owns the pin roles of one port.
///
/// Every direction change of the transmit pin goes through
/// [`DirectionController::as_input`] or [`DirectionController::as_output`], so
/// the half-duplex rule (a shared line is never driven while it is being
/// sampled) is enforced in one place: the port only calls
/// [`DirectionController::configure_for_transmit`] and
/// [`DirectionController::configure_for_receive`] from inside the transmit
/// critical section.
#[derive(Debug, Clone, Copy)]
pub struct DirectionController<Pin> {
    receive: Pin,
    transmit: Pin,
    duplex: Duplex,
    inverse_logic: bool,
}

impl<Pin: Copy + PartialEq> DirectionController<Pin> {
    pub(crate) const fn new(receive: Pin, transmit: Pin, duplex: Duplex, inverse_logic: bool) -> Self {
        Self {
            receive,
            transmit,
            duplex,
            inverse_logic,
        }
    }

    /// The line sampled by the receive interrupt.
    pub fn receive_pin(&self) -> Pin {
        self.receive
    }

    /// The line driven by the transmit engine.
    pub fn transmit_pin(&self) -> Pin {
        self.transmit
    }

    /// Full or half duplex.
    pub fn duplex(&self) -> Duplex {
        self.duplex
    }

    /// Electrical level of an idle (logical 1) line.
    pub(crate) fn idle_level(&self) -> bool {
        !self.inverse_logic
    }

    /// Initial transmit pin setup, done once per `begin`.
    pub(crate) fn setup_transmit<P: Platform<Pin = Pin>>(&self, platform: &P) {
        match self.duplex {
            Duplex::Full => self.as_output(platform),
            Duplex::Half => self.as_input(platform),
        }
    }

    /// Receive pin setup, done whenever the port starts listening.
    ///
    /// The pull-up holds an unconnected non-inverted line at its idle level.
    /// An inverted line idles low and gets no pull-up.
    pub(crate) fn setup_receive<P: Platform<Pin = Pin>>(&self, platform: &P) {
        platform.set_mode(self.receive, self.input_mode());
        if self.duplex == Duplex::Half && self.transmit != self.receive {
            self.as_input(platform);
        }
    }

    /// Make the transmit pin drivable. A no-op in full duplex.
    pub(crate) fn configure_for_transmit<P: Platform<Pin = Pin>>(&self, platform: &P) {
        if self.duplex == Duplex::Half {
            self.as_output(platform);
        }
    }

    /// Release the transmit pin back to the line. A no-op in full duplex.
    pub(crate) fn configure_for_receive<P: Platform<Pin = Pin>>(&self, platform: &P) {
        if self.duplex == Duplex::Half {
            self.as_input(platform);
        }
    }

    fn as_output<P: Platform<Pin = Pin>>(&self, platform: &P) {
        // Latch the idle level first so switching direction does not glitch the line.
        platform.set_level(self.transmit, self.idle_level());
        platform.set_mode(self.transmit, PinMode::Output);
    }

    fn as_input<P: Platform<Pin = Pin>>(&self, platform: &P) {
        platform.set_mode(self.transmit, self.input_mode());
    }

    /// Input mode of a released line: pulled up to idle unless inverted.
    fn input_mode(&self) -> PinMode {
        if self.inverse_logic {
            PinMode::Input
        } else {
            PinMode::InputPullUp
        }
    }
}
