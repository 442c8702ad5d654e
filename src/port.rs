//! A software serial port.

use crate::{
    Error,
    direction::{DirectionController, Duplex},
    platform::{Edge, Platform},
    registry::Registry,
    ring_buffer::DEFAULT_CAPACITY,
    rx::{RxConfig, RxState},
    timing::Timing,
    tx,
};

/// Registry slot of a port. Selects the port's overflow bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PortId(u8);

impl PortId {
    pub(crate) const fn new(slot: u8) -> Self {
        PortId(slot)
    }

    pub(crate) const fn mask(self) -> u32 {
        1 << self.0
    }
}

/// Line options of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// Electrical high is logical 0. Mostly useful for RS-232 level lines
    /// without a level shifter; untested with half-duplex wiring.
    pub inverse_logic: bool,
    /// Whether the transmit pin is released between bytes.
    pub duplex: Duplex,
}

/// A UART emulated on GPIO pins.
///
/// Transmission is bit-banged synchronously by [`SoftSerial::write`].
/// Reception is interrupt driven: after [`SoftSerial::begin`] or
/// [`SoftSerial::listen`] the registry's interrupt handler samples incoming
/// frames on this port's receive pin into the shared buffer. Any number of
/// ports can transmit, but only one listens at a time; making another port
/// listen discards what this one had buffered.
///
/// Dropping the port stops it listening.
pub struct SoftSerial<'r, P: Platform, const N: usize = DEFAULT_CAPACITY> {
    registry: &'r Registry<P, N>,
    id: PortId,
    pins: DirectionController<P::Pin>,
    inverse_logic: bool,
    timing: Option<Timing>,
}

impl<'r, P: Platform, const N: usize> SoftSerial<'r, P, N> {
    /// Create a port on `receive_pin` and `transmit_pin`.
    ///
    /// No pin is touched until [`SoftSerial::begin`].
    ///
    /// # Errors
    ///
    /// [`Error::TooManyPorts`] if the registry already has
    /// [`crate::MAX_PORTS`] live ports.
    pub fn new(
        registry: &'r Registry<P, N>,
        receive_pin: P::Pin,
        transmit_pin: P::Pin,
        config: Config,
    ) -> Result<Self, Error> {
        let id = registry.allocate()?;
        Ok(Self {
            registry,
            id,
            pins: DirectionController::new(
                receive_pin,
                transmit_pin,
                config.duplex,
                config.inverse_logic,
            ),
            inverse_logic: config.inverse_logic,
            timing: None,
        })
    }

    /// Create a half-duplex port that transmits and receives on one `pin`.
    ///
    /// # Errors
    ///
    /// See [`SoftSerial::new`].
    pub fn half_duplex(
        registry: &'r Registry<P, N>,
        pin: P::Pin,
        inverse_logic: bool,
    ) -> Result<Self, Error> {
        Self::new(
            registry,
            pin,
            pin,
            Config {
                inverse_logic,
                duplex: Duplex::Half,
            },
        )
    }

    /// The pin roles of this port.
    pub fn pins(&self) -> &DirectionController<P::Pin> {
        &self.pins
    }

    /// The delays computed by the last [`SoftSerial::begin`], if any.
    pub fn timing(&self) -> Option<&Timing> {
        self.timing.as_ref()
    }

    /// Calibrate for `baud`, set up the pins and start listening.
    ///
    /// Rates above the platform's [`crate::CpuProfile::max_reliable_baud`] are
    /// accepted, but received bytes may be corrupt; check
    /// [`Timing::degraded`].
    pub fn begin(&mut self, baud: u32) {
        let platform = self.registry.platform();
        let timing = Timing::calibrate(baud, &platform.cpu_profile());
        self.timing = Some(timing);

        self.pins.setup_transmit(platform);
        // Hold the line idle for a bit so the first start bit is recognizable.
        platform.busy_wait(timing.tx_delay);

        info!("port {} started at {=u32} baud", self.id, baud);
        self.listen();
    }

    /// Make this the listening port.
    ///
    /// Returns `true` if this changed the listening port. Returns `false` if
    /// [`SoftSerial::begin`] has not been called, or if this port was already
    /// listening, in which case only its receive timing is refreshed.
    ///
    /// Bytes buffered for the previously listening port are discarded.
    pub fn listen(&mut self) -> bool {
        let Some(timing) = self.timing else {
            return false;
        };
        let rx = RxConfig {
            port: self.id,
            pin: self.pins.receive_pin(),
            inverse_logic: self.inverse_logic,
            timing,
        };

        critical_section::with(|cs| {
            if !self.registry.activate(cs, rx) {
                return false;
            }
            let platform = self.registry.platform();
            self.pins.setup_receive(platform);
            platform.arm_interrupt(rx.pin, Edge::start_bit(self.inverse_logic));
            debug!("port {} listening", self.id);
            true
        })
    }

    /// Stop listening. Does nothing if another port is listening.
    ///
    /// A frame being sampled completes before this takes effect.
    pub fn end(&mut self) {
        if critical_section::with(|cs| self.registry.deactivate(cs, self.id)) {
            debug!("port {} stopped listening", self.id);
        }
    }

    /// Whether this is the listening port.
    pub fn is_listening(&self) -> bool {
        critical_section::with(|cs| self.registry.is_active(cs, self.id))
    }

    /// Whether a received byte was dropped because the buffer was full.
    ///
    /// Clears the flag: only the first call after an overflow returns `true`.
    pub fn overflow(&mut self) -> bool {
        self.registry.take_overflow(self.id)
    }

    /// Take the oldest received byte. `None` if there is none or this port is
    /// not listening.
    pub fn read(&mut self) -> Option<u8> {
        critical_section::with(|cs| {
            if !self.registry.is_active(cs, self.id) {
                return None;
            }
            self.registry.buffer().pop(cs)
        })
    }

    /// Like [`SoftSerial::read`] but leaves the byte in the buffer.
    pub fn peek(&self) -> Option<u8> {
        critical_section::with(|cs| {
            if !self.registry.is_active(cs, self.id) {
                return None;
            }
            self.registry.buffer().peek(cs)
        })
    }

    /// Number of buffered bytes. 0 if this port is not listening.
    pub fn available(&self) -> usize {
        critical_section::with(|cs| {
            if !self.registry.is_active(cs, self.id) {
                return 0;
            }
            self.registry.buffer().len()
        })
    }

    /// Discard the buffered bytes of this port.
    pub fn flush(&mut self) {
        critical_section::with(|cs| {
            if self.registry.is_active(cs, self.id) {
                self.registry.buffer().clear(cs);
            }
        });
    }

    /// Transmit `byte`, blocking for about ten bit periods with interrupts
    /// disabled. Returns the number of bytes written.
    ///
    /// Writes nothing and returns 0 if [`SoftSerial::begin`] has not been
    /// called, or if this half-duplex port is listening and a frame is being
    /// sampled, which can only be observed from a context that preempts the
    /// receive interrupt.
    pub fn write(&mut self, byte: u8) -> usize {
        match self.transmit(byte) {
            Ok(()) => 1,
            Err(_) => 0,
        }
    }

    fn transmit(&mut self, byte: u8) -> Result<(), Error> {
        let Some(timing) = self.timing else {
            warn!("port {} written before begin", self.id);
            return Err(Error::NotStarted);
        };

        critical_section::with(|cs| {
            if self.pins.duplex() == Duplex::Half
                && self.registry.rx_state() != RxState::Idle
                && self.registry.is_active(cs, self.id)
            {
                warn!("port {} is receiving, dropping write", self.id);
                return Err(Error::Receiving);
            }

            let platform = self.registry.platform();
            self.pins.configure_for_transmit(platform);
            tx::send_frame(
                platform,
                self.pins.transmit_pin(),
                byte,
                self.inverse_logic,
                timing.tx_delay,
            );
            self.pins.configure_for_receive(platform);
            Ok(())
        })
    }

    /// Wait until at least one byte is buffered for this port.
    ///
    /// Stays pending while another port is listening.
    #[cfg(feature = "async-await")]
    pub async fn wait_for_data(&mut self) {
        core::future::poll_fn(|cx| {
            self.registry.register_waker(cx.waker());

            if self.available() == 0 {
                core::task::Poll::Pending
            } else {
                core::task::Poll::Ready(())
            }
        })
        .await
    }
}

impl<P: Platform, const N: usize> Drop for SoftSerial<'_, P, N> {
    fn drop(&mut self) {
        self.end();
        self.registry.release(self.id);
    }
}

impl<P: Platform, const N: usize> embedded_io::ErrorType for SoftSerial<'_, P, N> {
    type Error = Error;
}

impl<P: Platform, const N: usize> embedded_io::Write for SoftSerial<'_, P, N> {
    /// Transmits all of `buf`, one blocking frame per byte.
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        let Some((&first, rest)) = buf.split_first() else {
            return Ok(0);
        };
        self.transmit(first)?;
        let sent = rest
            .iter()
            .take_while(|&&byte| self.transmit(byte).is_ok())
            .count();
        Ok(1 + sent)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        // Frames leave the pin before `write` returns.
        Ok(())
    }
}

impl<P: Platform, const N: usize> embedded_io::Read for SoftSerial<'_, P, N> {
    /// Blocks until at least one byte is buffered for this port, then copies
    /// out as many as fit. Returns 0 at once if the port is not listening.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            let n = critical_section::with(|cs| {
                if !self.registry.is_active(cs, self.id) {
                    return None;
                }
                let buffer = self.registry.buffer();
                let n = buf
                    .iter_mut()
                    .map_while(|slot| buffer.pop(cs).map(|byte| *slot = byte))
                    .count();
                Some(n)
            });
            match n {
                None => return Ok(0),
                Some(0) => continue,
                Some(n) => return Ok(n),
            }
        }
    }
}

impl<P: Platform, const N: usize> embedded_io::ReadReady for SoftSerial<'_, P, N> {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        Ok(self.available() > 0)
    }
}

impl<P: Platform, const N: usize> core::fmt::Write for SoftSerial<'_, P, N> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        embedded_io::Write::write_all(self, s.as_bytes()).map_err(|_| core::fmt::Error)
    }
}
