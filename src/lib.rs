#![no_std]
#![warn(missing_docs)]
#![doc = include_str!("../README.md")]

#[cfg(test)]
extern crate std;

// This must go first so the logging macros are visible to the other modules.
mod fmt;

#[cfg(feature = "async-await")]
mod atomic_waker;
pub mod direction;
pub mod platform;
mod port;
mod registry;
pub mod ring_buffer;
pub mod rx;
mod tx;
pub mod timing;

#[cfg(test)]
mod sim;

pub use direction::{DirectionController, Duplex};
pub use platform::{Edge, PinMode, Platform};
pub use port::{Config, PortId, SoftSerial};
pub use registry::{MAX_PORTS, Registry};
pub use ring_buffer::{DEFAULT_CAPACITY, RingBuffer};
pub use rx::RxState;
pub use timing::{CpuProfile, Timing};
pub use tx::frame_bits;

/// Errors reported by a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The registry already has [`MAX_PORTS`] live ports.
    TooManyPorts,
    /// The port was written before [`SoftSerial::begin`].
    NotStarted,
    /// A half-duplex port was written while its line was receiving.
    Receiving,
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::TooManyPorts => write!(f, "all {MAX_PORTS} port slots are in use"),
            Error::NotStarted => f.write_str("port has no baud rate, call begin first"),
            Error::Receiving => f.write_str("half-duplex line is busy receiving"),
        }
    }
}

impl core::error::Error for Error {}

impl embedded_io::Error for Error {
    fn kind(&self) -> embedded_io::ErrorKind {
        embedded_io::ErrorKind::Other
    }
}
