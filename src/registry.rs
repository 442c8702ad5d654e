//! Receiver state shared by every port and the receive interrupt.

use crate::{
    Error,
    platform::Platform,
    port::PortId,
    ring_buffer::{DEFAULT_CAPACITY, RingBuffer},
    rx::{self, RxConfig, RxState},
};
use core::{
    cell::Cell,
    sync::atomic::{AtomicU8, AtomicU32, Ordering},
};
use critical_section::{CriticalSection, Mutex};

/// Most ports that can be attached to one [`Registry`].
pub const MAX_PORTS: usize = 32;

/// The single receive path shared by all ports on a platform.
///
/// Only one edge interrupt can sample a line at a time, so at most one port
/// listens at any moment. The registry records which one, holds the buffer its
/// bytes land in, and latches overflows per port. It is usually a `static`
/// that every [`crate::SoftSerial`] borrows and that the board's interrupt
/// vector drives:
///
/// ```ignore
/// static SERIAL: Registry<Board> = Registry::new(Board);
///
/// #[interrupt]
/// fn PCINT0() {
///     SERIAL.handle_interrupt();
/// }
/// ```
///
/// # Concurrency
///
/// Foreground code changes the listening port and consumes bytes inside
/// critical sections. The interrupt handler is the sole producer of the ring
/// buffer and needs no lock: it publishes one complete byte per invocation by
/// storing the buffer's head index last, and a reader that sees the new index
/// sees the byte. `state` doubles as the guard that keeps the producer single:
/// an invocation that finds it anything but [`RxState::Idle`] returns at once.
pub struct Registry<P: Platform, const N: usize = DEFAULT_CAPACITY> {
    platform: P,
    active: Mutex<Cell<Option<RxConfig<P::Pin>>>>,
    buffer: RingBuffer<N>,
    state: AtomicU8,
    /// One bit per port, set by the interrupt when that port's byte was dropped.
    overflow: AtomicU32,
    /// One bit per allocated port id.
    ports: AtomicU32,
    #[cfg(feature = "async-await")]
    waker: crate::atomic_waker::AtomicWaker,
}

impl<P: Platform, const N: usize> Registry<P, N> {
    /// Creates a registry with no listening port and an empty buffer.
    pub const fn new(platform: P) -> Self {
        Self {
            platform,
            active: Mutex::new(Cell::new(None)),
            buffer: RingBuffer::new(),
            state: AtomicU8::new(RxState::Idle as u8),
            overflow: AtomicU32::new(0),
            ports: AtomicU32::new(0),
            #[cfg(feature = "async-await")]
            waker: crate::atomic_waker::AtomicWaker::new(),
        }
    }

    /// The platform the ports drive.
    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// Size of the shared receive buffer.
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Current state of the receive state machine.
    pub fn rx_state(&self) -> RxState {
        RxState::from_bits(self.state.load(Ordering::Acquire))
    }

    /// Service the receive edge interrupt.
    ///
    /// Call this from the interrupt vector armed through
    /// [`Platform::arm_interrupt`]. Samples one whole frame of the listening
    /// port, busy-waiting for about nine and a half bit periods, and stores the
    /// byte. Does nothing when no port is listening, when the line is not at
    /// the start-bit level, or when a frame is already being sampled.
    pub fn handle_interrupt(&self) {
        let Some(rx) = critical_section::with(|cs| self.active.borrow(cs).get()) else {
            return;
        };

        if self
            .state
            .compare_exchange(
                RxState::Idle as u8,
                RxState::Sampling as u8,
                Ordering::Acquire,
                Ordering::Relaxed,
            )
            .is_err()
        {
            return;
        }

        if let Some(byte) = rx::sample_frame(&self.platform, &rx, &self.state) {
            // SAFETY: The Idle -> Sampling exchange above admits a single producer
            // until `state` returns to Idle below.
            if unsafe { self.buffer.push(byte) } {
                trace!("received {=u8:#x}", byte);
                #[cfg(feature = "async-await")]
                self.waker.wake();
            } else {
                let mask = rx.port.mask();
                if self.overflow.fetch_or(mask, Ordering::Relaxed) & mask == 0 {
                    warn!("receive buffer full, dropping bytes for port {}", rx.port);
                }
            }
        }

        self.state.store(RxState::Idle as u8, Ordering::Release);
    }

    pub(crate) fn allocate(&self) -> Result<PortId, Error> {
        critical_section::with(|_| {
            let used = self.ports.load(Ordering::Relaxed);
            let free = (!used).trailing_zeros() as usize;
            if free >= MAX_PORTS {
                return Err(Error::TooManyPorts);
            }
            let id = PortId::new(free as u8);
            self.ports.store(used | id.mask(), Ordering::Relaxed);
            self.overflow.fetch_and(!id.mask(), Ordering::Relaxed);
            Ok(id)
        })
    }

    pub(crate) fn release(&self, id: PortId) {
        self.ports.fetch_and(!id.mask(), Ordering::Relaxed);
        self.overflow.fetch_and(!id.mask(), Ordering::Relaxed);
    }

    pub(crate) fn is_active(&self, cs: CriticalSection<'_>, id: PortId) -> bool {
        self.active.borrow(cs).get().is_some_and(|rx| rx.port == id)
    }

    /// Make `rx` the listening port. Returns `false` if it already was.
    ///
    /// The previous port's interrupt is disarmed and its unread bytes dropped.
    /// The caller configures and arms the new receive pin afterwards, inside
    /// the same critical section. If `rx` is already listening only its
    /// settings are replaced; the buffer and the armed interrupt are kept.
    pub(crate) fn activate(&self, cs: CriticalSection<'_>, rx: RxConfig<P::Pin>) -> bool {
        let slot = self.active.borrow(cs);
        if let Some(previous) = slot.get() {
            if previous.port == rx.port {
                slot.set(Some(rx));
                return false;
            }
            self.platform.disarm_interrupt(previous.pin);
            debug!("port {} stops listening", previous.port);
        }
        slot.set(Some(rx));
        self.buffer.clear(cs);
        true
    }

    /// Stop receiving if `id` is the listening port.
    pub(crate) fn deactivate(&self, cs: CriticalSection<'_>, id: PortId) -> bool {
        let slot = self.active.borrow(cs);
        match slot.get() {
            Some(rx) if rx.port == id => {
                self.platform.disarm_interrupt(rx.pin);
                slot.set(None);
                true
            }
            _ => false,
        }
    }

    pub(crate) fn buffer(&self) -> &RingBuffer<N> {
        &self.buffer
    }

    /// Return and clear the overflow latch of `id`.
    pub(crate) fn take_overflow(&self, id: PortId) -> bool {
        self.overflow.fetch_and(!id.mask(), Ordering::Relaxed) & id.mask() != 0
    }

    #[cfg(feature = "async-await")]
    pub(crate) fn register_waker(&self, waker: &core::task::Waker) {
        self.waker.register(waker);
    }

    #[cfg(test)]
    pub(crate) fn force_state(&self, state: RxState) {
        self.state.store(state as u8, Ordering::Release);
    }
}
