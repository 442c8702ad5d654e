//! A single-producer, single-consumer (SPSC) byte queue shared with the receive interrupt.

use core::{
    cell::UnsafeCell,
    mem::MaybeUninit,
    sync::atomic::{AtomicU32, Ordering},
};
use critical_section::CriticalSection;

/// Default number of bytes buffered between the receive interrupt and the reader.
pub const DEFAULT_CAPACITY: usize = 64;

/// A fixed-capacity byte queue storing up to `N` bytes.
///
/// The receive interrupt is the only producer, foreground code the consumer.
/// Neither side takes a lock:
///
/// - The producer writes the byte into its slot and only then publishes it by
///   storing `write` with `Release`.
/// - The consumer reads the slot after an `Acquire` load of `write`, and hands
///   the slot back by storing `read` with `Release`.
///
/// A consumer therefore never sees a half-written byte, and the producer never
/// overwrites a byte the consumer has not released. A full queue rejects new
/// bytes; nothing is ever evicted.
///
/// Both indices run modulo `2 * N` so that a full queue (`write - read == N`)
/// is distinguishable from an empty one (`write == read`).
pub struct RingBuffer<const N: usize> {
    /// Where the next read starts (the tail).
    ///
    /// Only the consumer stores to it. Always `< 2 * N`.
    read: AtomicU32,
    /// Where the next write goes (the head).
    ///
    /// Only the producer stores to it. Always `< 2 * N`.
    write: AtomicU32,
    buf: [UnsafeCell<MaybeUninit<u8>>; N],
}

// SAFETY: The slots are only touched under the SPSC protocol described on the type:
// - `push` is `unsafe` and requires a single producer.
// - Consumer methods require a `CriticalSection`, which serializes consumers.
// - Ownership of each slot is handed over through Release/Acquire on the indices.
unsafe impl<const N: usize> Sync for RingBuffer<N> {}

impl<const N: usize> RingBuffer<N> {
    const WRAP: u32 = {
        assert!(N > 0, "ring buffer capacity must be non-zero");
        assert!(N <= (u32::MAX / 4) as usize, "ring buffer capacity too large");
        2 * N as u32
    };

    /// Creates an empty queue.
    pub const fn new() -> Self {
        let _ = Self::WRAP;
        RingBuffer {
            read: AtomicU32::new(0),
            write: AtomicU32::new(0),
            buf: [const { UnsafeCell::new(MaybeUninit::uninit()) }; N],
        }
    }

    /// Maximum number of buffered bytes.
    #[inline]
    pub const fn capacity(&self) -> usize {
        N
    }

    #[inline]
    fn distance(read: u32, write: u32) -> usize {
        ((write + Self::WRAP - read) % Self::WRAP) as usize
    }

    #[inline]
    fn slot(index: u32) -> usize {
        index as usize % N
    }

    /// Number of unread bytes.
    #[inline]
    pub fn len(&self) -> usize {
        // Acquire: synchronizes with the producer's Release store of `write`.
        let write = self.write.load(Ordering::Acquire);
        let read = self.read.load(Ordering::Acquire);
        Self::distance(read, write)
    }

    /// Returns `true` if there is no data available to read.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends `byte`. Returns `false`, leaving the queue untouched, if it is full.
    ///
    /// # Safety
    ///
    /// There must be a single producer: `push` must not run concurrently with
    /// another `push` on the same queue.
    #[inline]
    pub unsafe fn push(&self, byte: u8) -> bool {
        // Relaxed: producer owns `write`.
        let write = self.write.load(Ordering::Relaxed);
        // Acquire: the consumer is done with every slot before `read`.
        let read = self.read.load(Ordering::Acquire);
        if Self::distance(read, write) == N {
            return false;
        }

        // SAFETY:
        // - `slot(write) < N`, so the index is in bounds.
        // - The queue is not full, so the slot is producer-owned: the consumer does
        //   not read it until `write` is published below.
        // - The caller guarantees no other producer writes concurrently.
        unsafe { self.buf[Self::slot(write)].get().write(MaybeUninit::new(byte)) };

        self.write.store((write + 1) % Self::WRAP, Ordering::Release);
        true
    }

    /// The next unread byte, without consuming it.
    #[inline]
    pub fn peek(&self, _cs: CriticalSection<'_>) -> Option<u8> {
        // Acquire: synchronizes with the producer's Release store of `write`.
        let write = self.write.load(Ordering::Acquire);
        // Relaxed: consumers own `read`, and the critical section serializes them.
        let read = self.read.load(Ordering::Relaxed);
        if read == write {
            return None;
        }

        // SAFETY:
        // - `slot(read) < N`, so the index is in bounds.
        // - `read != write`, so the slot was initialized by the producer before its
        //   Release store of `write`, which the Acquire load above observed.
        // - The producer does not write this slot until `read` moves past it.
        Some(unsafe { (*self.buf[Self::slot(read)].get()).assume_init() })
    }

    /// Removes and returns the next unread byte.
    #[inline]
    pub fn pop(&self, cs: CriticalSection<'_>) -> Option<u8> {
        let byte = self.peek(cs)?;
        let read = self.read.load(Ordering::Relaxed);
        // Release: the slot is handed back to the producer only after it was read.
        self.read.store((read + 1) % Self::WRAP, Ordering::Release);
        Some(byte)
    }

    /// Discards every unread byte.
    ///
    /// Only the consumer-owned `read` index moves, so this is safe to race with
    /// an in-flight `push`; a byte published concurrently may survive the clear.
    #[inline]
    pub fn clear(&self, _cs: CriticalSection<'_>) {
        let write = self.write.load(Ordering::Acquire);
        self.read.store(write, Ordering::Release);
    }
}

impl<const N: usize> Default for RingBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::vec::Vec;

    const BUF_SIZE: usize = 4;

    fn push<const N: usize>(b: &RingBuffer<N>, bytes: &[u8]) -> usize {
        // SAFETY: Tests push from a single thread.
        bytes.iter().filter(|&&x| unsafe { b.push(x) }).count()
    }

    fn drain<const N: usize>(b: &RingBuffer<N>) -> Vec<u8> {
        critical_section::with(|cs| core::iter::from_fn(|| b.pop(cs)).collect())
    }

    #[test]
    fn fill_simple() {
        let b = RingBuffer::<BUF_SIZE>::new();
        assert_eq!(push(&b, &[1, 2, 3]), 3);
        assert_eq!(b.len(), 3);
        assert_eq!(drain(&b), [1, 2, 3]);
        assert!(b.is_empty());
    }

    #[test]
    fn fill_to_capacity() {
        let b = RingBuffer::<BUF_SIZE>::new();
        assert_eq!(push(&b, &[1, 2, 3, 4]), BUF_SIZE);
        assert_eq!(b.len(), BUF_SIZE);
        assert_eq!(drain(&b), [1, 2, 3, 4]);
    }

    #[test]
    fn overfill_rejects_newest() {
        let b = RingBuffer::<BUF_SIZE>::new();
        assert_eq!(push(&b, &[1, 2, 3, 4, 5, 6]), BUF_SIZE);
        // SAFETY: Single-threaded test.
        assert!(!unsafe { b.push(7) });
        assert_eq!(drain(&b), [1, 2, 3, 4]);
    }

    #[test]
    fn crossing_end() {
        let b = RingBuffer::<BUF_SIZE>::new();
        push(&b, &[1, 2, 3]);
        critical_section::with(|cs| {
            assert_eq!(b.pop(cs), Some(1));
            assert_eq!(b.pop(cs), Some(2));
        });
        assert_eq!(push(&b, &[4, 5, 6]), 3);
        assert_eq!(b.len(), 4);
        assert_eq!(drain(&b), [3, 4, 5, 6]);
    }

    #[test]
    fn many_wraparounds() {
        let b = RingBuffer::<BUF_SIZE>::new();
        for round in 0..100u8 {
            assert_eq!(push(&b, &[round, round.wrapping_add(1), round.wrapping_add(2)]), 3);
            assert_eq!(drain(&b), [round, round.wrapping_add(1), round.wrapping_add(2)]);
        }
    }

    #[test]
    fn peek_does_not_consume() {
        let b = RingBuffer::<BUF_SIZE>::new();
        critical_section::with(|cs| assert_eq!(b.peek(cs), None));
        push(&b, &[9, 8]);
        critical_section::with(|cs| {
            assert_eq!(b.peek(cs), Some(9));
            assert_eq!(b.peek(cs), Some(9));
            assert_eq!(b.pop(cs), Some(9));
            assert_eq!(b.peek(cs), Some(8));
        });
    }

    #[test]
    fn clear_discards_everything() {
        let b = RingBuffer::<BUF_SIZE>::new();
        push(&b, &[1, 2, 3, 4]);
        critical_section::with(|cs| b.clear(cs));
        assert!(b.is_empty());
        assert_eq!(push(&b, &[5]), 1);
        assert_eq!(drain(&b), [5]);
    }

    #[test]
    fn default_capacity_retains_64_of_70() {
        let b = RingBuffer::<DEFAULT_CAPACITY>::new();
        let bytes: Vec<u8> = (0..70).collect();
        assert_eq!(push(&b, &bytes), 64);
        assert_eq!(b.capacity(), 64);
        assert_eq!(drain(&b), bytes[..64]);
    }
}
