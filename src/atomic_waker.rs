//! Waker slot shared between a waiting reader and the receive interrupt.

use core::{cell::UnsafeCell, task::Waker};

/// Holds the waker of the single task waiting for received data.
pub(crate) struct AtomicWaker {
    waker: UnsafeCell<Option<Waker>>,
}

// SAFETY: `waker` is only accessed inside critical sections.
unsafe impl Send for AtomicWaker {}
// SAFETY: `waker` is only accessed inside critical sections.
unsafe impl Sync for AtomicWaker {}

impl AtomicWaker {
    pub(crate) const fn new() -> Self {
        Self {
            waker: UnsafeCell::new(None),
        }
    }

    /// Register `new_waker`, replacing the previous one unless it would wake
    /// the same task.
    pub(crate) fn register(&self, new_waker: &Waker) {
        critical_section::with(|_| {
            // SAFETY: Exclusive access inside the critical section, no re-entrant use.
            let slot = unsafe { &mut *self.waker.get() };
            if !slot.as_ref().is_some_and(|w| w.will_wake(new_waker)) {
                *slot = Some(new_waker.clone());
            }
        });
    }

    /// Wake and forget the registered waker, if any.
    ///
    /// The waker is invoked after the critical section ends.
    pub(crate) fn wake(&self) {
        // SAFETY: Exclusive access inside the critical section, no re-entrant use.
        let waker = critical_section::with(|_| unsafe { &mut *self.waker.get() }.take());
        if let Some(w) = waker {
            w.wake();
        }
    }
}
