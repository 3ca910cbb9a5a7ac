//! Shared cell guarded by a group's semaphore.

use core::sync::atomic::{AtomicU32, Ordering};

/// Word shared by the two tasks of a group.
///
/// Accesses are relaxed atomics: the semaphore is what is supposed to order
/// them. A broken semaphore therefore shows up as a value mismatch instead
/// of undefined behaviour.
pub struct SharedCell(AtomicU32);

impl SharedCell {
    pub const fn new(value: u32) -> Self {
        Self(AtomicU32::new(value))
    }

    #[inline]
    pub fn load(&self) -> u32 {
        self.0.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn store(&self, value: u32) {
        self.0.store(value, Ordering::Relaxed)
    }
}
