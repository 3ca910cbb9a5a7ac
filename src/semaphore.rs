//! # Binary Semaphores
//!
//! Statically allocated binary semaphores. The table only records whether a
//! slot is allocated and whether the semaphore is currently available; the
//! list of waiters lives in the TCBs (`waiting_on`), so the scheduler owns
//! every blocking decision.

use crate::config::MAX_SEMAPHORES;
use crate::error::KernelError;

/// Handle to a semaphore in the kernel table. Cheap to copy and share.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub struct SemaphoreHandle(u8);

impl SemaphoreHandle {
    pub(crate) const fn new(index: u8) -> Self {
        Self(index)
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy)]
struct SemaphoreControlBlock {
    allocated: bool,
    available: bool,
}

impl SemaphoreControlBlock {
    const EMPTY: Self = Self {
        allocated: false,
        available: false,
    };
}

/// Fixed-size table of binary semaphores.
pub struct SemaphoreTable {
    slots: [SemaphoreControlBlock; MAX_SEMAPHORES],
}

impl SemaphoreTable {
    pub const fn new() -> Self {
        Self {
            slots: [SemaphoreControlBlock::EMPTY; MAX_SEMAPHORES],
        }
    }

    /// Allocate a binary semaphore in the available state.
    pub fn create_binary(&mut self) -> Result<SemaphoreHandle, KernelError> {
        let index = self
            .slots
            .iter()
            .position(|s| !s.allocated)
            .ok_or(KernelError::SemaphoreTableFull)?;
        self.slots[index] = SemaphoreControlBlock {
            allocated: true,
            available: true,
        };
        Ok(SemaphoreHandle::new(index as u8))
    }

    fn slot_mut(&mut self, handle: SemaphoreHandle) -> Result<&mut SemaphoreControlBlock, KernelError> {
        match self.slots.get_mut(handle.index()) {
            Some(slot) if slot.allocated => Ok(slot),
            _ => Err(KernelError::InvalidHandle),
        }
    }

    /// Check that `handle` names an allocated semaphore.
    pub fn validate(&self, handle: SemaphoreHandle) -> Result<(), KernelError> {
        match self.slots.get(handle.index()) {
            Some(slot) if slot.allocated => Ok(()),
            _ => Err(KernelError::InvalidHandle),
        }
    }

    /// Take the semaphore if it is available, without blocking.
    pub fn try_take(&mut self, handle: SemaphoreHandle) -> Result<(), KernelError> {
        let slot = self.slot_mut(handle)?;
        if slot.available {
            slot.available = false;
            Ok(())
        } else {
            Err(KernelError::WouldBlock)
        }
    }

    /// Make the semaphore available again. Rejected if it already is.
    pub fn release(&mut self, handle: SemaphoreHandle) -> Result<(), KernelError> {
        let slot = self.slot_mut(handle)?;
        if slot.available {
            return Err(KernelError::NotHeld);
        }
        slot.available = true;
        Ok(())
    }

    /// Whether the semaphore is currently held by someone.
    pub fn is_held(&self, handle: SemaphoreHandle) -> Result<bool, KernelError> {
        self.validate(handle)?;
        Ok(!self.slots[handle.index()].available)
    }
}
