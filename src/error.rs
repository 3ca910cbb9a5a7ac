//! # Kernel Errors
//!
//! Every fallible kernel operation reports one of these variants. None of
//! them is fatal: callers decide whether to retry, degrade, or report.

use core::fmt;

/// Failure reported by a kernel or runtime operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub enum KernelError {
    /// The static task table has no free slot.
    TaskTableFull,
    /// The static semaphore table has no free slot.
    SemaphoreTableFull,
    /// The semaphore handle does not name an allocated semaphore.
    InvalidHandle,
    /// The task id does not name an allocated task.
    InvalidTask,
    /// A zero-timeout take found the semaphore unavailable.
    WouldBlock,
    /// A blocking take gave up after its timeout elapsed.
    Timeout,
    /// A give was rejected because the semaphore was already available.
    NotHeld,
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            KernelError::TaskTableFull => "task table full",
            KernelError::SemaphoreTableFull => "semaphore table full",
            KernelError::InvalidHandle => "invalid semaphore handle",
            KernelError::InvalidTask => "invalid task id",
            KernelError::WouldBlock => "semaphore unavailable",
            KernelError::Timeout => "timed out waiting for semaphore",
            KernelError::NotHeld => "semaphore released while not held",
        };
        f.write_str(msg)
    }
}
