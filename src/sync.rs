//! # Synchronization Primitives
//!
//! Interrupt-safe critical section abstractions. All shared kernel and
//! self-test bookkeeping must be accessed within a critical section to
//! prevent data races between tasks and interrupt handlers.
//!
//! On the Cortex-M4 the implementation comes from `cortex-m`'s
//! `critical-section-single-core` feature (PRIMASK based). Host unit tests
//! link the `std` implementation of the `critical-section` crate instead.

pub use critical_section::{CriticalSection, Mutex};

/// Execute a closure within a critical section (interrupts disabled).
///
/// This is the primary mechanism for safely accessing shared mutable state
/// in the SemGuard kernel. Interrupts are disabled on entry and restored on
/// exit, ensuring atomicity of the enclosed operation.
///
/// # Usage
/// ```ignore
/// sync::critical_section(|cs| {
///     // Access shared state safely
/// });
/// ```
///
/// # Performance
/// Keep critical sections as short as possible to minimize interrupt latency.
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce(CriticalSection<'_>) -> R,
{
    critical_section::with(f)
}
