//! # SemGuard Configuration
//!
//! Compile-time constants governing the kernel and the mutual-exclusion
//! self-test. All limits are fixed at compile time; no dynamic allocation.

use crate::task::Priority;

// ---------------------------------------------------------------------------
// Kernel
// ---------------------------------------------------------------------------

/// Maximum number of tasks the system can manage simultaneously,
/// including the idle task. This bounds the static TCB array. Increase
/// with care: each task consumes `STACK_SIZE` bytes of RAM.
pub const MAX_TASKS: usize = 8;

/// Maximum number of binary semaphores in the kernel's static table.
pub const MAX_SEMAPHORES: usize = 4;

/// SysTick frequency in Hz. Determines scheduler tick granularity.
pub const TICK_HZ: u32 = 1000;

/// Default time slice in ticks. Equal-priority tasks rotate round-robin
/// every time their slice runs out.
pub const DEFAULT_TIME_SLICE: u32 = 10;

/// Per-task stack size in bytes. Must be large enough for the
/// deepest call chain plus the hardware exception frame (32 bytes)
/// and the software-saved context (32 bytes for R4–R11).
pub const STACK_SIZE: usize = 1024;

/// Priority of the idle task. Polling self-test tasks share it.
pub const IDLE_PRIORITY: Priority = 0;

/// Block time meaning "wait until the semaphore is given".
pub const WAIT_FOREVER: u32 = u32::MAX;

/// System clock frequency in Hz (default for STM32F4 at 16 MHz HSI).
pub const SYSTEM_CLOCK_HZ: u32 = 16_000_000;

/// Convert milliseconds to scheduler ticks, rounding down.
#[inline]
pub const fn ms_to_ticks(ms: u32) -> u32 {
    ((ms as u64 * TICK_HZ as u64) / 1000) as u32
}

// ---------------------------------------------------------------------------
// Mutual-exclusion self-test
// ---------------------------------------------------------------------------

/// Value the polling group counts its shared cell up to. Kept small so the
/// idle-priority tasks finish a cycle within the CPU time they get.
pub const POLLING_EXPECTED_VALUE: u32 = 0xFF;

/// Value the blocking group counts its shared cell up to. Large enough that
/// the critical section reliably spans several ticks.
pub const BLOCKING_EXPECTED_VALUE: u32 = 0xFFF;

/// Semaphore block time of the blocking group, in milliseconds.
pub const BLOCK_TIME_MS: u32 = 100;

/// Multiplier applied to a group's block time to obtain the post-cycle
/// sleep that lets lower-priority tasks run.
pub const DELAY_FACTOR: u32 = 10;

/// Number of tasks whose progress is tracked (two per group).
pub const MAX_CHECKED_TASKS: usize = 4;

/// Depth of the diagnostic message queue.
pub const DIAGNOSTIC_QUEUE_DEPTH: usize = 8;

/// Priority handed to the blocking self-test group by the firmware.
pub const SELF_TEST_PRIORITY: Priority = 2;

/// Priority of the supervisor task. Must sit above every self-test task.
pub const SUPERVISOR_PRIORITY: Priority = 3;

/// Ticks between two supervisor liveness polls. Long enough for every
/// self-test task, including the paced blocking ones, to finish a cycle.
pub const SUPERVISOR_PERIOD_TICKS: u32 = ms_to_ticks(3000);
